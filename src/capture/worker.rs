//! Dedicated capture thread: acquire, process, publish, trigger

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::capture::source::{CameraSource, CaptureError};
use crate::pipeline::{Mailbox, RenderTrigger};
use crate::process::{ImageTransform, ProcessingInvoker};

/// Counters for one capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames dequeued from the camera.
    pub captured: u64,
    /// Frames handed to the mailbox.
    pub published: u64,
    /// Frames discarded because extraction or processing failed.
    pub dropped: u64,
}

pub type CaptureOutcome = Result<CaptureStats, CaptureError>;

type ExitHook = Box<dyn FnOnce(&CaptureOutcome) + Send>;

/// Builder for the capture thread.
pub struct CaptureWorker<S, T, R> {
    source: S,
    invoker: ProcessingInvoker<T>,
    mailbox: Arc<Mailbox>,
    trigger: R,
    pin_core: Option<usize>,
    max_frames: Option<u64>,
    on_exit: Option<ExitHook>,
}

impl<S, T, R> CaptureWorker<S, T, R>
where
    S: CameraSource + 'static,
    T: ImageTransform + 'static,
    R: RenderTrigger,
{
    pub fn new(
        source: S,
        invoker: ProcessingInvoker<T>,
        mailbox: Arc<Mailbox>,
        trigger: R,
    ) -> Self {
        Self {
            source,
            invoker,
            mailbox,
            trigger,
            pin_core: None,
            max_frames: None,
            on_exit: None,
        }
    }

    /// Pin the capture thread to a CPU core.
    pub fn pin_to_core(mut self, core: Option<usize>) -> Self {
        self.pin_core = core;
        self
    }

    /// End the session cleanly after this many camera frames.
    pub fn max_frames(mut self, limit: Option<u64>) -> Self {
        self.max_frames = limit;
        self
    }

    /// Called on the capture thread with the session outcome, just before it exits.
    pub fn on_exit(mut self, hook: impl FnOnce(&CaptureOutcome) + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }

    pub fn spawn(mut self) -> Result<CaptureHandle, CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let on_exit = self.on_exit.take();

        let thread = thread::Builder::new()
            .name("lumaview-capture".into())
            .spawn(move || {
                // A panicking transform or camera still reports through the hook.
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(&thread_stop)))
                    .unwrap_or(Err(CaptureError::Panicked));
                match &outcome {
                    Ok(stats) => info!(?stats, "Capture session ended"),
                    Err(e) => warn!("Capture session failed: {}", e),
                }
                if let Some(hook) = on_exit {
                    hook(&outcome);
                }
                outcome
            })?;

        Ok(CaptureHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn run(self, stop: &AtomicBool) -> CaptureOutcome {
        let Self {
            mut source,
            mut invoker,
            mailbox,
            trigger,
            pin_core,
            max_frames,
            ..
        } = self;

        if let Some(core) = pin_core {
            pin_current_thread(core);
        }

        source.start()?;
        info!(
            "Capture session started: {} -> {}",
            source.describe(),
            invoker.transform_name()
        );

        let mut stats = CaptureStats::default();

        while !stop.load(Ordering::Acquire) {
            if max_frames.is_some_and(|limit| stats.captured >= limit) {
                debug!("Frame limit reached");
                break;
            }

            // Borrow of the camera buffer; it goes back to the camera when
            // this iteration ends, whichever branch runs.
            let camera_frame = source.next_frame()?;
            stats.captured += 1;

            let processed = camera_frame
                .extract_luma()
                .map_err(|e| e.to_string())
                .and_then(|input| invoker.process(&input).map_err(|e| e.to_string()));

            match processed {
                Ok(frame) => {
                    mailbox.publish(frame);
                    trigger.request_render();
                    stats.published += 1;
                    metrics::counter!("capture_frames_published").increment(1);
                }
                Err(reason) => {
                    warn!(sequence = camera_frame.sequence(), "Dropping frame: {}", reason);
                    stats.dropped += 1;
                    metrics::counter!("capture_frames_dropped").increment(1);
                }
            }
        }

        Ok(stats)
    }
}

fn pin_current_thread(core: usize) {
    let Some(id) = core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .find(|id| id.id == core)
    else {
        warn!("CPU core {} not available, capture thread left unpinned", core);
        return;
    };

    if core_affinity::set_for_current(id) {
        info!("Capture thread pinned to core {}", core);
    } else {
        warn!("Failed to pin capture thread to core {}", core);
    }
}

/// Owner-side handle of a running capture thread.
///
/// Dropping the handle asks the thread to stop without waiting for it.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<CaptureOutcome>>,
}

impl CaptureHandle {
    /// Ask the thread to stop after the frame it is working on.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop the session and wait for the thread. The in-flight frame is
    /// allowed to finish and be published.
    pub fn stop(mut self) -> CaptureOutcome {
        self.request_stop();
        self.join_thread()
    }

    /// Wait for the session to end on its own.
    pub fn join(mut self) -> CaptureOutcome {
        self.join_thread()
    }

    fn join_thread(&mut self) -> CaptureOutcome {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(Err(CaptureError::Panicked)),
            None => Ok(CaptureStats::default()),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}
