// tests/test_pipeline.rs — Capture worker and end-to-end pipeline runs with
// the synthetic camera and a recording GPU.

mod common;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use common::{CountingTrigger, GpuCall, RecordingGpu};
use lumaview::capture::{
    CameraFrame, CameraSource, CaptureError, CaptureWorker, PixelFormat, SyntheticCamera,
};
use lumaview::display::spawn_render_loop;
use lumaview::pipeline::render_signal;
use lumaview::process::{
    ImageBuf, ImageRef, ImageTransform, ProcessingInvoker, TransformError, TransformKind,
};
use lumaview::Mailbox;

/// Delivers `frames` grey frames, then fails like an unplugged device.
struct FlakyCamera {
    buffer: Vec<u8>,
    frames: u64,
    delivered: u64,
}

impl FlakyCamera {
    fn new(frames: u64) -> Self {
        Self {
            buffer: vec![42; 16],
            frames,
            delivered: 0,
        }
    }
}

impl CameraSource for FlakyCamera {
    fn describe(&self) -> String {
        "flaky".into()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CameraFrame<'_>, CaptureError> {
        if self.delivered == self.frames {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }
        self.delivered += 1;
        Ok(CameraFrame::new(
            &self.buffer,
            4,
            4,
            4,
            PixelFormat::Grey,
            self.delivered,
        ))
    }
}

/// Breaks the size contract on every odd frame.
struct OddFramesBroken {
    calls: u64,
}

impl ImageTransform for OddFramesBroken {
    fn name(&self) -> &str {
        "odd-broken"
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        self.calls += 1;
        if self.calls % 2 == 1 {
            output.resize(input.width + 1, input.height);
        } else {
            output.resize(input.width, input.height);
        }
        Ok(())
    }
}

/// Panics on the third frame, like a native transform that crashes.
struct CrashesOnThird {
    calls: u64,
}

impl ImageTransform for CrashesOnThird {
    fn name(&self) -> &str {
        "crashes-on-third"
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        self.calls += 1;
        if self.calls == 3 {
            panic!("transform crashed");
        }
        output.resize(input.width, input.height);
        Ok(())
    }
}

#[test]
fn worker_publishes_every_frame_and_triggers_once_per_publish() {
    let mailbox = Arc::new(Mailbox::new());
    let trigger = CountingTrigger::default();

    let handle = CaptureWorker::new(
        SyntheticCamera::new(32, 24, 0),
        ProcessingInvoker::new(TransformKind::Identity.build(0)),
        mailbox.clone(),
        trigger.clone(),
    )
    .max_frames(Some(25))
    .spawn()
    .unwrap();

    let stats = handle.join().unwrap();
    assert_eq!(stats.captured, 25);
    assert_eq!(stats.published, 25);
    assert_eq!(stats.dropped, 0);
    assert_eq!(trigger.count(), 25);

    // Nobody consumed: only the newest frame is left.
    let left = mailbox.take().unwrap();
    assert_eq!(left.size(), (32, 24));
    assert!(mailbox.take().is_none());
    assert_eq!(mailbox.stats().overwritten, 24);
}

#[test]
fn contract_violations_drop_the_frame_and_continue() {
    let mailbox = Arc::new(Mailbox::new());
    let trigger = CountingTrigger::default();

    let handle = CaptureWorker::new(
        SyntheticCamera::new(16, 16, 0),
        ProcessingInvoker::new(OddFramesBroken { calls: 0 }),
        mailbox.clone(),
        trigger.clone(),
    )
    .max_frames(Some(10))
    .spawn()
    .unwrap();

    let stats = handle.join().unwrap();
    assert_eq!(stats.captured, 10);
    assert_eq!(stats.dropped, 5);
    assert_eq!(stats.published, 5);
    assert_eq!(trigger.count(), 5, "dropped frames must not trigger a draw");
    assert_eq!(mailbox.stats().published, 5);
}

#[test]
fn camera_failure_ends_session_and_reports_it() {
    let mailbox = Arc::new(Mailbox::new());
    let (report_tx, report_rx) = flume::bounded(1);

    let handle = CaptureWorker::new(
        FlakyCamera::new(3),
        ProcessingInvoker::new(TransformKind::Invert.build(0)),
        mailbox.clone(),
        CountingTrigger::default(),
    )
    .on_exit(move |outcome| {
        let _ = report_tx.send(outcome.as_ref().err().map(ToString::to_string));
    })
    .spawn()
    .unwrap();

    let reported = report_rx.recv().unwrap();
    assert!(reported.unwrap().contains("device unplugged"));

    assert!(matches!(handle.join(), Err(CaptureError::Io(_))));
    assert_eq!(mailbox.stats().published, 3);
    assert_eq!(mailbox.take().unwrap().data()[0], 255 - 42);
}

#[test]
fn transform_panic_ends_session_and_reports_it() {
    let mailbox = Arc::new(Mailbox::new());
    let (report_tx, report_rx) = flume::bounded(1);

    let handle = CaptureWorker::new(
        SyntheticCamera::new(8, 8, 0),
        ProcessingInvoker::new(CrashesOnThird { calls: 0 }),
        mailbox.clone(),
        CountingTrigger::default(),
    )
    .on_exit(move |outcome| {
        let _ = report_tx.send(matches!(outcome, Err(CaptureError::Panicked)));
    })
    .spawn()
    .unwrap();

    let reported = report_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("exit hook must run after a panic");
    assert!(reported, "the hook must see the panic as a failure");

    assert!(matches!(handle.join(), Err(CaptureError::Panicked)));
    assert_eq!(mailbox.stats().published, 2);
}

#[test]
fn stop_lets_the_session_end_cleanly() {
    let mailbox = Arc::new(Mailbox::new());

    let handle = CaptureWorker::new(
        SyntheticCamera::new(8, 8, 200),
        ProcessingInvoker::new(TransformKind::Identity.build(0)),
        mailbox.clone(),
        CountingTrigger::default(),
    )
    .spawn()
    .unwrap();

    let stats = handle.stop().unwrap();
    assert_eq!(stats.published + stats.dropped, stats.captured);
    assert_eq!(mailbox.stats().published, stats.published);
}

#[test]
fn pinning_to_a_missing_core_still_captures() {
    let mailbox = Arc::new(Mailbox::new());

    let handle = CaptureWorker::new(
        SyntheticCamera::new(8, 8, 0),
        ProcessingInvoker::new(TransformKind::Threshold.build(100)),
        mailbox.clone(),
        CountingTrigger::default(),
    )
    .pin_to_core(Some(usize::MAX))
    .max_frames(Some(3))
    .spawn()
    .unwrap();

    assert_eq!(handle.join().unwrap().published, 3);
    assert!(mailbox
        .take()
        .unwrap()
        .data()
        .iter()
        .all(|&v| v == 0 || v == 255));
}

#[test]
fn camera_to_gpu_end_to_end() {
    let gpu = RecordingGpu::new();
    let mailbox = Arc::new(Mailbox::new());
    let (trigger, signal) = render_signal();

    let loop_gpu = gpu.clone();
    let render = spawn_render_loop(
        move || Ok(loop_gpu),
        mailbox.clone(),
        signal,
        (640, 480),
        |_| {},
    )
    .unwrap();

    let capture = CaptureWorker::new(
        SyntheticCamera::new(48, 32, 0),
        ProcessingInvoker::new(TransformKind::Sobel.build(0)),
        mailbox.clone(),
        trigger,
    )
    .max_frames(Some(50))
    .spawn()
    .unwrap();

    let capture_stats = capture.join().unwrap();
    // The worker owned the last trigger; its exit ends the render loop.
    let render_stats = render.join().unwrap();

    assert_eq!(capture_stats.published, 50);
    assert!(render_stats.uploads >= 1);
    assert!(render_stats.uploads <= 50);
    // A trigger can outlive the frame it announced; that draw reuses the texture.
    assert!(render_stats.uploads <= render_stats.draws);

    // The newest frame always reaches the GPU; nothing is left behind.
    assert!(mailbox.is_empty());
    let stats = mailbox.stats();
    assert_eq!(stats.taken + stats.overwritten, stats.published);

    let uploads = gpu.uploads();
    assert_eq!(uploads.len() as u64, render_stats.uploads);
    assert!(uploads.iter().all(|call| *call
        == GpuCall::ReplaceTexture {
            width: 48,
            height: 32,
            len: 48 * 32,
        }));
}
