//! Headless render driver on a dedicated thread
//!
//! Same callback sequence as the windowed driver, but the GPU context lives
//! on its own thread and sleeps on a [`RenderSignal`] between draws.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::display::renderer::{GpuContext, RenderCallbacks, RenderError, RenderStats, Renderer};
use crate::pipeline::{Mailbox, RenderSignal};

pub type RenderOutcome = Result<RenderStats, RenderError>;

/// Handle to the render thread.
pub struct RenderHandle {
    thread: JoinHandle<RenderOutcome>,
}

impl RenderHandle {
    /// Wait for the loop to end. It ends once every trigger is dropped, or
    /// on the first GPU error.
    pub fn join(self) -> RenderOutcome {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(RenderError::Draw("render thread panicked".into())))
    }
}

/// Start the render thread and wait until its context is ready.
///
/// `make_gpu` runs on the new thread so the GPU context never crosses
/// threads. Startup failures (device, program, texture) are returned here,
/// before any draw happens. `on_exit` runs on the render thread with the
/// final outcome.
pub fn spawn_render_loop<G, F>(
    make_gpu: F,
    mailbox: Arc<Mailbox>,
    signal: RenderSignal,
    size: (u32, u32),
    on_exit: impl FnOnce(&RenderOutcome) + Send + 'static,
) -> Result<RenderHandle, RenderError>
where
    G: GpuContext + 'static,
    F: FnOnce() -> Result<G, RenderError> + Send + 'static,
{
    let (ready_tx, ready_rx) = flume::bounded::<bool>(1);

    let thread = thread::Builder::new()
        .name("lumaview-render".into())
        .spawn(move || {
            let outcome = run(make_gpu, mailbox, signal, size, ready_tx);
            on_exit(&outcome);
            outcome
        })
        .map_err(|e| RenderError::Device(format!("failed to spawn render thread: {e}")))?;

    let handle = RenderHandle { thread };
    if ready_rx.recv() == Ok(true) {
        return Ok(handle);
    }

    // Startup failed; the thread has the error.
    match handle.join() {
        Err(e) => Err(e),
        Ok(_) => Err(RenderError::Device("render thread exited during startup".into())),
    }
}

fn run<G, F>(
    make_gpu: F,
    mailbox: Arc<Mailbox>,
    signal: RenderSignal,
    size: (u32, u32),
    ready: flume::Sender<bool>,
) -> RenderOutcome
where
    G: GpuContext,
    F: FnOnce() -> Result<G, RenderError>,
{
    let startup = make_gpu().and_then(|gpu| {
        let mut renderer = Renderer::new(gpu, mailbox);
        renderer.on_context_created()?;
        renderer.on_surface_resized(size.0, size.1)?;
        Ok(renderer)
    });

    let _ = ready.send(startup.is_ok());
    let mut renderer = startup?;
    info!(width = size.0, height = size.1, "Render loop started");

    while signal.wait() {
        let outcome = renderer.on_draw()?;
        debug!(?outcome, "Drew frame");
    }

    renderer.destroy();
    let stats = renderer.stats();
    info!(?stats, "Render loop finished");
    Ok(stats)
}
