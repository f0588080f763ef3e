//! Lumaview: live camera frames through a grey transform onto the GPU

use std::path::Path;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use lumaview::capture::{CameraSource, CaptureOutcome, CaptureWorker, SyntheticCamera, V4l2Camera};
use lumaview::display::{
    self, spawn_render_loop, DisplayApp, PipelineEvent, WgpuContext, WindowTrigger,
};
use lumaview::pipeline::render_signal;
use lumaview::process::ProcessingInvoker;
use lumaview::{
    utils, CameraKind, CaptureConfig, Config, Mailbox, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};

type Invoker = ProcessingInvoker<Box<dyn lumaview::process::ImageTransform>>;

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("Lumaview launching...");

    // Load configuration
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let config = Config::load(Path::new(&path))?;
    info!(?config, "Configuration loaded from {}", path);

    let camera = open_camera(&config.capture)?;
    info!("Using capture device: {}", camera.describe());

    let invoker =
        ProcessingInvoker::new(config.pipeline.transform.build(config.pipeline.threshold));
    let mailbox = Arc::new(Mailbox::new());

    if config.display.headless {
        run_headless(&config, camera, invoker, mailbox)?;
    } else {
        run_windowed(&config, camera, invoker, mailbox)?;
    }

    info!("Lumaview shutting down");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lumaview=debug"));
    let fmt = tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime());

    let registry = tracing_subscriber::registry().with(filter).with(fmt);

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

fn open_camera(config: &CaptureConfig) -> Result<Box<dyn CameraSource>> {
    match config.source {
        CameraKind::Synthetic => Ok(Box::new(SyntheticCamera::new(
            config.width,
            config.height,
            config.fps,
        ))),
        CameraKind::V4l2 => {
            // Auto-detect capture device if needed
            let mut config = config.clone();
            if config.device.is_empty() {
                let found = utils::auto_detect_device(config.format)?;
                config.device = found.path;
                config.format = found.format;
            }
            Ok(Box::new(V4l2Camera::open(&config)?))
        }
    }
}

/// Window on the main thread; capture on its own thread.
fn run_windowed(
    config: &Config,
    camera: Box<dyn CameraSource>,
    invoker: Invoker,
    mailbox: Arc<Mailbox>,
) -> Result<()> {
    let event_loop = display::window::event_loop()?;
    let trigger = WindowTrigger::new(event_loop.create_proxy());
    let exit_notifier = trigger.clone();

    let capture = CaptureWorker::new(camera, invoker, mailbox.clone(), trigger.clone())
        .pin_to_core(config.capture.pin_core)
        .max_frames(config.capture.max_frames)
        .on_exit(move |outcome: &CaptureOutcome| {
            let reason = outcome.as_ref().err().map(ToString::to_string);
            exit_notifier.notify(PipelineEvent::CaptureEnded(reason));
        })
        .spawn()?;

    let mut app = DisplayApp::new(config.display.clone(), mailbox.clone(), &trigger);
    event_loop.run_app(&mut app)?;

    // The in-flight frame finishes; anything left in the mailbox is dropped.
    let capture_outcome = capture.stop();
    info!(
        render = ?app.render_stats(),
        mailbox = ?mailbox.stats(),
        "Pipeline stopped"
    );

    if let Some(err) = app.take_error() {
        return Err(err.into());
    }
    let stats = capture_outcome?;
    info!(?stats, "Capture totals");
    Ok(())
}

/// Offscreen render thread and capture thread; main waits for either to end.
fn run_headless(
    config: &Config,
    camera: Box<dyn CameraSource>,
    invoker: Invoker,
    mailbox: Arc<Mailbox>,
) -> Result<()> {
    let (done_tx, done_rx) = flume::bounded::<&'static str>(2);
    let (trigger, signal) = render_signal();
    let size = (config.display.width, config.display.height);

    let render_done = done_tx.clone();
    let render = spawn_render_loop(
        move || pollster::block_on(WgpuContext::offscreen(size.0, size.1)),
        mailbox.clone(),
        signal,
        size,
        move |_| {
            let _ = render_done.send("render");
        },
    )?;

    let capture = CaptureWorker::new(camera, invoker, mailbox.clone(), trigger)
        .pin_to_core(config.capture.pin_core)
        .max_frames(config.capture.max_frames)
        .on_exit(move |_| {
            let _ = done_tx.send("capture");
        })
        .spawn()?;

    let first = done_rx.recv().map_err(|_| eyre!("pipeline threads vanished"))?;
    info!("{} thread finished first, stopping pipeline", first);

    // Stopping capture drops the last trigger, which ends the render loop.
    let capture_outcome = capture.stop();
    let render_outcome = render.join();
    info!(mailbox = ?mailbox.stats(), "Pipeline stopped");

    let render_stats = render_outcome?;
    let capture_stats = capture_outcome?;
    if capture_stats.dropped > 0 {
        warn!(dropped = capture_stats.dropped, "Frames dropped by the transform");
    }
    info!(capture = ?capture_stats, render = ?render_stats, "Session totals");
    Ok(())
}
