//! Windowed render driver on the winit event loop
//!
//! The event loop thread owns the GPU context. Capture-side wakeups arrive
//! as user events and turn into redraw requests; nothing polls.

use std::sync::Arc;

use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId};

use crate::display::gpu::WgpuContext;
use crate::display::renderer::{RenderCallbacks, RenderError, RenderStats, Renderer};
use crate::pipeline::{Mailbox, RedrawLatch, RenderTrigger};
use crate::DisplayConfig;

/// Events delivered from other threads to the event loop.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A frame was published; draw once.
    FrameReady,
    /// The capture session ended, with the failure reason if it failed.
    CaptureEnded(Option<String>),
}

/// Render trigger that wakes the winit event loop.
///
/// Only the first trigger since the last draw reaches the event loop; the
/// rest are absorbed by the [`RedrawLatch`].
#[derive(Clone)]
pub struct WindowTrigger {
    proxy: EventLoopProxy<PipelineEvent>,
    latch: RedrawLatch,
}

impl WindowTrigger {
    pub fn new(proxy: EventLoopProxy<PipelineEvent>) -> Self {
        Self {
            proxy,
            latch: RedrawLatch::new(),
        }
    }

    /// Forward a non-render event to the event loop.
    pub fn notify(&self, event: PipelineEvent) {
        if self.proxy.send_event(event).is_err() {
            warn!("Event loop already closed");
        }
    }
}

impl RenderTrigger for WindowTrigger {
    fn request_render(&self) {
        if self.latch.raise() {
            // A closed loop means shutdown is under way; nothing to wake.
            let _ = self.proxy.send_event(PipelineEvent::FrameReady);
        }
    }
}

/// Application handler for the winit event loop
pub struct DisplayApp {
    config: DisplayConfig,
    mailbox: Arc<Mailbox>,
    latch: RedrawLatch,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuContext>>,
    error: Option<RenderError>,
}

impl DisplayApp {
    pub fn new(config: DisplayConfig, mailbox: Arc<Mailbox>, trigger: &WindowTrigger) -> Self {
        Self {
            config,
            mailbox,
            latch: trigger.latch.clone(),
            window: None,
            renderer: None,
            error: None,
        }
    }

    /// The fatal render error that ended the loop, if any.
    pub fn take_error(&mut self) -> Option<RenderError> {
        self.error.take()
    }

    pub fn render_stats(&self) -> RenderStats {
        self.renderer
            .as_ref()
            .map(Renderer::stats)
            .unwrap_or_default()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RenderError) {
        error!("Render failure: {}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn create_renderer(
        &self,
        event_loop: &ActiveEventLoop,
    ) -> Result<(Arc<Window>, Renderer<WgpuContext>), RenderError> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| RenderError::Surface(e.to_string()))?,
        );

        let gpu = pollster::block_on(WgpuContext::for_window(window.clone(), &self.config))?;
        let mut renderer = Renderer::new(gpu, self.mailbox.clone());
        renderer.on_context_created()?;

        let size = window.inner_size();
        renderer.on_surface_resized(size.width, size.height)?;

        Ok((window, renderer))
    }
}

impl ApplicationHandler<PipelineEvent> for DisplayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        match self.create_renderer(event_loop) {
            Ok((window, renderer)) => {
                window.request_redraw();
                self.window = Some(window);
                self.renderer = Some(renderer);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Err(e) = renderer.on_surface_resized(new_size.width, new_size.height) {
                    self.fail(event_loop, e);
                } else if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                // Cleared before the take so a publish racing this draw
                // schedules another one.
                self.latch.clear();
                if let Err(e) = renderer.on_draw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: PipelineEvent) {
        match event {
            PipelineEvent::FrameReady => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            PipelineEvent::CaptureEnded(reason) => {
                match reason {
                    Some(reason) => error!("Capture session failed: {}", reason),
                    None => info!("Capture session finished"),
                }
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.destroy();
        }
        info!(pending = !self.mailbox.is_empty(), "Display shutting down");
    }
}

/// Build the event loop that carries [`PipelineEvent`]s.
pub fn event_loop() -> Result<EventLoop<PipelineEvent>, winit::error::EventLoopError> {
    let event_loop = EventLoop::<PipelineEvent>::with_user_event().build()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    Ok(event_loop)
}
