//! Frame renderer: draws the latest mailbox frame as a full-screen quad

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::pipeline::Mailbox;
use crate::Frame;

/// WGSL for the grey quad. The vertex stage passes position through and
/// forwards the texture coordinate; the fragment stage replicates the
/// single channel across RGB.
pub const SHADER_SOURCE: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = vec4<f32>(position, 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}

@group(0) @binding(0) var frame_texture: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let c = textureSample(frame_texture, frame_sampler, in.tex_coord).r;
    return vec4<f32>(c, c, c, 1.0);
}
"#;

/// Static full-screen quad, drawn as a 4-vertex triangle strip.
pub struct QuadGeometry {
    pub positions: [[f32; 2]; 4],
    pub tex_coords: [[f32; 2]; 4],
}

/// Top-left, bottom-left, top-right, bottom-right. Texture row 0 is the
/// top of the image.
pub const FULLSCREEN_QUAD: QuadGeometry = QuadGeometry {
    positions: [[-1.0, 1.0], [-1.0, -1.0], [1.0, 1.0], [1.0, -1.0]],
    tex_coords: [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("GPU device request failed: {0}")]
    Device(String),

    #[error("surface setup failed: {0}")]
    Surface(String),

    #[error("shader program rejected: {0}")]
    Program(String),

    #[error("texture allocation failed: {0}")]
    Texture(String),

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("{operation} is not valid while the renderer is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RendererState,
    },
}

/// GPU operations the renderer needs, confined to the render thread.
///
/// Binding the program and the two attribute arrays, and releasing them
/// again, happens inside `draw_quad`.
pub trait GpuContext {
    /// Compile and link the program and upload the fixed vertex arrays.
    fn create_program(&mut self, shader: &str, quad: &QuadGeometry) -> Result<(), RenderError>;

    /// Allocate the frame texture (initially 1x1 black).
    fn allocate_texture(&mut self) -> Result<(), RenderError>;

    fn set_viewport(&mut self, width: u32, height: u32);

    /// Re-specify the whole texture with the frame's geometry and pixels.
    fn replace_texture(&mut self, frame: &Frame) -> Result<(), RenderError>;

    fn draw_quad(&mut self) -> Result<(), RenderError>;
}

/// The three callbacks a render-loop driver invokes, always from one thread
/// and never concurrently.
pub trait RenderCallbacks {
    fn on_context_created(&mut self) -> Result<(), RenderError>;

    fn on_surface_resized(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    fn on_draw(&mut self) -> Result<DrawOutcome, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Ready,
    Drawing,
    Destroyed,
}

/// What a draw cycle did with the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A new frame was taken and uploaded before drawing.
    Uploaded { width: u32, height: u32 },
    /// The mailbox was empty; the previous texture was drawn again.
    Reused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draws: u64,
    pub uploads: u64,
}

pub struct Renderer<G> {
    gpu: G,
    mailbox: Arc<Mailbox>,
    state: RendererState,
    texture_size: Option<(u32, u32)>,
    stats: RenderStats,
}

impl<G: GpuContext> Renderer<G> {
    pub fn new(gpu: G, mailbox: Arc<Mailbox>) -> Self {
        Self {
            gpu,
            mailbox,
            state: RendererState::Uninitialized,
            texture_size: None,
            stats: RenderStats::default(),
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Geometry of the last uploaded frame.
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture_size
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Tear down with the GPU context; later callbacks are rejected.
    pub fn destroy(&mut self) {
        if self.state != RendererState::Destroyed {
            info!(stats = ?self.stats, "Renderer destroyed");
            self.state = RendererState::Destroyed;
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[RendererState],
    ) -> Result<(), RenderError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RenderError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn draw_cycle(&mut self) -> Result<DrawOutcome, RenderError> {
        // The mailbox lock is released before any GPU call.
        let outcome = match self.mailbox.take() {
            Some(frame) => {
                self.gpu.replace_texture(&frame)?;
                let (width, height) = frame.size();
                self.texture_size = Some((width, height));
                self.stats.uploads += 1;
                metrics::counter!("render_texture_uploads").increment(1);
                DrawOutcome::Uploaded { width, height }
            }
            None => DrawOutcome::Reused,
        };

        self.gpu.draw_quad()?;
        self.stats.draws += 1;
        Ok(outcome)
    }
}

impl<G: GpuContext> RenderCallbacks for Renderer<G> {
    #[instrument(skip(self))]
    fn on_context_created(&mut self) -> Result<(), RenderError> {
        self.expect_state("on_context_created", &[RendererState::Uninitialized])?;

        self.gpu.create_program(SHADER_SOURCE, &FULLSCREEN_QUAD)?;
        self.gpu.allocate_texture()?;

        self.state = RendererState::Ready;
        info!("Renderer ready");
        Ok(())
    }

    fn on_surface_resized(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.expect_state("on_surface_resized", &[RendererState::Ready])?;

        debug!(width, height, "Viewport resized");
        self.gpu.set_viewport(width, height);
        Ok(())
    }

    fn on_draw(&mut self) -> Result<DrawOutcome, RenderError> {
        self.expect_state("on_draw", &[RendererState::Ready])?;
        let start = Instant::now();

        self.state = RendererState::Drawing;
        let outcome = self.draw_cycle();
        self.state = RendererState::Ready;

        metrics::histogram!("render_time_us").record(start.elapsed().as_micros() as f64);
        outcome
    }
}
