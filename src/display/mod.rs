pub mod gpu;
pub mod headless;
pub mod renderer;
pub mod window;

pub use gpu::WgpuContext;
pub use headless::{spawn_render_loop, RenderHandle, RenderOutcome};
pub use renderer::{
    DrawOutcome, GpuContext, QuadGeometry, RenderCallbacks, RenderError, RenderStats, Renderer,
    RendererState, FULLSCREEN_QUAD, SHADER_SOURCE,
};
pub use window::{DisplayApp, PipelineEvent, WindowTrigger};
