//! WebGPU implementation of [`GpuContext`]

use std::sync::Arc;

use tracing::{info, instrument, warn};
use wgpu::util::DeviceExt;
use wgpu::*;
use winit::window::Window;

use crate::display::renderer::{GpuContext, QuadGeometry, RenderError};
use crate::{DisplayConfig, Frame};

const POSITION_ATTRIBUTES: [VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const TEX_COORD_ATTRIBUTES: [VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

/// Where draws land.
enum RenderTarget {
    Window {
        surface: Surface<'static>,
        config: SurfaceConfiguration,
    },
    /// Render-attachment texture for headless operation.
    Offscreen { texture: Texture },
}

/// Compiled program plus its fixed vertex arrays.
struct Program {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
    positions: Buffer,
    tex_coords: Buffer,
}

struct FrameTexture {
    texture: Texture,
    bind_group: BindGroup,
    width: u32,
    height: u32,
}

/// GPU-accelerated frame output using WebGPU
pub struct WgpuContext {
    device: Device,
    queue: Queue,
    target: RenderTarget,
    target_format: TextureFormat,
    viewport: (u32, u32),
    program: Option<Program>,
    texture: Option<FrameTexture>,
}

impl WgpuContext {
    /// Initialize WebGPU on a window surface
    #[instrument(skip(window, config))]
    pub async fn for_window(
        window: Arc<Window>,
        config: &DisplayConfig,
    ) -> Result<Self, RenderError> {
        info!("Initializing WebGPU display");

        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        let adapter = request_adapter(&instance, Some(&surface)).await?;
        let (device, queue) = request_device(&adapter).await?;

        // Luma is already display-encoded, so prefer a non-sRGB surface to
        // avoid a second gamma curve.
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;

        let size = window.inner_size();
        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if config.vsync {
                PresentMode::AutoVsync
            } else {
                PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };

        surface.configure(&device, &surface_config);

        Ok(Self {
            device,
            queue,
            target: RenderTarget::Window {
                surface,
                config: surface_config,
            },
            target_format: surface_format,
            viewport: (size.width, size.height),
            program: None,
            texture: None,
        })
    }

    /// Initialize WebGPU rendering into an offscreen texture
    #[instrument]
    pub async fn offscreen(width: u32, height: u32) -> Result<Self, RenderError> {
        info!("Initializing headless WebGPU target");

        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let adapter = request_adapter(&instance, None).await?;
        let (device, queue) = request_device(&adapter).await?;

        let format = TextureFormat::Rgba8Unorm;
        let texture = create_offscreen_texture(&device, format, width, height);

        Ok(Self {
            device,
            queue,
            target: RenderTarget::Offscreen { texture },
            target_format: format,
            viewport: (width, height),
            program: None,
            texture: None,
        })
    }

    /// Create (or re-create at a new size) the frame texture and its bind group.
    fn create_frame_texture(&self, width: u32, height: u32) -> Result<FrameTexture, RenderError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| RenderError::Texture("program not created".into()))?;

        self.device.push_error_scope(ErrorFilter::Validation);

        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("Frame Texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::R8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&program.sampler),
                },
            ],
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Texture(err.to_string()));
        }

        Ok(FrameTexture {
            texture,
            bind_group,
            width,
            height,
        })
    }

    fn write_frame(&self, texture: &Texture, width: u32, height: u32, data: &[u8]) {
        // Full extent every time; never a sub-region.
        self.queue.write_texture(
            ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Acquire the view to draw into, recovering a lost or outdated surface once.
    ///
    /// `None` means the swapchain had no frame to give this time.
    fn acquire_target(&self) -> Result<Option<(TextureView, Option<SurfaceTexture>)>, RenderError> {
        let (surface, config) = match &self.target {
            RenderTarget::Offscreen { texture } => {
                let view = texture.create_view(&TextureViewDescriptor::default());
                return Ok(Some((view, None)));
            }
            RenderTarget::Window { surface, config } => (surface, config),
        };

        let mut reconfigured = false;
        loop {
            let err = match surface.get_current_texture() {
                Ok(output) => {
                    let view = output
                        .texture
                        .create_view(&TextureViewDescriptor::default());
                    return Ok(Some((view, Some(output))));
                }
                Err(err) => err,
            };

            match classify_surface_error(&err) {
                SurfaceRecovery::Reconfigure if !reconfigured => {
                    warn!("Surface acquire failed ({}), reconfiguring", err);
                    surface.configure(&self.device, config);
                    reconfigured = true;
                }
                SurfaceRecovery::SkipFrame => {
                    warn!("Surface acquire failed ({}), skipping frame", err);
                    return Ok(None);
                }
                SurfaceRecovery::Reconfigure | SurfaceRecovery::Fatal => {
                    return Err(RenderError::Draw(err.to_string()));
                }
            }
        }
    }
}

/// How a failed swapchain acquire is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceRecovery {
    Reconfigure,
    SkipFrame,
    Fatal,
}

fn classify_surface_error(err: &SurfaceError) -> SurfaceRecovery {
    match err {
        SurfaceError::Lost | SurfaceError::Outdated => SurfaceRecovery::Reconfigure,
        SurfaceError::Timeout => SurfaceRecovery::SkipFrame,
        SurfaceError::OutOfMemory => SurfaceRecovery::Fatal,
    }
}

impl GpuContext for WgpuContext {
    fn create_program(&mut self, shader: &str, quad: &QuadGeometry) -> Result<(), RenderError> {
        self.device.push_error_scope(ErrorFilter::Validation);

        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Frame Shader"),
            source: ShaderSource::Wgsl(shader.into()),
        });

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[
                    BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Texture {
                            sample_type: TextureSampleType::Float { filterable: true },
                            view_dimension: TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    BindGroupLayoutEntry {
                        binding: 1,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Sampler(SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("Frame Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("Frame Pipeline"),
                layout: Some(&pipeline_layout),
                cache: None,
                vertex: VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[
                        VertexBufferLayout {
                            array_stride: std::mem::size_of::<[f32; 2]>() as BufferAddress,
                            step_mode: VertexStepMode::Vertex,
                            attributes: &POSITION_ATTRIBUTES,
                        },
                        VertexBufferLayout {
                            array_stride: std::mem::size_of::<[f32; 2]>() as BufferAddress,
                            step_mode: VertexStepMode::Vertex,
                            attributes: &TEX_COORD_ATTRIBUTES,
                        },
                    ],
                },
                fragment: Some(FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(ColorTargetState {
                        format: self.target_format,
                        blend: Some(BlendState::REPLACE),
                        write_mask: ColorWrites::ALL,
                    })],
                }),
                primitive: PrimitiveState {
                    topology: PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: MultisampleState::default(),
                multiview: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Program(err.to_string()));
        }

        let positions = self.device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("Quad Positions"),
            contents: bytemuck::cast_slice(&quad.positions),
            usage: BufferUsages::VERTEX,
        });
        let tex_coords = self.device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("Quad Texture Coordinates"),
            contents: bytemuck::cast_slice(&quad.tex_coords),
            usage: BufferUsages::VERTEX,
        });

        let sampler = self.device.create_sampler(&SamplerDescriptor {
            label: Some("Frame Sampler"),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });

        self.program = Some(Program {
            pipeline,
            bind_group_layout,
            sampler,
            positions,
            tex_coords,
        });
        Ok(())
    }

    fn allocate_texture(&mut self) -> Result<(), RenderError> {
        let texture = self.create_frame_texture(1, 1)?;
        self.write_frame(&texture.texture, 1, 1, &[0]);
        self.texture = Some(texture);
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        if width == 0 || height == 0 {
            // Minimized; keep the old target until there is something to show.
            return;
        }

        match &mut self.target {
            RenderTarget::Window { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            RenderTarget::Offscreen { texture } => {
                *texture =
                    create_offscreen_texture(&self.device, self.target_format, width, height);
            }
        }
    }

    fn replace_texture(&mut self, frame: &Frame) -> Result<(), RenderError> {
        let (width, height) = frame.size();

        let needs_realloc = self
            .texture
            .as_ref()
            .map_or(true, |t| (t.width, t.height) != (width, height));
        if needs_realloc {
            self.texture = Some(self.create_frame_texture(width, height)?);
        }

        if let Some(texture) = &self.texture {
            self.write_frame(&texture.texture, width, height, frame.data());
        }
        Ok(())
    }

    fn draw_quad(&mut self) -> Result<(), RenderError> {
        let (width, height) = self.viewport;
        if width == 0 || height == 0 {
            return Ok(());
        }

        let Some((view, output)) = self.acquire_target()? else {
            return Ok(());
        };

        let (Some(program), Some(texture)) = (&self.program, &self.texture) else {
            return Err(RenderError::Draw("program or texture missing".into()));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &texture.bind_group, &[]);
            render_pass.set_vertex_buffer(0, program.positions.slice(..));
            render_pass.set_vertex_buffer(1, program.tex_coords.slice(..));
            render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            render_pass.draw(0..4, 0..1);
        }

        // Submit commands
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(output) = output {
            output.present();
        }

        Ok(())
    }
}

async fn request_adapter(
    instance: &Instance,
    compatible_surface: Option<&Surface<'_>>,
) -> Result<Adapter, RenderError> {
    let adapter = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(RenderError::NoAdapter)?;

    info!("GPU: {}", adapter.get_info().name);
    Ok(adapter)
}

async fn request_device(adapter: &Adapter) -> Result<(Device, Queue), RenderError> {
    adapter
        .request_device(
            &DeviceDescriptor {
                label: Some("Lumaview GPU Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| RenderError::Device(e.to_string()))
}

fn create_offscreen_texture(
    device: &Device,
    format: TextureFormat,
    width: u32,
    height: u32,
) -> Texture {
    device.create_texture(&TextureDescriptor {
        label: Some("Offscreen Target"),
        size: Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
