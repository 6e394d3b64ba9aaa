//! Interactive window shell.
//!
//! One winit window, one wgpu surface. The off-screen 3D target never
//! presents; the surface only ever shows the composited glyph raster,
//! stretched over the full window. Pointer and resize events land between
//! ticks as last-write-wins field updates.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::config::Profile;
use crate::driver::{FrameDriver, TickOutcome};
use crate::renderer::{GpuContext, OffscreenRenderer};
use crate::scene::SubjectScene;

const PRESENT_SHADER: &str = r#"
@group(0) @binding(0) var raster_tex: texture_2d<f32>;
@group(0) @binding(1) var raster_sampler: sampler;

struct VertexOutput {
  @builtin(position) position: vec4<f32>,
  @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
  var positions = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -3.0),
    vec2<f32>(-1.0, 1.0),
    vec2<f32>(3.0, 1.0)
  );

  var out: VertexOutput;
  let p = positions[vertex_index];
  out.position = vec4<f32>(p, 0.0, 1.0);
  out.uv = p * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);
  return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
  let tex = textureSample(raster_tex, raster_sampler, input.uv);
  return vec4<f32>(tex.rgb, 1.0);
}
"#;

/// Open the window and run the frame loop until close or Escape.
pub fn run(profile: Profile) -> Result<()> {
    let seed = profile.seed.unwrap_or_else(entropy_seed);

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("glyphcast")
            .build(&event_loop)
            .context("failed to create window")?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("failed to create wgpu surface")?;
    let ctx = pollster::block_on(GpuContext::for_surface(&instance, &surface))
        .context("failed to initialize GPU context")?;

    let caps = surface.get_capabilities(&ctx.adapter);
    let format = pick_surface_format(&caps.formats);
    let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo
    };
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    let initial_size = window.inner_size();
    let mut surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: initial_size.width.max(1),
        height: initial_size.height.max(1),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&ctx.device, &surface_config);

    let mut scene = SubjectScene::load(&profile.model_path);
    let (cols, rows) = profile.grid_dims(surface_config.width, surface_config.height);
    let mut renderer = OffscreenRenderer::new(&ctx, cols, rows, &scene)?;
    let mut driver = FrameDriver::new(profile, seed);
    let mut present = PresentPass::new(&ctx.device, format);
    let mut last_tick = Instant::now();

    eprintln!(
        "[glyphcast] {}x{} surface, {}x{} glyph grid, adapter {}",
        surface_config.width,
        surface_config.height,
        cols,
        rows,
        ctx.adapter.get_info().name
    );
    if scene.is_empty() {
        eprintln!("[glyphcast] running with backdrop only (no subject mesh)");
    }
    eprintln!("[glyphcast] Controls: Esc quits");

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                WinitEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested => {
                            driver.dispose();
                            target.exit();
                        }
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state == ElementState::Pressed
                                && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                            {
                                driver.dispose();
                                target.exit();
                            }
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            let size = window.inner_size();
                            driver.pointer_moved(
                                position.x as f32,
                                position.y as f32,
                                size.width as f32,
                                size.height as f32,
                            );
                        }
                        WindowEvent::Resized(size) => {
                            if size.width > 0 && size.height > 0 {
                                surface_config.width = size.width;
                                surface_config.height = size.height;
                                surface.configure(&ctx.device, &surface_config);
                            }
                        }
                        WindowEvent::RedrawRequested => {
                            let now = Instant::now();
                            let delta = now.duration_since(last_tick).as_secs_f32();
                            last_tick = now;

                            match driver.tick(
                                &ctx,
                                &mut renderer,
                                &mut scene,
                                surface_config.width,
                                surface_config.height,
                                delta,
                            ) {
                                Ok(TickOutcome::Composited) => {
                                    present.present(
                                        &ctx,
                                        &surface,
                                        &surface_config,
                                        driver.raster(),
                                        driver.raster_dims(),
                                    );
                                }
                                Ok(_) => {}
                                Err(error) => {
                                    eprintln!("[glyphcast] tick error: {error:#}");
                                }
                            }
                        }
                        _ => {}
                    }
                }
                WinitEvent::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|error| anyhow!("event loop terminated: {error}"))
}

fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
    formats
        .iter()
        .copied()
        .find(|format| format.is_srgb())
        .unwrap_or_else(|| formats[0])
}

fn entropy_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

/// Blits the CPU raster to the swapchain through a full-screen triangle.
/// Nearest sampling keeps glyph edges crisp when the raster is stretched.
struct PresentPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    raster_texture: Option<RasterTexture>,
}

struct RasterTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl PresentPass {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("glyphcast-present-layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glyphcast-present-shader"),
            source: wgpu::ShaderSource::Wgsl(PRESENT_SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glyphcast-present-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("glyphcast-present-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glyphcast-present-sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            raster_texture: None,
        }
    }

    /// Upload the raster and draw it to the surface. Surface loss and
    /// timeouts skip the frame; the next tick retries naturally.
    fn present(
        &mut self,
        ctx: &GpuContext,
        surface: &wgpu::Surface<'_>,
        surface_config: &wgpu::SurfaceConfiguration,
        raster: &[u8],
        (width, height): (u32, u32),
    ) {
        if width == 0 || height == 0 || raster.len() != (width * height * 4) as usize {
            return;
        }

        self.upload(ctx, raster, width, height);
        let Some(raster_texture) = &self.raster_texture else {
            return;
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                surface.configure(&ctx.device, surface_config);
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                eprintln!("[glyphcast] surface out of memory");
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glyphcast-present-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glyphcast-present-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &raster_texture.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        ctx.queue.submit(Some(encoder.finish()));
        frame.present();
    }

    fn upload(&mut self, ctx: &GpuContext, raster: &[u8], width: u32, height: u32) {
        let needs_rebuild = self
            .raster_texture
            .as_ref()
            .map_or(true, |existing| {
                existing.width != width || existing.height != height
            });

        if needs_rebuild {
            let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("glyphcast-raster-texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("glyphcast-raster-bind-group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            self.raster_texture = Some(RasterTexture {
                texture,
                bind_group,
                width,
                height,
            });
        }

        let Some(raster_texture) = self.raster_texture.as_ref() else {
            return;
        };
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &raster_texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            raster,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}
