//! Off-screen 3D pass and synchronous readback.
//!
//! The scene renders into a low-resolution RGBA8 target sized to the glyph
//! grid, one texel per cell. Readback goes through a buffer with rows padded
//! to the copy alignment; `read_buffer` unpads into a tight byte vector.
//!
//! The pass renders with a Y-flipped projection so the readback buffer has
//! a bottom-left origin, which is what the classifier's row flip expects.

use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::scene::{MeshVertex, SubjectScene};

const CAMERA_EYE: Vec3 = Vec3::new(0.0, 0.0, 5.0);
const CAMERA_FOV_DEGREES: f32 = 50.0;
const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 100.0;

const BACKDROP_SHADER: &str = r#"
struct BackdropUniform {
  time: f32,
  _pad0: f32,
  _pad1: f32,
  _pad2: f32,
}

@group(0) @binding(0) var<uniform> backdrop: BackdropUniform;

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

fn mod289_v3(x: vec3<f32>) -> vec3<f32> {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn mod289_v2(x: vec2<f32>) -> vec2<f32> {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn permute_v3(x: vec3<f32>) -> vec3<f32> {
  return mod289_v3(((x * 34.0) + 1.0) * x);
}

fn snoise(v: vec2<f32>) -> f32 {
  let C = vec4<f32>(0.211324865405187, 0.366025403784439,
                    -0.577350269189626, 0.024390243902439);
  var i = floor(v + dot(v, C.yy));
  let x0 = v - i + dot(i, C.xx);
  var i1 = vec2<f32>(0.0, 1.0);
  if (x0.x > x0.y) {
    i1 = vec2<f32>(1.0, 0.0);
  }
  var x12 = x0.xyxy + C.xxzz;
  x12 = vec4<f32>(x12.xy - i1, x12.zw);
  i = mod289_v2(i);
  let p = permute_v3(permute_v3(i.y + vec3<f32>(0.0, i1.y, 1.0)) + i.x + vec3<f32>(0.0, i1.x, 1.0));
  var m = max(vec3<f32>(0.5) - vec3<f32>(dot(x0, x0), dot(x12.xy, x12.xy), dot(x12.zw, x12.zw)), vec3<f32>(0.0));
  m = m * m;
  m = m * m;
  let x = 2.0 * fract(p * C.www) - 1.0;
  let h = abs(x) - 0.5;
  let ox = floor(x + 0.5);
  let a0 = x - ox;
  m = m * (1.79284291400159 - 0.85373472095314 * (a0 * a0 + h * h));
  let gx = a0.x * x0.x + h.x * x0.y;
  let gyz = a0.yz * x12.xz + h.yz * x12.yw;
  return 130.0 * dot(m, vec3<f32>(gx, gyz));
}

fn fbm(p: vec2<f32>) -> f32 {
  var value = 0.0;
  var amplitude = 0.5;
  var q = p;
  for (var octave = 0; octave < 5; octave = octave + 1) {
    value = value + amplitude * snoise(q);
    q = q * 2.0;
    amplitude = amplitude * 0.5;
  }
  return value;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
  let t = backdrop.time * 0.12;
  // Drift toward the top-right by subtracting time from both axes.
  let uv = input.uv * 3.0 - vec2<f32>(t * 0.8, t * 0.5);

  let warp1 = fbm(uv + vec2<f32>(t * 0.3, t * 0.2));
  let warp2 = fbm(uv + vec2<f32>(warp1 * 0.8, warp1 * 0.4));
  let n = fbm(uv + vec2<f32>(warp2 * 0.6, warp2 * 0.3));

  let raw_noise = n * 0.5 + 0.5;
  var contrasted = smoothstep(0.25, 0.75, raw_noise);
  contrasted = pow(contrasted, 2.5);
  let brightness = contrasted * 0.7;
  return vec4<f32>(vec3<f32>(brightness), 1.0);
}
"#;

const SUBJECT_SHADER: &str = r#"
struct SubjectUniform {
  mvp: mat4x4<f32>,
  model: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> subject: SubjectUniform;

struct VertexInput {
  @location(0) position: vec3<f32>,
  @location(1) normal: vec3<f32>,
}

struct VertexOutput {
  @builtin(position) position: vec4<f32>,
  @location(0) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
  var out: VertexOutput;
  out.position = subject.mvp * vec4<f32>(input.position, 1.0);
  out.normal = (subject.model * vec4<f32>(input.normal, 0.0)).xyz;
  return out;
}

fn light_term(normal: vec3<f32>, direction: vec3<f32>, intensity: f32) -> f32 {
  return max(dot(normal, normalize(direction)), 0.0) * intensity;
}

@fragment
fn fs_main(input: VertexOutput, @builtin(front_facing) front_facing: bool) -> @location(0) vec4<f32> {
  var n = normalize(input.normal);
  if (!front_facing) {
    n = -n;
  }

  // Harsh key with dim fills, strong crown and rims, soft chin bounce.
  var lit = 0.05;
  lit = lit + light_term(n, vec3<f32>(1.0, 3.0, 4.0), 2.0);
  lit = lit + light_term(n, vec3<f32>(-5.0, 1.0, 2.0), 0.15);
  lit = lit + light_term(n, vec3<f32>(5.0, 1.0, 2.0), 0.15);
  lit = lit + light_term(n, vec3<f32>(0.0, 5.0, -2.0), 2.0);
  lit = lit + light_term(n, vec3<f32>(-5.0, 3.0, -4.0), 2.0);
  lit = lit + light_term(n, vec3<f32>(5.0, 3.0, -4.0), 2.0);
  lit = lit + light_term(n, vec3<f32>(0.0, -5.0, -3.0), 1.5);

  let shade = clamp(lit, 0.0, 1.0);
  return vec4<f32>(vec3<f32>(shade), 1.0);
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BackdropUniform {
    time: f32,
    _padding: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SubjectUniform {
    mvp: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
}

/// Shared GPU handles; created once per process against the window surface.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn for_surface(
        instance: &wgpu::Instance,
        surface: &wgpu::Surface<'_>,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(surface),
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("glyphcast-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

/// Renders the subject + backdrop into a `cols x rows` texel target and
/// reads it back as raw RGBA bytes.
pub struct OffscreenRenderer {
    cols: u32,
    rows: u32,
    target: RenderTarget,
    backdrop_pipeline: wgpu::RenderPipeline,
    backdrop_bind_group: wgpu::BindGroup,
    backdrop_uniform: wgpu::Buffer,
    subject_pipeline: wgpu::RenderPipeline,
    subject_bind_group: wgpu::BindGroup,
    subject_uniform: wgpu::Buffer,
    mesh: Option<MeshBuffers>,
}

impl OffscreenRenderer {
    pub fn new(ctx: &GpuContext, cols: u32, rows: u32, scene: &SubjectScene) -> Result<Self> {
        let device = &ctx.device;

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("glyphcast-offscreen-uniform-layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let backdrop_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("glyphcast-backdrop-uniform"),
            contents: bytemuck::bytes_of(&BackdropUniform {
                time: 0.0,
                _padding: [0.0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let backdrop_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glyphcast-backdrop-bind-group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: backdrop_uniform.as_entire_binding(),
            }],
        });

        let subject_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("glyphcast-subject-uniform"),
            contents: bytemuck::bytes_of(&SubjectUniform {
                mvp: Mat4::IDENTITY.to_cols_array_2d(),
                model: Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let subject_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glyphcast-subject-bind-group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: subject_uniform.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glyphcast-offscreen-pipeline-layout"),
            bind_group_layouts: &[&uniform_bind_group_layout],
            push_constant_ranges: &[],
        });

        let backdrop_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glyphcast-backdrop-shader"),
            source: wgpu::ShaderSource::Wgsl(BACKDROP_SHADER.into()),
        });
        let subject_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glyphcast-subject-shader"),
            source: wgpu::ShaderSource::Wgsl(SUBJECT_SHADER.into()),
        });

        let backdrop_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("glyphcast-backdrop-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &backdrop_shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &backdrop_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });

        let subject_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("glyphcast-subject-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &subject_shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                // The material is double-sided; no culling.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &subject_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });

        let mesh = if scene.is_empty() {
            None
        } else {
            let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("glyphcast-subject-vertices"),
                contents: bytemuck::cast_slice(scene.vertices()),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("glyphcast-subject-indices"),
                contents: bytemuck::cast_slice(scene.indices()),
                usage: wgpu::BufferUsages::INDEX,
            });
            Some(MeshBuffers {
                vertex,
                index,
                index_count: scene.indices().len() as u32,
            })
        };

        let target = build_target(device, cols, rows)?;

        Ok(Self {
            cols,
            rows,
            target,
            backdrop_pipeline,
            backdrop_bind_group,
            backdrop_uniform,
            subject_pipeline,
            subject_bind_group,
            subject_uniform,
            mesh,
        })
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Recreate the target and readback buffer for new grid dimensions.
    /// Contents are discarded; the next render repopulates them.
    pub fn resize(&mut self, ctx: &GpuContext, cols: u32, rows: u32) -> Result<()> {
        if self.cols == cols && self.rows == rows {
            return Ok(());
        }
        self.target = build_target(&ctx.device, cols, rows)?;
        self.cols = cols;
        self.rows = rows;
        Ok(())
    }

    /// Render backdrop + subject into the off-screen target and queue the
    /// readback copy. Runs every tick, including throttled ones.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        scene: &SubjectScene,
        aspect: f32,
        backdrop_time: f32,
    ) {
        ctx.queue.write_buffer(
            &self.backdrop_uniform,
            0,
            bytemuck::bytes_of(&BackdropUniform {
                time: backdrop_time,
                _padding: [0.0; 3],
            }),
        );

        let view = Mat4::look_at_rh(CAMERA_EYE, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(
            CAMERA_FOV_DEGREES.to_radians(),
            aspect.max(f32::EPSILON),
            CAMERA_NEAR,
            CAMERA_FAR,
        );
        // Flip Y so readback rows come out bottom-first.
        let flip = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0));
        let model = scene.model_matrix();
        ctx.queue.write_buffer(
            &self.subject_uniform,
            0,
            bytemuck::bytes_of(&SubjectUniform {
                mvp: (flip * projection * view * model).to_cols_array_2d(),
                model: model.to_cols_array_2d(),
            }),
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glyphcast-offscreen-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glyphcast-offscreen-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            pass.set_pipeline(&self.backdrop_pipeline);
            pass.set_bind_group(0, &self.backdrop_bind_group, &[]);
            pass.draw(0..3, 0..1);

            if let Some(mesh) = &self.mesh {
                pass.set_pipeline(&self.subject_pipeline);
                pass.set_bind_group(0, &self.subject_bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.target.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.target.padded_bytes_per_row),
                    rows_per_image: Some(self.rows),
                },
            },
            wgpu::Extent3d {
                width: self.cols,
                height: self.rows,
                depth_or_array_layers: 1,
            },
        );

        ctx.queue.submit(Some(encoder.finish()));
    }

    /// Synchronously map the readback buffer and copy it into a tight
    /// `cols * rows * 4` byte vector.
    pub fn read_buffer(&self, ctx: &GpuContext, out: &mut Vec<u8>) -> Result<()> {
        let tight_len = (self.target.unpadded_bytes_per_row * self.rows) as usize;
        out.resize(tight_len, 0);

        let buffer_slice = self.target.readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        {
            let mapped = buffer_slice.get_mapped_range();
            let row_bytes = self.target.unpadded_bytes_per_row as usize;
            for (row_index, chunk) in mapped
                .chunks(self.target.padded_bytes_per_row as usize)
                .take(self.rows as usize)
                .enumerate()
            {
                let dst_start = row_index * row_bytes;
                out[dst_start..dst_start + row_bytes].copy_from_slice(&chunk[..row_bytes]);
            }
        }

        self.target.readback.unmap();
        Ok(())
    }
}

fn build_target(device: &wgpu::Device, cols: u32, rows: u32) -> Result<RenderTarget> {
    if cols == 0 || rows == 0 {
        anyhow::bail!("off-screen target must be at least 1x1, got {cols}x{rows}");
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("glyphcast-offscreen-target"),
        size: wgpu::Extent3d {
            width: cols,
            height: rows,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("glyphcast-offscreen-depth"),
        size: wgpu::Extent3d {
            width: cols,
            height: rows,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

    let unpadded_bytes_per_row = cols
        .checked_mul(4)
        .ok_or_else(|| anyhow!("grid width overflow when computing row bytes"))?;
    let padded_bytes_per_row = align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("glyphcast-readback-buffer"),
        size: u64::from(padded_bytes_per_row) * u64::from(rows),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    Ok(RenderTarget {
        texture,
        view,
        depth_view,
        readback,
        unpadded_bytes_per_row,
        padded_bytes_per_row,
    })
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::align_to;

    #[test]
    fn align_to_rounds_up_to_the_copy_alignment() {
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(4, 256), 256);
        // 190 cols * 4 bytes = 760 -> padded to 768.
        assert_eq!(align_to(760, 256), 768);
    }
}
