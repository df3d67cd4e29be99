//! Water surface: one simulation backend (CPU grid or GPU textures), its
//! renderable surface, and the wall-clock stepping policy.

pub mod field;
pub mod gpu;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::params::WaterPhysics;
use crate::rendering::DEPTH_FORMAT;
use crate::scene::{material_bind_group_layout, noise_texture, MeshData, MeshVertex, TextureSet};

use field::WaveField;
use gpu::WaveFieldGpu;

/// Which simulation backend a `WaterSurface` is built around. Chosen at
/// construction; the two execution models are deliberately not unified
/// behind one trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Gpu,
}

/// Fixed-step accumulator mapping wall-clock microseconds onto whole
/// simulation steps.
///
/// `advance` drains every complete step, so the remainder is always smaller
/// than one step when it returns; an elapsed time of exactly one step yields
/// exactly one pass. A forced advance pends exactly one step regardless of
/// elapsed time.
pub struct StepClock {
    step_usec: u64,
    accum_usec: u64,
    last_call_usec: u64,
}

impl StepClock {
    pub fn new(step_usec: u64) -> Self {
        Self {
            step_usec,
            accum_usec: 0,
            last_call_usec: 0,
        }
    }

    /// Account elapsed time and return how many whole steps to run.
    pub fn advance(&mut self, now_usec: u64, force_one_step: bool) -> u32 {
        if force_one_step {
            self.accum_usec = self.step_usec;
        } else {
            self.accum_usec += now_usec.saturating_sub(self.last_call_usec);
            self.last_call_usec = now_usec;
        }

        let mut steps = 0;
        while self.accum_usec >= self.step_usec {
            self.accum_usec -= self.step_usec;
            steps += 1;
        }
        steps
    }

    pub fn accumulated_usec(&self) -> u64 {
        self.accum_usec
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BarUniforms {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SheetUniforms {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 3],
    surface_y: f32,
    cell_size: [f32; 2],
    _pad: [f32; 2],
}

/// Instanced bar rendering for the CPU backend: one instance offset per
/// interior cell, re-uploaded every frame from the field heights.
struct BarRender {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    material: TextureSet,
}

impl BarRender {
    fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        physics: &WaterPhysics,
    ) -> Result<Self> {
        let mesh = MeshData::bar(
            physics.cell_x_m() as f32 / 2.0,
            1.0,
            physics.cell_z_m() as f32 / 2.0,
        );
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Bar Vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Bar Indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let instance_count = (physics.grid_x * physics.grid_z) as u32;
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Water Bar Instances"),
            size: instance_count as u64 * std::mem::size_of::<[f32; 3]>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniforms = BarUniforms {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Bar Uniforms"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Water Bar Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Water Bar Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let material = noise_texture(
            device,
            queue,
            "Water Diffuse",
            256,
            [0.25, 0.45, 0.6],
            6.0,
            0.2,
            23,
        );
        let material_layout = material_bind_group_layout(device);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Water Bar Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/water_bars.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Water Bar Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Water Bar Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    MeshVertex::layout(),
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![3 => Float32x3],
                    },
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            instance_buffer,
            instance_count,
            uniform_buffer,
            uniform_bind_group,
            material,
        })
    }

    /// Derive one instance offset per interior cell from the current
    /// heights and upload the lot.
    fn prepare(
        &self,
        queue: &wgpu::Queue,
        field: &WaveField,
        physics: &WaterPhysics,
        view_proj: Mat4,
    ) {
        let (cell_x, cell_z) = (physics.cell_x_m() as f32, physics.cell_z_m() as f32);
        let mut offsets = Vec::with_capacity(field.grid_x() * field.grid_z());
        for i in 1..=field.grid_x() {
            for j in 1..=field.grid_z() {
                offsets.push([
                    -physics.dim_x_m / 2.0 + (i as f32 - 0.5) * cell_x,
                    physics.surface_y_m + field.height(i, j) as f32,
                    -physics.dim_z_m / 2.0 + (j as f32 - 0.5) * cell_z,
                ]);
            }
        }
        queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&offsets));

        let uniforms = BarUniforms {
            view_proj: view_proj.to_cols_array_2d(),
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }

    fn render(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, &self.material.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count);
    }
}

/// Displaced-sheet rendering for the GPU backend: a static grid mesh whose
/// vertex stage reads the current height texture.
struct SheetRender {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 2],
}

impl SheetRender {
    fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        physics: &WaterPhysics,
        field: &WaveFieldGpu,
        sky_view: &wgpu::TextureView,
    ) -> Result<Self> {
        let mesh = MeshData::water_sheet(
            physics.dim_x_m,
            physics.dim_z_m,
            physics.grid_x,
            physics.grid_z,
        );
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Sheet Vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Sheet Indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniforms = SheetUniforms {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            camera_pos: [0.0; 3],
            surface_y: physics.surface_y_m,
            cell_size: [physics.cell_x_m() as f32, physics.cell_z_m() as f32],
            _pad: [0.0; 2],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Sheet Uniforms"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Water Sky Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Water Sheet Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let bind_groups = [0, 1].map(|i: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Water Sheet Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(field.height_view(i)),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(sky_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            })
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Water Sheet Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/water_sheet.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Water Sheet Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Water Sheet Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            uniform_buffer,
            bind_groups,
        })
    }

    fn prepare(&self, queue: &wgpu::Queue, physics: &WaterPhysics, view_proj: Mat4, camera: Vec3) {
        let uniforms = SheetUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera.to_array(),
            surface_y: physics.surface_y_m,
            cell_size: [physics.cell_x_m() as f32, physics.cell_z_m() as f32],
            _pad: [0.0; 2],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }

    fn render(&self, pass: &mut wgpu::RenderPass<'_>, current: usize) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[current], &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

enum Backend {
    Cpu { field: WaveField, bars: BarRender },
    Gpu { field: WaveFieldGpu, sheet: SheetRender },
}

/// The visible water surface plus its simulation state.
pub struct WaterSurface {
    physics: WaterPhysics,
    clock: StepClock,
    backend: Backend,
}

impl WaterSurface {
    /// Build the surface around the requested backend. Any mesh, texture,
    /// or pipeline failure is fatal to construction.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        sky_view: &wgpu::TextureView,
        physics: WaterPhysics,
        kind: BackendKind,
    ) -> Result<Self> {
        let backend = match kind {
            BackendKind::Cpu => Backend::Cpu {
                field: WaveField::new(&physics)?,
                bars: BarRender::new(device, queue, color_format, &physics)?,
            },
            BackendKind::Gpu => {
                let field = WaveFieldGpu::new(device, &physics)?;
                let sheet = SheetRender::new(device, color_format, &physics, &field, sky_view)?;
                Backend::Gpu { field, sheet }
            }
        };
        Ok(Self {
            clock: StepClock::new(physics.step_usec),
            physics,
            backend,
        })
    }

    pub fn physics(&self) -> &WaterPhysics {
        &self.physics
    }

    /// Advance the simulation to `now_usec`, draining every whole step that
    /// has elapsed. A delayed caller catches up by running multiple steps.
    pub fn update_model(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        now_usec: u64,
        force_one_step: bool,
    ) {
        let steps = self.clock.advance(now_usec, force_one_step);
        match &mut self.backend {
            Backend::Cpu { field, .. } => {
                for _ in 0..steps {
                    field.step();
                }
            }
            Backend::Gpu { field, .. } => field.run_steps(device, queue, steps),
        }
    }

    /// Disturb the surface around grid cell `(x, z)`. The GPU backend runs
    /// its forced step immediately so the disturbance is visible on the
    /// next frame.
    pub fn touch(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        x: i64,
        z: i64,
        strength: f64,
        distance: f64,
    ) {
        match &mut self.backend {
            Backend::Cpu { field, .. } => field.touch(x, z, strength, distance),
            Backend::Gpu { field, .. } => field.touch(device, queue, x, z, strength, distance),
        }
    }

    /// Upload per-frame render data (camera uniforms, CPU instance
    /// offsets). Must run before the render pass is recorded.
    pub fn prepare(&self, queue: &wgpu::Queue, view_proj: Mat4, camera_pos: Vec3) {
        match &self.backend {
            Backend::Cpu { field, bars } => bars.prepare(queue, field, &self.physics, view_proj),
            Backend::Gpu { sheet, .. } => {
                sheet.prepare(queue, &self.physics, view_proj, camera_pos)
            }
        }
    }

    /// Draw the surface into the current pass.
    pub fn render(&self, pass: &mut wgpu::RenderPass<'_>) {
        match &self.backend {
            Backend::Cpu { bars, .. } => bars.render(pass),
            Backend::Gpu { field, sheet } => sheet.render(pass, field.current_index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_drains_whole_steps() {
        let mut clock = StepClock::new(10_000);
        assert_eq!(clock.advance(25_000, false), 2);
        assert!(clock.accumulated_usec() < 10_000);

        // Exactly one step past the last call runs exactly one pass.
        assert_eq!(clock.advance(35_000, false), 1);
        assert!(clock.accumulated_usec() < 10_000);
    }

    #[test]
    fn test_clock_accumulates_partial_steps() {
        let mut clock = StepClock::new(10_000);
        assert_eq!(clock.advance(4_000, false), 0);
        assert_eq!(clock.advance(8_000, false), 0);
        assert_eq!(clock.advance(12_000, false), 1);
        assert!(clock.accumulated_usec() < 10_000);
    }

    #[test]
    fn test_clock_forced_step_is_exactly_one() {
        let mut clock = StepClock::new(10_000);
        clock.advance(3_000, false);
        assert_eq!(clock.advance(0, true), 1);
        assert_eq!(clock.accumulated_usec(), 0);
    }

    #[test]
    fn test_clock_catches_up_after_long_pause() {
        let mut clock = StepClock::new(10_000);
        assert_eq!(clock.advance(1_000_000, false), 100);
        assert!(clock.accumulated_usec() < 10_000);
    }
}
