//! GPU-resident wave field: the same wave equation as the CPU grid, executed
//! as a full-screen pass over ping-ponged height/velocity textures.

use anyhow::{ensure, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::params::WaterPhysics;

/// Uniform block consumed by the update pass. `touch_*` fields are a
/// one-shot disturbance, cleared after the forced step that applies it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct UpdateUniforms {
    cell_size: [f32; 2],
    touch_center: [f32; 2],
    wave_speed: f32,
    dt: f32,
    damp: f32,
    touch_strength: f32,
    touch_distance: f32,
    _pad: [f32; 3],
}

/// One height/velocity texture set.
struct FieldTextures {
    _height: wgpu::Texture,
    height_view: wgpu::TextureView,
    _velocity: wgpu::Texture,
    velocity_view: wgpu::TextureView,
}

/// Double-buffered GPU wave field. `cur` indexes the set holding the current
/// state; each step renders into the other set and toggles the index, so a
/// pass never reads the textures it writes. Boundary behavior comes from
/// clamped texel loads in the update shader (edge clamp, the texture
/// equivalent of the CPU halo mirror).
pub struct WaveFieldGpu {
    grid_x: u32,
    grid_z: u32,
    base: UpdateUniforms,
    uniform_buffer: wgpu::Buffer,
    sets: [FieldTextures; 2],
    bind_groups: [wgpu::BindGroup; 2],
    pipeline: wgpu::RenderPipeline,
    cur: usize,
}

impl WaveFieldGpu {
    pub fn new(device: &wgpu::Device, physics: &WaterPhysics) -> Result<Self> {
        ensure!(
            physics.dim_x_m > 0.0 && physics.dim_z_m > 0.0,
            "water surface extents must be positive, got {} x {}",
            physics.dim_x_m,
            physics.dim_z_m
        );
        ensure!(
            physics.grid_x > 0 && physics.grid_z > 0,
            "water grid must have at least one cell per axis, got {} x {}",
            physics.grid_x,
            physics.grid_z
        );

        let base = UpdateUniforms {
            cell_size: [physics.cell_x_m() as f32, physics.cell_z_m() as f32],
            touch_center: [0.0, 0.0],
            wave_speed: physics.wave_speed as f32,
            dt: physics.dt_s as f32,
            damp: physics.damp_factor as f32,
            touch_strength: 0.0,
            touch_distance: 0.0,
            _pad: [0.0; 3],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Wave Update Uniforms"),
            contents: bytemuck::cast_slice(&[base]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let make_set = || {
            let make_tex = |label: &str| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: physics.grid_x as u32,
                        height: physics.grid_z as u32,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::R32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
            };
            let height = make_tex("Wave Height");
            let velocity = make_tex("Wave Velocity");
            FieldTextures {
                height_view: height.create_view(&wgpu::TextureViewDescriptor::default()),
                velocity_view: velocity.create_view(&wgpu::TextureViewDescriptor::default()),
                _height: height,
                _velocity: velocity,
            }
        };
        let sets = [make_set(), make_set()];

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Wave Update Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
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
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            });

        let bind_groups = [0, 1].map(|i: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Wave Update Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&sets[i].height_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&sets[i].velocity_view),
                    },
                ],
            })
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Wave Update Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/water_update.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Wave Update Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Wave Update Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[
                    Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::R32Float,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::R32Float,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                ],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            grid_x: physics.grid_x as u32,
            grid_z: physics.grid_z as u32,
            base,
            uniform_buffer,
            sets,
            bind_groups,
            pipeline,
            cur: 0,
        })
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_x, self.grid_z)
    }

    /// Index of the texture set holding the current state. Render bind
    /// groups built against `height_view(i)` select by this.
    pub fn current_index(&self) -> usize {
        self.cur
    }

    pub fn height_view(&self, index: usize) -> &wgpu::TextureView {
        &self.sets[index].height_view
    }

    /// Run `steps` integration passes, ping-ponging the texture sets.
    pub fn run_steps(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, steps: u32) {
        if steps == 0 {
            return;
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Wave Update Encoder"),
        });
        for _ in 0..steps {
            let src = self.cur;
            let dst = 1 - src;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Wave Update Pass"),
                color_attachments: &[
                    Some(wgpu::RenderPassColorAttachment {
                        view: &self.sets[dst].height_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: &self.sets[dst].velocity_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                ],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[src], &[]);
            pass.draw(0..3, 0..1);
            drop(pass);
            self.cur = dst;
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Apply a one-shot disturbance: upload the touch uniform, force exactly
    /// one integration step, then clear the disturbance so subsequent
    /// natural steps are unaffected.
    pub fn touch(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        x: i64,
        z: i64,
        strength: f64,
        distance: f64,
    ) {
        let mut touched = self.base;
        touched.touch_center = [x as f32, z as f32];
        touched.touch_strength = strength as f32;
        touched.touch_distance = distance as f32;
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[touched]));

        self.run_steps(device, queue, 1);

        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.base]));
    }
}
