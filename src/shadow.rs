//! Shadow maps: light-space distance capture for point (cube) and spot (2D)
//! lights.
//!
//! Both map kinds share one depth-capture pipeline; they differ only in
//! their targets and in how the light-space transforms are built. The maps
//! store `(distance, distance^2)` from the light in light-space meters.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::lights::{PointLight, SpotLight};
use crate::scene::{instance_bind_group_layout, MeshVertex, Scene};

pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Float;
pub const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Near/far planes of a shadow projection: the far plane is the light's
/// attenuation range, the near plane a small fraction of it so the whole
/// radius stays in range without destroying depth precision.
pub fn shadow_planes(range: f32) -> (f32, f32) {
    (range / 4096.0, range)
}

/// Capture-camera orientation for one cube face, in cube-layer order
/// (+X, -X, +Y, -Y, +Z, -Z).
#[derive(Debug, Clone, Copy)]
pub struct CubeFace {
    pub dir: Vec3,
    pub up: Vec3,
}

pub const CUBE_FACES: [CubeFace; 6] = [
    CubeFace {
        dir: Vec3::X,
        up: Vec3::NEG_Y,
    },
    CubeFace {
        dir: Vec3::NEG_X,
        up: Vec3::NEG_Y,
    },
    CubeFace {
        dir: Vec3::Y,
        up: Vec3::Z,
    },
    CubeFace {
        dir: Vec3::NEG_Y,
        up: Vec3::NEG_Z,
    },
    CubeFace {
        dir: Vec3::Z,
        up: Vec3::NEG_Y,
    },
    CubeFace {
        dir: Vec3::NEG_Z,
        up: Vec3::NEG_Y,
    },
];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ShadowUniforms {
    view_proj: [[f32; 4]; 4],
    light_pos: [f32; 4],
}

fn shadow_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Shadow Uniform Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Build the depth-capture pipeline shared by every shadow map kind.
fn depth_pipeline(device: &wgpu::Device) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Shadow Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/shadow.wgsl").into()),
    });

    let shadow_bgl = shadow_bind_group_layout(device);
    let instance_bgl = instance_bind_group_layout(device);
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Pipeline Layout"),
        bind_group_layouts: &[&shadow_bgl, &instance_bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Shadow Pipeline"),
        layout: Some(&layout),
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
                format: SHADOW_FORMAT,
                blend: None,
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
            format: SHADOW_DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn face_uniform(device: &wgpu::Device, label: &str) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<ShadowUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let layout = shadow_bind_group_layout(device);
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    });
    (buffer, bind_group)
}

fn depth_target(device: &wgpu::Device, label: &str, resolution: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn distance_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    depth: &wgpu::TextureView,
    far: f32,
    clear: bool,
) -> wgpu::RenderPass<'static> {
    let color_load = if clear {
        wgpu::LoadOp::Clear(wgpu::Color {
            r: far as f64,
            g: (far as f64) * (far as f64),
            b: 0.0,
            a: 1.0,
        })
    } else {
        wgpu::LoadOp::Load
    };
    let depth_load = if clear {
        wgpu::LoadOp::Clear(1.0)
    } else {
        wgpu::LoadOp::Load
    };

    encoder
        .begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
        .forget_lifetime()
}

/// Omnidirectional shadow map: six distance faces around the light, each
/// with its own depth buffer.
pub struct PointShadowMap {
    pipeline: wgpu::RenderPipeline,
    cube: wgpu::Texture,
    cube_view: wgpu::TextureView,
    face_views: Vec<wgpu::TextureView>,
    face_depths: Vec<wgpu::TextureView>,
    face_uniforms: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
}

impl PointShadowMap {
    pub fn new(device: &wgpu::Device, resolution: u32) -> Result<Self> {
        let pipeline = depth_pipeline(device);

        let cube = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Point Shadow Cube"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let cube_view = cube.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Point Shadow Cube View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let face_views = (0..6)
            .map(|layer| {
                cube.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Point Shadow Face"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let face_depths = (0..6)
            .map(|_| depth_target(device, "Point Shadow Depth", resolution))
            .collect();
        let face_uniforms = (0..6)
            .map(|_| face_uniform(device, "Point Shadow Uniforms"))
            .collect();

        Ok(Self {
            pipeline,
            cube,
            cube_view,
            face_views,
            face_depths,
            face_uniforms,
        })
    }

    /// Cube view sampled by the shading pass.
    pub fn cube_view(&self) -> &wgpu::TextureView {
        &self.cube_view
    }

    /// Re-render the scene's distance from the light's position into all six
    /// cube faces. Each face is attached and rendered exactly once per call.
    pub fn render_to_shadow_map(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        light: &PointLight,
        scene: &Scene,
        clear: bool,
    ) {
        let (near, far) = shadow_planes(light.range);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);

        for (face_index, face) in CUBE_FACES.iter().enumerate() {
            let view = Mat4::look_to_rh(light.position, face.dir, face.up);
            let uniforms = ShadowUniforms {
                view_proj: (proj * view).to_cols_array_2d(),
                light_pos: [light.position.x, light.position.y, light.position.z, far],
            };
            let (buffer, bind_group) = &self.face_uniforms[face_index];
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[uniforms]));

            let mut pass = distance_pass(
                encoder,
                "Point Shadow Pass",
                &self.face_views[face_index],
                &self.face_depths[face_index],
                far,
                clear,
            );
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            scene.draw(&mut pass, false);
        }
    }

    /// Free the map's target textures. Idempotent; rendering after this is a
    /// caller error.
    pub fn release(&mut self) {
        self.cube.destroy();
    }
}

/// Single-direction shadow map for a spot light.
pub struct SpotShadowMap {
    pipeline: wgpu::RenderPipeline,
    map: wgpu::Texture,
    map_view: wgpu::TextureView,
    depth: wgpu::TextureView,
    uniforms: (wgpu::Buffer, wgpu::BindGroup),
}

/// Spot-light projection: frustum scaled by the light's field-of-view
/// factor.
fn spot_projection(light: &SpotLight) -> Mat4 {
    let (near, far) = shadow_planes(light.range);
    Mat4::perspective_rh(2.0 * light.fov.atan(), 1.0, near, far)
}

/// Spot-light view: the direction completed into an orthonormal basis,
/// translated to the light position.
fn spot_view(light: &SpotLight) -> Mat4 {
    let dir = light.direction.normalize();
    let up = if dir.dot(Vec3::Y).abs() > 0.99 {
        Vec3::X
    } else {
        Vec3::Y
    };
    Mat4::look_to_rh(light.position, dir, up)
}

/// Combined projection-view matrix mapping world space into the spot
/// light's capture frame, without performing a render. The shading pass
/// uses this to reconstruct shadow-space coordinates for lookup.
pub fn spot_light_view_proj(light: &SpotLight) -> Mat4 {
    spot_projection(light) * spot_view(light)
}

impl SpotShadowMap {
    pub fn new(device: &wgpu::Device, resolution: u32) -> Result<Self> {
        let pipeline = depth_pipeline(device);

        let map = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Spot Shadow Map"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let map_view = map.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = depth_target(device, "Spot Shadow Depth", resolution);
        let uniforms = face_uniform(device, "Spot Shadow Uniforms");

        Ok(Self {
            pipeline,
            map,
            map_view,
            depth,
            uniforms,
        })
    }

    /// 2D view sampled by the shading pass.
    pub fn map_view(&self) -> &wgpu::TextureView {
        &self.map_view
    }

    /// Re-render the scene's distance from the spot light into the single
    /// 2D target.
    pub fn render_to_shadow_map(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        light: &SpotLight,
        scene: &Scene,
        clear: bool,
    ) {
        let (_, far) = shadow_planes(light.range);
        let uniforms = ShadowUniforms {
            view_proj: spot_light_view_proj(light).to_cols_array_2d(),
            light_pos: [light.position.x, light.position.y, light.position.z, far],
        };
        let (buffer, bind_group) = &self.uniforms;
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut pass = distance_pass(
            encoder,
            "Spot Shadow Pass",
            &self.map_view,
            &self.depth,
            far,
            clear,
        );
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        scene.draw(&mut pass, false);
    }

    /// Free the map's target texture. Idempotent.
    pub fn release(&mut self) {
        self.map.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::LightColor;

    #[test]
    fn test_shadow_planes_ratio() {
        let (near, far) = shadow_planes(16.0);
        assert_eq!(far, 16.0);
        assert!((near - 16.0 / 4096.0).abs() < 1e-9);
    }

    #[test]
    fn test_cube_faces_cover_each_axis_once() {
        // Six distinct principal-axis directions, each axis covered in both
        // signs exactly once, each with a perpendicular unit up vector.
        for (i, a) in CUBE_FACES.iter().enumerate() {
            assert!((a.dir.length() - 1.0).abs() < 1e-6);
            assert!((a.up.length() - 1.0).abs() < 1e-6);
            assert!(a.dir.dot(a.up).abs() < 1e-6);
            for (j, b) in CUBE_FACES.iter().enumerate() {
                if i != j {
                    assert!(a.dir.distance(b.dir) > 1e-6, "duplicate face direction");
                }
            }
        }
        let axis_sum: Vec3 = CUBE_FACES.iter().map(|f| f.dir).sum();
        assert!(axis_sum.length() < 1e-6);
    }

    fn spot() -> SpotLight {
        SpotLight {
            color: LightColor {
                ambient: Vec3::splat(0.05),
                intensity: Vec3::ONE,
            },
            position: Vec3::new(1.0, 4.0, -2.0),
            range: 24.0,
            linear_att: 0.3,
            direction: Vec3::new(0.0, -1.0, 0.5),
            fov: 0.8,
            directional_att: 2.0,
        }
    }

    #[test]
    fn test_spot_light_view_proj_depth_range() {
        let light = spot();
        let (near, far) = shadow_planes(light.range);
        let dir = light.direction.normalize();
        let mat = spot_light_view_proj(&light);

        let at_near = mat * (light.position + dir * near).extend(1.0);
        let at_far = mat * (light.position + dir * far).extend(1.0);
        assert!((at_near.z / at_near.w).abs() < 1e-3);
        assert!((at_far.z / at_far.w - 1.0).abs() < 1e-3);

        // Points on the axis project to the map center.
        assert!((at_far.x / at_far.w).abs() < 1e-4);
        assert!((at_far.y / at_far.w).abs() < 1e-4);
    }

    #[test]
    fn test_spot_view_handles_axis_aligned_direction() {
        let mut light = spot();
        light.direction = Vec3::NEG_Y;
        let mat = spot_light_view_proj(&light);
        assert!(mat.to_cols_array().iter().all(|v| v.is_finite()));
    }
}
