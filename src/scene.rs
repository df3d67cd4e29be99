//! Renderable scene geometry: procedural meshes, generated textures, and
//! per-instance transforms.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use noise::{Fbm, NoiseFn, Perlin};
use wgpu::util::DeviceExt;

/// Vertex layout shared by every mesh in the demo.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRS,
        }
    }
}

/// Per-instance model transform, bound at group 1 in the scene and shadow
/// pipelines.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct InstanceUniforms {
    pub model: [[f32; 4]; 4],
}

/// CPU-side mesh under construction.
#[derive(Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Append a quad with a uniform normal. Corners must wind
    /// counter-clockwise as seen from the normal side.
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, uv: [[f32; 2]; 4]) {
        let base = self.vertices.len() as u32;
        for (corner, tex) in corners.iter().zip(uv.iter()) {
            self.vertices.push(MeshVertex {
                position: corner.to_array(),
                normal: normal.to_array(),
                uv: *tex,
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Horizontal quad at height `y` facing up, with tiled texture
    /// coordinates.
    pub fn plane(half_x: f32, half_z: f32, y: f32, tile_u: f32, tile_v: f32) -> Self {
        let mut mesh = Self::default();
        mesh.push_quad(
            [
                Vec3::new(-half_x, y, -half_z),
                Vec3::new(-half_x, y, half_z),
                Vec3::new(half_x, y, half_z),
                Vec3::new(half_x, y, -half_z),
            ],
            Vec3::Y,
            [[0.0, 0.0], [0.0, tile_v], [tile_u, tile_v], [tile_u, 0.0]],
        );
        mesh
    }

    /// Vertical bar proxy for one water cell: an open box spanning
    /// `[-height, 0]` vertically so the top face rides at the cell's
    /// displaced height.
    pub fn bar(half_x: f32, height: f32, half_z: f32) -> Self {
        let mut mesh = Self::default();
        let (hx, hz) = (half_x, half_z);
        let uv = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

        // Top
        mesh.push_quad(
            [
                Vec3::new(-hx, 0.0, -hz),
                Vec3::new(-hx, 0.0, hz),
                Vec3::new(hx, 0.0, hz),
                Vec3::new(hx, 0.0, -hz),
            ],
            Vec3::Y,
            uv,
        );
        // +X / -X sides
        mesh.push_quad(
            [
                Vec3::new(hx, 0.0, -hz),
                Vec3::new(hx, 0.0, hz),
                Vec3::new(hx, -height, hz),
                Vec3::new(hx, -height, -hz),
            ],
            Vec3::X,
            uv,
        );
        mesh.push_quad(
            [
                Vec3::new(-hx, 0.0, hz),
                Vec3::new(-hx, 0.0, -hz),
                Vec3::new(-hx, -height, -hz),
                Vec3::new(-hx, -height, hz),
            ],
            -Vec3::X,
            uv,
        );
        // +Z / -Z sides
        mesh.push_quad(
            [
                Vec3::new(hx, 0.0, hz),
                Vec3::new(-hx, 0.0, hz),
                Vec3::new(-hx, -height, hz),
                Vec3::new(hx, -height, hz),
            ],
            Vec3::Z,
            uv,
        );
        mesh.push_quad(
            [
                Vec3::new(-hx, 0.0, -hz),
                Vec3::new(hx, 0.0, -hz),
                Vec3::new(hx, -height, -hz),
                Vec3::new(-hx, -height, -hz),
            ],
            -Vec3::Z,
            uv,
        );
        mesh
    }

    /// Pool basin: floor, four inward-facing walls, and a flat deck ring
    /// around the rim.
    pub fn basin(half_x: f32, half_z: f32, depth: f32, rim_y: f32, deck_margin: f32) -> Self {
        let mut mesh = Self::default();
        let floor_y = rim_y - depth;
        let wall_v = depth / 2.0;

        // Floor
        mesh.push_quad(
            [
                Vec3::new(-half_x, floor_y, -half_z),
                Vec3::new(-half_x, floor_y, half_z),
                Vec3::new(half_x, floor_y, half_z),
                Vec3::new(half_x, floor_y, -half_z),
            ],
            Vec3::Y,
            [[0.0, 0.0], [0.0, half_z], [half_x, half_z], [half_x, 0.0]],
        );

        // Walls face into the pool.
        mesh.push_quad(
            [
                Vec3::new(half_x, rim_y, -half_z),
                Vec3::new(half_x, rim_y, half_z),
                Vec3::new(half_x, floor_y, half_z),
                Vec3::new(half_x, floor_y, -half_z),
            ],
            -Vec3::X,
            [[0.0, 0.0], [half_z, 0.0], [half_z, wall_v], [0.0, wall_v]],
        );
        mesh.push_quad(
            [
                Vec3::new(-half_x, rim_y, half_z),
                Vec3::new(-half_x, rim_y, -half_z),
                Vec3::new(-half_x, floor_y, -half_z),
                Vec3::new(-half_x, floor_y, half_z),
            ],
            Vec3::X,
            [[0.0, 0.0], [half_z, 0.0], [half_z, wall_v], [0.0, wall_v]],
        );
        mesh.push_quad(
            [
                Vec3::new(half_x, rim_y, half_z),
                Vec3::new(-half_x, rim_y, half_z),
                Vec3::new(-half_x, floor_y, half_z),
                Vec3::new(half_x, floor_y, half_z),
            ],
            -Vec3::Z,
            [[0.0, 0.0], [half_x, 0.0], [half_x, wall_v], [0.0, wall_v]],
        );
        mesh.push_quad(
            [
                Vec3::new(-half_x, rim_y, -half_z),
                Vec3::new(half_x, rim_y, -half_z),
                Vec3::new(half_x, floor_y, -half_z),
                Vec3::new(-half_x, floor_y, -half_z),
            ],
            Vec3::Z,
            [[0.0, 0.0], [half_x, 0.0], [half_x, wall_v], [0.0, wall_v]],
        );

        // Deck ring around the rim.
        let (ox, oz) = (half_x + deck_margin, half_z + deck_margin);
        let strips: [[Vec3; 4]; 4] = [
            [
                Vec3::new(-ox, rim_y, -oz),
                Vec3::new(-ox, rim_y, oz),
                Vec3::new(-half_x, rim_y, oz),
                Vec3::new(-half_x, rim_y, -oz),
            ],
            [
                Vec3::new(half_x, rim_y, -oz),
                Vec3::new(half_x, rim_y, oz),
                Vec3::new(ox, rim_y, oz),
                Vec3::new(ox, rim_y, -oz),
            ],
            [
                Vec3::new(-half_x, rim_y, -oz),
                Vec3::new(-half_x, rim_y, -half_z),
                Vec3::new(half_x, rim_y, -half_z),
                Vec3::new(half_x, rim_y, -oz),
            ],
            [
                Vec3::new(-half_x, rim_y, half_z),
                Vec3::new(-half_x, rim_y, oz),
                Vec3::new(half_x, rim_y, oz),
                Vec3::new(half_x, rim_y, half_z),
            ],
        ];
        for strip in strips {
            let uvs = [
                [strip[0].x, strip[0].z],
                [strip[1].x, strip[1].z],
                [strip[2].x, strip[2].z],
                [strip[3].x, strip[3].z],
            ];
            mesh.push_quad(strip, Vec3::Y, uvs);
        }
        mesh
    }

    /// Height-field terrain skirt around the pool: a regular grid displaced
    /// by layered noise, with cells overlapping the pool cut out.
    pub fn terrain(
        half_x: f32,
        half_z: f32,
        cells: usize,
        hole_half_x: f32,
        hole_half_z: f32,
        amplitude: f32,
        seed: u32,
    ) -> Self {
        let fbm = Fbm::<Perlin>::new(seed);
        let height = |x: f32, z: f32| -> f32 {
            fbm.get([x as f64 * 0.15, z as f64 * 0.15]) as f32 * amplitude
        };
        let normal = |x: f32, z: f32| -> Vec3 {
            let e = 0.1;
            Vec3::new(
                height(x - e, z) - height(x + e, z),
                2.0 * e,
                height(x, z - e) - height(x, z + e),
            )
            .normalize()
        };

        let mut mesh = Self::default();
        let step_x = 2.0 * half_x / cells as f32;
        let step_z = 2.0 * half_z / cells as f32;
        let mut index_of = vec![u32::MAX; (cells + 1) * (cells + 1)];

        for gz in 0..cells {
            for gx in 0..cells {
                let x0 = -half_x + gx as f32 * step_x;
                let z0 = -half_z + gz as f32 * step_z;
                let (x1, z1) = (x0 + step_x, z0 + step_z);

                // Skip cells inside the pool cutout.
                if x1 > -hole_half_x && x0 < hole_half_x && z1 > -hole_half_z && z0 < hole_half_z {
                    continue;
                }

                let mut corner = |x: f32, z: f32, gx: usize, gz: usize| -> u32 {
                    let key = gz * (cells + 1) + gx;
                    if index_of[key] == u32::MAX {
                        index_of[key] = mesh.vertices.len() as u32;
                        mesh.vertices.push(MeshVertex {
                            position: [x, height(x, z), z],
                            normal: normal(x, z).to_array(),
                            uv: [x * 0.5, z * 0.5],
                        });
                    }
                    index_of[key]
                };

                let a = corner(x0, z0, gx, gz);
                let b = corner(x0, z1, gx, gz + 1);
                let c = corner(x1, z1, gx + 1, gz + 1);
                let d = corner(x1, z0, gx + 1, gz);
                mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        mesh
    }

    /// Flat grid of one vertex per water cell center, UV-mapped to texel
    /// centers of the height texture.
    pub fn water_sheet(dim_x: f32, dim_z: f32, grid_x: usize, grid_z: usize) -> Self {
        let mut mesh = Self::default();
        let cell_x = dim_x / grid_x as f32;
        let cell_z = dim_z / grid_z as f32;

        for i in 0..grid_x {
            for j in 0..grid_z {
                mesh.vertices.push(MeshVertex {
                    position: [
                        -dim_x / 2.0 + (i as f32 + 0.5) * cell_x,
                        0.0,
                        -dim_z / 2.0 + (j as f32 + 0.5) * cell_z,
                    ],
                    normal: [0.0, 1.0, 0.0],
                    uv: [
                        (i as f32 + 0.5) / grid_x as f32,
                        (j as f32 + 0.5) / grid_z as f32,
                    ],
                });
            }
        }
        for i in 0..grid_x - 1 {
            for j in 0..grid_z - 1 {
                let a = (i * grid_z + j) as u32;
                let b = a + 1;
                let c = ((i + 1) * grid_z + j + 1) as u32;
                let d = c - 1;
                mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        mesh
    }
}

/// Diffuse texture plus its sampler and material bind group.
pub struct TextureSet {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
}

/// Bind group layout for material textures (group 2 of the scene pipeline).
pub fn material_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Material Bind Group Layout"),
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
    })
}

/// Bind group layout for per-instance model transforms (group 1 of the scene
/// and shadow pipelines).
pub fn instance_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Instance Bind Group Layout"),
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
    })
}

/// Generate a tiling diffuse texture from layered value noise.
pub fn noise_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    size: u32,
    base_color: [f32; 3],
    noise_scale: f64,
    contrast: f32,
    seed: u32,
) -> TextureSet {
    let fbm = Fbm::<Perlin>::new(seed);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let n = fbm.get([x as f64 / size as f64 * noise_scale, y as f64 / size as f64 * noise_scale])
                as f32;
            for channel in base_color {
                let v = (channel * (1.0 + contrast * n)).clamp(0.0, 1.0);
                pixels.push((v * 255.0) as u8);
            }
            pixels.push(255);
        }
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &pixels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(size * 4),
            rows_per_image: Some(size),
        },
        wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    let layout = material_bind_group_layout(device);
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    TextureSet {
        _texture: texture,
        view,
        bind_group,
    }
}

/// Mesh uploaded to the GPU together with its material.
pub struct Renderable {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material: TextureSet,
}

impl Renderable {
    pub fn new(device: &wgpu::Device, label: &str, mesh: &MeshData, material: TextureSet) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            material,
        }
    }

    /// Draw with whatever pipeline and frame/instance bindings the caller
    /// has set. `use_textures` skips the material binding for depth-only
    /// passes.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, use_textures: bool) {
        if use_textures {
            pass.set_bind_group(2, &self.material.bind_group, &[]);
        }
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// One placed renderable with its model-transform bind group.
pub struct Instance {
    pub renderable: Renderable,
    pub bind_group: wgpu::BindGroup,
}

impl Instance {
    pub fn new(device: &wgpu::Device, label: &str, renderable: Renderable, model: Mat4) -> Self {
        let uniforms = InstanceUniforms {
            model: model.to_cols_array_2d(),
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let layout = instance_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            renderable,
            bind_group,
        }
    }
}

/// Static scene content shaded by the main pass and re-rendered by every
/// shadow pass.
pub struct Scene {
    pub instances: Vec<Instance>,
}

impl Scene {
    /// Assemble the demo scene: pool basin plus a terrain skirt, both with
    /// generated textures.
    pub fn demo(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pool_half_x: f32,
        pool_half_z: f32,
    ) -> Result<Self> {
        let basin_mesh = MeshData::basin(pool_half_x, pool_half_z, 1.6, 0.1, 1.5);
        let basin_tex = noise_texture(
            device,
            queue,
            "Basin Texture",
            256,
            [0.68, 0.72, 0.78],
            8.0,
            0.25,
            7,
        );
        let basin = Renderable::new(device, "Pool Basin", &basin_mesh, basin_tex);

        let terrain_mesh = MeshData::terrain(
            24.0,
            24.0,
            64,
            pool_half_x + 1.5,
            pool_half_z + 1.5,
            0.8,
            11,
        );
        let terrain_tex = noise_texture(
            device,
            queue,
            "Terrain Texture",
            256,
            [0.36, 0.44, 0.28],
            12.0,
            0.4,
            13,
        );
        let terrain = Renderable::new(device, "Terrain", &terrain_mesh, terrain_tex);

        Ok(Self {
            instances: vec![
                Instance::new(device, "Pool Basin", basin, Mat4::IDENTITY),
                Instance::new(device, "Terrain", terrain, Mat4::IDENTITY),
            ],
        })
    }

    /// Issue every instance into the current pass.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, use_textures: bool) {
        for instance in &self.instances {
            pass.set_bind_group(1, &instance.bind_group, &[]);
            instance.renderable.draw(pass, use_textures);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_mesh_shape() {
        let mesh = MeshData::plane(4.0, 2.0, 0.0, 1.0, 1.0);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_bar_mesh_has_top_and_sides() {
        let mesh = MeshData::bar(0.5, 1.0, 0.5);
        // Five quads: top plus four sides.
        assert_eq!(mesh.vertices.len(), 20);
        assert_eq!(mesh.indices.len(), 30);
        // Every vertex sits at or below the top plane.
        assert!(mesh.vertices.iter().all(|v| v.position[1] <= 0.0));
    }

    #[test]
    fn test_terrain_leaves_hole_for_pool() {
        let mesh = MeshData::terrain(10.0, 10.0, 20, 3.0, 3.0, 0.5, 1);
        assert!(!mesh.indices.is_empty());
        // No triangle may have its centroid inside the cutout.
        for tri in mesh.indices.chunks(3) {
            let centroid = tri
                .iter()
                .map(|&i| Vec3::from_array(mesh.vertices[i as usize].position))
                .sum::<Vec3>()
                / 3.0;
            assert!(
                centroid.x.abs() > 2.5 || centroid.z.abs() > 2.5,
                "triangle centroid {centroid} falls inside the pool cutout"
            );
        }
    }

    #[test]
    fn test_water_sheet_uv_maps_to_texel_centers() {
        let mesh = MeshData::water_sheet(8.0, 4.0, 16, 8);
        assert_eq!(mesh.vertices.len(), 16 * 8);
        let first = mesh.vertices[0];
        assert!((first.uv[0] - 0.5 / 16.0).abs() < 1e-6);
        assert!((first.uv[1] - 0.5 / 8.0).abs() < 1e-6);
    }
}
