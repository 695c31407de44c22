use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::camera::Camera;
use crate::config::{LightingConfig, ShadowConfig, MAX_SAMPLE_COUNT};
use crate::object::{ObjectId, SceneObject};
use crate::shadow::{light_width_uv, sample_offsets};

/// View and projection of the camera a pass renders from.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view: camera.view().to_cols_array_2d(),
            proj: camera.proj().to_cols_array_2d(),
        }
    }
}

/// Per-frame constants of the color pass.
///
/// Filter taps are packed two per `vec4` so the array keeps a 16-byte stride.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniform {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub light_view: [[f32; 4]; 4],
    pub light_proj: [[f32; 4]; 4],
    pub light_position: [f32; 3],
    pub light_near_plane: f32,
    pub ambient_light: [f32; 3],
    pub light_far_plane: f32,
    pub diffuse_light: [f32; 3],
    pub light_width: f32,
    pub filter_radius: f32,
    pub shadow_algorithm: u32,
    pub filter_pattern: u32,
    pub sample_count: u32,
    pub depth_bias: f32,
    pub _pad: [f32; 3],
    pub sample_offsets: [[f32; 4]; (MAX_SAMPLE_COUNT / 2) as usize],
}

impl FrameUniform {
    pub fn new(
        camera: &Camera,
        light: &Camera,
        lighting: &LightingConfig,
        shadows: &ShadowConfig,
    ) -> Self {
        let taps = sample_offsets(shadows.pattern(), shadows.sample_count());
        let mut packed = [[0.0; 4]; (MAX_SAMPLE_COUNT / 2) as usize];
        for (slot, pair) in packed.iter_mut().zip(taps.chunks(2)) {
            slot[0] = pair[0].x;
            slot[1] = pair[0].y;
            if let Some(second) = pair.get(1) {
                slot[2] = second.x;
                slot[3] = second.y;
            }
        }
        Self {
            view: camera.view().to_cols_array_2d(),
            proj: camera.proj().to_cols_array_2d(),
            light_view: light.view().to_cols_array_2d(),
            light_proj: light.proj().to_cols_array_2d(),
            light_position: light.position.into(),
            light_near_plane: light.near_plane,
            ambient_light: lighting.ambient.into(),
            light_far_plane: light.far_plane,
            diffuse_light: lighting.diffuse.into(),
            light_width: light_width_uv(shadows.light_width(), light.frustum_width()),
            filter_radius: shadows.filter_radius(),
            shadow_algorithm: shadows.algorithm().shader_index(),
            filter_pattern: shadows.pattern().shader_index(),
            sample_count: taps.len() as u32,
            depth_bias: shadows.depth_bias(),
            _pad: [0.0; 3],
            sample_offsets: packed,
        }
    }
}

/// Per-object constants shared by both passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
}

impl ObjectUniform {
    pub fn from_object(object: &SceneObject, color: Vec3) -> Self {
        let model = object.model_matrix();
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(object.normal_matrix()),
            color: color.extend(1.0).into(),
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

/// One dynamic-offset uniform buffer holding a slot per possible object.
pub struct ObjectUniforms {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    stride: u64,
}

impl ObjectUniforms {
    pub fn new(device: &wgpu::Device) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let size = std::mem::size_of::<ObjectUniform>() as u64;
        let stride = size.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("object-uniforms"),
            size: stride * ObjectId::LIMIT as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(size),
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object-bind-group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(size),
                }),
            }],
        });

        Self {
            buffer,
            layout,
            bind_group,
            stride,
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Dynamic offset of the slot owned by `id`.
    pub fn offset(&self, id: ObjectId) -> u32 {
        (id.get() as u64 * self.stride) as u32
    }

    pub fn write(&self, queue: &wgpu::Queue, id: ObjectId, uniform: &ObjectUniform) {
        queue.write_buffer(
            &self.buffer,
            self.offset(id) as u64,
            bytemuck::bytes_of(uniform),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;
    use crate::config::FilterPattern;
    use crate::mesh::MeshData;
    use crate::object::{ObjectSet, Transform};

    #[test]
    fn layouts_match_the_shader_structs() {
        assert_eq!(size_of::<CameraUniform>(), 128);
        assert_eq!(size_of::<ObjectUniform>(), 128);
        assert_eq!(size_of::<FrameUniform>(), 848);

        assert_eq!(offset_of!(FrameUniform, light_position), 256);
        assert_eq!(offset_of!(FrameUniform, light_near_plane), 268);
        assert_eq!(offset_of!(FrameUniform, ambient_light), 272);
        assert_eq!(offset_of!(FrameUniform, light_far_plane), 284);
        assert_eq!(offset_of!(FrameUniform, diffuse_light), 288);
        assert_eq!(offset_of!(FrameUniform, light_width), 300);
        assert_eq!(offset_of!(FrameUniform, filter_radius), 304);
        assert_eq!(offset_of!(FrameUniform, shadow_algorithm), 308);
        assert_eq!(offset_of!(FrameUniform, sample_count), 316);
        assert_eq!(offset_of!(FrameUniform, depth_bias), 320);
        assert_eq!(offset_of!(FrameUniform, sample_offsets), 336);
    }

    #[test]
    fn taps_are_packed_two_per_slot() {
        let mut shadows = ShadowConfig::default();
        shadows.set_pattern(FilterPattern::PoissonDisk);
        shadows.set_sample_count(3);
        let camera = Camera::default();
        let uniform = FrameUniform::new(&camera, &camera, &LightingConfig::default(), &shadows);

        let taps = sample_offsets(FilterPattern::PoissonDisk, 3);
        assert_eq!(uniform.sample_count, 3);
        assert_eq!(uniform.sample_offsets[0], [taps[0].x, taps[0].y, taps[1].x, taps[1].y]);
        assert_eq!(uniform.sample_offsets[1], [taps[2].x, taps[2].y, 0.0, 0.0]);
        assert_eq!(uniform.sample_offsets[2], [0.0; 4]);
        assert_eq!(uniform.filter_pattern, FilterPattern::PoissonDisk.shader_index());
    }

    #[test]
    fn light_width_is_expressed_in_shadow_map_units() {
        let shadows = ShadowConfig::default();
        let light = Camera::looking_at(Vec3::new(0.0, 13.0, -7.0), Vec3::ZERO);
        let uniform =
            FrameUniform::new(&Camera::default(), &light, &LightingConfig::default(), &shadows);
        let expected = shadows.light_width() / light.frustum_width();
        assert!((uniform.light_width - expected).abs() < 1e-6);
        assert_eq!(uniform.light_position, [0.0, 13.0, -7.0]);
    }

    #[test]
    fn object_uniform_carries_model_and_color() {
        let mut set = ObjectSet::new();
        let mesh = set.add_mesh(MeshData::cube());
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Transform::default()
        };
        set.add_object("box", mesh, transform, Vec3::new(0.5, 0.25, 1.0))
            .unwrap();
        let object = &set.objects()[0];
        let uniform = ObjectUniform::from_object(object, object.color);
        assert_eq!(uniform.model(), object.model_matrix());
        assert_eq!(uniform.color, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(uniform.normal[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
