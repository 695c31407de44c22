use std::num::NonZeroU64;

use log::trace;

use super::draw::{Draw, VERTEX_LAYOUT};
use super::program::ShaderProgram;
use super::shaders::SHADOW_SHADER;
use super::target::{ClearValues, RenderTarget};
use super::uniforms::{CameraUniform, ObjectUniforms};
use super::checked;
use crate::camera::Camera;
use crate::error::RenderError;

/// Renders scene depth from the light into the shadow target.
///
/// Front faces are culled so the map stores the far side of closed
/// occluders, which keeps lit surfaces from shadowing themselves.
pub struct ShadowPass {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
}

impl ShadowPass {
    pub fn new(device: &wgpu::Device, objects: &ObjectUniforms) -> Result<Self, RenderError> {
        let program = ShaderProgram::compile(device, "shadow-shader", SHADOW_SHADER)?;

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-camera-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<CameraUniform>() as u64),
                },
                count: None,
            }],
        });
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow-camera-uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-camera-bind-group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&camera_layout, objects.layout()],
            push_constant_ranges: &[],
        });
        let pipeline = checked(device, "shadow pipeline", || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("shadow-pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: program.module(),
                    entry_point: Some("vs_shadow"),
                    compilation_options: Default::default(),
                    buffers: &[VERTEX_LAYOUT],
                },
                fragment: None,
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Front),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: RenderTarget::SHADOW_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
        })
    }

    /// Clears the shadow target to the far plane and draws every object into it.
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget,
        light: &Camera,
        objects: &ObjectUniforms,
        draws: &[Draw<'_>],
    ) {
        queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniform::from_camera(light)),
        );
        let clear = ClearValues {
            color: wgpu::Color::BLACK,
            depth: 1.0,
            stencil: 0,
        };
        let mut pass = target.bind(encoder, None, &clear);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        for draw in draws {
            draw.record(&mut pass, objects.bind_group());
        }
        trace!("shadow pass recorded {} draw(s)", draws.len());
    }
}
