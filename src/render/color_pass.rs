use std::num::NonZeroU64;

use log::trace;

use super::checked;
use super::draw::{Draw, VERTEX_LAYOUT};
use super::program::ShaderProgram;
use super::shaders::COLOR_SHADER;
use super::target::{ClearValues, RenderTarget};
use super::uniforms::{FrameUniform, ObjectUniforms};
use crate::config::LightingConfig;
use crate::error::RenderError;
use crate::object::ObjectId;

/// Lit pass into the main target.
///
/// Fragments that pass the depth test replace the stencil with their object
/// identifier, so the stencil always names the visible object.
pub struct ColorPass {
    pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
}

impl ColorPass {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        objects: &ObjectUniforms,
        shadow_map: &RenderTarget,
    ) -> Result<Self, RenderError> {
        let program = ShaderProgram::compile(device, "color-shader", COLOR_SHADER)?;

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<FrameUniform>() as u64
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniform"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group =
            create_frame_bind_group(device, &frame_layout, &frame_buffer, shadow_map)?;

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("color-pipeline-layout"),
            bind_group_layouts: &[&frame_layout, objects.layout()],
            push_constant_ranges: &[],
        });
        let stencil_face = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Replace,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Replace,
        };
        let pipeline = checked(device, "color pipeline", || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("color-pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: program.module(),
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[VERTEX_LAYOUT],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: RenderTarget::DEPTH_STENCIL_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState {
                        front: stencil_face,
                        back: stencil_face,
                        read_mask: 0xFF,
                        write_mask: 0xFF,
                    },
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: program.module(),
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self {
            pipeline,
            frame_buffer,
            frame_bind_group,
        })
    }

    /// Records the color pass. Must be encoded after the shadow pass that
    /// filled the shadow map.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget,
        color_view: &wgpu::TextureView,
        frame: &FrameUniform,
        lighting: &LightingConfig,
        objects: &ObjectUniforms,
        draws: &[Draw<'_>],
    ) {
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(frame));
        let clear = ClearValues {
            color: wgpu::Color {
                r: lighting.ambient.x as f64,
                g: lighting.ambient.y as f64,
                b: lighting.ambient.z as f64,
                a: 1.0,
            },
            depth: 1.0,
            stencil: ObjectId::SENTINEL as u32,
        };
        let mut pass = target.bind(encoder, Some(color_view), &clear);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for draw in draws {
            pass.set_stencil_reference(draw.id.get() as u32);
            draw.record(&mut pass, objects.bind_group());
        }
        trace!("color pass recorded {} draw(s)", draws.len());
    }
}

fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow_map: &RenderTarget,
) -> Result<wgpu::BindGroup, RenderError> {
    let sampler = shadow_map
        .sampler()
        .ok_or_else(|| RenderError::creation("frame bind group", "target is not a shadow map"))?;
    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frame-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(shadow_map.depth_view()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    }))
}
