use log::debug;

use super::checked;
use crate::error::RenderError;

/// Where pixel row zero of a target lies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrigin {
    TopLeft,
    BottomLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Color, depth and an 8-bit stencil channel for picking.
    Color,
    /// Square depth-only target; color is neither written nor read.
    Shadow,
}

/// Full-target viewport installed whenever a target is bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Backend-neutral description of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDesc {
    kind: TargetKind,
    width: u32,
    height: u32,
}

impl TargetDesc {
    pub fn color(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::creation(
                "color target",
                format!("invalid size {width}x{height}"),
            ));
        }
        Ok(Self {
            kind: TargetKind::Color,
            width,
            height,
        })
    }

    pub fn shadow(resolution: u32) -> Result<Self, RenderError> {
        if resolution == 0 {
            return Err(RenderError::creation("shadow target", "resolution must be positive"));
        }
        Ok(Self {
            kind: TargetKind::Shadow,
            width: resolution,
            height: resolution,
        })
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_color(&self) -> bool {
        self.kind == TargetKind::Color
    }

    pub fn has_stencil(&self) -> bool {
        self.kind == TargetKind::Color
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Viewport covering the whole target.
    pub fn viewport(&self) -> Viewport {
        Viewport {
            x: 0.0,
            y: 0.0,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Values a target is cleared to when it is bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: wgpu::Color,
    pub depth: f32,
    pub stencil: u32,
}

/// GPU render target.
///
/// Color targets own their depth-stencil texture; the color attachment is the
/// frame's surface texture, handed over at bind time. Shadow targets own a
/// depth texture plus the sampler the color pass reads it through.
pub struct RenderTarget {
    desc: TargetDesc,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    sampler: Option<wgpu::Sampler>,
}

impl RenderTarget {
    pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
    pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Allocates a color target with a depth-stencil attachment.
    pub fn create_color_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let desc = TargetDesc::color(width, height)?;
        check_limits(device, &desc, "color target")?;
        let (depth, depth_view) = create_depth(
            device,
            &desc,
            Self::DEPTH_STENCIL_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            "color target",
        )?;
        debug!("created color target {width}x{height}");
        Ok(Self {
            desc,
            depth,
            depth_view,
            sampler: None,
        })
    }

    /// Allocates a square depth-only target whose sampler reads 1.0 outside
    /// the `[0, 1]` UV range.
    pub fn create_shadow_target(
        device: &wgpu::Device,
        resolution: u32,
    ) -> Result<Self, RenderError> {
        let desc = TargetDesc::shadow(resolution)?;
        check_limits(device, &desc, "shadow target")?;
        if !device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
        {
            return Err(RenderError::MissingFeature(
                wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER,
            ));
        }
        let (depth, depth_view) = create_depth(
            device,
            &desc,
            Self::SHADOW_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            "shadow target",
        )?;
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToBorder,
            address_mode_v: wgpu::AddressMode::ClampToBorder,
            address_mode_w: wgpu::AddressMode::ClampToBorder,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            border_color: Some(wgpu::SamplerBorderColor::OpaqueWhite),
            ..Default::default()
        });
        debug!("created shadow target {resolution}x{resolution}");
        Ok(Self {
            desc,
            depth,
            depth_view,
            sampler: Some(sampler),
        })
    }

    pub fn desc(&self) -> &TargetDesc {
        &self.desc
    }

    pub fn depth_texture(&self) -> &wgpu::Texture {
        &self.depth
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    pub fn sampler(&self) -> Option<&wgpu::Sampler> {
        self.sampler.as_ref()
    }

    pub fn origin(&self) -> PixelOrigin {
        PixelOrigin::TopLeft
    }

    /// Begins a render pass drawing into this target and sets a full-size
    /// viewport. `color` is ignored for shadow targets.
    pub fn bind<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        color: Option<&wgpu::TextureView>,
        clear: &ClearValues,
    ) -> wgpu::RenderPass<'e> {
        let color_attachment = color
            .filter(|_| self.desc.has_color())
            .map(|view| wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear.color),
                    store: wgpu::StoreOp::Store,
                },
            });
        let stencil_ops = self.desc.has_stencil().then_some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear.stencil),
            store: wgpu::StoreOp::Store,
        });
        let attachments = [color_attachment];
        let color_attachments: &[Option<wgpu::RenderPassColorAttachment>] =
            if attachments[0].is_some() {
                &attachments
            } else {
                &[]
            };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(match self.desc.kind() {
                TargetKind::Color => "color-pass",
                TargetKind::Shadow => "shadow-pass",
            }),
            color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear.depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let viewport = self.desc.viewport();
        pass.set_viewport(
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        );
        pass
    }
}

fn check_limits(
    device: &wgpu::Device,
    desc: &TargetDesc,
    what: &'static str,
) -> Result<(), RenderError> {
    check_dimensions(desc, device.limits().max_texture_dimension_2d, what)
}

/// Texel count of a target kept in host memory, bounded by the same side
/// limit a default GPU device enforces.
pub(crate) fn host_texel_count(desc: &TargetDesc, what: &'static str) -> Result<usize, RenderError> {
    check_dimensions(desc, wgpu::Limits::default().max_texture_dimension_2d, what)?;
    (desc.width() as usize)
        .checked_mul(desc.height() as usize)
        .ok_or_else(|| {
            RenderError::creation(
                what,
                format!("{}x{} texels do not fit in memory", desc.width(), desc.height()),
            )
        })
}

fn check_dimensions(desc: &TargetDesc, max: u32, what: &'static str) -> Result<(), RenderError> {
    if desc.width() > max || desc.height() > max {
        return Err(RenderError::creation(
            what,
            format!(
                "{}x{} exceeds the device limit of {max}",
                desc.width(),
                desc.height()
            ),
        ));
    }
    Ok(())
}

fn create_depth(
    device: &wgpu::Device,
    desc: &TargetDesc,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    what: &'static str,
) -> Result<(wgpu::Texture, wgpu::TextureView), RenderError> {
    checked(device, what, || {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(what),
            size: wgpu::Extent3d {
                width: desc.width(),
                height: desc.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_targets_are_rejected() {
        assert!(TargetDesc::color(0, 10).is_err());
        assert!(TargetDesc::color(10, 0).is_err());
        assert!(matches!(
            TargetDesc::shadow(0),
            Err(RenderError::ResourceCreation { what: "shadow target", .. })
        ));
    }

    #[test]
    fn shadow_targets_are_square_and_depth_only() {
        let desc = TargetDesc::shadow(512).unwrap();
        assert_eq!((desc.width(), desc.height()), (512, 512));
        assert!(!desc.has_color());
        assert!(!desc.has_stencil());
        let color = TargetDesc::color(640, 480).unwrap();
        assert!(color.has_color() && color.has_stencil());
    }

    #[test]
    fn host_targets_are_bounded() {
        let desc = TargetDesc::color(640, 480).unwrap();
        assert_eq!(host_texel_count(&desc, "color target").unwrap(), 640 * 480);
        let huge = TargetDesc::shadow(70_000).unwrap();
        assert!(matches!(
            host_texel_count(&huge, "shadow map"),
            Err(RenderError::ResourceCreation { what: "shadow map", .. })
        ));
    }

    #[test]
    fn binding_twice_yields_the_same_viewport() {
        let desc = TargetDesc::color(800, 600).unwrap();
        let first = desc.viewport();
        let second = desc.viewport();
        assert_eq!(first, second);
        assert_eq!((first.width, first.height), (800.0, 600.0));
        assert_eq!(desc, TargetDesc::color(800, 600).unwrap());
    }
}
