use std::sync::mpsc;

use glam::Vec2;
use log::debug;

use super::target::{PixelOrigin, RenderTarget};
use crate::error::RenderError;
use crate::object::{ObjectSet, SceneObject};

/// A target whose stencil channel can be read back one texel at a time.
pub trait StencilSource {
    /// Target size in pixels.
    fn size(&self) -> (u32, u32);

    /// Row order of the coordinates passed to [`StencilSource::read_stencil`].
    fn origin(&self) -> PixelOrigin;

    /// Reads the stencil value at pixel `(x, y)`, blocking until every draw
    /// touching the target has finished.
    fn read_stencil(&self, x: u32, y: u32) -> Result<u8, RenderError>;
}

/// Resolves window positions to the object drawn there.
#[derive(Debug, Default, Clone, Copy)]
pub struct PickingService;

impl PickingService {
    pub fn new() -> Self {
        Self
    }

    /// Converts a window position (origin top-left) into target pixel
    /// coordinates in the target's own row order.
    ///
    /// Positions outside the window map to `None`.
    pub fn window_to_pixel(
        position: Vec2,
        window_size: (u32, u32),
        target_size: (u32, u32),
        origin: PixelOrigin,
    ) -> Option<(u32, u32)> {
        let (window_w, window_h) = window_size;
        let (target_w, target_h) = target_size;
        if window_w == 0 || window_h == 0 || target_w == 0 || target_h == 0 {
            return None;
        }
        if position.x < 0.0 || position.y < 0.0 {
            return None;
        }
        let x = (position.x * target_w as f32 / window_w as f32).floor() as u32;
        let row_from_top = (position.y * target_h as f32 / window_h as f32).floor() as u32;
        if x >= target_w || row_from_top >= target_h {
            return None;
        }
        let y = match origin {
            PixelOrigin::TopLeft => row_from_top,
            PixelOrigin::BottomLeft => target_h - 1 - row_from_top,
        };
        Some((x, y))
    }

    /// Returns the object whose identifier is stored under `position`.
    ///
    /// This blocks on a GPU readback; call it on deliberate user actions only.
    pub fn pick<'a>(
        &self,
        source: &impl StencilSource,
        objects: &'a ObjectSet,
        position: Vec2,
        window_size: (u32, u32),
    ) -> Result<Option<&'a SceneObject>, RenderError> {
        let Some((x, y)) =
            Self::window_to_pixel(position, window_size, source.size(), source.origin())
        else {
            return Ok(None);
        };
        let stencil = source.read_stencil(x, y)?;
        let picked = objects.resolve(stencil);
        debug!(
            "pick at ({:.0}, {:.0}) -> pixel ({x}, {y}) stencil {stencil}",
            position.x, position.y
        );
        Ok(picked)
    }
}

/// Staging buffer for single-texel stencil copies.
pub struct StencilReadback {
    buffer: wgpu::Buffer,
}

impl StencilReadback {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stencil-readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer }
    }

    /// Copies the stencil texel at `(x, y)` out of `target` and waits for it.
    pub fn read(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &RenderTarget,
        x: u32,
        y: u32,
    ) -> Result<u8, RenderError> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("stencil-readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: target.depth_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::StencilOnly,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| RenderError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| RenderError::Readback(err.to_string()))?
            .map_err(|err| RenderError::Readback(err.to_string()))?;
        let value = {
            let data = slice.get_mapped_range();
            data[0]
        };
        self.buffer.unmap();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshData;
    use crate::object::{ObjectId, Transform};
    use glam::Vec3;

    /// Stencil image with a bottom-left origin, like the CPU backend.
    struct Stamp {
        width: u32,
        height: u32,
        rows: Vec<u8>,
    }

    impl Stamp {
        fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                rows: vec![ObjectId::SENTINEL; (width * height) as usize],
            }
        }

        /// Fills a rectangle given in top-left window rows.
        fn fill(&mut self, x0: u32, top: u32, x1: u32, bottom: u32, id: u8) {
            for row_from_top in top..bottom {
                let y = self.height - 1 - row_from_top;
                for x in x0..x1 {
                    self.rows[(y * self.width + x) as usize] = id;
                }
            }
        }
    }

    impl StencilSource for Stamp {
        fn size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn origin(&self) -> PixelOrigin {
            PixelOrigin::BottomLeft
        }

        fn read_stencil(&self, x: u32, y: u32) -> Result<u8, RenderError> {
            Ok(self.rows[(y * self.width + x) as usize])
        }
    }

    fn objects_with_ids(count: usize) -> ObjectSet {
        let mut set = ObjectSet::new();
        let mesh = set.add_mesh(MeshData::cube());
        for i in 0..count {
            set.add_object(format!("object-{i}"), mesh, Transform::default(), Vec3::ONE)
                .unwrap();
        }
        set
    }

    #[test]
    fn picks_objects_on_disjoint_regions() {
        let objects = objects_with_ids(8);
        let mut stencil = Stamp::new(100, 50);
        stencil.fill(0, 0, 40, 20, 3);
        stencil.fill(60, 30, 100, 50, 7);
        let picking = PickingService::new();
        let at = |x: f32, y: f32| {
            picking
                .pick(&stencil, &objects, Vec2::new(x, y), (100, 50))
                .unwrap()
                .map(|object| object.id.get())
        };
        assert_eq!(at(10.0, 5.0), Some(3));
        assert_eq!(at(80.0, 45.0), Some(7));
        assert_eq!(at(50.0, 25.0), None);
    }

    #[test]
    fn unknown_identifier_resolves_to_none() {
        let objects = objects_with_ids(2);
        let mut stencil = Stamp::new(10, 10);
        stencil.fill(0, 0, 10, 10, 9);
        let picked = PickingService::new()
            .pick(&stencil, &objects, Vec2::new(5.0, 5.0), (10, 10))
            .unwrap();
        assert!(picked.is_none());
    }

    #[test]
    fn vertical_axis_is_flipped_for_bottom_left_targets() {
        let size = (640, 480);
        assert_eq!(
            PickingService::window_to_pixel(Vec2::new(0.0, 0.0), size, size, PixelOrigin::BottomLeft),
            Some((0, 479))
        );
        assert_eq!(
            PickingService::window_to_pixel(Vec2::new(0.0, 0.0), size, size, PixelOrigin::TopLeft),
            Some((0, 0))
        );
        assert_eq!(
            PickingService::window_to_pixel(Vec2::new(639.5, 479.5), size, size, PixelOrigin::BottomLeft),
            Some((639, 0))
        );
    }

    #[test]
    fn positions_outside_the_window_miss() {
        let size = (64, 64);
        for position in [Vec2::new(-1.0, 3.0), Vec2::new(64.0, 3.0), Vec2::new(3.0, 70.0)] {
            assert_eq!(
                PickingService::window_to_pixel(position, size, size, PixelOrigin::TopLeft),
                None
            );
        }
    }

    #[test]
    fn window_positions_scale_to_target_resolution() {
        assert_eq!(
            PickingService::window_to_pixel(
                Vec2::new(50.0, 25.0),
                (100, 50),
                (200, 100),
                PixelOrigin::TopLeft
            ),
            Some((100, 50))
        );
    }
}
