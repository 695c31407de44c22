//! CPU reference backend.
//!
//! Runs the same two passes as [`super::Renderer`] through the software
//! rasterizer, sharing the shadow test in [`crate::shadow`]. Used for headless
//! summaries and for exercising the pipeline without a GPU. Pixel rows are
//! stored bottom-up, like a GL framebuffer.

use glam::{Vec2, Vec3};
use log::debug;

use super::picking::StencilSource;
use super::target::{host_texel_count, ClearValues, PixelOrigin, TargetDesc, Viewport};
use crate::app::AppContext;
use crate::error::RenderError;
use crate::object::{ObjectId, ObjectSet};
use crate::raster::{rasterize, ClipVertex, CullMode, Varying};
use crate::shadow::{light_space, shade, shadow_factor, DepthImage, ShadowParams};

/// Color, depth and stencil buffers of the CPU main target.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftTarget {
    desc: TargetDesc,
    color: Vec<Vec3>,
    depth: Vec<f32>,
    stencil: Vec<u8>,
    shadow: Vec<f32>,
}

impl SoftTarget {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let desc = TargetDesc::color(width, height)?;
        let len = host_texel_count(&desc, "color target")?;
        Ok(Self {
            desc,
            color: vec![Vec3::ZERO; len],
            depth: vec![1.0; len],
            stencil: vec![ObjectId::SENTINEL; len],
            shadow: vec![1.0; len],
        })
    }

    pub fn desc(&self) -> &TargetDesc {
        &self.desc
    }

    /// Clears every buffer and returns the full-target viewport.
    pub fn bind(&mut self, clear: &ClearValues) -> Viewport {
        let color = Vec3::new(
            clear.color.r as f32,
            clear.color.g as f32,
            clear.color.b as f32,
        );
        self.color.fill(color);
        self.depth.fill(clear.depth);
        self.stencil.fill(clear.stencil as u8);
        self.shadow.fill(1.0);
        self.desc.viewport()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.desc.width() + x) as usize
    }

    /// Color at `(x, y)`, rows counted from the bottom.
    pub fn color_at(&self, x: u32, y: u32) -> Vec3 {
        self.color[self.index(x, y)]
    }

    pub fn stencil_at(&self, x: u32, y: u32) -> u8 {
        self.stencil[self.index(x, y)]
    }

    /// Shadow factor the color pass applied at `(x, y)`; 1.0 where nothing
    /// was drawn.
    pub fn shadow_at(&self, x: u32, y: u32) -> f32 {
        self.shadow[self.index(x, y)]
    }
}

/// Per-object coverage of the last rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStats {
    pub id: ObjectId,
    pub name: String,
    /// Pixels whose stencil holds this object's identifier.
    pub coverage: usize,
    /// Average shadow factor over those pixels.
    pub mean_shadow: Option<f32>,
}

pub struct SoftRenderer {
    target: SoftTarget,
    shadow_map: DepthImage,
}

impl SoftRenderer {
    pub fn new(width: u32, height: u32, shadow_resolution: u32) -> Result<Self, RenderError> {
        Ok(Self {
            target: SoftTarget::new(width, height)?,
            shadow_map: DepthImage::new(shadow_resolution)?,
        })
    }

    pub fn target(&self) -> &SoftTarget {
        &self.target
    }

    pub fn shadow_map(&self) -> &DepthImage {
        &self.shadow_map
    }

    pub fn render(&mut self, ctx: &AppContext) {
        self.shadow_pass(ctx);
        self.color_pass(ctx);
    }

    fn shadow_pass(&mut self, ctx: &AppContext) {
        let light = ctx.light_camera();
        let view_proj = light.proj() * light.view();
        let resolution = self.shadow_map.resolution();
        self.shadow_map.clear();
        let texels = self.shadow_map.texels_mut();

        for object in ctx.objects.objects() {
            let Some(mesh) = ctx.objects.mesh_of(object) else {
                continue;
            };
            let mvp = view_proj * object.model_matrix();
            for triangle in mesh.triangles() {
                let clip = triangle.map(|vertex| ClipVertex {
                    clip: mvp * vertex.position().extend(1.0),
                    varying: Varying::default(),
                });
                rasterize(clip, resolution, resolution, CullMode::Front, |fragment| {
                    let texel = &mut texels[(fragment.y * resolution + fragment.x) as usize];
                    if fragment.depth < *texel {
                        *texel = fragment.depth;
                    }
                });
            }
        }
    }

    fn color_pass(&mut self, ctx: &AppContext) {
        let camera = ctx.view_camera();
        let view_proj = camera.proj() * camera.view();
        let light = ctx.light_camera();
        let light_view_proj = light.proj() * light.view();
        let params = ShadowParams::new(
            &ctx.shadows,
            light.frustum_width(),
            light.near_plane,
            light.far_plane,
        );
        let lighting = ctx.lighting;
        let ambient = lighting.ambient;

        let viewport = self.target.bind(&ClearValues {
            color: wgpu::Color {
                r: ambient.x as f64,
                g: ambient.y as f64,
                b: ambient.z as f64,
                a: 1.0,
            },
            depth: 1.0,
            stencil: ObjectId::SENTINEL as u32,
        });
        let (width, height) = (viewport.width as u32, viewport.height as u32);
        let shadow_map = &self.shadow_map;
        let target = &mut self.target;

        for object in ctx.objects.objects() {
            let Some(mesh) = ctx.objects.mesh_of(object) else {
                continue;
            };
            let model = object.model_matrix();
            let normal_matrix = object.normal_matrix();
            let mvp = view_proj * model;
            let color = ctx.display_color(object);
            let id = object.id.get();

            for triangle in mesh.triangles() {
                let clip = triangle.map(|vertex| ClipVertex {
                    clip: mvp * vertex.position().extend(1.0),
                    varying: Varying {
                        world: model.transform_point3(vertex.position()),
                        normal: normal_matrix * vertex.normal(),
                    },
                });
                rasterize(clip, width, height, CullMode::Back, |fragment| {
                    let index = ((height - 1 - fragment.y) * width + fragment.x) as usize;
                    if fragment.depth >= target.depth[index] {
                        return;
                    }
                    let world = fragment.varying.world;
                    let screen = Vec2::new(fragment.x as f32 + 0.5, fragment.y as f32 + 0.5);
                    let shadow = shadow_factor(
                        &params,
                        shadow_map,
                        light_space(light_view_proj, world),
                        screen,
                    );
                    let normal = fragment.varying.normal.normalize_or_zero();
                    let to_light = (light.position - world).normalize_or_zero();
                    target.depth[index] = fragment.depth;
                    target.stencil[index] = id;
                    target.shadow[index] = shadow;
                    target.color[index] = shade(
                        color,
                        lighting.ambient,
                        lighting.diffuse,
                        normal.dot(to_light),
                        shadow,
                    );
                });
            }
        }
        debug!("software frame rendered at {width}x{height}");
    }

    /// Coverage and mean shadow factor of every object in the last frame.
    pub fn object_stats(&self, objects: &ObjectSet) -> Vec<ObjectStats> {
        objects
            .objects()
            .iter()
            .map(|object| {
                let (coverage, shadow_sum) = self
                    .target
                    .stencil
                    .iter()
                    .zip(&self.target.shadow)
                    .filter(|(&stencil, _)| stencil == object.id.get())
                    .fold((0usize, 0.0f32), |(count, sum), (_, &shadow)| {
                        (count + 1, sum + shadow)
                    });
                ObjectStats {
                    id: object.id,
                    name: object.name.clone(),
                    coverage,
                    mean_shadow: (coverage > 0).then(|| shadow_sum / coverage as f32),
                }
            })
            .collect()
    }
}

impl StencilSource for SoftRenderer {
    fn size(&self) -> (u32, u32) {
        (self.target.desc.width(), self.target.desc.height())
    }

    fn origin(&self) -> PixelOrigin {
        PixelOrigin::BottomLeft
    }

    fn read_stencil(&self, x: u32, y: u32) -> Result<u8, RenderError> {
        Ok(self.target.stencil_at(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShadowAlgorithm;
    use crate::render::picking::PickingService;
    use crate::scene::{CameraDesc, MeshSource, ObjectDesc, Scene, TransformDesc};
    use crate::shadow::DepthSource;

    fn object(name: &str, mesh: MeshSource, position: Vec3, scale: f32) -> ObjectDesc {
        ObjectDesc {
            name: name.to_string(),
            mesh,
            transform: TransformDesc {
                position,
                rotation: Vec3::ZERO,
                scale: Vec3::splat(scale),
            },
            color: Some(Vec3::splat(0.8)),
        }
    }

    /// Eight cubes; only ids 3 and 7 sit in front of the viewer, left and right.
    fn picking_scene() -> Scene {
        let objects = (0..8)
            .map(|i| {
                let position = match i {
                    3 => Vec3::new(-3.0, 0.0, 0.0),
                    7 => Vec3::new(3.0, 0.0, 0.0),
                    _ => Vec3::new(0.0, 100.0, 0.0),
                };
                object(&format!("cube-{i}"), MeshSource::Cube, position, 2.0)
            })
            .collect();
        Scene {
            objects,
            camera: CameraDesc {
                position: Vec3::new(0.0, 0.0, 10.0),
                target: Vec3::ZERO,
                ..CameraDesc::viewer()
            },
            ..Scene::default()
        }
    }

    fn shadow_scene() -> Scene {
        Scene {
            objects: vec![
                object("ground", MeshSource::Plane, Vec3::ZERO, 200.0),
                object("blocker", MeshSource::Cube, Vec3::new(0.0, 1.5, 0.0), 1.0),
            ],
            shadow_resolution: 256,
            ..Scene::default()
        }
    }

    fn render(scene: &Scene, width: u32, height: u32) -> (AppContext, SoftRenderer) {
        let ctx = AppContext::from_scene(scene, width as f32 / height as f32).unwrap();
        let mut renderer = SoftRenderer::new(width, height, scene.shadow_resolution).unwrap();
        renderer.render(&ctx);
        (ctx, renderer)
    }

    #[test]
    fn picks_rendered_objects_by_identifier() {
        let (ctx, renderer) = render(&picking_scene(), 64, 64);
        let picking = PickingService::new();
        let pick = |x: f32, y: f32| {
            picking
                .pick(&renderer, &ctx.objects, Vec2::new(x, y), (64, 64))
                .unwrap()
                .map(|object| object.id.get())
        };
        assert_eq!(pick(17.0, 32.0), Some(3));
        assert_eq!(pick(47.0, 32.0), Some(7));
        assert_eq!(pick(32.0, 32.0), None);
        assert_eq!(pick(32.0, 2.0), None);

        let target = renderer.target();
        assert_eq!(target.color_at(32, 61), ctx.lighting.ambient);
        assert_eq!(target.shadow_at(32, 61), 1.0);
        assert_eq!(target.stencil_at(17, 31), 3);
    }

    #[test]
    fn stats_count_visible_pixels_per_object() {
        let (ctx, renderer) = render(&picking_scene(), 64, 64);
        let stats = renderer.object_stats(&ctx.objects);
        assert_eq!(stats.len(), 8);
        assert!(stats[3].coverage > 0 && stats[7].coverage > 0);
        assert_eq!(stats[0].coverage, 0);
        assert_eq!(stats[0].mean_shadow, None);
        // Mirror-image placement.
        assert!(stats[3].coverage.abs_diff(stats[7].coverage) <= 2);
    }

    #[test]
    fn only_back_faces_reach_the_shadow_map() {
        let mut scene = shadow_scene();
        scene.objects.truncate(1);
        let (_, renderer) = render(&scene, 32, 32);
        let map = renderer.shadow_map();
        let step = 1.0 / map.resolution() as f32;
        for y in 0..map.resolution() {
            for x in 0..map.resolution() {
                let uv = Vec2::new((x as f32 + 0.5) * step, (y as f32 + 0.5) * step);
                assert_eq!(map.depth_at(uv), 1.0);
            }
        }

        // The cube's far faces are stored: deeper than its center, still in
        // front of the ground the same light ray reaches.
        let (ctx, renderer) = render(&shadow_scene(), 32, 32);
        let light = ctx.light_camera();
        let light_view_proj = light.proj() * light.view();
        let center = Vec3::new(0.0, 1.5, 0.0);
        let ray = center - light.position;
        let ground_hit = light.position + ray * (light.position.y / -ray.y);
        let blocker = light_space(light_view_proj, center);
        let ground = light_space(light_view_proj, ground_hit);
        let stored = renderer.shadow_map().depth_at(blocker.uv);
        assert!(stored > blocker.depth, "stored {stored} vs center {}", blocker.depth);
        assert!(stored < ground.depth, "stored {stored} vs ground {}", ground.depth);
    }

    #[test]
    fn oversized_targets_are_rejected() {
        assert!(matches!(
            SoftRenderer::new(4, 4, 70_000),
            Err(RenderError::ResourceCreation { what: "shadow map", .. })
        ));
        assert!(matches!(
            SoftRenderer::new(70_000, 70_000, 64),
            Err(RenderError::ResourceCreation { what: "color target", .. })
        ));
        assert!(SoftRenderer::new(64, 48, 512).is_ok());
    }

    #[test]
    fn ground_outside_the_light_frustum_is_lit() {
        let (ctx, renderer) = render(&shadow_scene(), 32, 32);
        let light = ctx.light_camera();
        let light_view_proj = light.proj() * light.view();
        let outside = light_space(light_view_proj, Vec3::new(40.0, 0.0, 0.0));
        let shadowed = light_space(light_view_proj, Vec3::new(0.0, 0.0, 0.913));

        for algorithm in [ShadowAlgorithm::Hard, ShadowAlgorithm::Pcf, ShadowAlgorithm::Pcss] {
            let mut shadows = ctx.shadows;
            shadows.set_algorithm(algorithm);
            let params =
                ShadowParams::new(&shadows, light.frustum_width(), light.near_plane, light.far_plane);
            let factor = shadow_factor(&params, renderer.shadow_map(), outside, Vec2::ZERO);
            assert_eq!(factor, 1.0, "{algorithm}");
        }

        let mut shadows = ctx.shadows;
        shadows.set_algorithm(ShadowAlgorithm::Hard);
        let params =
            ShadowParams::new(&shadows, light.frustum_width(), light.near_plane, light.far_plane);
        assert_eq!(
            shadow_factor(&params, renderer.shadow_map(), shadowed, Vec2::ZERO),
            0.0
        );
    }

    #[test]
    fn blocker_darkens_part_of_the_ground() {
        let (ctx, renderer) = render(&shadow_scene(), 96, 96);
        let stats = renderer.object_stats(&ctx.objects);
        let ground = stats[0].mean_shadow.unwrap();
        assert!(ground < 1.0 && ground > 0.5, "ground shadow {ground}");
    }

    #[test]
    fn binding_twice_leaves_the_target_unchanged() {
        let mut target = SoftTarget::new(16, 8).unwrap();
        let clear = ClearValues {
            color: wgpu::Color::BLACK,
            depth: 1.0,
            stencil: ObjectId::SENTINEL as u32,
        };
        let first_viewport = target.bind(&clear);
        let first = target.clone();
        let second_viewport = target.bind(&clear);
        assert_eq!(first_viewport, second_viewport);
        assert_eq!(first, target);
        assert_eq!(target.stencil_at(3, 3), ObjectId::SENTINEL);
    }
}
