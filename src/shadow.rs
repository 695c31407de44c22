//! Shadow test shared by the GPU shader and the CPU reference backend.
//!
//! The functions here mirror `shade_shadow` in the color-pass WGSL line for
//! line: same light-space projection, same tap patterns, same blocker search
//! and penumbra estimate. The sample-offset table uploaded to the GPU is built
//! by [`sample_offsets`], so both backends filter with identical taps.

use std::f32::consts::TAU;

use glam::{Mat2, Mat4, Vec2, Vec3};

use crate::config::{FilterPattern, ShadowAlgorithm, ShadowConfig, MAX_SAMPLE_COUNT};
use crate::error::RenderError;
use crate::render::target::{host_texel_count, TargetDesc};

/// Poisson-disk taps inside a disk of diameter one, centered on the origin.
///
/// Ordered so that every prefix is spread over the whole disk, which keeps low
/// sample counts usable. The first tap is the center.
pub const POISSON_DISK: [[f32; 2]; MAX_SAMPLE_COUNT as usize] = [
    [0.0000000, 0.0000000], [-0.1437229, -0.4779870], [-0.0525299, 0.4946612],
    [0.3331756, -0.3593942], [0.4226276, 0.2256483], [-0.4402006, 0.1529544],
    [-0.4286771, -0.2227169], [-0.1512938, 0.2169969], [0.3154198, -0.1031186],
    [-0.1227498, -0.2213847], [0.1864945, 0.4181760], [0.1027049, -0.2855196],
    [0.1631269, 0.1862955], [-0.3310537, -0.0360465], [-0.3010042, 0.3525879],
    [0.0329465, -0.4442648], [0.3023961, 0.1008788], [0.1539728, 0.0001493],
    [0.4568033, 0.0771681], [-0.1341672, -0.0641453], [-0.2851555, -0.2509071],
    [0.3044094, 0.3344214], [0.0657879, -0.1458577], [0.2099540, -0.1908879],
    [0.3934737, -0.2144456], [0.0277717, 0.3852350], [-0.1902789, 0.4298373],
    [-0.2676617, 0.1498885], [-0.2575763, -0.4079314], [-0.0255298, 0.1239832],
    [0.0533749, 0.2472862], [-0.1425646, -0.3406047], [-0.0159316, -0.2988630],
    [-0.2222440, -0.1502212], [-0.0908282, 0.3666684], [0.1414123, -0.3945427],
    [-0.0486256, -0.1359341], [-0.3560525, 0.2555066], [-0.2478750, 0.0377581],
    [0.4424537, -0.0278537], [-0.4280616, 0.0022763], [-0.0499900, 0.2260769],
    [0.3286879, -0.0035217], [0.2466282, 0.2409559], [0.0829961, 0.1281623],
    [-0.2161462, 0.2916693], [0.4343682, -0.1259887], [0.3251901, 0.1892553],
    [-0.1065200, 0.0227643], [-0.3282089, 0.0860771], [0.2411156, 0.0097081],
    [-0.0544283, -0.4469773], [0.1422035, 0.3431450], [0.0941254, -0.0639059],
    [0.2369817, -0.2728119], [-0.4662400, -0.1451362], [0.3872571, 0.1272519],
    [-0.2191717, -0.0543297], [0.1638042, 0.1001756], [0.2950912, -0.1976323],
    [0.0510803, -0.3608262], [0.2589226, -0.4009328], [0.0211993, -0.2226637],
    [-0.3661052, -0.2798285],
];

/// Fragment position projected into the shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSpace {
    pub uv: Vec2,
    pub depth: f32,
}

/// Projects a world-space point into shadow-map UV and depth.
///
/// UV follows the texture convention (v grows downwards). Depth is the
/// post-divide value in `[0, 1]`, clamped so receivers past the far plane
/// compare against the border depth instead of always losing.
pub fn light_space(light_view_proj: Mat4, world: Vec3) -> LightSpace {
    let clip = light_view_proj * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    LightSpace {
        uv: Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5),
        depth: ndc.z.min(1.0),
    }
}

/// Converts a post-divide depth back to view-space distance.
pub fn linearize_depth(depth: f32, near: f32, far: f32) -> f32 {
    near * far / (far - depth * (far - near))
}

/// Depth lookups into a shadow map.
pub trait DepthSource {
    /// Returns the stored depth at `uv`; outside `[0, 1]` this must return 1.0.
    fn depth_at(&self, uv: Vec2) -> f32;
}

/// CPU-side shadow map with nearest sampling and a border depth of 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    resolution: u32,
    texels: Vec<f32>,
}

impl DepthImage {
    pub fn new(resolution: u32) -> Result<Self, RenderError> {
        let desc = TargetDesc::shadow(resolution)?;
        let len = host_texel_count(&desc, "shadow map")?;
        Ok(Self {
            resolution,
            texels: vec![1.0; len],
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn clear(&mut self) {
        self.texels.fill(1.0);
    }

    /// Texel rows run top to bottom, matching shadow-map UV.
    pub fn texels_mut(&mut self) -> &mut [f32] {
        &mut self.texels
    }
}

impl DepthSource for DepthImage {
    fn depth_at(&self, uv: Vec2) -> f32 {
        if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
            return 1.0;
        }
        let size = self.resolution as f32;
        let x = ((uv.x * size) as u32).min(self.resolution - 1);
        let y = ((uv.y * size) as u32).min(self.resolution - 1);
        self.texels[(y * self.resolution + x) as usize]
    }
}

/// Filter taps for `pattern`, in unit space (multiply by the filter radius).
///
/// Rotation for [`FilterPattern::RotatedPoisson`] is applied per fragment by
/// [`rotate_taps`], not here.
pub fn sample_offsets(pattern: FilterPattern, count: u32) -> Vec<Vec2> {
    let count = count.clamp(1, MAX_SAMPLE_COUNT) as usize;
    match pattern {
        FilterPattern::RegularGrid => {
            let side = (count as f32).sqrt().ceil() as usize;
            (0..count)
                .map(|i| {
                    let (col, row) = (i % side, i / side);
                    Vec2::new(
                        (col as f32 + 0.5) / side as f32 - 0.5,
                        (row as f32 + 0.5) / side as f32 - 0.5,
                    )
                })
                .collect()
        }
        FilterPattern::PoissonDisk | FilterPattern::RotatedPoisson => POISSON_DISK[..count]
            .iter()
            .map(|&[x, y]| Vec2::new(x, y))
            .collect(),
    }
}

/// Pseudo-random rotation angle derived from a screen position.
pub fn screen_rotation(screen: Vec2) -> f32 {
    let seed = screen.dot(Vec2::new(12.9898, 78.233)).sin() * 43758.547;
    (seed - seed.floor()) * TAU
}

fn rotate_taps(pattern: FilterPattern, screen: Vec2) -> Mat2 {
    match pattern {
        FilterPattern::RotatedPoisson => Mat2::from_angle(screen_rotation(screen)),
        FilterPattern::RegularGrid | FilterPattern::PoissonDisk => Mat2::IDENTITY,
    }
}

/// Inputs of the per-fragment shadow test that do not change per fragment.
#[derive(Debug, Clone)]
pub struct ShadowParams {
    pub algorithm: ShadowAlgorithm,
    pub pattern: FilterPattern,
    pub offsets: Vec<Vec2>,
    pub filter_radius: f32,
    /// Light width in shadow-map UV units (`light_width / frustum_width`).
    pub light_width_uv: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    pub bias: f32,
}

impl ShadowParams {
    pub fn new(config: &ShadowConfig, light_frustum_width: f32, near_plane: f32, far_plane: f32) -> Self {
        Self {
            algorithm: config.algorithm(),
            pattern: config.pattern(),
            offsets: sample_offsets(config.pattern(), config.sample_count()),
            filter_radius: config.filter_radius(),
            light_width_uv: light_width_uv(config.light_width(), light_frustum_width),
            near_plane,
            far_plane,
            bias: config.depth_bias(),
        }
    }
}

pub fn light_width_uv(light_width: f32, frustum_width: f32) -> f32 {
    if frustum_width > 0.0 {
        light_width / frustum_width
    } else {
        0.0
    }
}

/// Penumbra radius in UV units for a receiver and its average blocker, both
/// as linear view-space distances.
pub fn penumbra_radius(light_width_uv: f32, receiver: f32, blocker: f32) -> f32 {
    if blocker <= 0.0 {
        return 0.0;
    }
    (light_width_uv * (receiver - blocker) / blocker).max(0.0)
}

/// Radius of the blocker search region around the receiver's UV.
pub fn blocker_search_radius(params: &ShadowParams, receiver: f32) -> f32 {
    params.light_width_uv * (receiver - params.near_plane).max(0.0) / receiver.max(f32::EPSILON)
}

/// Fraction of light reaching the fragment: 1.0 is fully lit.
pub fn shadow_factor(
    params: &ShadowParams,
    map: &impl DepthSource,
    fragment: LightSpace,
    screen: Vec2,
) -> f32 {
    match params.algorithm {
        ShadowAlgorithm::Hard => hard_shadow(params, map, fragment),
        ShadowAlgorithm::Pcf => pcf(params, map, fragment, screen, params.filter_radius),
        ShadowAlgorithm::Pcss => pcss(params, map, fragment, screen),
    }
}

fn lit(params: &ShadowParams, stored: f32, depth: f32) -> bool {
    stored >= depth - params.bias
}

fn hard_shadow(params: &ShadowParams, map: &impl DepthSource, fragment: LightSpace) -> f32 {
    if lit(params, map.depth_at(fragment.uv), fragment.depth) {
        1.0
    } else {
        0.0
    }
}

fn pcf(
    params: &ShadowParams,
    map: &impl DepthSource,
    fragment: LightSpace,
    screen: Vec2,
    radius: f32,
) -> f32 {
    let rotation = rotate_taps(params.pattern, screen);
    let lit_taps = params
        .offsets
        .iter()
        .filter(|&&offset| {
            let uv = fragment.uv + rotation * offset * radius;
            lit(params, map.depth_at(uv), fragment.depth)
        })
        .count();
    lit_taps as f32 / params.offsets.len().max(1) as f32
}

fn pcss(
    params: &ShadowParams,
    map: &impl DepthSource,
    fragment: LightSpace,
    screen: Vec2,
) -> f32 {
    let receiver = linearize_depth(fragment.depth, params.near_plane, params.far_plane);
    let Some(blocker) = average_blocker(params, map, fragment, screen, receiver) else {
        return 1.0;
    };
    let radius = penumbra_radius(params.light_width_uv, receiver, blocker);
    pcf(params, map, fragment, screen, radius)
}

/// Mean linear depth of the occluders found around the fragment, if any.
pub fn average_blocker(
    params: &ShadowParams,
    map: &impl DepthSource,
    fragment: LightSpace,
    screen: Vec2,
    receiver: f32,
) -> Option<f32> {
    let rotation = rotate_taps(params.pattern, screen);
    let radius = blocker_search_radius(params, receiver);
    let (sum, found) = params
        .offsets
        .iter()
        .map(|&offset| map.depth_at(fragment.uv + rotation * offset * radius))
        .filter(|&stored| !lit(params, stored, fragment.depth))
        .fold((0.0, 0u32), |(sum, found), stored| {
            (
                sum + linearize_depth(stored, params.near_plane, params.far_plane),
                found + 1,
            )
        });
    (found > 0).then(|| sum / found as f32)
}

/// Final fragment color.
pub fn shade(color: Vec3, ambient: Vec3, diffuse: Vec3, n_dot_l: f32, shadow: f32) -> Vec3 {
    color * (ambient + diffuse * n_dot_l.max(0.0) * shadow)
}
