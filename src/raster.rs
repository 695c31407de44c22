//! Scanline-free triangle rasterizer used by the CPU reference backend.
//!
//! Triangles arrive in clip space, are clipped against the near plane
//! (`z >= 0`, matching the `[0, 1]` depth range of the projections used
//! throughout the crate) and are walked with edge functions over their
//! screen-space bounding box. Fragments are reported with a top-left pixel
//! origin; targets decide how rows are stored.

use glam::{Vec2, Vec3, Vec4};

/// Which triangle faces are discarded. Front faces wind counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    Front,
    Back,
}

/// Attributes interpolated across a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Varying {
    pub world: Vec3,
    pub normal: Vec3,
}

impl Varying {
    fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            world: self.world.lerp(other.world, t),
            normal: self.normal.lerp(other.normal, t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex {
    pub clip: Vec4,
    pub varying: Varying,
}

/// A covered pixel. `y` counts rows from the top of the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub varying: Varying,
}

/// Rasterizes one clip-space triangle into a `width` x `height` target.
pub fn rasterize(
    triangle: [ClipVertex; 3],
    width: u32,
    height: u32,
    cull: CullMode,
    mut emit: impl FnMut(Fragment),
) {
    let polygon = clip_near(&triangle);
    if polygon.len() < 3 {
        return;
    }
    // Near clipping preserves winding, so the clipped polygon decides facing.
    let Some(front) = facing(&polygon) else {
        return;
    };
    let culled = match cull {
        CullMode::Front => front,
        CullMode::Back => !front,
    };
    if culled {
        return;
    }
    for i in 1..polygon.len() - 1 {
        fill([polygon[0], polygon[i], polygon[i + 1]], width, height, &mut emit);
    }
}

fn ndc(vertex: &ClipVertex) -> Vec3 {
    vertex.clip.truncate() / vertex.clip.w
}

fn cross2(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

fn facing(polygon: &[ClipVertex]) -> Option<bool> {
    let points: Vec<Vec2> = polygon.iter().map(|v| ndc(v).truncate()).collect();
    let area: f32 = (0..points.len())
        .map(|i| cross2(points[i], points[(i + 1) % points.len()]))
        .sum();
    (area.abs() > f32::EPSILON).then_some(area > 0.0)
}

/// Sutherland-Hodgman against the near plane.
fn clip_near(triangle: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    const MIN_W: f32 = 1e-6;
    let inside = |v: &ClipVertex| v.clip.z >= 0.0 && v.clip.w > MIN_W;
    if triangle.iter().all(inside) {
        return triangle.to_vec();
    }
    let mut output = Vec::with_capacity(4);
    for i in 0..3 {
        let current = triangle[i];
        let next = triangle[(i + 1) % 3];
        if inside(&current) {
            output.push(current);
        }
        if inside(&current) != inside(&next) {
            let t = current.clip.z / (current.clip.z - next.clip.z);
            let clip = current.clip.lerp(next.clip, t);
            if clip.w > MIN_W {
                output.push(ClipVertex {
                    clip,
                    varying: current.varying.lerp(next.varying, t),
                });
            }
        }
    }
    output
}

fn fill(triangle: [ClipVertex; 3], width: u32, height: u32, emit: &mut impl FnMut(Fragment)) {
    let points = triangle.map(|v| ndc(&v));
    let [a, b, c] = points.map(|p| p.truncate());
    let area = cross2(b - a, c - a);
    if area.abs() <= f32::EPSILON {
        return;
    }

    let to_screen = |p: Vec2| {
        Vec2::new(
            (p.x * 0.5 + 0.5) * width as f32,
            (0.5 - p.y * 0.5) * height as f32,
        )
    };
    let screen = [to_screen(a), to_screen(b), to_screen(c)];
    let min = screen[0].min(screen[1]).min(screen[2]);
    let max = screen[0].max(screen[1]).max(screen[2]);
    if max.x < 0.0 || max.y < 0.0 || min.x > width as f32 || min.y > height as f32 {
        return;
    }
    let x0 = min.x.floor().max(0.0) as u32;
    let y0 = min.y.floor().max(0.0) as u32;
    let x1 = (max.x.ceil() as u32).min(width);
    let y1 = (max.y.ceil() as u32).min(height);

    let inv_w = triangle.map(|v| 1.0 / v.clip.w);
    for y in y0..y1 {
        for x in x0..x1 {
            let p = Vec2::new(
                (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
                1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
            );
            let weights = Vec3::new(
                cross2(c - b, p - b) / area,
                cross2(a - c, p - c) / area,
                cross2(b - a, p - a) / area,
            );
            if weights.min_element() < 0.0 {
                continue;
            }
            let depth = weights.dot(Vec3::new(points[0].z, points[1].z, points[2].z));
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }
            let perspective = weights * Vec3::from(inv_w);
            let perspective = perspective / perspective.element_sum();
            let varying = Varying {
                world: triangle[0].varying.world * perspective.x
                    + triangle[1].varying.world * perspective.y
                    + triangle[2].varying.world * perspective.z,
                normal: triangle[0].varying.normal * perspective.x
                    + triangle[1].varying.normal * perspective.y
                    + triangle[2].varying.normal * perspective.z,
            };
            emit(Fragment {
                x,
                y,
                depth,
                varying,
            });
        }
    }
}
