use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Interleaved vertex uploaded to the GPU: `position.xyz` followed by `normal.xyz`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from(self.normal)
    }
}

/// Indexed triangle list in object space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates triangles as vertex triples.
    pub fn triangles(&self) -> impl Iterator<Item = [Vertex; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertices[tri[0] as usize],
                self.vertices[tri[1] as usize],
                self.vertices[tri[2] as usize],
            ]
        })
    }

    /// Replaces zero normals with smoothed face normals.
    pub fn fill_missing_normals(&mut self) {
        if !self.vertices.iter().any(|v| v.normal() == Vec3::ZERO) {
            return;
        }
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let p0 = self.vertices[i0].position();
            let normal = (self.vertices[i1].position() - p0).cross(self.vertices[i2].position() - p0);
            if normal.length_squared() > f32::EPSILON {
                let normal = normal.normalize();
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }
        for (vertex, normal) in self.vertices.iter_mut().zip(accum) {
            if vertex.normal() == Vec3::ZERO {
                vertex.normal = normal.normalize_or_zero().into();
            }
        }
    }

    /// Unit cube centered on the origin with outward, counter-clockwise faces.
    pub fn cube() -> Self {
        let mut mesh = Self::default();
        for normal in [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z] {
            // Two axes spanning the face, ordered so that u x v == normal.
            let u = normal.any_orthonormal_vector();
            let v = normal.cross(u);
            let center = normal * 0.5;
            mesh.push_quad(
                [
                    center - u * 0.5 - v * 0.5,
                    center + u * 0.5 - v * 0.5,
                    center + u * 0.5 + v * 0.5,
                    center - u * 0.5 + v * 0.5,
                ],
                normal,
            );
        }
        mesh
    }

    /// Square in the XZ plane facing +Y, with the given side length.
    pub fn plane(size: f32) -> Self {
        let h = size * 0.5;
        let mut mesh = Self::default();
        mesh.push_quad(
            [
                Vec3::new(-h, 0.0, h),
                Vec3::new(h, 0.0, h),
                Vec3::new(h, 0.0, -h),
                Vec3::new(-h, 0.0, -h),
            ],
            Vec3::Y,
        );
        mesh
    }

    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        let base = self.vertices.len() as u32;
        self.vertices
            .extend(corners.iter().map(|&corner| Vertex::new(corner, normal)));
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_ccw(mesh: &MeshData) {
        for [a, b, c] in mesh.triangles() {
            let face = (b.position() - a.position()).cross(c.position() - a.position());
            assert!(face.dot(a.normal()) > 0.0, "triangle winds against its normal");
        }
    }

    #[test]
    fn cube_faces_point_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.triangle_count(), 12);
        assert_outward_ccw(&cube);
        for vertex in &cube.vertices {
            assert!(vertex.position().abs().max_element() <= 0.5 + 1e-6);
            assert!(vertex.position().dot(vertex.normal()) > 0.0);
        }
    }

    #[test]
    fn plane_faces_up() {
        let plane = MeshData::plane(10.0);
        assert_eq!(plane.triangle_count(), 2);
        assert_outward_ccw(&plane);
        assert!(plane.vertices.iter().all(|v| v.normal() == Vec3::Y));
    }

    #[test]
    fn missing_normals_are_computed() {
        let mut mesh = MeshData {
            vertices: vec![
                Vertex::new(Vec3::ZERO, Vec3::ZERO),
                Vertex::new(Vec3::X, Vec3::ZERO),
                Vertex::new(Vec3::Y, Vec3::ZERO),
            ],
            indices: vec![0, 1, 2],
        };
        mesh.fill_missing_normals();
        for vertex in &mesh.vertices {
            assert!((vertex.normal() - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
    }
}
