use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;

use crate::mesh::{MeshData, Vertex};

/// Loads a binary or ASCII STL file.
pub fn load_stl(path: &Path) -> Result<MeshData> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    read_stl(&mut reader).with_context(|| format!("failed to parse STL mesh {}", path.display()))
}

/// Reads STL data into a flat-shaded mesh.
///
/// Every facet gets its own three vertices so that the facet normal is kept
/// exactly. Facets with a zero normal get one computed from their winding.
pub fn read_stl<R: Read + Seek>(reader: &mut R) -> Result<MeshData> {
    let stl = stl_io::read_stl(reader)?;
    let mut mesh = MeshData::default();

    for face in &stl.faces {
        let corners = face.vertices.map(|index| {
            let v = stl.vertices[index];
            Vec3::new(v[0], v[1], v[2])
        });
        let mut normal = Vec3::new(face.normal[0], face.normal[1], face.normal[2]);
        if normal.length_squared() <= f32::EPSILON {
            normal = (corners[1] - corners[0])
                .cross(corners[2] - corners[0])
                .normalize_or_zero();
        }
        let base = mesh.vertices.len() as u32;
        mesh.vertices
            .extend(corners.iter().map(|&corner| Vertex::new(corner, normal)));
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const TETRA: &str = "solid tetra
facet normal 0 0 -1
  outer loop
    vertex 0 0 0
    vertex 0 1 0
    vertex 1 0 0
  endloop
endfacet
facet normal 0 0 0
  outer loop
    vertex 0 0 0
    vertex 1 0 0
    vertex 0 0 1
  endloop
endfacet
endsolid tetra
";

    #[test]
    fn reads_ascii_facets_with_flat_normals() {
        let mesh = read_stl(&mut Cursor::new(TETRA.as_bytes())).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertices.len(), 6);
        assert!(mesh.vertices[..3].iter().all(|v| v.normal() == -Vec3::Z));
        // Second facet had no normal; it is derived from the winding.
        assert!(mesh.vertices[3..]
            .iter()
            .all(|v| (v.normal() - -Vec3::Y).length() < 1e-6));
    }

    #[test]
    fn reports_missing_file() {
        let err = load_stl(Path::new("does/not/exist.stl")).unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.stl"));
    }
}
