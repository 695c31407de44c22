use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::{debug, warn};

use crate::mesh::{MeshData, Vertex};

/// One drawable piece of an OBJ file: an `o` block, split further when the
/// material changes inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjGroup {
    pub name: Option<String>,
    pub material: Option<String>,
    pub mesh: MeshData,
}

/// Parsed OBJ contents before materials are resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjFile {
    pub groups: Vec<ObjGroup>,
    pub material_libraries: Vec<String>,
}

/// OBJ group with its diffuse color looked up from the material libraries.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMesh {
    pub name: Option<String>,
    pub color: Option<Vec3>,
    pub mesh: MeshData,
}

/// Reads an OBJ file and the material libraries it references.
///
/// Libraries that cannot be read are skipped with a warning; the groups then
/// fall back to the object color from the scene.
pub fn load_obj(path: &Path) -> Result<Vec<LoadedMesh>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let file = load_obj_from_str(&data)
        .with_context(|| format!("failed to parse OBJ mesh {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut materials = HashMap::new();
    for library in &file.material_libraries {
        let library_path = base.join(library);
        match std::fs::read_to_string(&library_path) {
            Ok(text) => materials.extend(parse_mtl(&text)),
            Err(err) => warn!("skipping material library {}: {err}", library_path.display()),
        }
    }
    debug!(
        "loaded {} with {} group(s), {} material(s)",
        path.display(),
        file.groups.len(),
        materials.len()
    );

    Ok(file
        .groups
        .into_iter()
        .map(|group| LoadedMesh {
            color: group
                .material
                .as_ref()
                .and_then(|name| materials.get(name).copied()),
            name: group.name,
            mesh: group.mesh,
        })
        .collect())
}

/// Parses an OBJ file from memory.
///
/// Polygons are fan-triangulated, negative indices count back from the end,
/// and vertices without a normal get a smoothed one.
pub fn load_obj_from_str(data: &str) -> Result<ObjFile> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut material_libraries = Vec::new();
    let mut pending: Vec<PendingGroup> = vec![PendingGroup::default()];

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let rest = || trimmed[tag.len()..].trim().to_string();
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if let Some(current) = pending.last_mut() {
                    triangulate_face(&polygon, &mut current.faces);
                }
            }
            "o" => start_group(&mut pending, Some(rest()), None),
            "usemtl" => {
                let name = pending.last().and_then(|group| group.name.clone());
                start_group(&mut pending, name, Some(rest()));
            }
            "mtllib" => material_libraries.extend(parts.map(str::to_string)),
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let mut groups = Vec::new();
    for group in pending.into_iter().filter(|group| !group.faces.is_empty()) {
        let mut mesh = build_mesh(&positions, &normals, &group.faces)?;
        mesh.fill_missing_normals();
        groups.push(ObjGroup {
            name: group.name,
            material: group.material,
            mesh,
        });
    }
    if groups.is_empty() {
        return Err(anyhow!("OBJ file does not define any faces"));
    }

    Ok(ObjFile {
        groups,
        material_libraries,
    })
}

/// Extracts the diffuse (`Kd`) color of every material in an MTL file.
pub fn parse_mtl(data: &str) -> HashMap<String, Vec3> {
    let mut colors = HashMap::new();
    let mut current: Option<String> = None;
    for line in data.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("newmtl") => current = parts.next().map(str::to_string),
            Some("Kd") => {
                if let (Some(name), Ok(color)) = (current.as_ref(), parse_vec3(parts)) {
                    colors.insert(name.clone(), color);
                }
            }
            _ => {}
        }
    }
    colors
}

#[derive(Debug, Default)]
struct PendingGroup {
    name: Option<String>,
    material: Option<String>,
    faces: Vec<[FaceIndex; 3]>,
}

fn start_group(pending: &mut Vec<PendingGroup>, name: Option<String>, material: Option<String>) {
    // `o` keeps the active material; `usemtl` keeps the active object name.
    let material = material.or_else(|| pending.last().and_then(|g| g.material.clone()));
    match pending.last_mut() {
        Some(current) if current.faces.is_empty() => {
            current.name = name;
            current.material = material;
        }
        _ => pending.push(PendingGroup {
            name,
            material,
            faces: Vec::new(),
        }),
    }
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut component = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vn = segments
            .nth(1)
            .filter(|s| !s.is_empty())
            .map(str::parse::<i32>)
            .transpose()?
            .unwrap_or(0);
        indices.push(FaceIndex { v, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vn: i32,
}

fn build_mesh(positions: &[Vec3], normals: &[Vec3], faces: &[[FaceIndex; 3]]) -> Result<MeshData> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for face in faces {
        for idx in face {
            let position =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index"))?;
            let normal = fix_index(idx.vn, normals.len());
            let next_index = mesh.vertices.len() as u32;
            let entry = lookup.entry(Key { position, normal }).or_insert_with(|| {
                let normal = normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                mesh.vertices.push(Vertex::new(positions[position], normal));
                next_index
            });
            mesh.indices.push(*entry);
        }
    }

    Ok(mesh)
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let file = load_obj_from_str(obj).unwrap();
        assert_eq!(file.groups.len(), 1);
        assert_eq!(file.groups[0].mesh.indices, vec![0, 1, 2]);
        assert_eq!(file.groups[0].mesh.vertices.len(), 3);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let file = load_obj_from_str(obj).unwrap();
        for vertex in &file.groups[0].mesh.vertices {
            assert!((vertex.normal().length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn splits_objects_and_materials() {
        let obj = "mtllib scene.mtl\n\
            v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
            o floor\nusemtl grey\nf 1 2 3 4\n\
            o pillar\nusemtl red\nf -4 -3 -2\nusemtl blue\nf 1 3 4\n";
        let file = load_obj_from_str(obj).unwrap();
        assert_eq!(file.material_libraries, vec!["scene.mtl".to_string()]);
        let summary: Vec<_> = file
            .groups
            .iter()
            .map(|g| (g.name.as_deref(), g.material.as_deref(), g.mesh.triangle_count()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some("floor"), Some("grey"), 2),
                (Some("pillar"), Some("red"), 1),
                (Some("pillar"), Some("blue"), 1),
            ]
        );
    }

    #[test]
    fn reads_diffuse_colors_from_mtl() {
        let mtl = "newmtl red\nKa 0 0 0\nKd 1 0 0\n\nnewmtl grey\nKd 0.5 0.5 0.5\n";
        let colors = parse_mtl(mtl);
        assert_eq!(colors.get("red"), Some(&Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(colors.get("grey"), Some(&Vec3::splat(0.5)));
    }

    #[test]
    fn load_resolves_material_library_next_to_mesh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.mtl"), "newmtl green\nKd 0 1 0\n").unwrap();
        let path = dir.path().join("tri.obj");
        std::fs::write(&path, "mtllib m.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl green\nf 1 2 3\n")
            .unwrap();
        let meshes = load_obj(&path).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].color, Some(Vec3::Y));
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert!(load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
        assert!(load_obj_from_str("# empty\n").is_err());
    }
}
