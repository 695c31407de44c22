use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::info;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::config::{LightingConfig, ShadowConfig};
use crate::error::RenderError;
use crate::mesh::MeshData;
use crate::object::{ObjectSet, Transform};

/// Default side length of the shadow map, in texels.
pub const DEFAULT_SHADOW_RESOLUTION: u32 = 1024;

/// Scene description read from XML, before any mesh is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub objects: Vec<ObjectDesc>,
    pub camera: CameraDesc,
    pub light: LightDesc,
    pub shadows: ShadowConfig,
    pub shadow_resolution: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            camera: CameraDesc::viewer(),
            light: LightDesc::default(),
            shadows: ShadowConfig::default(),
            shadow_resolution: DEFAULT_SHADOW_RESOLUTION,
        }
    }
}

/// Where an object's geometry comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshSource {
    Cube,
    Plane,
    File(PathBuf),
}

impl MeshSource {
    fn parse(value: &str) -> Self {
        match value {
            "cube" => Self::Cube,
            "plane" => Self::Plane,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

/// Object entry of the scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDesc {
    pub name: String,
    pub mesh: MeshSource,
    pub transform: TransformDesc,
    /// Overrides material colors from the mesh file when present.
    pub color: Option<Vec3>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformDesc {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl From<TransformDesc> for Transform {
    fn from(desc: TransformDesc) -> Self {
        Self {
            position: desc.position,
            rotation: desc.rotation,
            scale: desc.scale,
        }
    }
}

/// Lens and placement of a camera. `fov` is the vertical field of view in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraDesc {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraDesc {
    pub fn viewer() -> Self {
        Self {
            position: Vec3::new(5.0, 5.0, 5.0),
            target: Vec3::ZERO,
            fov: Camera::DEFAULT_FOV_Y.to_degrees(),
            near: Camera::DEFAULT_NEAR,
            far: Camera::DEFAULT_FAR,
        }
    }

    pub fn light() -> Self {
        Self {
            position: Vec3::new(0.0, 13.0, -7.0),
            target: Vec3::ZERO,
            fov: Camera::DEFAULT_FOV_Y.to_degrees(),
            near: 5.0,
            far: 25.0,
        }
    }

    pub fn build(&self, aspect_ratio: f32) -> Camera {
        Camera::with_lens(
            self.position,
            self.target,
            self.fov.to_radians(),
            self.near,
            self.far,
            aspect_ratio,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDesc {
    pub camera: CameraDesc,
    pub lighting: LightingConfig,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            camera: CameraDesc::light(),
            lighting: LightingConfig::default(),
        }
    }
}

impl Scene {
    /// Parses the scene XML.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        let mut scene = Self::default();

        for node in root.children().filter(|n| n.has_tag_name("object")) {
            let name = required_text(&node, "name")?;
            let mesh = required_text(&node, "mesh")
                .with_context(|| format!("object {name} has no mesh"))?;
            scene.objects.push(ObjectDesc {
                mesh: MeshSource::parse(&mesh),
                transform: TransformDesc {
                    position: parse_vec3(optional_text(&node, "position"), Vec3::ZERO)?,
                    rotation: parse_vec3(optional_text(&node, "rotation"), Vec3::ZERO)?,
                    scale: parse_scale(optional_text(&node, "scale"))?,
                },
                color: optional_text(&node, "color")
                    .map(|value| parse_color(Some(value), Vec3::ONE))
                    .transpose()?,
                name,
            });
        }

        if let Some(node) = child(&root, "camera") {
            scene.camera = parse_camera(&node, scene.camera)?;
        }
        if let Some(node) = child(&root, "light") {
            scene.light.camera = parse_camera(&node, scene.light.camera)?;
            let lighting = &mut scene.light.lighting;
            lighting.ambient = parse_color(optional_text(&node, "ambient"), lighting.ambient)?;
            lighting.diffuse = parse_color(optional_text(&node, "diffuse"), lighting.diffuse)?;
        }
        if let Some(node) = child(&root, "shadows") {
            parse_shadows(&node, &mut scene)?;
        }

        Ok(scene)
    }

    /// Reads and parses a scene file. Relative mesh paths are resolved
    /// against the directory containing the scene.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let xml = std::fs::read_to_string(path).map_err(|err| RenderError::asset(path, err))?;
        let mut scene =
            Self::from_xml(&xml).map_err(|err| RenderError::asset(path, format!("{err:#}")))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for object in &mut scene.objects {
            if let MeshSource::File(mesh) = &mut object.mesh {
                if mesh.is_relative() {
                    *mesh = base.join(&*mesh);
                }
            }
        }
        info!("loaded scene {} with {} object(s)", path.display(), scene.objects.len());
        Ok(scene)
    }

    /// Built-in scene: a ground plane with a few cubes casting shadows on it.
    pub fn demo() -> Self {
        let object = |name: &str, mesh: MeshSource, position: Vec3, scale: Vec3, color: Vec3| {
            ObjectDesc {
                name: name.to_string(),
                mesh,
                transform: TransformDesc {
                    position,
                    rotation: Vec3::ZERO,
                    scale,
                },
                color: Some(color),
            }
        };
        Self {
            objects: vec![
                object(
                    "ground",
                    MeshSource::Plane,
                    Vec3::ZERO,
                    Vec3::splat(14.0),
                    Vec3::new(0.78, 0.78, 0.74),
                ),
                object(
                    "tower",
                    MeshSource::Cube,
                    Vec3::new(0.0, 2.0, 0.0),
                    Vec3::new(1.0, 4.0, 1.0),
                    Vec3::new(0.86, 0.35, 0.29),
                ),
                object(
                    "crate",
                    MeshSource::Cube,
                    Vec3::new(2.5, 0.75, 1.5),
                    Vec3::splat(1.5),
                    Vec3::new(0.33, 0.58, 0.82),
                ),
                object(
                    "slab",
                    MeshSource::Cube,
                    Vec3::new(-2.5, 1.6, -1.0),
                    Vec3::new(2.5, 0.2, 2.5),
                    Vec3::new(0.45, 0.72, 0.39),
                ),
            ],
            ..Self::default()
        }
    }

    /// Loads every mesh and registers every object, assigning identifiers in
    /// scene order.
    ///
    /// OBJ files with several groups produce one object per group, named
    /// `object/group`.
    pub fn instantiate(&self) -> Result<ObjectSet, RenderError> {
        let mut set = ObjectSet::new();
        let mut builtin_cube = None;
        let mut builtin_plane = None;

        for desc in &self.objects {
            let transform = Transform::from(desc.transform);
            match &desc.mesh {
                MeshSource::Cube => {
                    let mesh = *builtin_cube.get_or_insert_with(|| set.add_mesh(MeshData::cube()));
                    set.add_object(&desc.name, mesh, transform, desc.color.unwrap_or(Vec3::ONE))?;
                }
                MeshSource::Plane => {
                    let mesh =
                        *builtin_plane.get_or_insert_with(|| set.add_mesh(MeshData::plane(1.0)));
                    set.add_object(&desc.name, mesh, transform, desc.color.unwrap_or(Vec3::ONE))?;
                }
                MeshSource::File(path) => {
                    let pieces = load_mesh_file(path)?;
                    let several = pieces.len() > 1;
                    for (index, piece) in pieces.into_iter().enumerate() {
                        let name = match (several, piece.name) {
                            (false, _) => desc.name.clone(),
                            (true, Some(group)) => format!("{}/{group}", desc.name),
                            (true, None) => format!("{}/{index}", desc.name),
                        };
                        let color = desc.color.or(piece.color).unwrap_or(Vec3::ONE);
                        let mesh = set.add_mesh(piece.mesh);
                        set.add_object(name, mesh, transform, color)?;
                    }
                }
            }
        }

        Ok(set)
    }
}

struct MeshPiece {
    name: Option<String>,
    color: Option<Vec3>,
    mesh: MeshData,
}

fn load_mesh_file(path: &Path) -> Result<Vec<MeshPiece>, RenderError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let pieces = match extension.as_deref() {
        Some("obj") => crate::obj::load_obj(path).map(|meshes| {
            meshes
                .into_iter()
                .map(|loaded| MeshPiece {
                    name: loaded.name,
                    color: loaded.color,
                    mesh: loaded.mesh,
                })
                .collect()
        }),
        Some("stl") => crate::stl::load_stl(path).map(|mesh| {
            vec![MeshPiece {
                name: None,
                color: None,
                mesh,
            }]
        }),
        _ => Err(anyhow!("unsupported mesh format")),
    };
    pieces.map_err(|err| RenderError::asset(path, format!("{err:#}")))
}

fn parse_camera(node: &Node<'_, '_>, defaults: CameraDesc) -> Result<CameraDesc> {
    Ok(CameraDesc {
        position: parse_vec3(optional_text(node, "position"), defaults.position)?,
        target: parse_vec3(optional_text(node, "target"), defaults.target)?,
        fov: parse_f32(optional_text(node, "fov"), defaults.fov)?,
        near: parse_f32(optional_text(node, "near"), defaults.near)?,
        far: parse_f32(optional_text(node, "far"), defaults.far)?,
    })
}

fn parse_shadows(node: &Node<'_, '_>, scene: &mut Scene) -> Result<()> {
    let shadows = &mut scene.shadows;
    if let Some(algorithm) = optional_text(node, "algorithm") {
        shadows.set_algorithm(algorithm.parse()?);
    }
    if let Some(pattern) = optional_text(node, "pattern") {
        shadows.set_pattern(pattern.parse()?);
    }
    if let Some(samples) = optional_text(node, "samples") {
        let samples = samples
            .parse::<i64>()
            .map_err(|err| anyhow!("failed to parse sample count: {err}"))?;
        shadows.set_sample_count(samples);
    }
    shadows.set_filter_radius(parse_f32(optional_text(node, "radius"), shadows.filter_radius())?);
    shadows.set_light_width(parse_f32(optional_text(node, "width"), shadows.light_width())?);
    shadows.set_depth_bias(parse_f32(optional_text(node, "bias"), shadows.depth_bias())?);
    if let Some(resolution) = optional_text(node, "resolution") {
        scene.shadow_resolution = resolution
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse shadow resolution: {err}"))?;
    }
    Ok(())
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str, what: &str) -> Result<Vec3> {
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("invalid {what} `{value}`: {err}"))?;
    match numbers[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(anyhow!("{what} `{value}` must have three components")),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    value.map_or(Ok(default), |value| parse_components(&value, "vector"))
}

/// Scale accepts either a single uniform factor or three components.
fn parse_scale(value: Option<String>) -> Result<Vec3> {
    match value {
        Some(value) => match value.trim().parse::<f32>() {
            Ok(uniform) => Ok(Vec3::splat(uniform)),
            Err(_) => parse_components(&value, "scale"),
        },
        None => Ok(Vec3::ONE),
    }
}

/// Colors are written as 0-255 components.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    value.map_or(Ok(default), |value| {
        Ok(parse_components(&value, "color")? / 255.0)
    })
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}
