use std::fmt;

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::error::RenderError;
use crate::mesh::MeshData;

/// Pickable object identifier, written into the 8-bit stencil channel.
///
/// `255` is reserved as the "nothing here" value the stencil is cleared to,
/// so the valid range is `0..=254`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u8);

impl ObjectId {
    pub const SENTINEL: u8 = u8::MAX;
    pub const LIMIT: usize = Self::SENTINEL as usize;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ObjectId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        if value == Self::SENTINEL {
            Err(value)
        } else {
            Ok(Self(value))
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hands out object identifiers in load order, starting at zero.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u8,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Result<ObjectId, RenderError> {
        let id = ObjectId::try_from(self.next).map_err(|_| RenderError::ObjectLimit {
            limit: ObjectId::LIMIT,
        })?;
        self.next += 1;
        Ok(id)
    }
}

/// Placement of an object in the world. Rotation is in degrees, applied Z·Y·X.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_rotation_z(self.rotation.z.to_radians())
            * Quat::from_rotation_y(self.rotation.y.to_radians())
            * Quat::from_rotation_x(self.rotation.x.to_radians());
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// Loaded object: a mesh reference plus everything the passes need to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub mesh: usize,
    pub transform: Transform,
    pub color: Vec3,
}

impl SceneObject {
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.model_matrix()).inverse().transpose()
    }
}

/// All loaded meshes and the objects that instance them.
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
    meshes: Vec<MeshData>,
    objects: Vec<SceneObject>,
    ids: IdAllocator,
}

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// Registers an object and assigns it the next identifier.
    pub fn add_object(
        &mut self,
        name: impl Into<String>,
        mesh: usize,
        transform: Transform,
        color: Vec3,
    ) -> Result<ObjectId, RenderError> {
        let id = self.ids.allocate()?;
        self.objects.push(SceneObject {
            id,
            name: name.into(),
            mesh,
            transform,
            color,
        });
        Ok(id)
    }

    pub fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [SceneObject] {
        &mut self.objects
    }

    pub fn mesh_of(&self, object: &SceneObject) -> Option<&MeshData> {
        self.meshes.get(object.mesh)
    }

    pub fn find(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    /// Resolves a raw stencil value to an object, treating the sentinel and
    /// unknown values as empty.
    pub fn resolve(&self, stencil: u8) -> Option<&SceneObject> {
        ObjectId::try_from(stencil).ok().and_then(|id| self.find(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_deterministic_and_bounded() {
        let mut ids = IdAllocator::new();
        for expected in 0..=254u8 {
            assert_eq!(ids.allocate().unwrap().get(), expected);
        }
        assert!(matches!(
            ids.allocate(),
            Err(RenderError::ObjectLimit { limit: 255 })
        ));
        assert!(ids.allocate().is_err());
    }

    #[test]
    fn sentinel_is_not_an_identifier() {
        assert!(ObjectId::try_from(ObjectId::SENTINEL).is_err());
        assert_eq!(ObjectId::try_from(7).unwrap().get(), 7);
    }

    #[test]
    fn resolve_ignores_sentinel_and_unknown_values() {
        let mut set = ObjectSet::new();
        let mesh = set.add_mesh(MeshData::cube());
        let a = set.add_object("a", mesh, Transform::default(), Vec3::ONE).unwrap();
        assert_eq!(set.resolve(a.get()).map(|o| o.name.as_str()), Some("a"));
        assert!(set.resolve(ObjectId::SENTINEL).is_none());
        assert!(set.resolve(42).is_none());
    }

    #[test]
    fn transform_applies_scale_then_rotation_then_translation() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
            scale: Vec3::splat(2.0),
        };
        let moved = transform.matrix().transform_point3(Vec3::X);
        assert!((moved - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
    }
}
