//! Host scene graph boundary.
//!
//! The stream never owns scene objects; it finds, creates and mutates them
//! through [`SceneHost`]. [`MemoryHost`] is a complete in-memory host used by
//! the CLI and the tests.

mod memory;

pub use memory::{HostMesh, HostObject, HostStats, MemoryHost, PointCloud};

use crate::config::AspectRatioMode;
use crate::util::{Bounds, Mat4, Quat, Vec2, Vec3, Vec4};

/// Handle of a host scene object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Handle of a host mesh resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// Handle of a host material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// TRS transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_matrix(m: &Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Camera parameters owned by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub field_of_view: f32,
    pub near_clipping_plane: f32,
    pub far_clipping_plane: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            field_of_view: 60.0,
            near_clipping_plane: 0.3,
            far_clipping_plane: 1000.0,
        }
    }
}

/// Vertex attributes uploaded to a host mesh. Empty slices clear the
/// attribute.
#[derive(Clone, Copy, Debug)]
pub struct MeshVertices<'a> {
    pub positions: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub uvs: &'a [Vec2],
    pub tangents: &'a [Vec4],
    pub bounds: Bounds,
}

/// Scene graph operations the stream needs from its host.
pub trait SceneHost {
    // ---- objects ----

    /// Create a named object. Root objects have no parent.
    fn create_object(&mut self, parent: Option<ObjectId>, name: &str) -> ObjectId;

    fn find_child(&self, parent: ObjectId, name: &str) -> Option<ObjectId>;

    fn children(&self, object: ObjectId) -> Vec<ObjectId>;

    fn name(&self, object: ObjectId) -> Option<&str>;

    fn exists(&self, object: ObjectId) -> bool;

    /// Destroy an object and its whole subtree.
    fn destroy_object(&mut self, object: ObjectId);

    fn set_active(&mut self, object: ObjectId, active: bool);

    fn is_active(&self, object: ObjectId) -> bool;

    fn set_local_transform(&mut self, object: ObjectId, transform: Transform);

    fn set_world_transform(&mut self, object: ObjectId, transform: Transform);

    // ---- camera ----

    /// Camera parameters, attaching a default camera when missing.
    fn camera(&mut self, object: ObjectId) -> CameraState;

    fn set_camera(&mut self, object: ObjectId, camera: CameraState);

    // ---- meshes ----

    fn mesh_of(&self, object: ObjectId) -> Option<MeshId>;

    /// Mesh attached to `object`; creates one with a renderer holding a
    /// single default material when the object has none.
    fn attach_mesh(&mut self, object: ObjectId) -> MeshId;

    /// Reference `source`'s mesh and copy its renderer onto `target` when
    /// `target` does not have them yet.
    fn share_mesh(&mut self, source: ObjectId, target: ObjectId);

    fn clear_mesh(&mut self, mesh: MeshId);

    fn upload_vertices(&mut self, mesh: MeshId, vertices: MeshVertices<'_>);

    fn set_submesh_count(&mut self, mesh: MeshId, count: usize);

    fn set_submesh_indices(&mut self, mesh: MeshId, submesh: usize, indices: &[u32]);

    fn recalculate_normals(&mut self, mesh: MeshId);

    // ---- renderer / materials ----

    /// Renderer materials, `None` when the object has no renderer.
    fn materials(&self, object: ObjectId) -> Option<Vec<MaterialId>>;

    fn set_materials(&mut self, object: ObjectId, materials: &[MaterialId]);

    /// New instance of the default material named `name`.
    fn default_material(&mut self, name: &str) -> MaterialId;

    /// Material with `name`, created when it does not exist.
    fn find_or_create_material(&mut self, name: &str) -> MaterialId;

    // ---- points ----

    fn set_points(&mut self, object: ObjectId, positions: &[Vec3], velocities: &[Vec3], ids: &[u64]);

    // ---- display ----

    fn aspect_ratio(&self, mode: AspectRatioMode) -> f32;
}
