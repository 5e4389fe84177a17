//! Scene reader boundary.
//!
//! The reader is an opaque service: given a node and a time it produces a
//! decoded [`Sample`]. Mesh and points samples fill caller-sized buffers so
//! the stream can reuse its caches across frames.

mod decode;
pub mod memory;

pub use decode::{DecodeBatch, DecodeRequest, Decoder, DECODE_QUEUE_DEPTH};
pub use memory::{AssetResolver, MemoryReader, MemoryResolver, SceneDesc};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ReaderConfig;
use crate::material::Facesets;
use crate::util::{Bounds, Chrono, Quat, Result, Vec2, Vec3, Vec4};

/// Identifier of a node inside one reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Schema carried by a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Group,
    Xform,
    Mesh,
    Camera,
    Points,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Group => "group",
            Self::Xform => "xform",
            Self::Mesh => "mesh",
            Self::Camera => "camera",
            Self::Points => "points",
        };
        f.write_str(name)
    }
}

/// Whether a mesh's structure may change between samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyVariance {
    #[default]
    Constant,
    /// Positions move, connectivity is fixed.
    Homogeneous,
    /// Connectivity may change every sample.
    Heterogeneous,
}

/// One node of the source scene graph.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    /// Full path, `/` separated, rooted at `/`.
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// Path of the node this one instances, if any.
    pub instance_source: Option<String>,
    /// Node-local sample range, used by `Clip`.
    pub time_range: Option<(Chrono, Chrono)>,
    /// Source data never changes over time.
    pub constant: bool,
    pub topology_variance: TopologyVariance,
}

/// Decoded transform sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct XformData {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Values are relative to the parent.
    pub inherits: bool,
}

impl Default for XformData {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            inherits: true,
        }
    }
}

/// Decoded camera sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraData {
    pub field_of_view: f32,
    pub near_clipping_plane: f32,
    pub far_clipping_plane: f32,
    pub focus_distance: f32,
    pub focal_length: f32,
    pub aspect_ratio: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            field_of_view: 60.0,
            near_clipping_plane: 0.3,
            far_clipping_plane: 1000.0,
            focus_distance: 5.0,
            focal_length: 0.0,
            aspect_ratio: 1.0,
        }
    }
}

/// Per-sample mesh summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshSampleSummary {
    pub split_count: usize,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub has_tangents: bool,
    pub has_velocities: bool,
    /// Reader detected a connectivity change since the previous sample.
    pub topology_changed: bool,
}

/// Destination slices for one split; each is sized to the split's vertex
/// count, `None` when the attribute is absent this sample.
pub struct VertexBuffers<'a> {
    pub positions: &'a mut [Vec3],
    pub normals: Option<&'a mut [Vec3]>,
    pub uvs: Option<&'a mut [Vec2]>,
    pub tangents: Option<&'a mut [Vec4]>,
}

/// One index-buffer partition as laid out by the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmeshSummary {
    /// Global submesh index, stable key across frames.
    pub index: usize,
    pub split_index: usize,
    /// Index of the submesh within its split.
    pub split_submesh_index: usize,
    /// Faceset the faces belong to, `None` for unassigned faces.
    pub faceset_index: Option<usize>,
    pub triangle_count: usize,
}

/// Decoded polygon mesh sample.
pub trait MeshSample: Send + fmt::Debug {
    fn summary(&self) -> MeshSampleSummary;

    /// Number of vertices in `split`.
    fn vertex_count(&self, split: usize) -> usize;

    /// Write vertex attributes of `split` into `out` and return its bounds.
    fn fill_vertices(&self, split: usize, out: VertexBuffers<'_>) -> Bounds;

    /// Partition triangles by faceset membership; must be called before any
    /// submesh query.
    fn prepare_submeshes(&mut self, facesets: &Facesets) -> Vec<SubmeshSummary>;

    fn split_submesh_count(&self, split: usize) -> usize;

    /// Write `3 * triangle_count` indices, local to the submesh's split.
    fn fill_submesh_indices(&self, submesh: &SubmeshSummary, out: &mut [u32]);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointsSampleSummary {
    pub has_velocities: bool,
    pub has_ids: bool,
}

/// Decoded point cloud sample.
pub trait PointsSample: Send + fmt::Debug {
    fn count(&self) -> usize;

    fn summary(&self) -> PointsSampleSummary;

    /// Write `count()` values into each present slice.
    fn fill(&self, positions: &mut [Vec3], velocities: Option<&mut [Vec3]>, ids: Option<&mut [u64]>);
}

/// A decoded sample of any kind.
#[derive(Debug)]
pub enum Sample {
    Xform(XformData),
    Camera(CameraData),
    Mesh(Box<dyn MeshSample>),
    Points(Box<dyn PointsSample>),
}

impl Sample {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Xform(_) => NodeKind::Xform,
            Self::Camera(_) => NodeKind::Camera,
            Self::Mesh(_) => NodeKind::Mesh,
            Self::Points(_) => NodeKind::Points,
        }
    }
}

/// Reader interface for an opened scene.
pub trait SceneReader: Send + Sync {
    /// Source sample range `(start, end)`.
    fn time_range(&self) -> (Chrono, Chrono);

    fn root(&self) -> NodeId;

    fn node(&self, id: NodeId) -> Option<&NodeInfo>;

    /// Find a node by its full path.
    fn find(&self, path: &str) -> Option<NodeId>;

    /// Decode `id` at `time` with the node's resolved configuration.
    fn sample(&self, id: NodeId, time: Chrono, config: &ReaderConfig) -> Result<Sample>;

    /// Resolve the node an instance points at.
    fn instance_source(&self, id: NodeId) -> Option<NodeId> {
        let path = self.node(id)?.instance_source.as_deref()?;
        self.find(path)
    }

    /// Children of a node, empty for unknown ids.
    fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }
}

/// Opens readers for source paths.
pub trait SourceResolver: Send + Sync {
    /// `Error::SourceNotFound` when the path cannot be opened.
    fn resolve(&self, path: &Path) -> Result<Arc<dyn SceneReader>>;
}
