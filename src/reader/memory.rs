//! In-memory scene reader.
//!
//! Scenes are described with [`SceneDesc`] (serde, usually JSON) and decoded
//! on demand: samples are selected by floor time, meshes are expanded to
//! face-varying vertices, partitioned into size-bounded splits and
//! fan-triangulated.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{
    CameraData, MeshSample, MeshSampleSummary, NodeId, NodeInfo, NodeKind, PointsSample,
    PointsSampleSummary, Sample, SceneReader, SourceResolver, SubmeshSummary, TopologyVariance,
    VertexBuffers, XformData,
};
use crate::config::{NormalsMode, ReaderConfig, TangentsMode};
use crate::material::Facesets;
use crate::util::{Bounds, Chrono, Error, Quat, Result, Vec2, Vec3, Vec4};

/// Largest vertex count of one split (16-bit index buffers).
pub const DEFAULT_MAX_SPLIT_VERTICES: usize = 65000;

// ============================================================================
// Scene description
// ============================================================================

/// Serializable description of a whole scene.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDesc {
    /// Overrides the range computed from the frames.
    pub time_range: Option<(Chrono, Chrono)>,
    pub max_split_vertices: usize,
    pub nodes: Vec<NodeDesc>,
}

impl SceneDesc {
    pub fn new(nodes: Vec<NodeDesc>) -> Self {
        Self {
            nodes,
            ..Default::default()
        }
    }
}

impl Default for SceneDesc {
    fn default() -> Self {
        Self {
            time_range: None,
            max_split_vertices: DEFAULT_MAX_SPLIT_VERTICES,
            nodes: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    /// Full path of the node this one instances.
    #[serde(default)]
    pub instance_of: Option<String>,
    #[serde(flatten)]
    pub schema: SchemaDesc,
    #[serde(default)]
    pub children: Vec<NodeDesc>,
}

impl NodeDesc {
    fn with_schema(name: &str, schema: SchemaDesc) -> Self {
        Self {
            name: name.to_string(),
            instance_of: None,
            schema,
            children: Vec::new(),
        }
    }

    pub fn group(name: &str) -> Self {
        Self::with_schema(name, SchemaDesc::Group)
    }

    pub fn xform(name: &str, frames: Vec<XformFrame>) -> Self {
        Self::with_schema(name, SchemaDesc::Xform { frames })
    }

    pub fn mesh(name: &str, mesh: MeshDesc) -> Self {
        Self::with_schema(name, SchemaDesc::Mesh(mesh))
    }

    pub fn camera(name: &str, frames: Vec<CameraFrame>) -> Self {
        Self::with_schema(name, SchemaDesc::Camera { frames })
    }

    pub fn points(name: &str, frames: Vec<PointsFrame>) -> Self {
        Self::with_schema(name, SchemaDesc::Points { frames })
    }

    pub fn with_children(mut self, children: Vec<NodeDesc>) -> Self {
        self.children = children;
        self
    }

    pub fn instance_of(mut self, path: &str) -> Self {
        self.instance_of = Some(path.to_string());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SchemaDesc {
    Group,
    Xform { frames: Vec<XformFrame> },
    Mesh(MeshDesc),
    Camera { frames: Vec<CameraFrame> },
    Points { frames: Vec<PointsFrame> },
}

impl SchemaDesc {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Group => NodeKind::Group,
            Self::Xform { .. } => NodeKind::Xform,
            Self::Mesh(_) => NodeKind::Mesh,
            Self::Camera { .. } => NodeKind::Camera,
            Self::Points { .. } => NodeKind::Points,
        }
    }

    fn frame_times(&self) -> Vec<Chrono> {
        match self {
            Self::Group => Vec::new(),
            Self::Xform { frames } => frames.iter().map(|f| f.time).collect(),
            Self::Mesh(mesh) => mesh.frames.iter().map(|f| f.time).collect(),
            Self::Camera { frames } => frames.iter().map(|f| f.time).collect(),
            Self::Points { frames } => frames.iter().map(|f| f.time).collect(),
        }
    }
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XformFrame {
    pub time: Chrono,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Quaternion `[x, y, z, w]`.
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
    #[serde(default = "yes")]
    pub inherits: bool,
}

impl XformFrame {
    pub fn at(time: Chrono, translation: [f32; 3]) -> Self {
        Self {
            time,
            translation,
            rotation: identity_rotation(),
            scale: unit_scale(),
            inherits: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub time: Chrono,
    pub field_of_view: f32,
    pub near_clipping_plane: f32,
    pub far_clipping_plane: f32,
    #[serde(default)]
    pub focus_distance: f32,
    #[serde(default)]
    pub focal_length: f32,
    /// Film aperture ratio, used when the stream asks for it.
    #[serde(default)]
    pub aperture_aspect_ratio: Option<f32>,
}

impl CameraFrame {
    pub fn new(time: Chrono, field_of_view: f32, near: f32, far: f32) -> Self {
        Self {
            time,
            field_of_view,
            near_clipping_plane: near,
            far_clipping_plane: far,
            focus_distance: 0.0,
            focal_length: 0.0,
            aperture_aspect_ratio: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshDesc {
    /// Inferred from the frames when absent.
    #[serde(default)]
    pub variance: Option<TopologyVariance>,
    pub frames: Vec<MeshFrame>,
}

impl MeshDesc {
    pub fn new(frames: Vec<MeshFrame>) -> Self {
        Self {
            variance: None,
            frames,
        }
    }

    fn resolved_variance(&self) -> TopologyVariance {
        if let Some(v) = self.variance {
            return v;
        }
        let Some(first) = self.frames.first() else {
            return TopologyVariance::Constant;
        };
        let same_topology = self
            .frames
            .iter()
            .all(|f| f.face_counts == first.face_counts && f.face_indices == first.face_indices);
        if !same_topology {
            TopologyVariance::Heterogeneous
        } else if self.frames.len() > 1 {
            TopologyVariance::Homogeneous
        } else {
            TopologyVariance::Constant
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshFrame {
    pub time: Chrono,
    pub positions: Vec<[f32; 3]>,
    pub face_counts: Vec<u32>,
    pub face_indices: Vec<u32>,
    /// Per-vertex or per-face-vertex normals.
    #[serde(default)]
    pub normals: Option<Vec<[f32; 3]>>,
    /// Per-vertex or per-face-vertex UVs.
    #[serde(default)]
    pub uvs: Option<Vec<[f32; 2]>>,
    #[serde(default)]
    pub velocities: Option<Vec<[f32; 3]>>,
}

impl MeshFrame {
    pub fn new(time: Chrono, positions: Vec<[f32; 3]>, face_counts: Vec<u32>, face_indices: Vec<u32>) -> Self {
        Self {
            time,
            positions,
            face_counts,
            face_indices,
            normals: None,
            uvs: None,
            velocities: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointsFrame {
    pub time: Chrono,
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub velocities: Option<Vec<[f32; 3]>>,
    #[serde(default)]
    pub ids: Option<Vec<u64>>,
}

impl PointsFrame {
    pub fn new(time: Chrono, positions: Vec<[f32; 3]>) -> Self {
        Self {
            time,
            positions,
            velocities: None,
            ids: None,
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

enum SchemaData {
    None,
    Xform(Vec<XformFrame>),
    Mesh(MeshDesc),
    Camera(Vec<CameraFrame>),
    Points(Vec<Arc<PointsFrame>>),
}

/// Scene reader over fully loaded in-memory data.
pub struct MemoryReader {
    nodes: Vec<NodeInfo>,
    data: Vec<SchemaData>,
    by_path: HashMap<String, NodeId>,
    time_range: (Chrono, Chrono),
    max_split_vertices: usize,
}

impl MemoryReader {
    /// Build a reader from a description, validating names and meshes.
    pub fn from_desc(desc: &SceneDesc) -> Result<Self> {
        let mut reader = Self {
            nodes: Vec::new(),
            data: Vec::new(),
            by_path: HashMap::new(),
            time_range: (0.0, 0.0),
            max_split_vertices: desc.max_split_vertices.max(3),
        };

        let root = NodeId(0);
        reader.nodes.push(NodeInfo {
            id: root,
            name: String::new(),
            path: "/".to_string(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Group,
            instance_source: None,
            time_range: None,
            constant: true,
            topology_variance: TopologyVariance::Constant,
        });
        reader.data.push(SchemaData::None);
        reader.by_path.insert("/".to_string(), root);

        let mut range: Option<(Chrono, Chrono)> = None;
        for node in &desc.nodes {
            reader.add_node(root, node, &mut range)?;
        }
        reader.time_range = desc.time_range.or(range).unwrap_or((0.0, 0.0));
        reader.resolve_instances();
        Ok(reader)
    }

    /// Instances take the schema of their source; an unresolved instance
    /// keeps its own.
    fn resolve_instances(&mut self) {
        for i in 0..self.nodes.len() {
            let Some(source) = self.nodes[i].instance_source.as_deref().and_then(|p| self.by_path.get(p).copied()) else {
                continue;
            };
            let src = &self.nodes[source.0 as usize];
            let (kind, time_range, constant, variance) = (src.kind, src.time_range, src.constant, src.topology_variance);
            let node = &mut self.nodes[i];
            node.kind = kind;
            node.time_range = time_range;
            node.constant = constant;
            node.topology_variance = variance;
        }
    }

    /// Load a JSON scene description from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let desc: SceneDesc = serde_json::from_str(&text)?;
        Self::from_desc(&desc)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn add_node(&mut self, parent: NodeId, desc: &NodeDesc, range: &mut Option<(Chrono, Chrono)>) -> Result<()> {
        if desc.name.is_empty() || desc.name.contains('/') {
            return Err(Error::invalid(format!("invalid node name '{}'", desc.name)));
        }
        let parent_path = &self.nodes[parent.0 as usize].path;
        let path = if parent_path == "/" {
            format!("/{}", desc.name)
        } else {
            format!("{}/{}", parent_path, desc.name)
        };
        if self.by_path.contains_key(&path) {
            return Err(Error::invalid(format!("duplicate node path '{}'", path)));
        }

        let times = desc.schema.frame_times();
        let node_range = match (times.first(), times.last()) {
            (Some(&first), Some(&last)) => Some((first, last)),
            _ => None,
        };
        if let Some((s, e)) = node_range {
            *range = Some(match *range {
                Some((rs, re)) => (rs.min(s), re.max(e)),
                None => (s, e),
            });
        }

        let (data, variance) = match &desc.schema {
            SchemaDesc::Group => (SchemaData::None, TopologyVariance::Constant),
            SchemaDesc::Xform { frames } => (SchemaData::Xform(frames.clone()), TopologyVariance::Constant),
            SchemaDesc::Mesh(mesh) => {
                validate_mesh(&path, mesh)?;
                (SchemaData::Mesh(mesh.clone()), mesh.resolved_variance())
            }
            SchemaDesc::Camera { frames } => (SchemaData::Camera(frames.clone()), TopologyVariance::Constant),
            SchemaDesc::Points { frames } => (
                SchemaData::Points(frames.iter().cloned().map(Arc::new).collect()),
                TopologyVariance::Constant,
            ),
        };

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeInfo {
            id,
            name: desc.name.clone(),
            path: path.clone(),
            parent: Some(parent),
            children: Vec::new(),
            kind: desc.schema.kind(),
            instance_source: desc.instance_of.clone(),
            time_range: node_range,
            constant: times.len() <= 1,
            topology_variance: variance,
        });
        self.data.push(data);
        self.by_path.insert(path, id);
        self.nodes[parent.0 as usize].children.push(id);

        for child in &desc.children {
            self.add_node(id, child, range)?;
        }
        Ok(())
    }
}

fn validate_mesh(path: &str, mesh: &MeshDesc) -> Result<()> {
    for frame in &mesh.frames {
        let total: u64 = frame.face_counts.iter().map(|&c| c as u64).sum();
        if total != frame.face_indices.len() as u64 {
            return Err(Error::invalid(format!(
                "{}: face counts sum to {} but {} face indices given",
                path,
                total,
                frame.face_indices.len()
            )));
        }
        if let Some(bad) = frame.face_indices.iter().find(|&&i| i as usize >= frame.positions.len()) {
            return Err(Error::invalid(format!(
                "{}: face index {} out of range ({} positions)",
                path,
                bad,
                frame.positions.len()
            )));
        }
    }
    Ok(())
}

/// Index of the last frame at or before `time`, or the first frame.
fn floor_frame<T>(frames: &[T], time: Chrono, frame_time: impl Fn(&T) -> Chrono) -> Option<&T> {
    if frames.is_empty() {
        return None;
    }
    let idx = frames.partition_point(|f| frame_time(f) <= time);
    frames.get(idx.saturating_sub(1))
}

fn mirror_x(v: Vec3, swap: bool) -> Vec3 {
    if swap {
        Vec3::new(-v.x, v.y, v.z)
    } else {
        v
    }
}

impl SceneReader for MemoryReader {
    fn time_range(&self) -> (Chrono, Chrono) {
        self.time_range
    }

    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(id.0 as usize)
    }

    fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    fn sample(&self, id: NodeId, time: Chrono, config: &ReaderConfig) -> Result<Sample> {
        let info = self
            .node(id)
            .ok_or_else(|| Error::NodeNotFound(format!("#{}", id.0)))?;
        let no_frames = || Error::other(format!("{}: no samples", info.path));
        let swap = config.swap_handedness;
        let data_id = self.instance_source(id).unwrap_or(id);

        match &self.data[data_id.0 as usize] {
            SchemaData::None => Err(Error::KindMismatch {
                path: info.path.clone(),
                expected: "sampled node".into(),
                actual: info.kind.to_string(),
            }),
            SchemaData::Xform(frames) => {
                let f = floor_frame(frames, time, |f| f.time).ok_or_else(no_frames)?;
                let [x, y, z, w] = f.rotation;
                let rotation = if swap {
                    // Mirror across the YZ plane: axis.x flips and the angle negates.
                    Quat::from_xyzw(x, -y, -z, w)
                } else {
                    Quat::from_xyzw(x, y, z, w)
                };
                Ok(Sample::Xform(XformData {
                    translation: mirror_x(Vec3::from(f.translation), swap),
                    rotation: rotation.normalize(),
                    scale: Vec3::from(f.scale),
                    inherits: f.inherits,
                }))
            }
            SchemaData::Camera(frames) => {
                let f = floor_frame(frames, time, |f| f.time).ok_or_else(no_frames)?;
                // A zero ratio asks for the camera's own aperture.
                let aspect_ratio = if config.aspect_ratio > 0.0 {
                    config.aspect_ratio
                } else {
                    f.aperture_aspect_ratio.unwrap_or(1.0)
                };
                Ok(Sample::Camera(CameraData {
                    field_of_view: f.field_of_view,
                    near_clipping_plane: f.near_clipping_plane,
                    far_clipping_plane: f.far_clipping_plane,
                    focus_distance: f.focus_distance,
                    focal_length: f.focal_length,
                    aspect_ratio,
                }))
            }
            SchemaData::Points(frames) => {
                let f = floor_frame(frames, time, |f| f.time).ok_or_else(no_frames)?;
                Ok(Sample::Points(Box::new(MemoryPointsSample {
                    frame: Arc::clone(f),
                    swap_handedness: swap,
                })))
            }
            SchemaData::Mesh(mesh) => {
                let f = floor_frame(&mesh.frames, time, |f| f.time).ok_or_else(no_frames)?;
                Ok(Sample::Mesh(Box::new(MemoryMeshSample::build(
                    f,
                    config,
                    self.max_split_vertices,
                    info.topology_variance,
                ))))
            }
        }
    }
}

// ============================================================================
// Points
// ============================================================================

#[derive(Debug)]
struct MemoryPointsSample {
    frame: Arc<PointsFrame>,
    swap_handedness: bool,
}

impl PointsSample for MemoryPointsSample {
    fn count(&self) -> usize {
        self.frame.positions.len()
    }

    fn summary(&self) -> PointsSampleSummary {
        PointsSampleSummary {
            has_velocities: self.frame.velocities.is_some(),
            has_ids: self.frame.ids.is_some(),
        }
    }

    fn fill(&self, positions: &mut [Vec3], velocities: Option<&mut [Vec3]>, ids: Option<&mut [u64]>) {
        let swap = self.swap_handedness;
        for (dst, src) in positions.iter_mut().zip(&self.frame.positions) {
            *dst = mirror_x(Vec3::from(*src), swap);
        }
        if let (Some(dst), Some(src)) = (velocities, &self.frame.velocities) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = mirror_x(Vec3::from(*s), swap);
            }
        }
        if let (Some(dst), Some(src)) = (ids, &self.frame.ids) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = *s;
            }
        }
    }
}

// ============================================================================
// Mesh
// ============================================================================

/// One polygon of the source mesh.
#[derive(Clone, Copy, Debug)]
struct Face {
    index: usize,
    /// Offset of the first corner in the face-vertex arrays.
    first: usize,
    count: usize,
}

#[derive(Debug, Default)]
struct SplitData {
    faces: Vec<Face>,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    tangents: Vec<Vec4>,
    /// `(face index, local triangle)` in face order.
    triangles: Vec<(usize, [u32; 3])>,
}

#[derive(Debug)]
struct MemoryMeshSample {
    splits: Vec<SplitData>,
    summary: MeshSampleSummary,
    /// UV tile of each face, when partitioning per tile.
    face_tiles: Vec<(i32, i32)>,
    face_count: usize,
    submesh_triangles: Vec<Vec<[u32; 3]>>,
    split_submesh_counts: Vec<usize>,
}

/// Look up a per-vertex or per-face-vertex attribute for one corner.
fn corner_value<T: Copy>(values: &[T], vertex: usize, corner: usize, vertex_count: usize, corner_count: usize) -> Option<T> {
    if values.len() == corner_count {
        values.get(corner).copied()
    } else if values.len() == vertex_count {
        values.get(vertex).copied()
    } else {
        None
    }
}

/// Flat normal per face from its first three corners.
fn compute_face_normals(frame: &MeshFrame) -> Vec<Vec3> {
    let mut normals = Vec::with_capacity(frame.face_counts.len());
    let mut idx = 0usize;

    for &count in &frame.face_counts {
        let count = count as usize;
        let normal = if count >= 3 {
            let p = |k: usize| Vec3::from(frame.positions[frame.face_indices[idx + k] as usize]);
            let (v0, v1, v2) = (p(0), p(1), p(2));
            (v1 - v0).cross(v2 - v0).normalize_or_zero()
        } else {
            Vec3::Y
        };
        normals.push(normal);
        idx += count;
    }

    normals
}

impl MemoryMeshSample {
    fn build(frame: &MeshFrame, config: &ReaderConfig, max_split_vertices: usize, variance: TopologyVariance) -> Self {
        let vertex_count = frame.positions.len();
        let corner_count = frame.face_indices.len();
        let swap = config.swap_handedness;

        let file_normals = frame
            .normals
            .as_ref()
            .filter(|n| n.len() == vertex_count || n.len() == corner_count);
        let uvs = frame
            .uvs
            .as_ref()
            .filter(|u| u.len() == vertex_count || u.len() == corner_count);

        let face_normals = match (config.normals_mode, file_normals) {
            (NormalsMode::AlwaysCompute, _) | (NormalsMode::ComputeIfMissing, None) => Some(compute_face_normals(frame)),
            _ => None,
        };
        let use_file_normals = matches!(
            config.normals_mode,
            NormalsMode::ReadFromFile | NormalsMode::ComputeIfMissing
        ) && file_normals.is_some();
        let has_normals = use_file_normals || face_normals.is_some();
        let has_uvs = uvs.is_some();
        let has_tangents = config.tangents_mode != TangentsMode::None && has_uvs && has_normals;

        // Partition faces into splits that respect the vertex budget.
        let mut faces_per_split: Vec<Vec<Face>> = vec![Vec::new()];
        let mut split_vertices = 0usize;
        let mut first = 0usize;
        for (index, &count) in frame.face_counts.iter().enumerate() {
            let count = count as usize;
            if count >= 3 {
                if split_vertices + count > max_split_vertices && split_vertices > 0 {
                    faces_per_split.push(Vec::new());
                    split_vertices = 0;
                }
                if let Some(current) = faces_per_split.last_mut() {
                    current.push(Face { index, first, count });
                }
                split_vertices += count;
            }
            first += count;
        }
        if faces_per_split.len() > 1 && faces_per_split.last().is_some_and(|f| f.is_empty()) {
            faces_per_split.pop();
        }

        let mut face_tiles = vec![(0, 0); frame.face_counts.len()];
        let splits = faces_per_split
            .into_iter()
            .map(|faces| {
                let mut split = SplitData::default();
                for face in &faces {
                    let base = split.positions.len() as u32;
                    for k in 0..face.count {
                        let corner = face.first + k;
                        let vertex = frame.face_indices[corner] as usize;
                        split
                            .positions
                            .push(mirror_x(Vec3::from(frame.positions[vertex]), swap));
                        if has_normals {
                            let n = match (&face_normals, file_normals) {
                                (Some(computed), _) => computed[face.index],
                                (None, Some(file)) => corner_value(file, vertex, corner, vertex_count, corner_count)
                                    .map(Vec3::from)
                                    .unwrap_or(Vec3::Y),
                                (None, None) => Vec3::Y,
                            };
                            split.normals.push(mirror_x(n.normalize_or_zero(), swap));
                        }
                        if let Some(uvs) = uvs {
                            let uv = corner_value(uvs, vertex, corner, vertex_count, corner_count)
                                .map(Vec2::from)
                                .unwrap_or(Vec2::ZERO);
                            if k == 0 {
                                face_tiles[face.index] = (uv.x.floor() as i32, uv.y.floor() as i32);
                            }
                            split.uvs.push(uv);
                        }
                    }
                    // Fan triangulation: v0, v1, v2, then v0, v2, v3, etc.
                    for i in 1..face.count as u32 - 1 {
                        let tri = if config.swap_face_winding {
                            [base, base + i + 1, base + i]
                        } else {
                            [base, base + i, base + i + 1]
                        };
                        split.triangles.push((face.index, tri));
                    }
                }
                if has_tangents {
                    split.tangents = compute_tangents(&split);
                }
                split.faces = faces;
                split
            })
            .collect::<Vec<_>>();

        let summary = MeshSampleSummary {
            split_count: splits.len(),
            has_normals,
            has_uvs,
            has_tangents,
            has_velocities: frame.velocities.is_some(),
            topology_changed: variance == TopologyVariance::Heterogeneous,
        };

        if !(config.submesh_per_uv_tile && has_uvs) {
            face_tiles.iter_mut().for_each(|t| *t = (0, 0));
        }

        Self {
            splits,
            summary,
            face_tiles,
            face_count: frame.face_counts.len(),
            submesh_triangles: Vec::new(),
            split_submesh_counts: Vec::new(),
        }
    }
}

/// Per-vertex tangents from UV gradients, orthogonalized against the normal.
fn compute_tangents(split: &SplitData) -> Vec<Vec4> {
    let mut accum = vec![Vec3::ZERO; split.positions.len()];
    for (_, [a, b, c]) in &split.triangles {
        let (a, b, c) = (*a as usize, *b as usize, *c as usize);
        let e1 = split.positions[b] - split.positions[a];
        let e2 = split.positions[c] - split.positions[a];
        let d1 = split.uvs[b] - split.uvs[a];
        let d2 = split.uvs[c] - split.uvs[a];
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let t = (e1 * d2.y - e2 * d1.y) / det;
        for v in [a, b, c] {
            accum[v] += t;
        }
    }
    accum
        .iter()
        .zip(&split.normals)
        .map(|(t, n)| {
            let ortho = (*t - *n * n.dot(*t)).normalize_or_zero();
            let ortho = if ortho == Vec3::ZERO { n.any_orthonormal_vector() } else { ortho };
            ortho.extend(1.0)
        })
        .collect()
}

impl MeshSample for MemoryMeshSample {
    fn summary(&self) -> MeshSampleSummary {
        self.summary
    }

    fn vertex_count(&self, split: usize) -> usize {
        self.splits.get(split).map_or(0, |s| s.positions.len())
    }

    fn fill_vertices(&self, split: usize, out: VertexBuffers<'_>) -> Bounds {
        let Some(data) = self.splits.get(split) else {
            return Bounds::default();
        };
        for (d, s) in out.positions.iter_mut().zip(&data.positions) {
            *d = *s;
        }
        if let Some(normals) = out.normals {
            for (d, s) in normals.iter_mut().zip(&data.normals) {
                *d = *s;
            }
        }
        if let Some(uvs) = out.uvs {
            for (d, s) in uvs.iter_mut().zip(&data.uvs) {
                *d = *s;
            }
        }
        if let Some(tangents) = out.tangents {
            for (d, s) in tangents.iter_mut().zip(&data.tangents) {
                *d = *s;
            }
        }
        Bounds::from_points(&data.positions)
    }

    fn prepare_submeshes(&mut self, facesets: &Facesets) -> Vec<SubmeshSummary> {
        // First faceset listing a face wins. Faces no set lists go to the
        // first empty (whole-object) set, if any.
        let whole_object = facesets.iter().position(<[u32]>::is_empty);
        let mut face_sets: Vec<Option<usize>> = vec![None; self.face_count];
        for (set, faces) in facesets.iter().enumerate() {
            for &face in faces {
                if let Some(slot) = face_sets.get_mut(face as usize) {
                    slot.get_or_insert(set);
                }
            }
        }
        if let Some(set) = whole_object {
            for slot in face_sets.iter_mut().filter(|s| s.is_none()) {
                *slot = Some(set);
            }
        }

        let mut summaries = Vec::new();
        self.submesh_triangles.clear();
        self.split_submesh_counts.clear();

        for (split_index, split) in self.splits.iter().enumerate() {
            // Unassigned faces sort after every faceset.
            let mut groups: BTreeMap<(usize, (i32, i32)), Vec<[u32; 3]>> = BTreeMap::new();
            for (face, tri) in &split.triangles {
                let set = face_sets[*face].unwrap_or(usize::MAX);
                groups.entry((set, self.face_tiles[*face])).or_default().push(*tri);
            }
            self.split_submesh_counts.push(groups.len());

            for (split_submesh_index, ((set, _), triangles)) in groups.into_iter().enumerate() {
                summaries.push(SubmeshSummary {
                    index: self.submesh_triangles.len(),
                    split_index,
                    split_submesh_index,
                    faceset_index: (set != usize::MAX).then_some(set),
                    triangle_count: triangles.len(),
                });
                self.submesh_triangles.push(triangles);
            }
        }
        summaries
    }

    fn split_submesh_count(&self, split: usize) -> usize {
        self.split_submesh_counts.get(split).copied().unwrap_or(0)
    }

    fn fill_submesh_indices(&self, submesh: &SubmeshSummary, out: &mut [u32]) {
        let Some(triangles) = self.submesh_triangles.get(submesh.index) else {
            return;
        };
        for (d, s) in out.iter_mut().zip(triangles.iter().flatten()) {
            *d = *s;
        }
    }
}

// ============================================================================
// Resolvers
// ============================================================================

/// Resolves paths relative to an asset directory holding JSON scenes.
#[derive(Clone, Debug)]
pub struct AssetResolver {
    root: PathBuf,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceResolver for AssetResolver {
    fn resolve(&self, path: &Path) -> Result<Arc<dyn SceneReader>> {
        let full = self.root.join(path);
        if !full.is_file() {
            return Err(Error::SourceNotFound(full));
        }
        Ok(Arc::new(MemoryReader::load(&full)?))
    }
}

/// Serves readers registered by path; entries can be swapped at runtime.
#[derive(Default)]
pub struct MemoryResolver {
    scenes: RwLock<HashMap<PathBuf, Arc<MemoryReader>>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, reader: MemoryReader) {
        self.scenes.write().insert(path.into(), Arc::new(reader));
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.scenes.write().remove(path.as_ref()).is_some()
    }
}

impl SourceResolver for MemoryResolver {
    fn resolve(&self, path: &Path) -> Result<Arc<dyn SceneReader>> {
        let reader = self
            .scenes
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::SourceNotFound(path.to_path_buf()))?;
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(time: Chrono, z: f32) -> MeshFrame {
        MeshFrame::new(
            time,
            vec![[0.0, 0.0, z], [1.0, 0.0, z], [1.0, 1.0, z], [0.0, 1.0, z]],
            vec![4],
            vec![0, 1, 2, 3],
        )
    }

    /// Two quads sharing an edge.
    fn strip() -> MeshFrame {
        MeshFrame::new(
            0.0,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [2.0, 0.0, 0.0],
                [2.0, 1.0, 0.0],
            ],
            vec![4, 4],
            vec![0, 1, 2, 3, 1, 4, 5, 2],
        )
    }

    fn mesh_sample(reader: &MemoryReader, path: &str, time: Chrono, config: &ReaderConfig) -> Box<dyn MeshSample> {
        match reader.sample(reader.find(path).unwrap(), time, config).unwrap() {
            Sample::Mesh(m) => m,
            other => panic!("expected mesh, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_tree_paths() {
        let desc = SceneDesc::new(vec![NodeDesc::group("root").with_children(vec![
            NodeDesc::xform("arm", vec![XformFrame::at(0.0, [1.0, 2.0, 3.0])]),
            NodeDesc::mesh("body", MeshDesc::new(vec![quad(0.0, 0.0)])),
        ])]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        assert_eq!(reader.node_count(), 4);
        let arm = reader.find("/root/arm").unwrap();
        let info = reader.node(arm).unwrap();
        assert_eq!(info.kind, NodeKind::Xform);
        assert_eq!(info.parent, reader.find("/root"));
        assert_eq!(reader.children(reader.find("/root").unwrap()).len(), 2);
    }

    #[test]
    fn test_rejects_duplicate_and_bad_names() {
        let desc = SceneDesc::new(vec![NodeDesc::group("a"), NodeDesc::group("a")]);
        assert!(MemoryReader::from_desc(&desc).is_err());
        let desc = SceneDesc::new(vec![NodeDesc::group("a/b")]);
        assert!(MemoryReader::from_desc(&desc).is_err());
    }

    #[test]
    fn test_rejects_bad_face_indices() {
        let mut frame = quad(0.0, 0.0);
        frame.face_indices[3] = 9;
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![frame]))]);
        assert!(matches!(MemoryReader::from_desc(&desc), Err(Error::InvalidScene(_))));
    }

    #[test]
    fn test_floor_sample_selection() {
        let desc = SceneDesc::new(vec![NodeDesc::xform(
            "x",
            vec![
                XformFrame::at(0.0, [0.0, 0.0, 0.0]),
                XformFrame::at(1.0, [1.0, 0.0, 0.0]),
                XformFrame::at(2.0, [2.0, 0.0, 0.0]),
            ],
        )]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        assert_eq!(reader.time_range(), (0.0, 2.0));
        let id = reader.find("/x").unwrap();
        let tx = |t| match reader.sample(id, t, &ReaderConfig::default()).unwrap() {
            Sample::Xform(d) => d.translation.x,
            _ => unreachable!(),
        };
        assert_eq!(tx(-1.0), 0.0);
        assert_eq!(tx(1.5), 1.0);
        assert_eq!(tx(2.0), 2.0);
        assert_eq!(tx(9.0), 2.0);
    }

    #[test]
    fn test_swap_handedness_xform() {
        let mut frame = XformFrame::at(0.0, [1.0, 2.0, 3.0]);
        let q = Quat::from_rotation_y(0.5);
        frame.rotation = [q.x, q.y, q.z, q.w];
        let desc = SceneDesc::new(vec![NodeDesc::xform("x", vec![frame])]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let config = ReaderConfig {
            swap_handedness: true,
            ..Default::default()
        };
        let Sample::Xform(data) = reader.sample(reader.find("/x").unwrap(), 0.0, &config).unwrap() else {
            panic!("expected xform");
        };
        assert_eq!(data.translation, Vec3::new(-1.0, 2.0, 3.0));
        assert!(data.rotation.abs_diff_eq(Quat::from_rotation_y(-0.5), 1e-6));
    }

    #[test]
    fn test_mesh_triangulation_and_normals() {
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![quad(0.0, 0.0)]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let mut sample = mesh_sample(&reader, "/m", 0.0, &ReaderConfig::default());
        let summary = sample.summary();
        assert_eq!(summary.split_count, 1);
        assert!(summary.has_normals);
        assert!(!summary.has_uvs);
        assert!(!summary.topology_changed);

        let n = sample.vertex_count(0);
        assert_eq!(n, 4);
        let mut positions = vec![Vec3::ZERO; n];
        let mut normals = vec![Vec3::ZERO; n];
        let bounds = sample.fill_vertices(
            0,
            VertexBuffers {
                positions: &mut positions,
                normals: Some(&mut normals),
                uvs: None,
                tangents: None,
            },
        );
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
        assert!(normals.iter().all(|n| *n == Vec3::Z));

        let submeshes = sample.prepare_submeshes(&Facesets::default());
        assert_eq!(submeshes.len(), 1);
        assert_eq!(submeshes[0].triangle_count, 2);
        assert_eq!(submeshes[0].faceset_index, None);
        let mut indices = vec![0u32; 6];
        sample.fill_submesh_indices(&submeshes[0], &mut indices);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_normals_modes() {
        let mut frame = quad(0.0, 0.0);
        frame.normals = Some(vec![[0.0, 0.0, -1.0]; 4]);
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![frame]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();

        let first_normal = |mode| {
            let config = ReaderConfig {
                normals_mode: mode,
                ..Default::default()
            };
            let sample = mesh_sample(&reader, "/m", 0.0, &config);
            if !sample.summary().has_normals {
                return None;
            }
            let mut p = vec![Vec3::ZERO; 4];
            let mut n = vec![Vec3::ZERO; 4];
            sample.fill_vertices(
                0,
                VertexBuffers {
                    positions: &mut p,
                    normals: Some(&mut n),
                    uvs: None,
                    tangents: None,
                },
            );
            Some(n[0])
        };
        assert_eq!(first_normal(NormalsMode::ReadFromFile), Some(Vec3::NEG_Z));
        assert_eq!(first_normal(NormalsMode::ComputeIfMissing), Some(Vec3::NEG_Z));
        assert_eq!(first_normal(NormalsMode::AlwaysCompute), Some(Vec3::Z));
        assert_eq!(first_normal(NormalsMode::Ignore), None);
    }

    #[test]
    fn test_face_winding_swap() {
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![quad(0.0, 0.0)]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let config = ReaderConfig {
            swap_face_winding: true,
            ..Default::default()
        };
        let mut sample = mesh_sample(&reader, "/m", 0.0, &config);
        let submeshes = sample.prepare_submeshes(&Facesets::default());
        let mut indices = vec![0u32; 6];
        sample.fill_submesh_indices(&submeshes[0], &mut indices);
        assert_eq!(indices, vec![0, 2, 1, 0, 3, 2]);
    }

    #[test]
    fn test_splits_respect_vertex_budget() {
        let mut desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![strip()]))]);
        desc.max_split_vertices = 4;
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let mut sample = mesh_sample(&reader, "/m", 0.0, &ReaderConfig::default());
        assert_eq!(sample.summary().split_count, 2);
        assert_eq!(sample.vertex_count(0), 4);
        assert_eq!(sample.vertex_count(1), 4);
        assert_eq!(sample.vertex_count(2), 0);

        let submeshes = sample.prepare_submeshes(&Facesets::default());
        assert_eq!(submeshes.len(), 2);
        assert_eq!(submeshes[1].split_index, 1);
        assert_eq!(submeshes[1].split_submesh_index, 0);
        assert_eq!(sample.split_submesh_count(0), 1);
    }

    #[test]
    fn test_submeshes_by_faceset() {
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![strip()]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let mut sample = mesh_sample(&reader, "/m", 0.0, &ReaderConfig::default());

        let facesets = Facesets::from_sets(&[vec![1]]);
        let submeshes = sample.prepare_submeshes(&facesets);
        assert_eq!(submeshes.len(), 2);
        assert_eq!(submeshes[0].faceset_index, Some(0));
        assert_eq!(submeshes[1].faceset_index, None);
        assert_eq!(sample.split_submesh_count(0), 2);

        let mut indices = vec![0u32; 6];
        sample.fill_submesh_indices(&submeshes[0], &mut indices);
        // Second face starts at local vertex 4.
        assert_eq!(indices, vec![4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_whole_object_faceset_takes_unassigned_faces() {
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![strip()]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let mut sample = mesh_sample(&reader, "/m", 0.0, &ReaderConfig::default());

        let facesets = Facesets::from_sets(&[vec![1], vec![]]);
        let submeshes = sample.prepare_submeshes(&facesets);
        assert_eq!(submeshes.len(), 2);
        assert_eq!(submeshes[0].faceset_index, Some(0));
        assert_eq!(submeshes[1].faceset_index, Some(1));
    }

    #[test]
    fn test_submeshes_per_uv_tile() {
        let mut frame = strip();
        // Corner-indexed so face 1 starts in tile (1, 0).
        frame.uvs = Some(vec![
            [0.1, 0.1], [0.9, 0.1], [0.9, 0.9], [0.1, 0.9],
            [1.1, 0.1], [1.9, 0.1], [1.9, 0.9], [1.1, 0.9],
        ]);
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![frame]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();

        let mut sample = mesh_sample(&reader, "/m", 0.0, &ReaderConfig::default());
        assert_eq!(sample.prepare_submeshes(&Facesets::default()).len(), 2);

        let config = ReaderConfig {
            submesh_per_uv_tile: false,
            ..Default::default()
        };
        let mut sample = mesh_sample(&reader, "/m", 0.0, &config);
        assert_eq!(sample.prepare_submeshes(&Facesets::default()).len(), 1);
    }

    #[test]
    fn test_tangents_need_uvs() {
        let mut frame = quad(0.0, 0.0);
        let config = ReaderConfig {
            tangents_mode: TangentsMode::Smooth,
            ..Default::default()
        };
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![frame.clone()]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        assert!(!mesh_sample(&reader, "/m", 0.0, &config).summary().has_tangents);

        frame.uvs = Some(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        let desc = SceneDesc::new(vec![NodeDesc::mesh("m", MeshDesc::new(vec![frame]))]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let sample = mesh_sample(&reader, "/m", 0.0, &config);
        assert!(sample.summary().has_tangents);
        let mut p = vec![Vec3::ZERO; 4];
        let mut t = vec![Vec4::ZERO; 4];
        sample.fill_vertices(
            0,
            VertexBuffers {
                positions: &mut p,
                normals: None,
                uvs: None,
                tangents: Some(&mut t),
            },
        );
        assert!(t.iter().all(|t| t.abs_diff_eq(Vec4::new(1.0, 0.0, 0.0, 1.0), 1e-6)));
    }

    #[test]
    fn test_variance_inference() {
        let constant = MeshDesc::new(vec![quad(0.0, 0.0)]);
        assert_eq!(constant.resolved_variance(), TopologyVariance::Constant);
        let moving = MeshDesc::new(vec![quad(0.0, 0.0), quad(1.0, 1.0)]);
        assert_eq!(moving.resolved_variance(), TopologyVariance::Homogeneous);
        let changing = MeshDesc::new(vec![quad(0.0, 0.0), strip()]);
        assert_eq!(changing.resolved_variance(), TopologyVariance::Heterogeneous);
    }

    #[test]
    fn test_points_sample() {
        let mut frame = PointsFrame::new(0.0, vec![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        frame.ids = Some(vec![10, 11]);
        let desc = SceneDesc::new(vec![NodeDesc::points("p", vec![frame])]);
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let Sample::Points(points) = reader
            .sample(reader.find("/p").unwrap(), 0.0, &ReaderConfig::default())
            .unwrap()
        else {
            panic!("expected points");
        };
        assert_eq!(points.count(), 2);
        assert!(points.summary().has_ids);
        assert!(!points.summary().has_velocities);
        let mut p = vec![Vec3::ZERO; 2];
        let mut ids = vec![0u64; 2];
        points.fill(&mut p, None, Some(&mut ids));
        assert_eq!(p[1], Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn test_scene_json() {
        let json = r#"{
            "nodes": [
                { "name": "cam", "kind": "camera",
                  "frames": [ { "time": 0.0, "field_of_view": 45.0,
                                "near_clipping_plane": 0.1, "far_clipping_plane": 100.0 } ] },
                { "name": "copy", "kind": "group", "instance_of": "/cam" }
            ]
        }"#;
        let desc: SceneDesc = serde_json::from_str(json).unwrap();
        let reader = MemoryReader::from_desc(&desc).unwrap();
        let copy = reader.find("/copy").unwrap();
        assert_eq!(reader.instance_source(copy), reader.find("/cam"));
        assert_eq!(reader.node(reader.find("/cam").unwrap()).unwrap().kind, NodeKind::Camera);
        assert_eq!(reader.node(copy).unwrap().kind, NodeKind::Camera);
        assert!(matches!(
            reader.sample(copy, 0.0, &ReaderConfig::default()),
            Ok(Sample::Camera(_))
        ));
    }

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new();
        resolver.insert("a.json", MemoryReader::from_desc(&SceneDesc::default()).unwrap());
        assert!(resolver.resolve(Path::new("a.json")).is_ok());
        assert!(matches!(
            resolver.resolve(Path::new("b.json")),
            Err(Error::SourceNotFound(_))
        ));
        assert!(resolver.remove("a.json"));
        assert!(resolver.resolve(Path::new("a.json")).is_err());
    }

    #[test]
    fn test_asset_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let desc = SceneDesc::new(vec![NodeDesc::group("g")]);
        std::fs::write(dir.path().join("scene.json"), serde_json::to_string(&desc).unwrap()).unwrap();
        let resolver = AssetResolver::new(dir.path());
        let reader = resolver.resolve(Path::new("scene.json")).unwrap();
        assert!(reader.find("/g").is_some());
        assert!(resolver.resolve(Path::new("missing.json")).is_err());
    }
}
