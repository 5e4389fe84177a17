//! Node proxies: one per source node bound to a host object.
//!
//! A proxy moves through `Unbound -> Clean <-> Dirty -> Invalidated`.
//! Decoded samples are stored into the proxy's caches ([`NodeProxy::deliver`])
//! which marks it dirty; the main-thread apply pass consumes the caches into
//! the host ([`NodeProxy::apply`]) and marks it clean. Invalidation is
//! terminal.

pub mod camera;
pub mod mesh;
pub mod points;
pub mod xform;

pub use camera::CameraNode;
pub use mesh::{MeshNode, Split, SplitLayout, Submesh};
pub use points::PointsNode;
pub use xform::XformNode;

use std::collections::HashSet;

use crate::host::{ObjectId, SceneHost};
use crate::material::FacesetCache;
use crate::reader::{NodeId, NodeInfo, NodeKind, Sample};
use crate::util::{Chrono, Error, Result};

/// Sample-delivery registrations of the bound proxies.
///
/// Results for nodes without a registration are dropped, which keeps late
/// decodes for destroyed nodes from reaching anything.
#[derive(Debug, Default)]
pub struct Registry {
    registered: HashSet<NodeId>,
    stats: RegistryStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub attached: usize,
    pub detached: usize,
    /// Registrations dropped by a destroy notification from the reader.
    pub released: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, node: NodeId) {
        if self.registered.insert(node) {
            self.stats.attached += 1;
        }
    }

    /// Detach a registration; false when there was none.
    pub fn detach(&mut self, node: NodeId) -> bool {
        let removed = self.registered.remove(&node);
        if removed {
            self.stats.detached += 1;
        }
        removed
    }

    /// The reader already dropped the node; forget it without detaching.
    pub fn release(&mut self, node: NodeId) {
        if self.registered.remove(&node) {
            self.stats.released += 1;
        }
    }

    pub fn is_registered(&self, node: NodeId) -> bool {
        self.registered.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyState {
    Unbound,
    Clean,
    Dirty,
    Invalidated,
}

/// Link from an instance to the node it mirrors. Not owning: the source is
/// looked up by path every time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceLink {
    pub source_path: String,
}

/// Kind-specific cached state.
#[derive(Debug)]
pub enum NodeData {
    Group,
    Xform(XformNode),
    Mesh(Box<MeshNode>),
    Camera(CameraNode),
    Points(PointsNode),
}

impl NodeData {
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Group => Self::Group,
            NodeKind::Xform => Self::Xform(XformNode::default()),
            NodeKind::Mesh => Self::Mesh(Box::default()),
            NodeKind::Camera => Self::Camera(CameraNode::default()),
            NodeKind::Points => Self::Points(PointsNode::default()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Group => NodeKind::Group,
            Self::Xform(_) => NodeKind::Xform,
            Self::Mesh(_) => NodeKind::Mesh,
            Self::Camera(_) => NodeKind::Camera,
            Self::Points(_) => NodeKind::Points,
        }
    }
}

/// Live binding of one source node to one host object.
#[derive(Debug)]
pub struct NodeProxy {
    pub path: String,
    pub name: String,
    pub object: ObjectId,
    handle: Option<NodeId>,
    instance: Option<InstanceLink>,
    /// Declared instance source, resolved or not.
    instance_source: Option<String>,
    dirty: bool,
    /// A sample was delivered since the last bind.
    sampled: bool,
    invalidated: bool,
    constant: bool,
    time_range: Option<(Chrono, Chrono)>,
    pub data: NodeData,
}

impl NodeProxy {
    pub fn new(info: &NodeInfo, object: ObjectId) -> Self {
        let mut data = NodeData::for_kind(info.kind);
        if let NodeData::Mesh(mesh) = &mut data {
            mesh.set_variance(info.topology_variance);
        }
        Self {
            path: info.path.clone(),
            name: info.name.clone(),
            object,
            handle: None,
            instance: None,
            instance_source: info.instance_source.clone(),
            dirty: false,
            sampled: false,
            invalidated: false,
            constant: info.constant,
            time_range: info.time_range,
            data,
        }
    }

    pub fn state(&self) -> ProxyState {
        if self.invalidated {
            ProxyState::Invalidated
        } else if self.handle.is_none() {
            ProxyState::Unbound
        } else if self.dirty {
            ProxyState::Dirty
        } else {
            ProxyState::Clean
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn handle(&self) -> Option<NodeId> {
        self.handle
    }

    /// Bound and not invalidated.
    pub fn is_valid(&self) -> bool {
        self.handle.is_some() && !self.invalidated
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn time_range(&self) -> Option<(Chrono, Chrono)> {
        self.time_range
    }

    /// Resolved instance link, if the node mirrors another.
    pub fn instance(&self) -> Option<&InstanceLink> {
        self.instance.as_ref()
    }

    pub fn is_instanced(&self) -> bool {
        self.instance_source.is_some()
    }

    /// Path the node declares as its instance source.
    pub fn instance_source(&self) -> Option<&str> {
        self.instance_source.as_deref()
    }

    pub fn has_sample(&self) -> bool {
        self.sampled
    }

    /// Bind to a reader node. Instances resolved to a source mirror it and
    /// take no sample registration; everything else registers for samples.
    pub fn bind(&mut self, handle: NodeId, instance: Option<InstanceLink>, registry: &mut Registry) -> Result<()> {
        if self.invalidated {
            return Err(Error::other(format!("{}: proxy was invalidated", self.path)));
        }
        self.handle = Some(handle);
        self.instance = instance;
        self.sampled = false;
        if self.instance.is_none() {
            registry.attach(handle);
        }
        if let NodeData::Mesh(mesh) = &mut self.data {
            mesh.reset();
        }
        if let NodeData::Xform(xform) = &mut self.data {
            xform.reset();
        }
        Ok(())
    }

    /// Drop the instance link and own the node's data from now on, as when
    /// the instance source went away.
    pub fn detach_instance(&mut self, registry: &mut Registry) {
        if self.instance.take().is_some() {
            if let Some(handle) = self.handle.filter(|_| !self.invalidated) {
                registry.attach(handle);
            }
            if let NodeData::Mesh(mesh) = &mut self.data {
                mesh.reset();
            }
            self.sampled = false;
        }
    }

    /// True when the proxy wants a sample this tick even if its source data
    /// is constant.
    pub fn needs_forced_update(&self, facesets: Option<&FacesetCache>) -> bool {
        match &self.data {
            NodeData::Mesh(mesh) => mesh.needs_forced_update(facesets),
            NodeData::Xform(xform) => xform.is_fresh(),
            NodeData::Camera(_) | NodeData::Points(_) | NodeData::Group => false,
        }
    }

    /// Store a decoded sample. Only touches the proxy's own caches.
    pub fn deliver(&mut self, sample: Sample, facesets: Option<&mut FacesetCache>) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        match (&mut self.data, sample) {
            (NodeData::Xform(node), Sample::Xform(data)) => node.store(data),
            (NodeData::Camera(node), Sample::Camera(data)) => node.store(data),
            (NodeData::Points(node), Sample::Points(data)) => node.store(data.as_ref()),
            (NodeData::Mesh(node), Sample::Mesh(data)) => node.store(data, facesets, &self.path)?,
            (data, sample) => {
                return Err(Error::KindMismatch {
                    path: self.path.clone(),
                    expected: data.kind().to_string(),
                    actual: sample.kind().to_string(),
                })
            }
        }
        self.dirty = true;
        self.sampled = true;
        Ok(())
    }

    /// Mirror a source mesh's host layout onto this instance.
    pub fn apply_instance(&mut self, host: &mut dyn SceneHost, source_object: ObjectId, layout: &[SplitLayout]) {
        if self.is_valid() && self.instance.is_some() {
            mesh::apply_instance(host, self.object, &self.name, source_object, layout);
        }
    }

    /// Push cached state into the host when dirty (or when the node asks for
    /// a re-apply on its own).
    pub fn apply(&mut self, host: &mut dyn SceneHost) {
        if !self.is_valid() {
            return;
        }
        let wants_apply = match &self.data {
            NodeData::Camera(camera) => self.dirty || camera.options_changed(),
            _ => self.dirty,
        };
        if !wants_apply {
            return;
        }
        match &mut self.data {
            NodeData::Group => {}
            NodeData::Xform(node) => node.apply(host, self.object),
            NodeData::Camera(node) => node.apply(host, self.object),
            NodeData::Points(node) => node.apply(host, self.object),
            NodeData::Mesh(node) => node.apply(host, self.object, &self.name, &self.path),
        }
        self.dirty = false;
    }

    /// Null the handle and drop the sample registration. With
    /// `handle_deleted` the reader already dropped the node, so nothing is
    /// detached. Safe to call more than once.
    pub fn invalidate(&mut self, registry: Option<&mut Registry>, handle_deleted: bool) {
        if let Some(handle) = self.handle.take() {
            if let Some(registry) = registry {
                if handle_deleted {
                    registry.release(handle);
                } else if self.instance.is_none() {
                    registry.detach(handle);
                }
            }
        }
        self.instance = None;
        self.dirty = false;
        self.invalidated = true;
    }
}
