//! Polygon mesh applier.
//!
//! A mesh node keeps one [`Split`] per reader split and one [`Submesh`] per
//! index partition. Samples are stored into the split caches; the topology
//! tracker decides whether submesh indices are re-derived and whether the
//! host mesh is cleared on the next apply.

use tracing::{debug, warn};

use crate::cache::{resize_attribute, VertexCache};
use crate::config::MeshOverrides;
use crate::host::{MaterialId, MeshId, ObjectId, SceneHost, Transform};
use crate::material::{split_host_name, FacesetCache, Facesets};
use crate::reader::{MeshSample, MeshSampleSummary, SubmeshSummary, TopologyVariance};
use crate::topology::{TopologyInput, TopologyTracker};
use crate::util::{Bounds, Error, Result};

/// One size-bounded partition of the mesh and the host object showing it.
#[derive(Clone, Debug)]
pub struct Split {
    pub cache: VertexCache,
    /// Host object; resolved lazily on the first apply.
    pub host: Option<ObjectId>,
    pub mesh: Option<MeshId>,
    /// Clear the host mesh before the next upload.
    pub clear: bool,
    pub submesh_count: usize,
    pub active: bool,
    pub bounds: Bounds,
}

impl Split {
    fn new() -> Self {
        Self {
            cache: VertexCache::default(),
            host: None,
            mesh: None,
            clear: true,
            submesh_count: 0,
            active: true,
            bounds: Bounds::default(),
        }
    }
}

/// Index buffer of one submesh, keyed by its global index.
#[derive(Clone, Debug, Default)]
pub struct Submesh {
    pub indices: Vec<u32>,
    pub faceset_index: Option<usize>,
    pub split_index: usize,
    /// Submesh slot within the split.
    pub index: usize,
    /// Indices changed and must be uploaded.
    pub update: bool,
}

/// Host-side layout of one split, enough for an instance to mirror it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitLayout {
    pub host: Option<ObjectId>,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct MeshNode {
    pub overrides: MeshOverrides,
    variance: TopologyVariance,
    topology: TopologyTracker,
    splits: Vec<Split>,
    submeshes: Vec<Submesh>,
    summary: MeshSampleSummary,
}

impl MeshNode {
    pub fn variance(&self) -> TopologyVariance {
        self.variance
    }

    pub fn set_variance(&mut self, variance: TopologyVariance) {
        self.variance = variance;
    }

    pub fn topology(&self) -> &TopologyTracker {
        &self.topology
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    /// Summary of the last stored sample.
    pub fn summary(&self) -> &MeshSampleSummary {
        &self.summary
    }

    pub fn split_layout(&self) -> Vec<SplitLayout> {
        self.splits
            .iter()
            .map(|s| SplitLayout {
                host: s.host,
                active: s.active,
            })
            .collect()
    }

    /// Force a full rebuild on the next sample.
    pub fn reset(&mut self) {
        self.topology.reset();
    }

    pub fn needs_forced_update(&self, facesets: Option<&FacesetCache>) -> bool {
        let dirty = facesets.is_some_and(FacesetCache::is_dirty);
        let has = facesets.is_some_and(|f| !f.is_empty());
        self.topology.needs_forced_update(dirty, has)
    }

    /// Multi-split and heterogeneous meshes show each split on a child object.
    fn uses_sub_objects(&self, split_count: usize) -> bool {
        self.variance == TopologyVariance::Heterogeneous || split_count > 1
    }

    fn update_splits(&mut self, split_count: usize) {
        let wanted = if self.uses_sub_objects(split_count) {
            split_count
        } else {
            1
        };
        for (i, split) in self.splits.iter_mut().enumerate() {
            split.active = i < split_count;
        }
        while self.splits.len() < wanted {
            self.splits.push(Split::new());
        }
    }

    pub(crate) fn store(
        &mut self,
        mut sample: Box<dyn MeshSample>,
        mut facesets: Option<&mut FacesetCache>,
        path: &str,
    ) -> Result<()> {
        let summary = sample.summary();
        let input = TopologyInput {
            reported: summary.topology_changed,
            split_count: summary.split_count,
            facesets_dirty: facesets.as_deref().is_some_and(FacesetCache::is_dirty),
            has_facesets: facesets.as_deref().is_some_and(|f| !f.is_empty()),
        };
        let changed = self.topology.evaluate(&input);

        // Submesh layout is derived before any cache is touched so that a
        // sample with a submesh on an unknown split is skipped as a whole.
        let layout = if changed {
            let empty = Facesets::default();
            let sets = facesets.as_deref().map_or(&empty, FacesetCache::facesets);
            let layout = sample.prepare_submeshes(sets);
            if let Some(bad) = layout.iter().find(|s| s.split_index >= summary.split_count) {
                let err = Error::InvalidSplit {
                    index: bad.split_index,
                    count: summary.split_count,
                };
                warn!(path, "{err}");
                return Ok(());
            }
            debug!(path, splits = summary.split_count, submeshes = layout.len(), "mesh topology changed");
            Some(layout)
        } else {
            None
        };

        self.update_splits(summary.split_count);
        for (s, split) in self.splits.iter_mut().enumerate().take(summary.split_count) {
            // Pending work accumulates until the next apply.
            split.clear |= changed;
            split.active = true;
            split.cache.prepare(sample.vertex_count(s), &summary);
            split.bounds = sample.fill_vertices(s, split.cache.buffers());
        }
        self.summary = summary;

        let Some(layout) = layout else {
            return Ok(());
        };

        let split_count = summary.split_count.min(self.splits.len());
        let counts: Vec<usize> = (0..split_count).map(|s| sample.split_submesh_count(s)).collect();
        for (split, &count) in self.splits.iter_mut().zip(&counts) {
            split.submesh_count = count;
        }

        self.submeshes.truncate(layout.len());
        for entry in &layout {
            if entry.index >= self.submeshes.len() {
                self.submeshes.push(Submesh::default());
            }
            let slot = entry.index.min(self.submeshes.len() - 1);
            let submesh = &mut self.submeshes[slot];
            fill_submesh(sample.as_ref(), entry, submesh);
            let vertex_count = self.splits[entry.split_index].cache.vertex_count();
            if let Some(&index) = submesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(Error::invalid(format!(
                    "{path}: submesh {} references vertex {index} of {vertex_count}",
                    entry.index
                )));
            }
        }

        self.topology.commit_rebuild(&input, &counts);
        if let Some(facesets) = facesets.as_deref_mut() {
            facesets.acknowledge();
        }
        Ok(())
    }

    /// Push the caches into the host. `name` is the node's object name, used
    /// to find split children.
    pub(crate) fn apply(&mut self, host: &mut dyn SceneHost, object: ObjectId, name: &str, path: &str) {
        let sub_objects = self.uses_sub_objects(self.summary.split_count);

        for (s, split) in self.splits.iter_mut().enumerate() {
            if !split.active {
                if let Some(split_host) = split.host {
                    host.set_active(split_host, false);
                }
                continue;
            }

            let split_host = match split.host {
                Some(id) if host.exists(id) => id,
                _ if sub_objects => find_or_create_split_host(host, object, name, s),
                _ => object,
            };
            split.host = Some(split_host);

            let mesh = match split.mesh {
                Some(mesh) => mesh,
                None => host.attach_mesh(split_host),
            };
            split.mesh = Some(mesh);

            if split.clear {
                host.clear_mesh(mesh);
            }
            host.upload_vertices(mesh, split.cache.vertices(split.bounds));

            if split.clear {
                host.set_submesh_count(mesh, split.submesh_count);
                resize_material_slots(host, split_host, split.submesh_count);
            }
            split.clear = false;
            host.set_active(split_host, true);
        }

        for submesh in self.submeshes.iter_mut().filter(|s| s.update) {
            match self.splits.get(submesh.split_index).and_then(|s| s.mesh) {
                Some(mesh) => host.set_submesh_indices(mesh, submesh.index, &submesh.indices),
                None => debug!(path, split = submesh.split_index, "submesh without mesh"),
            }
            submesh.update = false;
        }

        if !self.summary.has_normals && !self.summary.has_tangents {
            for split in self.splits.iter().take(self.summary.split_count) {
                if let Some(mesh) = split.mesh {
                    host.recalculate_normals(mesh);
                }
            }
        }
    }
}

fn fill_submesh(sample: &dyn MeshSample, entry: &SubmeshSummary, submesh: &mut Submesh) {
    submesh.faceset_index = entry.faceset_index;
    submesh.split_index = entry.split_index;
    submesh.index = entry.split_submesh_index;
    submesh.update = true;
    resize_attribute(&mut submesh.indices, 3 * entry.triangle_count, true);
    sample.fill_submesh_indices(entry, &mut submesh.indices);
}

/// Keep the first `min(old, new)` materials, give new slots a fresh default.
fn resize_material_slots(host: &mut dyn SceneHost, object: ObjectId, count: usize) {
    let Some(current) = host.materials(object) else {
        return;
    };
    if current.len() == count {
        return;
    }
    let keep = current.len().min(count);
    let mut materials: Vec<MaterialId> = current[..keep].to_vec();
    for i in keep..count {
        materials.push(host.default_material(&format!("Material_{i}")));
    }
    host.set_materials(object, &materials);
}

/// `<name>_split_<index>` under `parent`, created with an identity local
/// transform when missing.
pub(crate) fn find_or_create_split_host(
    host: &mut dyn SceneHost,
    parent: ObjectId,
    name: &str,
    index: usize,
) -> ObjectId {
    let child_name = split_host_name(name, index);
    if let Some(child) = host.find_child(parent, &child_name) {
        return child;
    }
    let child = host.create_object(Some(parent), &child_name);
    host.set_local_transform(child, Transform::IDENTITY);
    child
}

/// Mirror a source mesh onto an instance object. A single split hosted on
/// the source object itself is shared directly; otherwise each source split
/// gets a `<name>_split_<n>` child referencing the split's mesh.
pub(crate) fn apply_instance(
    host: &mut dyn SceneHost,
    object: ObjectId,
    name: &str,
    source_object: ObjectId,
    layout: &[SplitLayout],
) {
    if let [only] = layout {
        if only.host == Some(source_object) {
            host.share_mesh(source_object, object);
            return;
        }
    }
    for (s, split) in layout.iter().enumerate() {
        let child = find_or_create_split_host(host, object, name, s);
        host.set_active(child, split.active);
        if let Some(source) = split.host.filter(|_| split.active) {
            host.share_mesh(source, child);
        }
    }
}
