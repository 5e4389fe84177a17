//! Reusable per-node sample buffers.
//!
//! Buffers are sized to the current sample every frame. An attribute that is
//! absent from the sample is truncated to empty; a present one is resized to
//! the vertex count and fully overwritten by the reader.

use crate::host::MeshVertices;
use crate::reader::{MeshSampleSummary, PointsSampleSummary, VertexBuffers};
use crate::util::{Bounds, Vec2, Vec3, Vec4};

/// Resize `buffer` to `len` (or empty when absent). Returns true when the
/// length changed.
///
/// A length change resets every element, so a buffer shrunk and grown again
/// never exposes values from an earlier sample. Capacity is kept.
pub fn resize_attribute<T: Clone + Default>(buffer: &mut Vec<T>, len: usize, present: bool) -> bool {
    let len = if present { len } else { 0 };
    if buffer.len() == len {
        return false;
    }
    buffer.clear();
    buffer.resize(len, T::default());
    true
}

/// Vertex arrays of one mesh split.
#[derive(Clone, Debug, Default)]
pub struct VertexCache {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub tangents: Vec<Vec4>,
}

impl VertexCache {
    /// Size every attribute for a sample of `vertex_count` vertices.
    pub fn prepare(&mut self, vertex_count: usize, summary: &MeshSampleSummary) -> bool {
        let mut resized = resize_attribute(&mut self.positions, vertex_count, true);
        resized |= resize_attribute(&mut self.normals, vertex_count, summary.has_normals);
        resized |= resize_attribute(&mut self.uvs, vertex_count, summary.has_uvs);
        resized |= resize_attribute(&mut self.tangents, vertex_count, summary.has_tangents);
        resized
    }

    /// Destination slices for the reader; absent attributes map to `None`.
    pub fn buffers(&mut self) -> VertexBuffers<'_> {
        VertexBuffers {
            positions: &mut self.positions,
            normals: non_empty(&mut self.normals),
            uvs: non_empty(&mut self.uvs),
            tangents: non_empty(&mut self.tangents),
        }
    }

    pub fn vertices(&self, bounds: Bounds) -> MeshVertices<'_> {
        MeshVertices {
            positions: &self.positions,
            normals: &self.normals,
            uvs: &self.uvs,
            tangents: &self.tangents,
            bounds,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

fn non_empty<T>(buffer: &mut Vec<T>) -> Option<&mut [T]> {
    if buffer.is_empty() {
        None
    } else {
        Some(buffer.as_mut_slice())
    }
}

/// Point arrays of one points node.
#[derive(Clone, Debug, Default)]
pub struct PointsCache {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub ids: Vec<u64>,
}

impl PointsCache {
    /// Size the arrays for `count` points. A zero count truncates every array.
    pub fn prepare(&mut self, count: usize, summary: &PointsSampleSummary) -> bool {
        let mut resized = resize_attribute(&mut self.positions, count, true);
        resized |= resize_attribute(&mut self.velocities, count, summary.has_velocities);
        resized |= resize_attribute(&mut self.ids, count, summary.has_ids);
        resized
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
