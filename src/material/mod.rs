//! Material assignments and faceset caches.
//!
//! Assignments come from an XML manifest ([`AssignmentDocument`]). Each
//! assigned material owns one faceset: the faces it covers, or none for a
//! whole-object assignment. The faceset cache feeds mesh submesh partitioning
//! and tells the mesh applier when membership changed.

mod assignment;
mod binding;

pub use assignment::{parse_face_ranges, AssignmentDocument, NodeAssignments, ShaderAssignment};
pub use binding::{bind_materials, split_host_name, BindOutcome};

use crate::host::MaterialId;

/// Flat faceset storage: `face_counts[i]` faces of set `i`, laid out
/// consecutively in `face_indices`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Facesets {
    pub face_counts: Vec<usize>,
    pub face_indices: Vec<u32>,
}

impl Facesets {
    pub fn from_sets(sets: &[Vec<u32>]) -> Self {
        Self {
            face_counts: sets.iter().map(Vec::len).collect(),
            face_indices: sets.iter().flatten().copied().collect(),
        }
    }

    /// Number of facesets.
    pub fn len(&self) -> usize {
        self.face_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.face_counts.is_empty()
    }

    /// Counts sum to the number of stored indices.
    pub fn is_consistent(&self) -> bool {
        self.face_counts.iter().sum::<usize>() == self.face_indices.len()
    }

    /// Faces of each set, in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u32]> + '_ {
        let mut offset = 0;
        self.face_counts.iter().map(move |&count| {
            let start = offset.min(self.face_indices.len());
            let end = (offset + count).min(self.face_indices.len());
            offset += count;
            &self.face_indices[start..end]
        })
    }
}

/// One material bound to a list of faces; empty faces cover the whole object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialAssignment {
    pub material: MaterialId,
    pub faces: Vec<u32>,
}

/// Faceset state attached to one mesh node.
#[derive(Clone, Debug, Default)]
pub struct FacesetCache {
    facesets: Facesets,
    /// Materials waiting for the binding pass, one per faceset.
    pending: Vec<MaterialId>,
    dirty: bool,
}

impl FacesetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the assignments. Membership is compared by content so that
    /// re-importing identical assignments leaves the cache clean.
    pub fn update_assignments(&mut self, assignments: &[MaterialAssignment]) {
        let sets: Vec<Vec<u32>> = assignments.iter().map(|a| a.faces.clone()).collect();
        let facesets = Facesets::from_sets(&sets);
        if facesets != self.facesets {
            self.facesets = facesets;
            self.dirty = true;
        }
        self.pending = assignments.iter().map(|a| a.material).collect();
    }

    pub fn facesets(&self) -> &Facesets {
        &self.facesets
    }

    pub fn len(&self) -> usize {
        self.facesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facesets.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the current membership as consumed by a topology rebuild.
    pub fn acknowledge(&mut self) {
        self.dirty = false;
    }

    pub fn pending_materials(&self) -> &[MaterialId] {
        &self.pending
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(material: u64, faces: &[u32]) -> MaterialAssignment {
        MaterialAssignment {
            material: MaterialId(material),
            faces: faces.to_vec(),
        }
    }

    #[test]
    fn test_facesets_layout() {
        let sets = Facesets::from_sets(&[vec![2, 3, 4], vec![], vec![0]]);
        assert_eq!(sets.face_counts, vec![3, 0, 1]);
        assert_eq!(sets.face_indices, vec![2, 3, 4, 0]);
        assert!(sets.is_consistent());
        let collected: Vec<&[u32]> = sets.iter().collect();
        assert_eq!(collected, vec![&[2, 3, 4][..], &[][..], &[0][..]]);
    }

    #[test]
    fn test_identical_update_stays_clean() {
        let mut cache = FacesetCache::new();
        cache.update_assignments(&[assign(1, &[2, 3, 4])]);
        assert!(cache.is_dirty());
        cache.acknowledge();

        cache.update_assignments(&[assign(1, &[2, 3, 4])]);
        assert!(!cache.is_dirty());
        assert_eq!(cache.pending_materials(), &[MaterialId(1)]);

        // Same faces, different material: membership unchanged.
        cache.update_assignments(&[assign(5, &[2, 3, 4])]);
        assert!(!cache.is_dirty());

        cache.update_assignments(&[assign(1, &[2, 3])]);
        assert!(cache.is_dirty());
    }

    #[test]
    fn test_shrinking_assignments_dirty() {
        let mut cache = FacesetCache::new();
        cache.update_assignments(&[assign(1, &[0]), assign(2, &[1])]);
        cache.acknowledge();
        cache.update_assignments(&[assign(1, &[0])]);
        assert!(cache.is_dirty());
        assert_eq!(cache.len(), 1);
    }
}
