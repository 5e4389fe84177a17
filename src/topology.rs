//! Topology change detection for mesh nodes.

use smallvec::SmallVec;

/// Structural facts about one incoming mesh sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopologyInput {
    /// The reader flagged a connectivity change.
    pub reported: bool,
    pub split_count: usize,
    /// Faceset membership changed since it was last acknowledged.
    pub facesets_dirty: bool,
    /// A faceset source is attached to the node.
    pub has_facesets: bool,
}

/// Retained layout of the previous frame, compared against each new sample.
#[derive(Clone, Debug)]
pub struct TopologyTracker {
    fresh_setup: bool,
    had_facesets: bool,
    split_count: usize,
    submesh_counts: SmallVec<[usize; 4]>,
}

impl TopologyTracker {
    /// A tracker for a freshly (re)created node: the first sample always
    /// rebuilds.
    pub fn new() -> Self {
        Self {
            fresh_setup: true,
            had_facesets: false,
            split_count: 0,
            submesh_counts: SmallVec::new(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh_setup
    }

    /// Whether the node needs a forced decode even if its source is constant.
    pub fn needs_forced_update(&self, facesets_dirty: bool, has_facesets: bool) -> bool {
        self.fresh_setup || facesets_dirty || (self.had_facesets && !has_facesets)
    }

    /// Decide whether `input` changes the topology.
    pub fn evaluate(&self, input: &TopologyInput) -> bool {
        let facesets_cleared = self.had_facesets && !input.has_facesets;
        input.reported
            || self.fresh_setup
            || input.facesets_dirty
            || facesets_cleared
            || input.split_count != self.split_count
    }

    /// Record the layout produced by a rebuild. The caller acknowledges the
    /// faceset source once, right after this.
    pub fn commit_rebuild(&mut self, input: &TopologyInput, submesh_counts: &[usize]) {
        self.fresh_setup = false;
        self.had_facesets = input.has_facesets;
        self.split_count = input.split_count;
        self.submesh_counts = SmallVec::from_slice(submesh_counts);
    }

    /// Submesh count of a split at the last rebuild.
    pub fn submesh_count(&self, split: usize) -> Option<usize> {
        self.submesh_counts.get(split).copied()
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    /// Force the next sample to rebuild, as after a (re)bind.
    pub fn reset(&mut self) {
        self.fresh_setup = true;
    }
}

impl Default for TopologyTracker {
    fn default() -> Self {
        Self::new()
    }
}
