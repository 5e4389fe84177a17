//! Points applier.

use crate::cache::PointsCache;
use crate::host::{ObjectId, SceneHost};
use crate::reader::PointsSample;

#[derive(Debug, Default)]
pub struct PointsNode {
    cache: PointsCache,
    /// Largest point count seen so far.
    peak_count: usize,
}

impl PointsNode {
    pub fn cache(&self) -> &PointsCache {
        &self.cache
    }

    pub fn peak_count(&self) -> usize {
        self.peak_count
    }

    pub(crate) fn store(&mut self, sample: &dyn PointsSample) {
        let count = sample.count();
        let summary = sample.summary();
        self.cache.prepare(count, &summary);
        if count > 0 {
            let PointsCache {
                positions,
                velocities,
                ids,
            } = &mut self.cache;
            let velocities = (!velocities.is_empty()).then_some(velocities.as_mut_slice());
            let ids = (!ids.is_empty()).then_some(ids.as_mut_slice());
            sample.fill(positions, velocities, ids);
        }
        self.peak_count = self.peak_count.max(count);
    }

    pub(crate) fn apply(&mut self, host: &mut dyn SceneHost, object: ObjectId) {
        host.set_points(object, &self.cache.positions, &self.cache.velocities, &self.cache.ids);
    }
}
