//! Update gate: decides once per tick whether anything must be re-sampled.

use std::path::PathBuf;

use crate::clock::TIME_EPSILON;
use crate::config::{NormalsMode, StreamSettings, TangentsMode};
use crate::util::Chrono;

/// Snapshot of every input that can invalidate the last sampled state.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateState {
    pub time: Chrono,
    pub swap_handedness: bool,
    pub swap_face_winding: bool,
    pub submesh_per_uv_tile: bool,
    pub normals_mode: NormalsMode,
    pub tangents_mode: TangentsMode,
    pub aspect_ratio: f32,
    pub source_path: Option<PathBuf>,
    /// Bumped whenever a per-node override changes.
    pub overrides_revision: u64,
}

impl UpdateState {
    pub fn capture(
        settings: &StreamSettings,
        time: Chrono,
        aspect_ratio: f32,
        overrides_revision: u64,
    ) -> Self {
        Self {
            time,
            swap_handedness: settings.data.swap_handedness,
            swap_face_winding: settings.data.swap_face_winding,
            submesh_per_uv_tile: settings.data.submesh_per_uv_tile,
            normals_mode: settings.data.normals_mode,
            tangents_mode: settings.data.tangents_mode,
            aspect_ratio,
            source_path: settings.source_path.clone(),
            overrides_revision,
        }
    }
}

/// Outcome of a gate check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Nothing changed; the tick is a no-op.
    Unchanged,
    /// Re-sample at the new time and/or configuration.
    Resample,
    /// Source path changed; tear the context down and rebuild.
    Rebind,
}

impl UpdateDecision {
    pub fn needs_update(self) -> bool {
        self != Self::Unchanged
    }
}

#[derive(Debug, Clone)]
pub struct UpdateGate {
    last: Option<UpdateState>,
    force_refresh: bool,
    epsilon: Chrono,
}

impl UpdateGate {
    pub fn new() -> Self {
        Self {
            last: None,
            force_refresh: false,
            epsilon: TIME_EPSILON,
        }
    }

    /// Force the next evaluation to re-sample.
    pub fn request_refresh(&mut self) {
        self.force_refresh = true;
    }

    pub fn refresh_requested(&self) -> bool {
        self.force_refresh
    }

    pub fn last_state(&self) -> Option<&UpdateState> {
        self.last.as_ref()
    }

    pub fn evaluate(&self, next: &UpdateState) -> UpdateDecision {
        let Some(last) = &self.last else {
            return UpdateDecision::Resample;
        };
        if next.source_path != last.source_path {
            return UpdateDecision::Rebind;
        }
        let changed = self.force_refresh
            || next.swap_handedness != last.swap_handedness
            || next.swap_face_winding != last.swap_face_winding
            || next.submesh_per_uv_tile != last.submesh_per_uv_tile
            || next.normals_mode != last.normals_mode
            || next.tangents_mode != last.tangents_mode
            || (next.time - last.time).abs() > self.epsilon
            || next.aspect_ratio != last.aspect_ratio
            || next.overrides_revision != last.overrides_revision;
        if changed {
            UpdateDecision::Resample
        } else {
            UpdateDecision::Unchanged
        }
    }

    /// True when the non-time part of the state differs from the last commit.
    pub fn config_changed(&self, next: &UpdateState) -> bool {
        match &self.last {
            Some(last) => {
                let mut timeless = next.clone();
                timeless.time = last.time;
                timeless != *last
            }
            None => true,
        }
    }

    /// Record `state` as applied and clear the refresh request.
    pub fn commit(&mut self, state: UpdateState) {
        self.last = Some(state);
        self.force_refresh = false;
    }

    /// Forget the last state so the next evaluation re-samples.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for UpdateGate {
    fn default() -> Self {
        Self::new()
    }
}
