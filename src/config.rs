//! Persistent stream settings, per-node overrides and the resolved decode
//! configuration handed to the reader.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clock::CycleMode;
use crate::util::{Chrono, Result};

/// How vertex normals are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalsMode {
    /// Use normals stored in the source; none if absent.
    ReadFromFile,
    /// Use stored normals, compute them when absent.
    #[default]
    ComputeIfMissing,
    /// Ignore stored normals and always compute.
    AlwaysCompute,
    /// Never provide normals.
    Ignore,
}

/// How tangents are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TangentsMode {
    #[default]
    None,
    Smooth,
    Split,
}

/// Where the camera aspect ratio comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatioMode {
    #[default]
    CurrentResolution,
    DefaultResolution,
    CameraAperture,
}

/// Per-mesh face winding override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceWinding {
    Preserve,
    Swap,
}

/// Playback range and cycle policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub start_time: Chrono,
    pub end_time: Chrono,
    pub time_offset: Chrono,
    pub time_scale: Chrono,
    pub preserve_start_time: bool,
    pub cycle: CycleMode,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 0.0,
            time_offset: 0.0,
            time_scale: 1.0,
            preserve_start_time: true,
            cycle: CycleMode::Hold,
        }
    }
}

/// Data conversion options forwarded to the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub swap_handedness: bool,
    pub swap_face_winding: bool,
    pub submesh_per_uv_tile: bool,
    pub normals_mode: NormalsMode,
    pub tangents_mode: TangentsMode,
    pub aspect_ratio_mode: AspectRatioMode,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            swap_handedness: false,
            swap_face_winding: false,
            submesh_per_uv_tile: true,
            normals_mode: NormalsMode::ComputeIfMissing,
            tangents_mode: TangentsMode::None,
            aspect_ratio_mode: AspectRatioMode::CurrentResolution,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticSettings {
    pub verbose: bool,
    pub log_to_file: bool,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Decode samples on a background worker.
    pub use_threads: bool,
    /// Number of decoded samples the reader may keep around (0 = none).
    pub sample_cache_size: usize,
}

/// Settings persisted per stream instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub source_path: Option<PathBuf>,
    pub time: Chrono,
    pub playback: PlaybackSettings,
    pub data: DataSettings,
    pub diagnostics: DiagnosticSettings,
    pub advanced: AdvancedSettings,
}

impl StreamSettings {
    /// Settings streaming the given source with defaults everywhere else.
    pub fn with_source(path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Mesh options that fall back to the stream setting when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshOverrides {
    pub face_winding: Option<FaceWinding>,
    pub normals_mode: Option<NormalsMode>,
    pub tangents_mode: Option<TangentsMode>,
    pub cache_tangents_splits: bool,
}

impl Default for MeshOverrides {
    fn default() -> Self {
        Self {
            face_winding: None,
            normals_mode: None,
            tangents_mode: None,
            cache_tangents_splits: true,
        }
    }
}

/// Camera options that fall back to the stream setting when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOverrides {
    pub aspect_ratio_mode: Option<AspectRatioMode>,
    /// Keep the host camera's clipping planes instead of the source's.
    pub ignore_clipping_planes: bool,
}

/// Resolved decode configuration for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub swap_handedness: bool,
    pub swap_face_winding: bool,
    pub submesh_per_uv_tile: bool,
    pub normals_mode: NormalsMode,
    pub tangents_mode: TangentsMode,
    pub cache_tangents_splits: bool,
    pub aspect_ratio: f32,
    pub cache_samples: usize,
    /// Deliver the sample even if the node's data did not change.
    pub force_update: bool,
}

impl ReaderConfig {
    /// Stream-level defaults before any node override is applied.
    pub fn from_settings(settings: &StreamSettings, aspect_ratio: f32) -> Self {
        Self {
            swap_handedness: settings.data.swap_handedness,
            swap_face_winding: settings.data.swap_face_winding,
            submesh_per_uv_tile: settings.data.submesh_per_uv_tile,
            normals_mode: settings.data.normals_mode,
            tangents_mode: settings.data.tangents_mode,
            cache_tangents_splits: true,
            aspect_ratio,
            cache_samples: settings.advanced.sample_cache_size,
            force_update: false,
        }
    }

    /// Apply mesh overrides on top of the stream defaults.
    pub fn with_mesh_overrides(mut self, overrides: &MeshOverrides) -> Self {
        self.normals_mode = overrides.normals_mode.unwrap_or(self.normals_mode);
        self.tangents_mode = overrides.tangents_mode.unwrap_or(self.tangents_mode);
        if let Some(winding) = overrides.face_winding {
            self.swap_face_winding = winding == FaceWinding::Swap;
        }
        self.cache_tangents_splits = overrides.cache_tangents_splits;
        self
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::from_settings(&StreamSettings::default(), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");

        let mut settings = StreamSettings::with_source("anim.json");
        settings.playback.cycle = CycleMode::Bounce;
        settings.data.swap_handedness = true;
        settings.advanced.use_threads = true;
        settings.save(&path).unwrap();

        let loaded = StreamSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_settings_missing_fields_default() {
        let settings: StreamSettings =
            serde_json::from_str(r#"{ "playback": { "cycle": "Loop" } }"#).unwrap();
        assert_eq!(settings.playback.cycle, CycleMode::Loop);
        assert_eq!(settings.playback.time_scale, 1.0);
        assert!(settings.data.submesh_per_uv_tile);
        assert_eq!(settings.data.normals_mode, NormalsMode::ComputeIfMissing);
    }

    #[test]
    fn test_mesh_override_resolution() {
        let base = ReaderConfig::default();
        let resolved = base.clone().with_mesh_overrides(&MeshOverrides::default());
        assert_eq!(resolved, base);

        let overrides = MeshOverrides {
            face_winding: Some(FaceWinding::Swap),
            normals_mode: Some(NormalsMode::AlwaysCompute),
            tangents_mode: None,
            cache_tangents_splits: false,
        };
        let resolved = base.with_mesh_overrides(&overrides);
        assert!(resolved.swap_face_winding);
        assert_eq!(resolved.normals_mode, NormalsMode::AlwaysCompute);
        assert_eq!(resolved.tangents_mode, TangentsMode::None);
        assert!(!resolved.cache_tangents_splits);
    }
}
