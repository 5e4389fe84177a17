//! # Alembic Stream
//!
//! Per-frame streaming of Alembic scene-cache data into a live host scene.
//!
//! A [`Stream`] binds one source (a [`reader::SceneReader`]) under one host
//! root object (a [`host::SceneHost`]). Each tick maps the host time through
//! the playback clock, asks the update gate whether anything must be
//! re-sampled, decodes the wanted nodes and reconciles the results with the
//! host objects, reusing buffers and skipping uploads whose topology did not
//! change.
//!
//! ## Modules
//!
//! - [`util`] - Errors, time and math types
//! - [`config`] - Persisted settings, per-node overrides, decode configuration
//! - [`clock`] - Playback clock (Hold, Loop, Reverse, Bounce, Clip)
//! - [`gate`] - Per-tick update gate
//! - [`topology`] - Topology-change tracking between samples
//! - [`cache`] - Reusable vertex and point buffers
//! - [`reader`] - Reader boundary, decode queue and the in-memory reader
//! - [`host`] - Host boundary and the in-memory host
//! - [`proxy`] - Node proxies and per-kind appliers
//! - [`material`] - Assignment manifests, faceset caches, material binding
//! - [`lifecycle`] - Tree build and orphan cleanup
//! - [`stream`] - The stream context driving all of the above
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use alembic_stream::prelude::*;
//!
//! let resolver = Arc::new(AssetResolver::new("assets"));
//! let mut host = MemoryHost::new();
//! let root = host.create_object(None, "shot");
//!
//! let mut stream = Stream::new(StreamSettings::with_source("shot.json"), root, resolver);
//! stream.load(&mut host, true)?;
//! for frame in 0..48 {
//!     stream.update(&mut host, frame as f64 / 24.0);
//! }
//! ```

pub mod util;
pub mod config;
pub mod clock;
pub mod gate;
pub mod topology;
pub mod cache;
pub mod reader;
pub mod host;
pub mod proxy;
pub mod material;
pub mod lifecycle;
pub mod logging;
pub mod stream;

// Re-export commonly used types
pub use util::{Chrono, Error, Result};
pub use stream::{Stream, StreamStats};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Chrono, Error, Result};
    pub use crate::config::{
        AspectRatioMode, CameraOverrides, FaceWinding, MeshOverrides, NormalsMode, StreamSettings,
        TangentsMode,
    };
    pub use crate::clock::{CycleMode, PlaybackClock};
    pub use crate::host::{MemoryHost, ObjectId, SceneHost};
    pub use crate::material::AssignmentDocument;
    pub use crate::reader::{AssetResolver, MemoryReader, MemoryResolver, SceneReader, SourceResolver};
    pub use crate::stream::{Stream, StreamStats};
}
