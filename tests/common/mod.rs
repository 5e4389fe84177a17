//! Scene builders and log capture shared by the integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use alembic_stream::config::StreamSettings;
use alembic_stream::host::{MemoryHost, SceneHost};
use alembic_stream::reader::memory::{MeshDesc, MeshFrame, NodeDesc, SceneDesc, XformFrame};
use alembic_stream::reader::{MemoryReader, MemoryResolver};
use alembic_stream::Stream;

pub const SCENE: &str = "scene.json";

/// Stream over `desc` registered as [`SCENE`], bound with object creation.
pub fn bound_stream(desc: &SceneDesc) -> (Stream, MemoryHost, Arc<MemoryResolver>) {
    bound_stream_with(desc, StreamSettings::with_source(SCENE))
}

pub fn bound_stream_with(desc: &SceneDesc, settings: StreamSettings) -> (Stream, MemoryHost, Arc<MemoryResolver>) {
    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert(SCENE, MemoryReader::from_desc(desc).unwrap());
    let mut host = MemoryHost::new();
    let root = host.create_object(None, "stream");
    let mut stream = Stream::new(settings, root, resolver.clone());
    stream.load(&mut host, true).unwrap();
    (stream, host, resolver)
}

/// Row of `count` unit quads along x, optionally lifted to `z`.
pub fn quad_row(time: f64, count: u32, z: f32) -> MeshFrame {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for q in 0..count {
        let x = q as f32;
        let base = positions.len() as u32;
        positions.extend([[x, 0.0, z], [x + 1.0, 0.0, z], [x + 1.0, 1.0, z], [x, 1.0, z]]);
        indices.extend([base, base + 1, base + 2, base + 3]);
    }
    MeshFrame::new(time, positions, vec![4; count as usize], indices)
}

pub fn static_mesh(name: &str, quads: u32) -> NodeDesc {
    NodeDesc::mesh(name, MeshDesc::new(vec![quad_row(0.0, quads, 0.0)]))
}

/// `x` goes 0, 0.5, 1 at times 0, 0.5, 1.
pub fn ramp(name: &str) -> NodeDesc {
    NodeDesc::xform(
        name,
        vec![
            XformFrame::at(0.0, [0.0, 0.0, 0.0]),
            XformFrame::at(0.5, [0.5, 0.0, 0.0]),
            XformFrame::at(1.0, [1.0, 0.0, 0.0]),
        ],
    )
}

/// Formatted log output of a scoped subscriber.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.text().matches(needle).count()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with every event (debug and up) recorded into a buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer)
}
