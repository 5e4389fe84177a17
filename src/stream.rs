//! Stream context: one source bound under one host root object.
//!
//! Each tick runs the same pipeline:
//!
//! 1. recover the reader context if it was lost,
//! 2. map the external time through the playback clock,
//! 3. ask the update gate whether anything must be re-sampled (or the whole
//!    tree rebuilt after a source change),
//! 4. submit decode requests for the nodes that want a sample,
//! 5. drain decoded batches into the proxies and apply dirty proxies to the
//!    host, mirror instances and bind pending materials.
//!
//! Nothing in a tick returns an error; failures are logged and the affected
//! node is skipped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::clock::PlaybackClock;
use crate::config::{CameraOverrides, MeshOverrides, ReaderConfig, StreamSettings};
use crate::gate::{UpdateDecision, UpdateGate, UpdateState};
use crate::host::{ObjectId, SceneHost};
use crate::lifecycle::{build_tree, cleanup_orphans};
use crate::logging::FileLog;
use crate::material::{bind_materials, AssignmentDocument, BindOutcome, FacesetCache, MaterialAssignment};
use crate::proxy::{NodeData, NodeProxy, Registry, RegistryStats};
use crate::reader::{DecodeBatch, DecodeRequest, Decoder, NodeId, NodeKind, SceneReader, SourceResolver};
use crate::util::{Chrono, Error, Result};

/// Counters over the lifetime of a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub ticks: usize,
    /// Ticks that submitted decode requests.
    pub resamples: usize,
    pub requests: usize,
    pub samples_applied: usize,
    /// Samples dropped because their node or context went away.
    pub samples_dropped: usize,
    pub decode_errors: usize,
    pub rebinds: usize,
    pub recoveries: usize,
    pub instance_fallbacks: usize,
    pub orphans_removed: usize,
    pub material_binds: usize,
}

struct ReaderContext {
    reader: Arc<dyn SceneReader>,
    decoder: Decoder,
    source_path: PathBuf,
    /// Proxy path of every bound reader node.
    paths: HashMap<NodeId, String>,
    /// Batches older than this belong to a previous context.
    first_epoch: u64,
    /// Last submitted batch, for [`Stream::flush`].
    last_submitted: Option<u64>,
}

/// Streams one source into a host subtree.
pub struct Stream {
    settings: StreamSettings,
    root: ObjectId,
    resolver: Arc<dyn SourceResolver>,
    context: Option<ReaderContext>,
    gate: UpdateGate,
    registry: Registry,
    proxies: BTreeMap<String, NodeProxy>,
    /// Faceset caches keyed by mesh proxy path.
    materials: BTreeMap<String, FacesetCache>,
    epoch: u64,
    overrides_revision: u64,
    sample_time: Chrono,
    clipped: bool,
    /// A context was opened at least once.
    loaded: bool,
    /// Objects tracked before a rebind whose source could not be opened.
    /// Orphans among them are removed once the source binds.
    pending_rebind: Option<HashSet<ObjectId>>,
    /// Set by [`Stream::destroy`]; ticks do nothing until the next load.
    destroyed: bool,
    file_log: FileLog,
    stats: StreamStats,
}

impl Stream {
    /// A stream under the host object `root`. Nothing is opened until
    /// [`Stream::load`] or the first tick.
    pub fn new(settings: StreamSettings, root: ObjectId, resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            settings,
            root,
            resolver,
            context: None,
            gate: UpdateGate::new(),
            registry: Registry::new(),
            proxies: BTreeMap::new(),
            materials: BTreeMap::new(),
            epoch: 0,
            overrides_revision: 0,
            sample_time: 0.0,
            clipped: false,
            loaded: false,
            pending_rebind: None,
            destroyed: false,
            file_log: FileLog::new(),
            stats: StreamStats::default(),
        }
    }

    // ---- accessors ----

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Settings changes are picked up by the next tick.
    pub fn settings_mut(&mut self) -> &mut StreamSettings {
        &mut self.settings
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn is_bound(&self) -> bool {
        self.context.is_some()
    }

    /// Source path of the open context.
    pub fn bound_source(&self) -> Option<&Path> {
        self.context.as_ref().map(|c| c.source_path.as_path())
    }

    pub fn reader(&self) -> Option<&Arc<dyn SceneReader>> {
        self.context.as_ref().map(|c| &c.reader)
    }

    /// Internal time of the last tick.
    pub fn sample_time(&self) -> Chrono {
        self.sample_time
    }

    /// The whole stream is outside its range under `Clip`.
    pub fn is_clipped(&self) -> bool {
        self.clipped
    }

    pub fn proxy(&self, path: &str) -> Option<&NodeProxy> {
        self.proxies.get(path)
    }

    pub fn proxies(&self) -> impl Iterator<Item = &NodeProxy> + '_ {
        self.proxies.values()
    }

    pub fn facesets(&self, path: &str) -> Option<&FacesetCache> {
        self.materials.get(path)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn file_log(&self) -> &FileLog {
        &self.file_log
    }

    /// Force the next tick to re-sample every node.
    pub fn request_refresh(&mut self) {
        self.gate.request_refresh();
    }

    // ---- lifecycle ----

    /// Open the source and bind the host tree. With `create_missing`, host
    /// objects are created for nodes that have none and the playback offset
    /// is reset to the source start.
    pub fn load(&mut self, host: &mut dyn SceneHost, create_missing: bool) -> Result<()> {
        let path = self.settings.source_path.clone().ok_or(Error::Unbound)?;
        self.teardown();
        self.destroyed = false;
        self.pending_rebind = None;
        self.open(host, &path, create_missing, create_missing)
    }

    /// Tear the context down and rebuild it from the current source path,
    /// removing host objects whose nodes are gone.
    ///
    /// When the source cannot be opened the stream stays unbound and every
    /// following tick retries the rebind, orphan cleanup included.
    pub fn rebind(&mut self, host: &mut dyn SceneHost) -> Result<()> {
        let mut tracked = self.pending_rebind.take().unwrap_or_default();
        tracked.extend(self.proxies.values().map(|p| p.object));
        self.teardown();

        let opened = match self.settings.source_path.clone() {
            Some(path) => self.open(host, &path, true, true),
            None => Err(Error::Unbound),
        };
        if let Err(err) = opened {
            self.pending_rebind = Some(tracked);
            return Err(err);
        }
        self.stats.rebinds += 1;

        let live: HashSet<ObjectId> = self.proxies.values().map(|p| p.object).collect();
        let removed = cleanup_orphans(host, self.root, &tracked, &live);
        self.stats.orphans_removed += removed.len();
        Ok(())
    }

    /// A rebind is waiting for its source to become available.
    pub fn is_rebind_pending(&self) -> bool {
        self.pending_rebind.is_some()
    }

    /// Drop the context after detaching every proxy. The next tick recovers
    /// it on the existing host objects.
    pub fn unbind(&mut self) {
        self.teardown();
    }

    /// Drop the context and every proxy. Host objects are left alone. The
    /// stream stays inert until [`Stream::load`] is called again.
    pub fn destroy(&mut self) {
        self.teardown();
        self.proxies.clear();
        self.materials.clear();
        self.loaded = false;
        self.pending_rebind = None;
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The reader context vanished underneath the stream (host reload).
    /// Handles are gone, so nothing is detached.
    pub fn invalidate_context(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.decoder.quiesce();
        }
        for proxy in self.proxies.values_mut() {
            proxy.invalidate(Some(&mut self.registry), true);
        }
    }

    /// Destroy notification from the reader for one node.
    pub fn on_node_destroyed(&mut self, path: &str) {
        if let Some(proxy) = self.proxies.get_mut(path) {
            debug!(path, "node destroyed by reader");
            proxy.invalidate(Some(&mut self.registry), true);
        }
    }

    /// The host is destroying the proxy of `path`. Returns false when there
    /// was none.
    pub fn destroy_node(&mut self, path: &str) -> bool {
        let Some(mut proxy) = self.proxies.remove(path) else {
            return false;
        };
        if self.settings.diagnostics.verbose {
            info!(path, "destroy node");
        }
        proxy.invalidate(Some(&mut self.registry), false);
        if let Some(context) = &mut self.context {
            context.paths.retain(|_, p| p != path);
        }
        self.materials.remove(path);
        true
    }

    fn teardown(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.decoder.quiesce();
        }
        for proxy in self.proxies.values_mut() {
            proxy.invalidate(Some(&mut self.registry), false);
        }
    }

    /// Resolve `path`, reconcile the playback range and build proxies.
    fn open(&mut self, host: &mut dyn SceneHost, path: &Path, create_missing: bool, reset_playback: bool) -> Result<()> {
        let reader = self.resolver.resolve(path)?;
        let (source_start, source_end) = reader.time_range();

        let playback = &mut self.settings.playback;
        if playback.start_time >= playback.end_time {
            playback.start_time = source_start;
            playback.end_time = source_end;
        } else {
            playback.start_time = playback.start_time.max(source_start);
            playback.end_time = playback.end_time.min(source_end);
        }
        if reset_playback {
            playback.time_offset = -source_start;
            playback.time_scale = 1.0;
            playback.preserve_start_time = true;
        }
        let clock = PlaybackClock::from_settings(&self.settings.playback);
        self.clipped = clock.is_clipped(self.settings.time);

        let build = build_tree(
            reader.as_ref(),
            host,
            self.root,
            &self.proxies,
            &mut self.registry,
            create_missing,
        );
        self.stats.instance_fallbacks += build.instance_fallbacks;
        if self.settings.diagnostics.verbose {
            info!(
                source = %path.display(),
                nodes = build.proxies.len(),
                missing = build.missing,
                "stream bound"
            );
        }

        let mesh_paths: HashSet<&String> = build
            .proxies
            .iter()
            .filter(|(_, p)| p.kind() == NodeKind::Mesh)
            .map(|(path, _)| path)
            .collect();
        self.materials.retain(|path, _| mesh_paths.contains(path));

        self.proxies = build.proxies;
        self.epoch += 1;
        self.context = Some(ReaderContext {
            decoder: Decoder::new(Arc::clone(&reader), self.settings.advanced.use_threads),
            reader,
            source_path: path.to_path_buf(),
            paths: build.handles.into_iter().collect(),
            first_epoch: self.epoch,
            last_submitted: None,
        });
        self.loaded = true;
        self.gate.reset();
        self.gate.request_refresh();
        Ok(())
    }

    /// Reopen a lost context on the existing host objects.
    fn recover(&mut self, host: &mut dyn SceneHost) -> bool {
        let Some(path) = self.settings.source_path.clone() else {
            return false;
        };
        if self.settings.diagnostics.verbose {
            info!(source = %path.display(), "trying to recover stream context");
        }
        match self.open(host, &path, false, true) {
            Ok(()) => {
                self.stats.recoveries += 1;
                if self.settings.diagnostics.verbose {
                    info!("stream context recovered");
                }
                true
            }
            Err(err) if self.loaded => {
                warn!("Lost stream context: {err}");
                false
            }
            Err(err) => {
                debug!("no stream context: {err}");
                false
            }
        }
    }

    /// Finish a rebind that failed on an earlier tick.
    fn retry_rebind(&mut self, host: &mut dyn SceneHost) -> bool {
        match self.rebind(host) {
            Ok(()) => {
                if self.settings.diagnostics.verbose {
                    info!("stream bound after source became available");
                }
                true
            }
            Err(err) => {
                debug!("source still unavailable: {err}");
                false
            }
        }
    }

    // ---- per-tick entry points ----

    /// Editor-style update to an arbitrary external time.
    pub fn advance_to(&mut self, host: &mut dyn SceneHost, time: Chrono) {
        self.update(host, time);
    }

    /// Runtime-style update, `delta` after the last tick.
    pub fn advance_by(&mut self, host: &mut dyn SceneHost, delta: Chrono) {
        let time = self.settings.time + delta;
        self.update(host, time);
    }

    /// Run one tick at external time `time`.
    pub fn update(&mut self, host: &mut dyn SceneHost, time: Chrono) {
        self.file_log.sync(&self.settings.diagnostics);
        match self.file_log.dispatch().cloned() {
            Some(dispatch) => tracing::dispatcher::with_default(&dispatch, || self.tick(host, time)),
            None => self.tick(host, time),
        }
    }

    /// Block until the last submitted batch has been applied. Only threaded
    /// decoding ever has anything outstanding.
    pub fn flush(&mut self, host: &mut dyn SceneHost) {
        while let Some(context) = &mut self.context {
            if context.last_submitted.is_none() {
                break;
            }
            let batches = context.decoder.wait();
            if batches.is_empty() {
                break;
            }
            self.deliver(batches);
        }
        self.apply(host);
    }

    fn tick(&mut self, host: &mut dyn SceneHost, time: Chrono) {
        let _span = info_span!("stream_update", time).entered();
        self.stats.ticks += 1;
        if self.destroyed {
            return;
        }

        if self.context.is_none() {
            let bound = if self.pending_rebind.is_some() {
                self.retry_rebind(host)
            } else {
                self.recover(host)
            };
            if !bound {
                return;
            }
        }

        self.settings.time = time;
        let mut state = self.capture_state(host);
        let decision = self.gate.evaluate(&state);

        if decision == UpdateDecision::Rebind {
            if self.settings.diagnostics.verbose {
                info!("source path changed");
            }
            if let Err(err) = self.rebind(host) {
                warn!("cannot bind source: {err}");
                self.gate.commit(state);
                return;
            }
            state = self.capture_state(host);
        }

        if decision.needs_update() {
            if self.settings.diagnostics.verbose {
                info!(t = time, sample_time = state.time, "stream update");
            }
            self.request_samples(host, &state);
            self.gate.commit(state);
        }

        if let Some(context) = &mut self.context {
            let batches = context.decoder.drain();
            self.deliver(batches);
        }
        self.apply(host);
    }

    fn capture_state(&mut self, host: &dyn SceneHost) -> UpdateState {
        let clock = PlaybackClock::from_settings(&self.settings.playback);
        self.clipped = clock.is_clipped(self.settings.time);
        self.sample_time = clock.sample_time(self.settings.time);
        let aspect_ratio = host.aspect_ratio(self.settings.data.aspect_ratio_mode);
        UpdateState::capture(&self.settings, self.sample_time, aspect_ratio, self.overrides_revision)
    }

    /// Submit a decode request for every node that wants a sample.
    fn request_samples(&mut self, host: &dyn SceneHost, state: &UpdateState) {
        let Some(context) = &mut self.context else {
            return;
        };
        let _span = info_span!("request_samples").entered();

        let clock = PlaybackClock::from_settings(&self.settings.playback);
        let time = self.settings.time;
        let config_changed = self.gate.config_changed(state);
        let force = self.gate.refresh_requested() || config_changed;
        let base = ReaderConfig::from_settings(&self.settings, state.aspect_ratio);

        let mut requests = Vec::new();
        for proxy in self.proxies.values_mut() {
            let Some(node) = proxy.handle().filter(|_| proxy.is_valid()) else {
                continue;
            };
            if proxy.kind() == NodeKind::Group || proxy.instance().is_some() {
                continue;
            }
            if self.clipped || proxy.time_range().is_some_and(|range| clock.is_range_clipped(time, range)) {
                continue;
            }

            // Decode options may change connectivity (winding, splits, tiles).
            if config_changed {
                if let NodeData::Mesh(mesh) = &mut proxy.data {
                    mesh.reset();
                }
            }

            let forced = force || proxy.needs_forced_update(self.materials.get(&proxy.path));
            if proxy.is_constant() && proxy.has_sample() && !forced {
                continue;
            }

            let mut config = match &proxy.data {
                NodeData::Mesh(mesh) => base.clone().with_mesh_overrides(&mesh.overrides),
                NodeData::Camera(camera) => match camera.overrides.aspect_ratio_mode {
                    Some(mode) => ReaderConfig {
                        aspect_ratio: host.aspect_ratio(mode),
                        ..base.clone()
                    },
                    None => base.clone(),
                },
                _ => base.clone(),
            };
            config.force_update = forced;
            requests.push(DecodeRequest { node, config });
        }

        if requests.is_empty() {
            return;
        }
        self.stats.resamples += 1;
        self.stats.requests += requests.len();
        self.epoch += 1;
        context.last_submitted = Some(self.epoch);
        context.decoder.submit(self.epoch, state.time, requests);
    }

    /// Store decoded samples into their proxies.
    fn deliver(&mut self, batches: Vec<DecodeBatch>) {
        let Some(context) = &mut self.context else {
            return;
        };
        let newest = batches.iter().map(|b| b.epoch).max();
        if newest.is_some() && newest >= context.last_submitted {
            context.last_submitted = None;
        }
        for batch in batches {
            if batch.epoch < context.first_epoch {
                self.stats.samples_dropped += batch.samples.len();
                continue;
            }
            for (node, result) in batch.samples {
                let proxy = context
                    .paths
                    .get(&node)
                    .filter(|_| self.registry.is_registered(node))
                    .and_then(|path| self.proxies.get_mut(path));
                let Some(proxy) = proxy else {
                    self.stats.samples_dropped += 1;
                    continue;
                };
                let sample = match result {
                    Ok(sample) => sample,
                    Err(err) => {
                        warn!(path = %proxy.path, "{err}");
                        self.stats.decode_errors += 1;
                        continue;
                    }
                };
                let facesets = self.materials.get_mut(&proxy.path);
                match proxy.deliver(sample, facesets) {
                    Ok(()) => self.stats.samples_applied += 1,
                    Err(err) => {
                        warn!(path = %proxy.path, "{err}");
                        self.stats.decode_errors += 1;
                    }
                }
            }
        }
    }

    /// Main-thread pass: dirty proxies into the host, instances, materials.
    fn apply(&mut self, host: &mut dyn SceneHost) {
        let _span = info_span!("apply_scene").entered();
        for proxy in self.proxies.values_mut() {
            proxy.apply(host);
        }
        self.apply_instances(host);
        self.bind_pending_materials(host);
    }

    fn apply_instances(&mut self, host: &mut dyn SceneHost) {
        let links: Vec<(String, String)> = self
            .proxies
            .values()
            .filter(|p| p.is_valid())
            .filter_map(|p| p.instance().map(|link| (p.path.clone(), link.source_path.clone())))
            .collect();

        for (path, source_path) in links {
            let source = self
                .proxies
                .get(&source_path)
                .filter(|s| s.is_valid() && host.exists(s.object))
                .and_then(|s| match &s.data {
                    NodeData::Mesh(mesh) => Some((s.object, mesh.split_layout())),
                    _ => None,
                });
            let Some(proxy) = self.proxies.get_mut(&path) else {
                continue;
            };
            match source {
                Some((source_object, layout)) => proxy.apply_instance(host, source_object, &layout),
                None => {
                    warn!(path = %path, source = %source_path, "instance source was deleted; node now owns its data");
                    proxy.detach_instance(&mut self.registry);
                    self.gate.request_refresh();
                }
            }
        }
    }

    fn bind_pending_materials(&mut self, host: &mut dyn SceneHost) {
        let pending: Vec<String> = self
            .materials
            .iter()
            .filter(|(_, cache)| !cache.pending_materials().is_empty())
            .map(|(path, _)| path.clone())
            .collect();

        for path in pending {
            let Some(proxy) = self.proxies.get(&path).filter(|p| p.is_valid()) else {
                continue;
            };
            // Instances bind against the source's submesh layout.
            let source_path = proxy.instance().map(|link| link.source_path.clone());
            let layout_owner = source_path
                .as_deref()
                .and_then(|s| self.proxies.get(s))
                .unwrap_or(proxy);
            let NodeData::Mesh(mesh) = &layout_owner.data else {
                continue;
            };
            let source_facesets = source_path
                .as_deref()
                .and_then(|s| self.materials.get(s))
                .map(|cache| cache.facesets().clone());
            let Some(cache) = self.materials.get_mut(&path) else {
                continue;
            };
            let outcome = bind_materials(
                host,
                proxy.object,
                &proxy.name,
                &path,
                mesh.submeshes(),
                cache,
                source_facesets.as_ref(),
            );
            if outcome == BindOutcome::Bound {
                self.stats.material_binds += 1;
            }
        }
    }

    // ---- material assignments ----

    /// Apply an assignment manifest. Returns the number of assignments that
    /// found their target.
    pub fn import_material_assignments(&mut self, host: &mut dyn SceneHost, document: &AssignmentDocument) -> usize {
        let mut per_node: BTreeMap<String, Vec<MaterialAssignment>> = BTreeMap::new();
        let mut applied = 0;

        for node in &document.nodes {
            for shader in &node.shaders {
                let Some(target) = self.find_mesh_target(&node.path, shader.instance) else {
                    debug!(path = %node.path, instance = shader.instance, "assignment target not found");
                    continue;
                };
                let material = host.find_or_create_material(&shader.material);
                per_node.entry(target).or_default().push(MaterialAssignment {
                    material,
                    faces: shader.faces.clone(),
                });
                applied += 1;
            }
        }

        for (path, assignments) in per_node {
            self.materials.entry(path).or_default().update_assignments(&assignments);
        }
        self.gate.request_refresh();
        applied
    }

    /// Load and apply an assignment manifest file.
    pub fn import_material_file(&mut self, host: &mut dyn SceneHost, path: impl AsRef<Path>) -> Result<usize> {
        let document = AssignmentDocument::load(path)?;
        Ok(self.import_material_assignments(host, &document))
    }

    /// The `instance`-th mesh whose path or declared instance source is `path`.
    fn find_mesh_target(&self, path: &str, instance: usize) -> Option<String> {
        self.proxies
            .values()
            .filter(|p| p.kind() == NodeKind::Mesh)
            .filter(|p| p.path == path || p.instance_source() == Some(path))
            .nth(instance)
            .map(|p| p.path.clone())
    }

    // ---- per-node overrides ----

    pub fn set_mesh_overrides(&mut self, path: &str, overrides: MeshOverrides) -> Result<()> {
        let proxy = self.proxies.get_mut(path).ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
        let NodeData::Mesh(mesh) = &mut proxy.data else {
            return Err(kind_mismatch(proxy, NodeKind::Mesh));
        };
        if mesh.overrides != overrides {
            mesh.overrides = overrides;
            self.overrides_revision += 1;
        }
        Ok(())
    }

    pub fn set_camera_overrides(&mut self, path: &str, overrides: CameraOverrides) -> Result<()> {
        let proxy = self.proxies.get_mut(path).ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
        let NodeData::Camera(camera) = &mut proxy.data else {
            return Err(kind_mismatch(proxy, NodeKind::Camera));
        };
        if camera.overrides != overrides {
            camera.overrides = overrides;
            self.overrides_revision += 1;
        }
        Ok(())
    }
}

fn kind_mismatch(proxy: &NodeProxy, expected: NodeKind) -> Error {
    Error::KindMismatch {
        path: proxy.path.clone(),
        expected: expected.to_string(),
        actual: proxy.kind().to_string(),
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.decoder.quiesce();
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("source", &self.settings.source_path)
            .field("bound", &self.is_bound())
            .field("proxies", &self.proxies.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::CycleMode;
    use crate::host::MemoryHost;
    use crate::reader::memory::{CameraFrame, NodeDesc, SceneDesc, XformFrame};
    use crate::reader::{MemoryReader, MemoryResolver};

    fn setup(desc: SceneDesc) -> (Stream, MemoryHost, Arc<MemoryResolver>) {
        let resolver = Arc::new(MemoryResolver::new());
        resolver.insert("scene.json", MemoryReader::from_desc(&desc).unwrap());
        let mut host = MemoryHost::new();
        let root = host.create_object(None, "stream");
        let stream = Stream::new(StreamSettings::with_source("scene.json"), root, resolver.clone());
        (stream, host, resolver)
    }

    fn moving() -> SceneDesc {
        SceneDesc::new(vec![NodeDesc::xform(
            "a",
            vec![XformFrame::at(0.0, [0.0, 0.0, 0.0]), XformFrame::at(1.0, [1.0, 0.0, 0.0])],
        )])
    }

    #[test]
    fn test_load_reconciles_range() {
        let (mut stream, mut host, _) = setup(moving());
        stream.load(&mut host, true).unwrap();
        let playback = &stream.settings().playback;
        assert_eq!((playback.start_time, playback.end_time), (0.0, 1.0));
        assert_eq!(playback.time_offset, 0.0);
        assert!(stream.is_bound());
    }

    #[test]
    fn test_load_clamps_configured_range() {
        let (mut stream, mut host, _) = setup(moving());
        stream.settings_mut().playback.start_time = -5.0;
        stream.settings_mut().playback.end_time = 0.5;
        stream.load(&mut host, false).unwrap();
        let playback = &stream.settings().playback;
        assert_eq!((playback.start_time, playback.end_time), (0.0, 0.5));
    }

    #[test]
    fn test_load_without_source_is_unbound() {
        let mut host = MemoryHost::new();
        let root = host.create_object(None, "stream");
        let mut stream = Stream::new(StreamSettings::default(), root, Arc::new(MemoryResolver::new()));
        assert!(matches!(stream.load(&mut host, true), Err(Error::Unbound)));
        stream.update(&mut host, 1.0);
        assert!(!stream.is_bound());
    }

    #[test]
    fn test_tick_applies_and_gate_skips_repeat() {
        let (mut stream, mut host, _) = setup(moving());
        stream.load(&mut host, true).unwrap();
        stream.update(&mut host, 1.0);
        let obj = host.find_path(stream.root(), "a").unwrap();
        assert_eq!(host.local_transform(obj).unwrap().translation.x, 1.0);
        let after_first = stream.stats();

        stream.update(&mut host, 1.0);
        assert_eq!(stream.stats().resamples, after_first.resamples);
        assert_eq!(stream.stats().requests, after_first.requests);
    }

    #[test]
    fn test_constant_node_sampled_once() {
        let desc = SceneDesc::new(vec![
            NodeDesc::xform("still", vec![XformFrame::at(0.0, [2.0, 0.0, 0.0])]),
            NodeDesc::xform(
                "moving",
                vec![XformFrame::at(0.0, [0.0, 0.0, 0.0]), XformFrame::at(1.0, [1.0, 0.0, 0.0])],
            ),
        ]);
        let (mut stream, mut host, _) = setup(desc);
        stream.load(&mut host, true).unwrap();
        stream.update(&mut host, 0.0);
        assert_eq!(stream.stats().requests, 2);
        stream.update(&mut host, 0.5);
        assert_eq!(stream.stats().requests, 3);
    }

    #[test]
    fn test_clip_excludes_out_of_range_nodes() {
        let desc = SceneDesc::new(vec![
            NodeDesc::xform(
                "early",
                vec![XformFrame::at(0.0, [0.0, 0.0, 0.0]), XformFrame::at(1.0, [1.0, 0.0, 0.0])],
            ),
            NodeDesc::xform(
                "late",
                vec![XformFrame::at(5.0, [0.0, 0.0, 0.0]), XformFrame::at(10.0, [1.0, 0.0, 0.0])],
            ),
        ]);
        let (mut stream, mut host, _) = setup(desc);
        stream.settings_mut().playback.cycle = CycleMode::Clip;
        stream.load(&mut host, true).unwrap();
        stream.update(&mut host, 0.5);
        assert_eq!(stream.stats().requests, 1);
        assert!(!stream.is_clipped());

        stream.update(&mut host, 20.0);
        assert!(stream.is_clipped());
        assert_eq!(stream.stats().requests, 1);
    }

    #[test]
    fn test_camera_override_bumps_revision() {
        let desc = SceneDesc::new(vec![NodeDesc::camera("cam", vec![CameraFrame::new(0.0, 40.0, 0.1, 10.0)])]);
        let (mut stream, mut host, _) = setup(desc);
        stream.load(&mut host, true).unwrap();
        stream.update(&mut host, 0.0);
        let before = stream.stats().resamples;

        stream
            .set_camera_overrides(
                "/cam",
                CameraOverrides {
                    ignore_clipping_planes: true,
                    ..Default::default()
                },
            )
            .unwrap();
        stream.update(&mut host, 0.0);
        assert_eq!(stream.stats().resamples, before + 1);

        assert!(matches!(
            stream.set_mesh_overrides("/cam", MeshOverrides::default()),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            stream.set_camera_overrides("/nope", CameraOverrides::default()),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_destroy_node_drops_late_samples() {
        let (mut stream, mut host, _) = setup(moving());
        stream.load(&mut host, true).unwrap();
        assert!(stream.destroy_node("/a"));
        assert!(!stream.destroy_node("/a"));
        stream.update(&mut host, 0.5);
        assert!(stream.proxy("/a").is_none());
        assert_eq!(stream.registry_stats().detached, 1);
    }
}
