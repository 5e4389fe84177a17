//! Node lifecycle: reconcile host objects and proxies with a reader tree.
//!
//! Building walks the reader tree from its root, reusing host objects found
//! by name under their parent and creating the missing ones when asked to.
//! Instances are resolved in a second pass once every proxy exists. After a
//! rebuild, tracked objects that are no longer part of the tree are removed.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::host::{ObjectId, SceneHost};
use crate::proxy::{InstanceLink, NodeData, NodeProxy, Registry};
use crate::reader::{NodeId, NodeKind, SceneReader};

/// Result of one tree build.
#[derive(Debug, Default)]
pub struct TreeBuild {
    /// Proxies keyed by full node path.
    pub proxies: BTreeMap<String, NodeProxy>,
    /// Reader node of each proxy.
    pub handles: BTreeMap<NodeId, String>,
    /// Nodes skipped because their host object is missing.
    pub missing: usize,
    /// Instances that could not be resolved and own their data instead.
    pub instance_fallbacks: usize,
}

impl TreeBuild {
    /// Host objects bound by this build.
    pub fn live_objects(&self) -> HashSet<ObjectId> {
        self.proxies.values().map(|p| p.object).collect()
    }
}

/// Build proxies for every node of `reader` under the host object `root`.
///
/// `previous` holds the proxies of the last build; their per-node overrides
/// carry over to nodes with the same path and kind.
pub fn build_tree(
    reader: &dyn SceneReader,
    host: &mut dyn SceneHost,
    root: ObjectId,
    previous: &BTreeMap<String, NodeProxy>,
    registry: &mut Registry,
    create_missing: bool,
) -> TreeBuild {
    let mut build = TreeBuild::default();
    let mut stack = vec![(reader.root(), root)];

    while let Some((node, parent)) = stack.pop() {
        // Reverse so siblings are visited in reader order.
        for &child in reader.children(node).iter().rev() {
            let Some(info) = reader.node(child) else {
                continue;
            };
            let object = match host.find_child(parent, &info.name) {
                Some(object) => object,
                None if create_missing => host.create_object(Some(parent), &info.name),
                None => {
                    debug!(path = %info.path, "no host object, node skipped");
                    build.missing += 1;
                    continue;
                }
            };

            let mut proxy = NodeProxy::new(info, object);
            if let Some(old) = previous.get(&info.path) {
                carry_overrides(old, &mut proxy);
            }
            build.handles.insert(child, info.path.clone());
            build.proxies.insert(info.path.clone(), proxy);
            stack.push((child, object));
        }
    }

    let handles: Vec<(NodeId, String)> = build.handles.iter().map(|(id, p)| (*id, p.clone())).collect();
    for (handle, path) in handles {
        let link = resolve_instance(&build.proxies, &path, &mut build.instance_fallbacks);
        if let Some(proxy) = build.proxies.get_mut(&path) {
            if let Err(err) = proxy.bind(handle, link, registry) {
                warn!(path, "{err}");
            }
        }
    }
    build
}

/// Link an instanced mesh to its source proxy. Non-mesh instances read their
/// source's samples directly and need no link. A mesh whose source does not
/// resolve to another mesh proxy falls back to owning its data, with one
/// warning.
fn resolve_instance(
    proxies: &BTreeMap<String, NodeProxy>,
    path: &str,
    fallbacks: &mut usize,
) -> Option<InstanceLink> {
    let proxy = proxies.get(path)?;
    let source_path = proxy.instance_source()?;
    if proxy.kind() != NodeKind::Mesh {
        return None;
    }
    match proxies.get(source_path) {
        Some(source) if source.kind() == NodeKind::Mesh && !source.is_instanced() => Some(InstanceLink {
            source_path: source_path.to_string(),
        }),
        Some(source) => {
            warn!(path, source = source_path, kind = %source.kind(), "instance source is not an owning mesh; node owns its data");
            *fallbacks += 1;
            None
        }
        None => {
            warn!(path, source = source_path, "cannot find instance source; node owns its data");
            *fallbacks += 1;
            None
        }
    }
}

fn carry_overrides(old: &NodeProxy, new: &mut NodeProxy) {
    match (&old.data, &mut new.data) {
        (NodeData::Mesh(old), NodeData::Mesh(new)) => new.overrides = old.overrides.clone(),
        (NodeData::Camera(old), NodeData::Camera(new)) => new.overrides = old.overrides.clone(),
        _ => {}
    }
}

/// Destroy every `tracked` object under `root` that is not `live`.
///
/// The walk stops at a removed object; everything else is descended into.
/// Returns the removed objects.
pub fn cleanup_orphans(
    host: &mut dyn SceneHost,
    root: ObjectId,
    tracked: &HashSet<ObjectId>,
    live: &HashSet<ObjectId>,
) -> Vec<ObjectId> {
    let mut doomed = Vec::new();
    for child in host.children(root) {
        collect_orphans(host, child, tracked, live, &mut doomed);
    }
    for &object in &doomed {
        debug!(object = object.0, name = host.name(object).unwrap_or(""), "node no longer in source tree");
        host.destroy_object(object);
    }
    doomed
}

fn collect_orphans(
    host: &dyn SceneHost,
    object: ObjectId,
    tracked: &HashSet<ObjectId>,
    live: &HashSet<ObjectId>,
    doomed: &mut Vec<ObjectId>,
) {
    if tracked.contains(&object) && !live.contains(&object) {
        doomed.push(object);
        return;
    }
    for child in host.children(object) {
        collect_orphans(host, child, tracked, live, doomed);
    }
}
