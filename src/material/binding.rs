//! Bind pending assigned materials to submesh renderer slots.

use tracing::{debug, warn};

use super::{FacesetCache, Facesets};
use crate::host::{MaterialId, ObjectId, SceneHost};
use crate::proxy::Submesh;

/// Result of one binding attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// Nothing pending.
    Nothing,
    /// Materials bound, pending list cleared.
    Bound,
    /// Structural mismatch; nothing was changed and the binding is retried
    /// on the next tick.
    Retry,
}

/// Name of the child object hosting split `index` of mesh `name`.
pub fn split_host_name(name: &str, index: usize) -> String {
    format!("{name}_split_{index}")
}

struct SlotWrite {
    renderer: ObjectId,
    slot: usize,
    material: MaterialId,
    split_index: usize,
}

/// Bind the cache's pending materials onto the renderers of `object`.
///
/// Submeshes with a faceset take the material of that faceset, in slot order
/// within their split. Every renderer is resolved before anything is written,
/// so a mismatch leaves the host untouched.
pub fn bind_materials(
    host: &mut dyn SceneHost,
    object: ObjectId,
    name: &str,
    path: &str,
    submeshes: &[Submesh],
    cache: &mut FacesetCache,
    source_facesets: Option<&Facesets>,
) -> BindOutcome {
    let materials = cache.pending_materials();
    if materials.is_empty() {
        return BindOutcome::Nothing;
    }

    if submeshes.len() < materials.len() {
        warn!(
            path,
            "Not enough submeshes for all assigned materials. ({} material(s) for {} submesh(es))",
            materials.len(),
            submeshes.len()
        );
        return BindOutcome::Retry;
    }

    if source_facesets.is_some_and(|source| source != cache.facesets()) {
        warn!(
            path,
            "Instance facesets differ from source object. Material assignments may lead to unexpected results."
        );
    }

    let mut writes = Vec::with_capacity(submeshes.len());
    let mut split_index = 0;
    let mut slot = 0;
    for submesh in submeshes {
        if submesh.split_index != split_index {
            debug!(path, split = submesh.split_index, "reset submesh slot");
            slot = 0;
        }

        let renderer = match host.find_child(object, &split_host_name(name, submesh.split_index)) {
            None if submesh.split_index > 0 => {
                warn!(path, split = submesh.split_index, "Invalid split index");
                return BindOutcome::Retry;
            }
            None => object,
            Some(child) if submesh.split_index == 0 && !host.is_active(child) => object,
            Some(child) => child,
        };

        if host.materials(renderer).is_none() {
            warn!(path, "No renderer on \"{name}\" to assign materials to");
            return BindOutcome::Retry;
        }

        if let Some(faceset) = submesh.faceset_index {
            let index = faceset.min(materials.len() - 1);
            if index != faceset {
                warn!(
                    path,
                    "Invalid faceset index {faceset}. Use material {index} instead ({} material(s))",
                    materials.len()
                );
            }
            writes.push(SlotWrite {
                renderer,
                slot,
                material: materials[index],
                split_index: submesh.split_index,
            });
        }

        split_index = submesh.split_index;
        slot += 1;
    }

    for write in writes {
        let Some(mut assigned) = host.materials(write.renderer) else {
            continue;
        };
        if write.slot >= assigned.len() {
            let filler = host.default_material(&format!("Material_{}", assigned.len()));
            assigned.resize(write.slot + 1, filler);
        }
        if assigned[write.slot] == write.material {
            continue;
        }
        assigned[write.slot] = write.material;
        host.set_materials(write.renderer, &assigned);

        // A single material on the first split child also goes on the parent.
        if write.split_index == 0 && write.renderer != object && assigned.len() == 1 && host.materials(object).is_some() {
            host.set_materials(object, &assigned);
        }
    }

    cache.clear_pending();
    BindOutcome::Bound
}
