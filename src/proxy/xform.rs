//! Transform applier.

use crate::host::{ObjectId, SceneHost, Transform};
use crate::reader::XformData;

#[derive(Debug)]
pub struct XformNode {
    data: XformData,
    fresh_setup: bool,
}

impl Default for XformNode {
    fn default() -> Self {
        Self {
            data: XformData::default(),
            fresh_setup: true,
        }
    }
}

impl XformNode {
    pub fn data(&self) -> &XformData {
        &self.data
    }

    /// No sample consumed since the last (re)bind.
    pub fn is_fresh(&self) -> bool {
        self.fresh_setup
    }

    pub fn reset(&mut self) {
        self.fresh_setup = true;
    }

    pub(crate) fn store(&mut self, data: XformData) {
        self.data = data;
        self.fresh_setup = false;
    }

    /// Inherited transforms are local to the parent; others are world space.
    pub(crate) fn apply(&mut self, host: &mut dyn SceneHost, object: ObjectId) {
        let transform = Transform {
            translation: self.data.translation,
            rotation: self.data.rotation,
            scale: self.data.scale,
        };
        if self.data.inherits {
            host.set_local_transform(object, transform);
        } else {
            host.set_world_transform(object, transform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::util::{Quat, Vec3};

    #[test]
    fn test_local_vs_world() {
        let mut host = MemoryHost::new();
        let parent = host.create_object(None, "p");
        let child = host.create_object(Some(parent), "c");
        host.set_local_transform(
            parent,
            Transform {
                translation: Vec3::new(0.0, 5.0, 0.0),
                ..Transform::IDENTITY
            },
        );

        let mut node = XformNode::default();
        assert!(node.is_fresh());
        node.store(XformData {
            translation: Vec3::new(1.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            inherits: true,
        });
        assert!(!node.is_fresh());
        node.apply(&mut host, child);
        assert_eq!(host.local_transform(child).unwrap().translation, Vec3::new(1.0, 0.0, 0.0));

        let world = XformData {
            inherits: false,
            ..*node.data()
        };
        node.store(world);
        node.apply(&mut host, child);
        let local = host.local_transform(child).unwrap();
        assert!(local.translation.abs_diff_eq(Vec3::new(1.0, -5.0, 0.0), 1e-5));
    }
}
