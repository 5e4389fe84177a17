//! Camera applier.

use crate::config::CameraOverrides;
use crate::host::{ObjectId, SceneHost, Transform};
use crate::reader::CameraData;
use crate::util::{Quat, Vec3};

#[derive(Debug, Default)]
pub struct CameraNode {
    pub overrides: CameraOverrides,
    data: CameraData,
    /// `ignore_clipping_planes` at the last apply.
    applied_ignore_clipping: bool,
}

impl CameraNode {
    pub fn data(&self) -> &CameraData {
        &self.data
    }

    /// The clipping option changed since the last apply.
    pub fn options_changed(&self) -> bool {
        self.applied_ignore_clipping != self.overrides.ignore_clipping_planes
    }

    pub(crate) fn store(&mut self, data: CameraData) {
        self.data = data;
    }

    /// Field of view is always applied; clipping planes only when the source
    /// planes are respected. The node transform is forced to a 180 degree yaw
    /// so the camera looks down the source's forward axis.
    pub(crate) fn apply(&mut self, host: &mut dyn SceneHost, object: ObjectId) {
        host.set_local_transform(
            object,
            Transform {
                translation: Vec3::ZERO,
                rotation: Quat::from_rotation_y(std::f32::consts::PI),
                scale: Vec3::ONE,
            },
        );

        let mut camera = host.camera(object);
        camera.field_of_view = self.data.field_of_view;
        if !self.overrides.ignore_clipping_planes {
            camera.near_clipping_plane = self.data.near_clipping_plane;
            camera.far_clipping_plane = self.data.far_clipping_plane;
        }
        host.set_camera(object, camera);
        self.applied_ignore_clipping = self.overrides.ignore_clipping_planes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CameraState, MemoryHost};

    fn sample() -> CameraData {
        CameraData {
            field_of_view: 35.0,
            near_clipping_plane: 0.5,
            far_clipping_plane: 50.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_with_clipping() {
        let mut host = MemoryHost::new();
        let obj = host.create_object(None, "cam");
        let mut node = CameraNode::default();
        node.store(sample());
        node.apply(&mut host, obj);

        let camera = host.object(obj).unwrap().camera.unwrap();
        assert_eq!(camera.field_of_view, 35.0);
        assert_eq!(camera.near_clipping_plane, 0.5);
        assert_eq!(camera.far_clipping_plane, 50.0);

        let local = host.local_transform(obj).unwrap();
        assert!(local.rotation.abs_diff_eq(Quat::from_rotation_y(std::f32::consts::PI), 1e-6));
    }

    #[test]
    fn test_ignore_clipping_planes() {
        let mut host = MemoryHost::new();
        let obj = host.create_object(None, "cam");
        let mut node = CameraNode::default();
        node.overrides.ignore_clipping_planes = true;
        assert!(node.options_changed());
        node.store(sample());
        node.apply(&mut host, obj);
        assert!(!node.options_changed());

        let camera = host.object(obj).unwrap().camera.unwrap();
        assert_eq!(camera.field_of_view, 35.0);
        assert_eq!(camera.near_clipping_plane, CameraState::default().near_clipping_plane);

        node.overrides.ignore_clipping_planes = false;
        assert!(node.options_changed());
    }
}
