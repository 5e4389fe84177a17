//! In-memory scene host.

use std::collections::{BTreeMap, HashMap};

use super::{CameraState, MaterialId, MeshId, MeshVertices, ObjectId, SceneHost, Transform};
use crate::config::AspectRatioMode;
use crate::util::{Bounds, Mat4, Vec2, Vec3, Vec4};

/// Point arrays published by a points node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub ids: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct HostObject {
    pub name: String,
    pub parent: Option<ObjectId>,
    pub children: Vec<ObjectId>,
    pub active: bool,
    pub local: Transform,
    pub camera: Option<CameraState>,
    pub mesh: Option<MeshId>,
    /// `None` when the object has no renderer.
    pub renderer: Option<Vec<MaterialId>>,
    pub points: Option<PointCloud>,
}

impl HostObject {
    fn new(name: &str, parent: Option<ObjectId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            active: true,
            local: Transform::IDENTITY,
            camera: None,
            mesh: None,
            renderer: None,
            points: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct HostMesh {
    /// Object the mesh was created on.
    pub owner: ObjectId,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub tangents: Vec<Vec4>,
    pub bounds: Bounds,
    pub submeshes: Vec<Vec<u32>>,
    pub normals_recalculated: usize,
}

/// Mutation counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostStats {
    pub objects_created: usize,
    pub meshes_created: usize,
    pub vertex_uploads: usize,
    pub mesh_clears: usize,
    pub index_uploads: usize,
    /// Every `destroy_object` target, in call order.
    pub destroyed: Vec<ObjectId>,
}

/// Complete scene graph kept in memory.
#[derive(Debug)]
pub struct MemoryHost {
    objects: BTreeMap<ObjectId, HostObject>,
    meshes: HashMap<MeshId, HostMesh>,
    materials: Vec<String>,
    next_id: u64,
    resolution: (u32, u32),
    stats: HostStats,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            meshes: HashMap::new(),
            materials: Vec::new(),
            next_id: 1,
            resolution: (1920, 1080),
            stats: HostStats::default(),
        }
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = (width, height);
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    pub fn object(&self, id: ObjectId) -> Option<&HostObject> {
        self.objects.get(&id)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&HostMesh> {
        self.meshes.get(&id)
    }

    pub fn material_name(&self, id: MaterialId) -> Option<&str> {
        self.materials.get(id.0 as usize).map(String::as_str)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Resolve a `/`-separated path of child names below `root`.
    pub fn find_path(&self, root: ObjectId, path: &str) -> Option<ObjectId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(root, |obj, name| self.find_child(obj, name))
    }

    /// Remove the renderer from an object, leaving its mesh in place.
    pub fn remove_renderer(&mut self, object: ObjectId) {
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.renderer = None;
        }
    }

    pub fn local_transform(&self, object: ObjectId) -> Option<Transform> {
        self.objects.get(&object).map(|o| o.local)
    }

    pub fn world_matrix(&self, object: ObjectId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(object);
        while let Some(id) = current {
            let Some(obj) = self.objects.get(&id) else {
                break;
            };
            matrix = obj.local.to_matrix() * matrix;
            current = obj.parent;
        }
        matrix
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn add_material(&mut self, name: &str) -> MaterialId {
        self.materials.push(name.to_string());
        MaterialId(self.materials.len() as u64 - 1)
    }

    fn collect_subtree(&self, object: ObjectId, out: &mut Vec<ObjectId>) {
        out.push(object);
        if let Some(obj) = self.objects.get(&object) {
            for child in &obj.children {
                self.collect_subtree(*child, out);
            }
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHost for MemoryHost {
    fn create_object(&mut self, parent: Option<ObjectId>, name: &str) -> ObjectId {
        let id = ObjectId(self.alloc_id());
        self.objects.insert(id, HostObject::new(name, parent));
        if let Some(parent) = parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.push(id);
        }
        self.stats.objects_created += 1;
        id
    }

    fn find_child(&self, parent: ObjectId, name: &str) -> Option<ObjectId> {
        self.objects
            .get(&parent)?
            .children
            .iter()
            .copied()
            .find(|c| self.objects.get(c).is_some_and(|o| o.name == name))
    }

    fn children(&self, object: ObjectId) -> Vec<ObjectId> {
        self.objects
            .get(&object)
            .map(|o| o.children.clone())
            .unwrap_or_default()
    }

    fn name(&self, object: ObjectId) -> Option<&str> {
        self.objects.get(&object).map(|o| o.name.as_str())
    }

    fn exists(&self, object: ObjectId) -> bool {
        self.objects.contains_key(&object)
    }

    fn destroy_object(&mut self, object: ObjectId) {
        self.stats.destroyed.push(object);
        let Some(parent) = self.objects.get(&object).map(|o| o.parent) else {
            return;
        };
        if let Some(parent) = parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.retain(|c| *c != object);
        }
        let mut doomed = Vec::new();
        self.collect_subtree(object, &mut doomed);
        for id in &doomed {
            self.objects.remove(id);
        }
        self.meshes.retain(|_, mesh| !doomed.contains(&mesh.owner));
    }

    fn set_active(&mut self, object: ObjectId, active: bool) {
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.active = active;
        }
    }

    fn is_active(&self, object: ObjectId) -> bool {
        self.objects.get(&object).is_some_and(|o| o.active)
    }

    fn set_local_transform(&mut self, object: ObjectId, transform: Transform) {
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.local = transform;
        }
    }

    fn set_world_transform(&mut self, object: ObjectId, transform: Transform) {
        let parent_world = self
            .objects
            .get(&object)
            .and_then(|o| o.parent)
            .map(|p| self.world_matrix(p))
            .unwrap_or(Mat4::IDENTITY);
        let local = parent_world.inverse() * transform.to_matrix();
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.local = Transform::from_matrix(&local);
        }
    }

    fn camera(&mut self, object: ObjectId) -> CameraState {
        match self.objects.get_mut(&object) {
            Some(obj) => *obj.camera.get_or_insert_with(CameraState::default),
            None => CameraState::default(),
        }
    }

    fn set_camera(&mut self, object: ObjectId, camera: CameraState) {
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.camera = Some(camera);
        }
    }

    fn mesh_of(&self, object: ObjectId) -> Option<MeshId> {
        self.objects.get(&object)?.mesh
    }

    fn attach_mesh(&mut self, object: ObjectId) -> MeshId {
        if let Some(mesh) = self.mesh_of(object).filter(|m| self.meshes.contains_key(m)) {
            return mesh;
        }
        let mesh = MeshId(self.alloc_id());
        self.meshes.insert(
            mesh,
            HostMesh {
                owner: object,
                ..Default::default()
            },
        );
        let material = self.default_material("Material_0");
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.mesh = Some(mesh);
            obj.renderer = Some(vec![material]);
        }
        self.stats.meshes_created += 1;
        mesh
    }

    fn share_mesh(&mut self, source: ObjectId, target: ObjectId) {
        let Some((mesh, renderer)) = self.objects.get(&source).map(|o| (o.mesh, o.renderer.clone())) else {
            return;
        };
        if let Some(obj) = self.objects.get_mut(&target) {
            match mesh {
                Some(mesh) if obj.mesh.is_none() => obj.mesh = Some(mesh),
                None => obj.mesh = None,
                _ => {}
            }
            match renderer {
                Some(materials) if obj.renderer.is_none() => obj.renderer = Some(materials),
                None => obj.renderer = None,
                _ => {}
            }
        }
    }

    fn clear_mesh(&mut self, mesh: MeshId) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            let owner = m.owner;
            *m = HostMesh {
                owner,
                ..Default::default()
            };
            self.stats.mesh_clears += 1;
        }
    }

    fn upload_vertices(&mut self, mesh: MeshId, vertices: MeshVertices<'_>) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            copy_into(&mut m.positions, vertices.positions);
            copy_into(&mut m.normals, vertices.normals);
            copy_into(&mut m.uvs, vertices.uvs);
            copy_into(&mut m.tangents, vertices.tangents);
            m.bounds = vertices.bounds;
            self.stats.vertex_uploads += 1;
        }
    }

    fn set_submesh_count(&mut self, mesh: MeshId, count: usize) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.submeshes.resize_with(count, Vec::new);
        }
    }

    fn set_submesh_indices(&mut self, mesh: MeshId, submesh: usize, indices: &[u32]) {
        if let Some(slot) = self.meshes.get_mut(&mesh).and_then(|m| m.submeshes.get_mut(submesh)) {
            slot.clear();
            slot.extend_from_slice(indices);
            self.stats.index_uploads += 1;
        }
    }

    fn recalculate_normals(&mut self, mesh: MeshId) {
        let Some(m) = self.meshes.get_mut(&mesh) else {
            return;
        };
        let mut normals = vec![Vec3::ZERO; m.positions.len()];
        for tri in m.submeshes.iter().flat_map(|s| s.chunks_exact(3)) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a.max(b).max(c) >= m.positions.len() {
                continue;
            }
            let n = (m.positions[b] - m.positions[a]).cross(m.positions[c] - m.positions[a]);
            for v in [a, b, c] {
                normals[v] += n;
            }
        }
        m.normals = normals.into_iter().map(|n| n.normalize_or_zero()).collect();
        m.normals_recalculated += 1;
    }

    fn materials(&self, object: ObjectId) -> Option<Vec<MaterialId>> {
        self.objects.get(&object)?.renderer.clone()
    }

    fn set_materials(&mut self, object: ObjectId, materials: &[MaterialId]) {
        if let Some(renderer) = self.objects.get_mut(&object).and_then(|o| o.renderer.as_mut()) {
            renderer.clear();
            renderer.extend_from_slice(materials);
        }
    }

    fn default_material(&mut self, name: &str) -> MaterialId {
        self.add_material(name)
    }

    fn find_or_create_material(&mut self, name: &str) -> MaterialId {
        match self.materials.iter().position(|m| m == name) {
            Some(i) => MaterialId(i as u64),
            None => self.add_material(name),
        }
    }

    fn set_points(&mut self, object: ObjectId, positions: &[Vec3], velocities: &[Vec3], ids: &[u64]) {
        if let Some(obj) = self.objects.get_mut(&object) {
            let cloud = obj.points.get_or_insert_with(PointCloud::default);
            copy_into(&mut cloud.positions, positions);
            copy_into(&mut cloud.velocities, velocities);
            copy_into(&mut cloud.ids, ids);
        }
    }

    fn aspect_ratio(&self, mode: AspectRatioMode) -> f32 {
        match mode {
            AspectRatioMode::CurrentResolution => {
                let (w, h) = self.resolution;
                if h == 0 {
                    1.0
                } else {
                    w as f32 / h as f32
                }
            }
            AspectRatioMode::DefaultResolution => 16.0 / 9.0,
            // Zero asks the reader for the camera's own aperture ratio.
            AspectRatioMode::CameraAperture => 0.0,
        }
    }
}

/// Copy a slice into a vector, reusing its allocation.
fn copy_into<T: Clone>(dst: &mut Vec<T>, src: &[T]) {
    dst.clear();
    dst.extend_from_slice(src);
}
