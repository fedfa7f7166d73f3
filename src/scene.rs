//! Scene graph: a flat node arena with parent links.
//!
//! Nodes are appended once and never removed; the demo only ever hides the
//! reticle, it does not delete anything.

use glam::{Mat4, Quat, Vec3};

use crate::geometry::MeshData;

/// Handle into [`Scene::nodes`]. Stable for the scene's lifetime since nodes
/// are never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Handle into [`Scene::meshes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(u32);

impl MeshId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Rebuild a handle from an index previously taken with
    /// [`MeshId::index`]. Valid because meshes are never removed.
    pub fn from_index(index: usize) -> Self {
        MeshId(index as u32)
    }
}

/// Shaded material parameters (phong-ish, matching the demo's look).
#[derive(Clone, Copy, Debug)]
pub struct Material {
    pub color: Vec3,
    pub shininess: f32,
    pub opacity: f32,
    /// Skip lighting entirely (the reticle renders as a plain white ring).
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            shininess: 0.0,
            opacity: 1.0,
            unlit: false,
        }
    }
}

/// Sky/ground gradient light.
#[derive(Clone, Copy, Debug)]
pub struct HemisphereLight {
    pub sky_color: Vec3,
    pub ground_color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

pub struct Node {
    pub position: Vec3,
    pub rotation: Quat,
    pub visible: bool,
    pub parent: Option<NodeId>,
    pub mesh: Option<MeshId>,
    pub material: Material,
    /// When set, the local transform is this matrix verbatim and the
    /// position/rotation components are ignored. The reticle is posed this
    /// way every frame from resolved hit-test matrices.
    explicit_matrix: Option<Mat4>,
}

impl Node {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            visible: true,
            parent: None,
            mesh: None,
            material: Material::default(),
            explicit_matrix: None,
        }
    }

    pub fn with_mesh(mesh: MeshId, material: Material) -> Self {
        Self {
            mesh: Some(mesh),
            material,
            ..Self::new()
        }
    }

    /// Overwrite the local transform with an explicit matrix. Component
    /// fields stop contributing until [`Node::clear_matrix`] is called.
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.explicit_matrix = Some(matrix);
    }

    pub fn clear_matrix(&mut self) {
        self.explicit_matrix = None;
    }

    pub fn local_matrix(&self) -> Mat4 {
        match self.explicit_matrix {
            Some(m) => m,
            None => Mat4::from_rotation_translation(self.rotation, self.position),
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Scene {
    nodes: Vec<Node>,
    meshes: Vec<MeshData>,
    pub light: HemisphereLight,
}

impl Scene {
    pub fn new(light: HemisphereLight) -> Self {
        Self {
            nodes: Vec::new(),
            meshes: Vec::new(),
            light,
        }
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() as u32 - 1)
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn mesh(&self, id: MeshId) -> &MeshData {
        &self.meshes[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Walk parent links up to the root and accumulate the world transform.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        let local = node.local_matrix();
        match node.parent {
            Some(parent) => self.world_matrix(parent) * local,
            None => local,
        }
    }

    /// A node renders when it and every ancestor are visible.
    pub fn effectively_visible(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if !node.visible {
            return false;
        }
        match node.parent {
            Some(parent) => self.effectively_visible(parent),
            None => true,
        }
    }

    /// Iterate ids of all nodes in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{generate_ring, RingOptions};

    fn test_light() -> HemisphereLight {
        HemisphereLight {
            sky_color: Vec3::ONE,
            ground_color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::Y,
        }
    }

    #[test]
    fn world_matrix_composes_parent_chain() {
        let mut scene = Scene::new(test_light());

        let mut root = Node::new();
        root.position = Vec3::new(0.0, 5.0, 0.0);
        let root_id = scene.add_node(root);

        let mut child = Node::new();
        child.position = Vec3::new(1.0, 0.0, 0.0);
        child.parent = Some(root_id);
        let child_id = scene.add_node(child);

        let world = scene.world_matrix(child_id);
        let origin = world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn explicit_matrix_overrides_components() {
        let mut scene = Scene::new(test_light());
        let mesh = scene.add_mesh(generate_ring(RingOptions::default()));

        let id = scene.add_node(Node::with_mesh(mesh, Material::default()));
        scene.node_mut(id).position = Vec3::new(9.0, 9.0, 9.0);

        let pose = Mat4::from_translation(Vec3::new(0.0, 1.0, -2.0));
        scene.node_mut(id).set_matrix(pose);

        assert_eq!(scene.world_matrix(id), pose);

        scene.node_mut(id).clear_matrix();
        let origin = scene.world_matrix(id).transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(9.0, 9.0, 9.0)).length() < 1e-6);
    }

    #[test]
    fn hidden_parent_hides_children() {
        let mut scene = Scene::new(test_light());

        let root_id = scene.add_node(Node::new());
        let mut child = Node::new();
        child.parent = Some(root_id);
        let child_id = scene.add_node(child);

        assert!(scene.effectively_visible(child_id));
        scene.node_mut(root_id).visible = false;
        assert!(!scene.effectively_visible(child_id));
    }
}
