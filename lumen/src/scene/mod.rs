pub mod camera;
pub mod gltf;
pub mod mesh;

use crate::ren::draw::{DrawContext, RenderObject, Renderable};
use mesh::MeshAsset;

use glam::Mat4;
use slotmap::{SlotMap, new_key_type};
use std::sync::Arc;

new_key_type! {
    pub struct NodeKey;
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Transform,
    Mesh(Arc<MeshAsset>),
}

#[derive(Clone, Debug)]
pub struct Node {
    /// Back-reference used for lookups only; ownership flows parent to child.
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    pub local_transform: Mat4,
    pub world_transform: Mat4,
    pub kind: NodeKind,
}

impl Node {
    fn new(parent: Option<NodeKey>, kind: NodeKind, local_transform: Mat4) -> Self {
        Self {
            parent,
            children: vec![],
            local_transform,
            world_transform: local_transform,
            kind,
        }
    }
}

/// Node hierarchy stored in an arena. Removing a node removes its whole subtree.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, Node>,
    roots: Vec<NodeKey>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node under `parent`, or as a new root, with its world transform composed from
    /// the parent's. Returns `None` when `parent` is no longer in the graph.
    pub fn insert(&mut self, parent: Option<NodeKey>, kind: NodeKind, local_transform: Mat4) -> Option<NodeKey> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return None;
            }
        }

        let mut node = Node::new(parent, kind, local_transform);
        node.world_transform = self.parent_world(parent) * local_transform;

        let key = self.nodes.insert(node);
        match parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(parent) => parent.children.push(key),
            None => self.roots.push(key),
        }
        Some(key)
    }

    /// Re-parents `child` under `parent`. Fails if either is missing or if `parent` lies in
    /// `child`'s subtree.
    pub fn attach(&mut self, parent: NodeKey, child: NodeKey) -> bool {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) || self.is_ancestor(child, parent) {
            return false;
        }

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
        self.roots.retain(|&root| root != child);

        let parent_matrix = self.parent_world(Some(parent));
        self.refresh_transform(child, &parent_matrix);
        true
    }

    fn parent_world(&self, parent: Option<NodeKey>) -> Mat4 {
        parent
            .and_then(|parent| self.nodes.get(parent))
            .map_or(Mat4::IDENTITY, |parent| parent.world_transform)
    }

    fn detach(&mut self, key: NodeKey) {
        let parent = self.nodes.get(key).and_then(|node| node.parent);
        match parent {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(parent) {
                    parent.children.retain(|&child| child != key);
                }
            }
            None => self.roots.retain(|&root| root != key),
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.parent = None;
        }
    }

    fn is_ancestor(&self, ancestor: NodeKey, mut key: NodeKey) -> bool {
        loop {
            if key == ancestor {
                return true;
            }
            match self.nodes.get(key).and_then(|node| node.parent) {
                Some(parent) => key = parent,
                None => return false,
            }
        }
    }

    /// Removes `key` and every descendant. Returns the number of nodes removed.
    pub fn remove(&mut self, key: NodeKey) -> usize {
        if !self.nodes.contains_key(key) {
            return 0;
        }
        self.detach(key);

        let mut removed = 0;
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.remove(key) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        removed
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_local_transform(&mut self, key: NodeKey, local_transform: Mat4) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        node.local_transform = local_transform;
        let parent = node.parent;

        let parent_matrix = self.parent_world(parent);
        self.refresh_transform(key, &parent_matrix);
    }

    /// Recomputes `key`'s world transform from `parent_matrix`, then its descendants.
    pub fn refresh_transform(&mut self, key: NodeKey, parent_matrix: &Mat4) {
        let mut stack = vec![(key, *parent_matrix)];
        while let Some((key, parent_matrix)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            node.world_transform = parent_matrix * node.local_transform;
            let world = node.world_transform;
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }
    }

    pub fn refresh_all(&mut self) {
        for root in self.roots.clone() {
            self.refresh_transform(root, &Mat4::IDENTITY);
        }
    }

    /// Emits render objects for `key` and its subtree. Mesh nodes contribute one object per
    /// surface at `top_matrix * world_transform`.
    pub fn draw_node(&self, key: NodeKey, top_matrix: &Mat4, ctx: &mut DrawContext) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };

        if let NodeKind::Mesh(mesh) = &node.kind {
            let node_matrix = *top_matrix * node.world_transform;
            for surface in &mesh.surfaces {
                ctx.push(RenderObject {
                    index_count: surface.count,
                    first_index: surface.start_index,
                    index_buffer: mesh.buffers.index_buffer,
                    material: surface.material.clone(),
                    bounds: surface.bounds,
                    transform: node_matrix,
                    vertex_buffer_address: mesh.buffers.vertex_buffer_address,
                });
            }
        }

        for &child in &node.children {
            self.draw_node(child, top_matrix, ctx);
        }
    }
}

impl Renderable for SceneGraph {
    fn draw(&self, top_matrix: &Mat4, ctx: &mut DrawContext) {
        for &root in &self.roots {
            self.draw_node(root, top_matrix, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ren::draw::{self, EngineStats, MaterialPass, mock};
    use mesh::{Bounds, GeoSurface, GpuMeshBuffers};

    use ash::vk::{self, Handle};
    use glam::{Quat, Vec3};

    fn mesh(name: &str, index_buffer: u64, triangles: u32, pass: MaterialPass) -> Arc<MeshAsset> {
        let material = mock::material(&mock::pipeline(pass as u64 + 1), index_buffer, pass);
        Arc::new(MeshAsset {
            name: name.to_owned(),
            surfaces: vec![GeoSurface {
                start_index: 0,
                count: triangles * 3,
                bounds: Bounds::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0)),
                material,
            }],
            buffers: GpuMeshBuffers {
                index_buffer: vk::Buffer::from_raw(index_buffer),
                vertex_buffer: vk::Buffer::from_raw(index_buffer + 100),
                vertex_buffer_address: 0x1000 * index_buffer,
            },
        })
    }

    #[test]
    fn refresh_composes_chain_root_to_leaf() {
        let locals = [
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            Mat4::from_quat(Quat::from_rotation_y(0.7)),
            Mat4::from_scale(Vec3::new(2.0, 2.0, 2.0)),
            Mat4::from_translation(Vec3::new(0.0, -3.0, 5.0)),
        ];

        let mut graph = SceneGraph::new();
        let mut parent = None;
        let mut keys = vec![];
        for local in locals {
            let key = graph.insert(parent, NodeKind::Transform, local).unwrap();
            keys.push(key);
            parent = Some(key);
        }
        graph.refresh_all();

        let expected = locals.iter().fold(Mat4::IDENTITY, |acc, local| acc * *local);
        let leaf = graph.get(*keys.last().unwrap()).unwrap();
        assert!(leaf.world_transform.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn changing_an_ancestor_propagates_down() {
        let mut graph = SceneGraph::new();
        let root = graph.insert(None, NodeKind::Transform, Mat4::IDENTITY).unwrap();
        let child = graph
            .insert(Some(root), NodeKind::Transform, Mat4::from_translation(Vec3::X))
            .unwrap();
        graph.refresh_all();

        graph.set_local_transform(root, Mat4::from_translation(Vec3::Y));

        let world = graph.get(child).unwrap().world_transform;
        assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn inserting_under_a_moved_parent_composes_world() {
        let mut graph = SceneGraph::new();
        let parent = graph.insert(None, NodeKind::Transform, Mat4::IDENTITY).unwrap();
        graph.set_local_transform(parent, Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));

        let child = graph
            .insert(Some(parent), NodeKind::Transform, Mat4::from_translation(Vec3::X))
            .unwrap();

        let world = graph.get(child).unwrap().world_transform;
        assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 5.0, 0.0));
    }

    #[test]
    fn attaching_recomputes_the_moved_subtree() {
        let mut graph = SceneGraph::new();
        let parent = graph
            .insert(None, NodeKind::Transform, Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        let child = graph
            .insert(None, NodeKind::Transform, Mat4::from_translation(Vec3::X))
            .unwrap();
        let grandchild = graph
            .insert(Some(child), NodeKind::Transform, Mat4::from_translation(Vec3::Z))
            .unwrap();

        assert!(graph.attach(parent, child));

        let world = graph.get(child).unwrap().world_transform;
        assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 5.0, 0.0));
        let world = graph.get(grandchild).unwrap().world_transform;
        assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 5.0, 1.0));
    }

    #[test]
    fn removing_a_node_removes_its_subtree() {
        let mut graph = SceneGraph::new();
        let root = graph.insert(None, NodeKind::Transform, Mat4::IDENTITY).unwrap();
        let branch = graph.insert(Some(root), NodeKind::Transform, Mat4::IDENTITY).unwrap();
        let leaf = graph.insert(Some(branch), NodeKind::Transform, Mat4::IDENTITY).unwrap();
        let sibling = graph.insert(Some(root), NodeKind::Transform, Mat4::IDENTITY).unwrap();

        assert_eq!(graph.remove(branch), 2);
        assert!(graph.get(leaf).is_none());
        assert_eq!(graph.get(root).unwrap().children, vec![sibling]);
        assert!(graph.insert(Some(branch), NodeKind::Transform, Mat4::IDENTITY).is_none());
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let root = graph.insert(None, NodeKind::Transform, Mat4::IDENTITY).unwrap();
        let child = graph.insert(Some(root), NodeKind::Transform, Mat4::IDENTITY).unwrap();
        let other = graph.insert(None, NodeKind::Transform, Mat4::IDENTITY).unwrap();

        assert!(!graph.attach(child, root));
        assert!(graph.attach(child, other));
        assert_eq!(graph.roots(), &[root]);
        assert_eq!(graph.get(other).unwrap().parent, Some(child));
    }

    #[test]
    fn mesh_nodes_emit_one_object_per_surface_under_top_matrix() {
        let mut graph = SceneGraph::new();
        let root = graph
            .insert(None, NodeKind::Transform, Mat4::from_translation(Vec3::Z))
            .unwrap();
        graph
            .insert(Some(root), NodeKind::Mesh(mesh("quad", 1, 2, MaterialPass::MainColor)), Mat4::IDENTITY)
            .unwrap();
        graph.refresh_all();

        let top = Mat4::from_translation(Vec3::X);
        let mut ctx = DrawContext::default();
        graph.draw(&top, &mut ctx);

        assert_eq!(ctx.opaque_surfaces.len(), 1);
        let object = &ctx.opaque_surfaces[0];
        assert_eq!(object.transform.w_axis.truncate(), Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(object.vertex_buffer_address, 0x1000);
    }

    #[test]
    fn traverse_and_submit_counts_draws_and_triangles() {
        let mut graph = SceneGraph::new();
        let at = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        graph.insert(None, NodeKind::Mesh(mesh("opaque", 1, 2, MaterialPass::MainColor)), at);
        graph.insert(None, NodeKind::Mesh(mesh("glass", 2, 1, MaterialPass::Transparent)), at);
        graph.refresh_all();

        let mut ctx = DrawContext::default();
        draw::traverse(&[&graph], &Mat4::IDENTITY, &mut ctx);
        assert_eq!(ctx.opaque_surfaces.len(), 1);
        assert_eq!(ctx.transparent_surfaces.len(), 1);

        let mut recorder = mock::Recorder::default();
        let mut stats = EngineStats::default();
        draw::submit(&mut ctx, &mock::view_proj(), &mut recorder, &mut stats);

        assert_eq!(stats.drawcall_count, 2);
        assert_eq!(stats.triangle_count, 3);
        assert!(ctx.is_empty());
    }
}
