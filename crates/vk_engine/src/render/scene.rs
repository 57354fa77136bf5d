//! Scene graph
//!
//! Nodes live in a slot map and refer to each other by key: a node stores its
//! parent's key and the keys of its children, never references. Meshes live
//! in a second slot map so that several nodes can draw the same asset.
//!
//! World transforms are cached. Call [`SceneGraph::refresh_transforms`] after
//! changing local transforms or the hierarchy, then [`SceneGraph::draw`] to
//! collect [`RenderObject`]s.

use ash::vk;
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::foundation::math::Mat4;
use crate::render::mesh::MeshAsset;
use crate::render::vulkan::deletion_queue::DeletionQueue;

new_key_type! {
    /// Handle to a node in a [`SceneGraph`]
    pub struct NodeKey;

    /// Handle to a mesh owned by a [`SceneGraph`]
    pub struct MeshKey;
}

/// Scene graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A key did not refer to a live node
    #[error("Unknown scene node")]
    UnknownNode,

    /// A key did not refer to a registered mesh
    #[error("Unknown mesh")]
    UnknownMesh,

    /// The requested parent is the node itself or one of its descendants
    #[error("Reparenting would create a cycle")]
    Cycle,
}

/// What a node contributes when drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Grouping node with a transform only
    Empty,
    /// Draws every surface of a mesh
    Mesh(MeshKey),
}

/// One entry of the hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    /// Name used by [`SceneGraph::find_node`]
    pub name: String,
    /// What the node draws
    pub kind: NodeKind,
    /// Transform relative to the parent
    pub local_transform: Mat4,
    world_transform: Mat4,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl Node {
    /// Transform to world space as of the last refresh
    pub fn world_transform(&self) -> &Mat4 {
        &self.world_transform
    }

    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }
}

/// A single indexed draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    /// Indices to draw
    pub index_count: u32,
    /// Offset into the index buffer
    pub first_index: u32,
    /// Index buffer to bind
    pub index_buffer: vk::Buffer,
    /// Final world matrix
    pub transform: Mat4,
    /// Vertex buffer address pushed to the shader
    pub vertex_buffer_address: vk::DeviceAddress,
}

/// Draws collected for one frame
#[derive(Debug, Default)]
pub struct DrawContext {
    /// Opaque draws, in traversal order
    pub opaque_surfaces: Vec<RenderObject>,
}

impl DrawContext {
    /// Forget last frame's draws, keeping the allocation
    pub fn clear(&mut self) {
        self.opaque_surfaces.clear();
    }
}

/// Arena-backed node hierarchy
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, Node>,
    meshes: SlotMap<MeshKey, MeshAsset>,
    roots: Vec<NodeKey>,
}

impl SceneGraph {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `mesh` so nodes can draw it
    pub fn add_mesh(&mut self, mesh: MeshAsset) -> MeshKey {
        self.meshes.insert(mesh)
    }

    /// Mesh stored under `key`
    pub fn mesh(&self, key: MeshKey) -> Option<&MeshAsset> {
        self.meshes.get(key)
    }

    /// Find a mesh by name
    pub fn find_mesh(&self, name: &str) -> Option<MeshKey> {
        self.meshes
            .iter()
            .find(|(_, mesh)| mesh.name == name)
            .map(|(key, _)| key)
    }

    /// Insert a node under `parent`, or as a root when `parent` is `None`
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        local_transform: Mat4,
        parent: Option<NodeKey>,
    ) -> Result<NodeKey, SceneError> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(SceneError::UnknownNode);
            }
        }
        if let NodeKind::Mesh(mesh) = kind {
            if !self.meshes.contains_key(mesh) {
                return Err(SceneError::UnknownMesh);
            }
        }

        let key = self.nodes.insert(Node {
            name: name.into(),
            kind,
            local_transform,
            world_transform: local_transform,
            parent,
            children: Vec::new(),
        });
        self.attach(key, parent);
        Ok(key)
    }

    /// Node stored under `key`
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Mutable access to a node, e.g. to move it
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    /// Find a node by name
    pub fn find_node(&self, name: &str) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(key, _)| key)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the scene has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes without a parent, in insertion order
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Move `child` under `new_parent`, or to the root list
    pub fn set_parent(&mut self, child: NodeKey, new_parent: Option<NodeKey>) -> Result<(), SceneError> {
        if !self.nodes.contains_key(child) {
            return Err(SceneError::UnknownNode);
        }
        if let Some(parent) = new_parent {
            if !self.nodes.contains_key(parent) {
                return Err(SceneError::UnknownNode);
            }
            if self.is_ancestor_or_self(child, parent) {
                return Err(SceneError::Cycle);
            }
        }

        self.detach(child);
        self.attach(child, new_parent);
        Ok(())
    }

    /// Remove `key` and its whole subtree
    pub fn remove_node(&mut self, key: NodeKey) -> Result<(), SceneError> {
        if !self.nodes.contains_key(key) {
            return Err(SceneError::UnknownNode);
        }
        self.detach(key);

        let mut stack = vec![key];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Recompute every world transform from `root_matrix` down
    pub fn refresh_transforms(&mut self, root_matrix: &Mat4) {
        let mut stack: Vec<(NodeKey, Mat4)> =
            self.roots.iter().rev().map(|&key| (key, *root_matrix)).collect();

        while let Some((key, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            node.world_transform = parent_world * node.local_transform;
            let world = node.world_transform;
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }

    /// Append a render object for every mesh surface in the graph
    ///
    /// `top_matrix` is applied on top of the cached world transforms.
    pub fn draw(&self, top_matrix: &Mat4, context: &mut DrawContext) {
        let mut stack: Vec<NodeKey> = self.roots.iter().rev().copied().collect();

        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if let NodeKind::Mesh(mesh_key) = node.kind {
                if let Some(mesh) = self.meshes.get(mesh_key) {
                    let transform = top_matrix * node.world_transform;
                    context
                        .opaque_surfaces
                        .extend(mesh.surfaces.iter().map(|surface| RenderObject {
                            index_count: surface.count,
                            first_index: surface.start_index,
                            index_buffer: mesh.mesh_buffers.index_buffer.buffer,
                            transform,
                            vertex_buffer_address: mesh.mesh_buffers.vertex_buffer_address,
                        }));
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Drop every node and hand every mesh's buffers to `queue`
    pub fn release_into(&mut self, queue: &mut DeletionQueue) {
        self.nodes.clear();
        self.roots.clear();
        for (_, mesh) in self.meshes.drain() {
            mesh.mesh_buffers.release_into(queue);
        }
    }

    fn attach(&mut self, key: NodeKey, parent: Option<NodeKey>) {
        let parent = parent.filter(|&p| self.nodes.contains_key(p));
        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent_node) => parent_node.children.push(key),
            None => self.roots.push(key),
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.parent = parent;
        }
    }

    fn detach(&mut self, key: NodeKey) {
        let parent = self.nodes.get(key).and_then(|node| node.parent);
        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent_node) => parent_node.children.retain(|&child| child != key),
            None => self.roots.retain(|&root| root != key),
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeKey, mut node: NodeKey) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}
