//! # Scene Graph: Named Nodes, Parenting, World Transforms
//!
//! The override engine never owns the live graph. It talks to it through the
//! [`SceneGraph`] trait, implemented by the host runtime. [`SceneTree`] is a
//! small in-memory implementation used for tooling and tests.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tree = SceneTree::new();
//! let root = tree.spawn_root("NPC Root", NodeTransform::IDENTITY);
//! let pelvis = tree.spawn_child(root, "Pelvis", NodeTransform::from_xyz(0.0, 0.0, 60.0));
//!
//! // After update_world_transforms, pelvis's world transform reflects the
//! // combined root + pelvis transform.
//! tree.update_world_transforms(root);
//! ```
//!
//! ## Threading
//!
//! Graph writes (local transforms, re-parenting, world refresh) are only safe
//! on the thread that owns the graph. Nothing here is `Sync`-guarded; callers
//! running on worker threads must route mutations through a
//! [`TaskQueue`](crate::task::TaskQueue).

use std::collections::{HashMap, VecDeque};

use crate::math::NodeTransform;
use crate::visit::Visit;

/// Identifies a node within one scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Scene graph collaborator.
pub trait SceneGraph {
    /// Node name, if it has one.
    fn name(&self, node: NodeId) -> Option<&str>;

    /// Child nodes, in order.
    fn children(&self, node: NodeId) -> &[NodeId];

    fn local_transform(&self, node: NodeId) -> Option<NodeTransform>;

    /// Overwrite a node's local transform. Returns `false` if the node is gone.
    fn set_local_transform(&mut self, node: NodeId, transform: NodeTransform) -> bool;

    /// Move `node` under `new_parent`, keeping its local transform. Returns
    /// `false` if either node is gone or the move would create a cycle.
    fn reparent(&mut self, node: NodeId, new_parent: NodeId) -> bool;

    /// String-list metadata attached to a node under `tag`.
    fn extra_strings(&self, node: NodeId, tag: &str) -> Option<&[String]>;

    /// Recompute world transforms for the subtree under `root`.
    fn update_world_transforms(&mut self, root: NodeId);

    /// Depth-first, pre-order walk from `root`. Stops when the visitor
    /// returns anything but [`Visit::Continue`] and reports that outcome.
    fn visit_depth_first(&self, root: NodeId, visitor: &mut dyn FnMut(NodeId) -> Visit) -> Visit {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let visit = visitor(node);
            if visit.is_stop() {
                return visit;
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        Visit::Continue
    }

    /// Find the first node named `name` under `root` (inclusive). A root
    /// that is gone aborts the search.
    fn find_node(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let mut found = None;
        let outcome = self.visit_depth_first(root, &mut |node| {
            if self.local_transform(node).is_none() {
                Visit::Abort
            } else if self.name(node) == Some(name) {
                found = Some(node);
                Visit::Found
            } else {
                Visit::Continue
            }
        });
        if outcome.is_found() { found } else { None }
    }
}

// ── SceneTree ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SceneNode {
    name: Option<String>,
    local: NodeTransform,
    world: NodeTransform,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    extra: HashMap<String, Vec<String>>,
    alive: bool,
}

/// In-memory [`SceneGraph`].
///
/// Node ids are indices into a `Vec` and are never reused, so a despawned id
/// stays dead.
#[derive(Debug, Clone, Default)]
pub struct SceneTree {
    nodes: Vec<SceneNode>,
}

impl SceneTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0 as usize).filter(|n| n.alive)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0 as usize).filter(|n| n.alive)
    }

    fn push(&mut self, name: &str, local: NodeTransform, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SceneNode {
            name: (!name.is_empty()).then(|| name.to_string()),
            local,
            world: local,
            parent,
            children: Vec::new(),
            extra: HashMap::new(),
            alive: true,
        });
        id
    }

    /// Add a parentless node. An empty name leaves the node unnamed.
    pub fn spawn_root(&mut self, name: &str, local: NodeTransform) -> NodeId {
        self.push(name, local, None)
    }

    /// Add a node under `parent`. Returns `None` if the parent is gone.
    pub fn spawn_child(&mut self, parent: NodeId, name: &str, local: NodeTransform) -> Option<NodeId> {
        self.node(parent)?;
        let id = self.push(name, local, Some(parent));
        self.node_mut(parent)?.children.push(id);
        Some(id)
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    /// World transform as of the last [`update_world_transforms`](SceneGraph::update_world_transforms).
    pub fn world_transform(&self, node: NodeId) -> Option<NodeTransform> {
        self.node(node).map(|n| n.world)
    }

    pub fn set_extra_strings(&mut self, node: NodeId, tag: &str, strings: Vec<String>) {
        if let Some(n) = self.node_mut(node) {
            n.extra.insert(tag.to_string(), strings);
        }
    }

    /// Despawn a node and its whole subtree.
    pub fn despawn_recursive(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node) {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|&c| c != node);
            }
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.node_mut(id) {
                n.alive = false;
                stack.extend(n.children.drain(..));
            }
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}

impl SceneGraph for SceneTree {
    fn name(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.name.as_deref()
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn local_transform(&self, node: NodeId) -> Option<NodeTransform> {
        self.node(node).map(|n| n.local)
    }

    fn set_local_transform(&mut self, node: NodeId, transform: NodeTransform) -> bool {
        match self.node_mut(node) {
            Some(n) => {
                n.local = transform;
                true
            }
            None => false,
        }
    }

    fn reparent(&mut self, node: NodeId, new_parent: NodeId) -> bool {
        if !self.is_alive(node) || !self.is_alive(new_parent) || self.is_ancestor(node, new_parent) {
            return false;
        }
        if let Some(old) = self.parent(node) {
            if let Some(p) = self.node_mut(old) {
                p.children.retain(|&c| c != node);
            }
        }
        if let Some(p) = self.node_mut(new_parent) {
            p.children.push(node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = Some(new_parent);
        }
        true
    }

    fn extra_strings(&self, node: NodeId, tag: &str) -> Option<&[String]> {
        self.node(node)?.extra.get(tag).map(Vec::as_slice)
    }

    /// Propagate local transforms down from `root`.
    ///
    /// - `root` combines with its parent's current world transform (identity
    ///   if it has none).
    /// - Children get `world = parent_world * child_local`.
    /// - Traversal is BFS so parents are computed before children.
    fn update_world_transforms(&mut self, root: NodeId) {
        let parent_world = self
            .parent(root)
            .and_then(|p| self.world_transform(p))
            .unwrap_or(NodeTransform::IDENTITY);

        let mut queue: VecDeque<(NodeId, NodeTransform)> = VecDeque::new();
        queue.push_back((root, parent_world));

        while let Some((id, parent_world)) = queue.pop_front() {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            let world = parent_world * node.local;
            node.world = world;
            for &child in &node.children {
                queue.push_back((child, world));
            }
        }
    }
}
