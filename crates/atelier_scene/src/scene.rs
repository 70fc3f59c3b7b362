// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live scene tree.
//!
//! Nodes are stored in an arena keyed by [`NodeId`]. Parent and child links
//! are identifiers, so replacing the whole arena (undo, load) never leaves a
//! dangling reference behind: anything held outside simply stops resolving.

use crate::node::{NodeId, SceneNode};
use glam::Mat4;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name given to the root of a fresh scene
pub const ROOT_NAME: &str = "Scene";

/// Parent matrices with a smaller determinant are treated as singular
const MIN_PARENT_DETERMINANT: f32 = 1e-12;

/// Structural problems found by [`Scene::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// Root id does not resolve
    #[error("Root node is missing")]
    MissingRoot,

    /// Root claims a parent
    #[error("Root node has a parent")]
    RootHasParent,

    /// Parent and child disagree about their link
    #[error("Broken link between {parent} and {child}")]
    BrokenLink {
        /// Parent side of the link
        parent: NodeId,
        /// Child side of the link
        child: NodeId,
    },

    /// A node appears twice while walking down from the root
    #[error("Cycle detected at {0}")]
    Cycle(NodeId),

    /// A node cannot be reached from the root
    #[error("Node {0} is not reachable from the root")]
    Unreachable(NodeId),

    /// A node is stored under a key other than its own id
    #[error("Node stored under mismatched id {0}")]
    MismatchedId(NodeId),
}

/// The live, mutable scene tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Root node ID
    root: NodeId,
    /// All nodes, root included
    nodes: IndexMap<NodeId, SceneNode>,
}

impl Scene {
    /// Create a scene holding only an empty root group
    pub fn new() -> Self {
        Self::with_root_name(ROOT_NAME)
    }

    /// Create a scene whose root group has the given name
    pub fn with_root_name(name: impl Into<String>) -> Self {
        let root = SceneNode::group(name);
        let id = root.id;
        let mut nodes = IndexMap::new();
        nodes.insert(id, root);
        Self { root: id, nodes }
    }

    /// Root node ID
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    /// Look up a node, logging when it is absent
    pub fn resolve(&self, id: NodeId) -> Option<&SceneNode> {
        let node = self.nodes.get(&id);
        if node.is_none() {
            tracing::debug!("Node {id} not found in scene");
        }
        node
    }

    /// Check whether a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scene holds nothing but its root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// All nodes in storage order
    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    /// Parent of a node
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Ordered children of a node (empty when the node is missing)
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Add a node as the last child of `parent`
    pub fn add_child(&mut self, parent: NodeId, node: SceneNode) -> Option<NodeId> {
        let index = self.children_of(parent).len();
        self.insert_child(parent, index, node)
    }

    /// Add a node as a child of `parent` at `index` (clamped)
    pub fn insert_child(&mut self, parent: NodeId, index: usize, mut node: SceneNode) -> Option<NodeId> {
        if !self.contains(parent) || self.contains(node.id) {
            return None;
        }
        let id = node.id;
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.insert(id, node);
        self.link(id, parent, Some(index));
        Some(id)
    }

    /// True when `ancestor` sits on the path from `node` up to the root.
    /// A node is considered its own ancestor.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            // a corrupted arena must not hang the walk
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.parent_of(id);
        }
        false
    }

    /// Detach a node from its parent, keeping it (and its subtree) in the arena
    pub(crate) fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.parent_of(id) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
    }

    /// Attach a detached node under `parent`, appending when `index` is None
    pub(crate) fn link(&mut self, id: NodeId, parent: NodeId, index: Option<usize>) {
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let index = index
                .unwrap_or(parent_node.children.len())
                .min(parent_node.children.len());
            parent_node.children.insert(index, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent);
        }
    }

    /// Move a node under a new parent, keeping its world transform.
    ///
    /// Under a singular parent (zero scale) there is no local transform that
    /// keeps the world one, so the local transform is left as it is.
    /// Callers must have ruled out cycles.
    pub(crate) fn move_node(&mut self, id: NodeId, parent: NodeId, index: Option<usize>) {
        if let Some(local) = self.compensated_local(id, parent) {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.transform = local;
            }
        }

        self.unlink(id);
        self.link(id, parent, index);
    }

    /// Local transform that keeps `id` in place once it hangs under `parent`
    fn compensated_local(&self, id: NodeId, parent: NodeId) -> Option<crate::node::Transform> {
        let old_parent_world = self.world_matrix(self.parent_of(id)?);
        let new_parent_world = self.world_matrix(parent);
        if old_parent_world.abs_diff_eq(new_parent_world, 1e-6) {
            return None;
        }
        if new_parent_world.determinant().abs() < MIN_PARENT_DETERMINANT {
            tracing::debug!("Parent {parent} is singular, keeping local transform of {id}");
            return None;
        }

        let world = old_parent_world * self.get(id)?.transform.to_matrix();
        let local = crate::node::Transform::from_matrix(new_parent_world.inverse() * world);
        let finite = local
            .position
            .iter()
            .chain(&local.rotation)
            .chain(&local.scale)
            .all(|v| v.is_finite());
        finite.then_some(local)
    }

    /// Remove a node and its whole subtree. The root cannot be removed.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<SceneNode> {
        if id == self.root || !self.contains(id) {
            return Vec::new();
        }
        self.unlink(id);

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.shift_remove(&next) {
                stack.extend(node.children.iter().copied());
                removed.push(node);
            }
        }
        removed
    }

    /// Move another scene's content under `parent`.
    ///
    /// The other scene's root becomes a group named `name`; its id is
    /// returned. Ids that already exist here are skipped with their subtree.
    pub fn graft(&mut self, parent: NodeId, mut other: Scene, name: impl Into<String>) -> Option<NodeId> {
        if !self.contains(parent) || other.nodes.keys().any(|id| self.contains(*id)) {
            tracing::debug!("Refusing to graft scene with colliding ids");
            return None;
        }
        let top = other.root;
        if let Some(root) = other.nodes.get_mut(&top) {
            root.name = name.into();
        }
        for (id, node) in other.nodes {
            self.nodes.insert(id, node);
        }
        self.link(top, parent, None);
        Some(top)
    }

    /// Non-root node IDs in depth-first pre-order
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.children_of(self.root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children_of(id).iter().rev().copied());
        }
        order
    }

    /// Leaf mesh nodes in depth-first order
    pub fn leaf_meshes(&self) -> Vec<NodeId> {
        self.depth_first()
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(SceneNode::is_leaf_mesh))
            .collect()
    }

    /// World matrix of a node (product of every ancestor's local transform)
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(next) = current {
            let Some(node) = self.nodes.get(&next) else {
                break;
            };
            chain.push(node.transform.to_matrix());
            if chain.len() > self.nodes.len() {
                break;
            }
            current = node.parent;
        }
        chain.into_iter().rev().fold(Mat4::IDENTITY, |acc, m| acc * m)
    }

    /// Check every structural invariant of the tree
    pub fn validate(&self) -> Result<(), SceneError> {
        for (key, node) in &self.nodes {
            if *key != node.id {
                return Err(SceneError::MismatchedId(*key));
            }
        }

        let root = self.nodes.get(&self.root).ok_or(SceneError::MissingRoot)?;
        if root.parent.is_some() {
            return Err(SceneError::RootHasParent);
        }

        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(SceneError::Cycle(id));
            }
            for child in self.children_of(id) {
                let linked = self.nodes.get(child).is_some_and(|c| c.parent == Some(id));
                if !linked {
                    return Err(SceneError::BrokenLink {
                        parent: id,
                        child: *child,
                    });
                }
                stack.push(*child);
            }
        }

        if let Some(orphan) = self.nodes.keys().find(|id| !seen.contains(*id)) {
            return Err(SceneError::Unreachable(*orphan));
        }
        Ok(())
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Geometry, Material, Transform};

    fn mesh(name: &str) -> SceneNode {
        SceneNode::mesh(name, Geometry::default(), Material::default())
    }

    #[test]
    fn test_add_and_depth_first() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.add_child(root, SceneNode::group("A")).unwrap();
        let a1 = scene.add_child(a, mesh("A1")).unwrap();
        let b = scene.add_child(root, mesh("B")).unwrap();

        assert_eq!(scene.depth_first(), vec![a, a1, b]);
        assert_eq!(scene.leaf_meshes(), vec![a1, b]);
        assert_eq!(scene.parent_of(a1), Some(a));
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_is_ancestor() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.add_child(root, SceneNode::group("A")).unwrap();
        let b = scene.add_child(a, SceneNode::group("B")).unwrap();

        assert!(scene.is_ancestor(a, b));
        assert!(scene.is_ancestor(b, b));
        assert!(!scene.is_ancestor(b, a));
    }

    #[test]
    fn test_remove_subtree() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.add_child(root, SceneNode::group("A")).unwrap();
        scene.add_child(a, mesh("A1")).unwrap();

        let removed = scene.remove_subtree(a);
        assert_eq!(removed.len(), 2);
        assert_eq!(scene.len(), 1);
        assert!(scene.children_of(root).is_empty());
        assert!(scene.remove_subtree(root).is_empty());
    }

    #[test]
    fn test_move_keeps_world_position() {
        let mut scene = Scene::new();
        let root = scene.root();
        let parent = scene
            .add_child(root, SceneNode::group("P").with_transform(Transform::from_position([10.0, 0.0, 0.0])))
            .unwrap();
        let child = scene
            .add_child(root, mesh("C").with_transform(Transform::from_position([1.0, 0.0, 0.0])))
            .unwrap();

        scene.move_node(child, parent, None);

        let local = scene.get(child).unwrap().transform.position;
        assert!((local[0] + 9.0).abs() < 1e-5);
        let world = scene.world_matrix(child).w_axis;
        assert!((world.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_move_under_zero_scale_parent() {
        let mut scene = Scene::new();
        let root = scene.root();
        let collapsed = Transform {
            scale: [0.0, 0.0, 0.0],
            ..Transform::from_position([3.0, 0.0, 0.0])
        };
        let parent = scene.add_child(root, SceneNode::group("P").with_transform(collapsed)).unwrap();
        let child = scene
            .add_child(root, mesh("C").with_transform(Transform::from_position([1.0, 0.0, 0.0])))
            .unwrap();

        scene.move_node(child, parent, None);

        assert_eq!(scene.parent_of(child), Some(parent));
        assert_eq!(scene.get(child).unwrap().transform, Transform::from_position([1.0, 0.0, 0.0]));
        assert!(scene.world_matrix(child).is_finite());

        // and back out again: the degenerate world must not poison the local
        scene.move_node(child, root, None);
        let transform = scene.get(child).unwrap().transform;
        assert!(transform.position.iter().chain(&transform.rotation).all(|v| v.is_finite()));
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_broken_link() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.add_child(root, mesh("A")).unwrap();
        scene.get_mut(a).unwrap().parent = None;

        assert_eq!(
            scene.validate(),
            Err(SceneError::BrokenLink { parent: root, child: a })
        );
    }

    #[test]
    fn test_graft() {
        let mut scene = Scene::new();
        let mut asset = Scene::with_root_name("asset");
        let asset_root = asset.root();
        asset.add_child(asset_root, mesh("Part")).unwrap();

        let root = scene.root();
        let top = scene.graft(root, asset, "Robot").unwrap();
        assert_eq!(scene.get(top).unwrap().name, "Robot");
        assert_eq!(scene.children_of(top).len(), 1);
        assert!(scene.validate().is_ok());
    }
}
