// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural mutations of the live tree.
//!
//! Every operation validates first and mutates only once it knows it will
//! succeed, so a `false`/`None` result means the tree was not touched.
//! Unknown ids and structurally invalid requests are skipped with a debug log.
//! These functions do not snapshot; [`crate::store::SceneStore`] wraps them
//! with undo support.

use crate::geometry;
use crate::node::{NodeId, NodeKind, SceneNode, Transform};
use crate::scene::Scene;
use crate::selection::Selection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name given to containers created by [`group`]
pub const DEFAULT_GROUP_NAME: &str = "New Group";

/// One entry of a bulk grouping request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Name of the container to create
    pub name: String,
    /// Nodes to move under it
    pub ids: Vec<NodeId>,
}

impl GroupSpec {
    /// Create a new group spec
    pub fn new(name: impl Into<String>, ids: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            ids,
        }
    }
}

/// Rename a node. Empty names and unchanged names are ignored.
pub fn rename(scene: &mut Scene, id: NodeId, new_name: &str) -> bool {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        tracing::debug!("Ignoring empty name for {id}");
        return false;
    }
    let Some(node) = scene.get_mut(id) else {
        tracing::debug!("Rename target {id} not found");
        return false;
    };
    if node.name == new_name {
        return false;
    }
    node.name = new_name.to_string();
    true
}

/// Group nodes under a new container.
///
/// The container goes into the first resolved node's parent, at that node's
/// position. Nodes with a different parent are moved in as well. Nodes that
/// would end up containing the container itself are skipped. The container
/// becomes the sole selection.
pub fn group(scene: &mut Scene, selection: &mut Selection, ids: &[NodeId]) -> Option<NodeId> {
    let mut resolved: Vec<NodeId> = Vec::new();
    for id in ids {
        if resolved.contains(id) {
            continue;
        }
        match scene.resolve(*id) {
            Some(node) if node.parent.is_some() => resolved.push(*id),
            Some(_) => tracing::debug!("Cannot group parentless node {id}"),
            None => {}
        }
    }

    let first = *resolved.first()?;
    let parent = scene.parent_of(first)?;
    resolved.retain(|id| {
        let encloses = scene.is_ancestor(*id, parent);
        if encloses {
            tracing::debug!("Skipping {id}: it encloses the group's insertion point");
        }
        !encloses
    });
    if resolved.is_empty() {
        return None;
    }

    let index = scene
        .children_of(parent)
        .iter()
        .position(|c| *c == first)
        .unwrap_or(scene.children_of(parent).len());
    let container = scene.insert_child(parent, index, SceneNode::group(DEFAULT_GROUP_NAME))?;

    for id in &resolved {
        scene.move_node(*id, container, None);
    }

    selection.set_single(container);
    tracing::info!("Grouped {} nodes into {container}", resolved.len());
    Some(container)
}

/// Dissolve a group container.
///
/// Its children move into the container's parent at the container's
/// position, keeping their world transforms, and become the selection.
/// Only non-root group nodes can be ungrouped.
pub fn ungroup(scene: &mut Scene, selection: &mut Selection, id: NodeId) -> Option<Vec<NodeId>> {
    let node = scene.resolve(id)?;
    if node.kind != NodeKind::Group {
        tracing::debug!("Cannot ungroup mesh {id}");
        return None;
    }
    let parent = scene.parent_of(id)?;
    let children = node.children.clone();
    let index = scene.children_of(parent).iter().position(|c| *c == id)?;

    for (offset, child) in children.iter().enumerate() {
        scene.move_node(*child, parent, Some(index + offset));
    }
    scene.remove_subtree(id);

    selection.set_all(children.iter().copied());
    tracing::info!("Ungrouped {id} into {} nodes", children.len());
    Some(children)
}

/// Move `child` to the end of `parent`'s children.
///
/// Rejected when either id is missing, when they are equal, when `child` is
/// the root, or when `parent` lies inside `child`'s subtree.
pub fn reparent(scene: &mut Scene, child: NodeId, parent: NodeId) -> bool {
    if child == parent {
        tracing::debug!("Cannot parent {child} to itself");
        return false;
    }
    if scene.resolve(child).is_none() || scene.resolve(parent).is_none() {
        return false;
    }
    if child == scene.root() {
        tracing::debug!("Cannot reparent the root");
        return false;
    }
    if scene.is_ancestor(child, parent) {
        tracing::debug!("Rejecting reparent of {child} under its descendant {parent}");
        return false;
    }

    scene.move_node(child, parent, None);
    true
}

/// Merge leaf meshes into one mesh under the root.
///
/// Non-mesh entries are skipped. Geometry is baked to world space and
/// recentered on its bounding-box center, which becomes the new node's
/// position. The first contributor's material is kept. The originals are
/// removed and the new node becomes the sole selection.
pub fn merge(scene: &mut Scene, selection: &mut Selection, ids: &[NodeId], name: String) -> Option<NodeId> {
    let mut sources: Vec<NodeId> = Vec::new();
    for id in ids {
        if sources.contains(id) {
            continue;
        }
        match scene.resolve(*id) {
            Some(node) if node.is_leaf_mesh() => sources.push(*id),
            Some(_) => tracing::debug!("Skipping non-mesh node {id} in merge"),
            None => {}
        }
    }
    if sources.len() < 2 {
        tracing::debug!("Merge needs at least two meshes, got {}", sources.len());
        return None;
    }

    let worlds: Vec<_> = sources.iter().map(|id| scene.world_matrix(*id)).collect();
    let mut combined = geometry::merge_world(
        sources
            .iter()
            .zip(worlds)
            .filter_map(|(id, world)| Some((scene.get(*id)?.geometry.as_ref()?, world))),
    );
    let center = geometry::recenter(&mut combined);
    let material = sources
        .first()
        .and_then(|id| scene.get(*id))
        .and_then(|n| n.material.clone())
        .unwrap_or_default();

    let merged = SceneNode::mesh(name, combined, material)
        .with_transform(Transform::from_position(center.to_array()));
    let root = scene.root();
    let merged_id = scene.add_child(root, merged)?;

    for id in &sources {
        scene.remove_subtree(*id);
    }

    selection.set_single(merged_id);
    tracing::info!("Merged {} meshes into {merged_id}", sources.len());
    Some(merged_id)
}

/// Apply many renames as one batch.
///
/// A name already handed out earlier in the batch gets `_1`, `_2`, ...
/// appended. Returns how many nodes changed name.
pub fn bulk_rename(scene: &mut Scene, pairs: &[(NodeId, String)]) -> usize {
    let mut used: HashSet<String> = HashSet::new();
    let mut renamed = 0;

    for (id, name) in pairs {
        let base = name.trim();
        if base.is_empty() || scene.resolve(*id).is_none() {
            continue;
        }
        let mut candidate = base.to_string();
        let mut counter = 1;
        while used.contains(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }
        if rename(scene, *id, &candidate) {
            renamed += 1;
        }
        used.insert(candidate);
    }
    renamed
}

/// Apply many groupings as one batch. Returns the containers created.
pub fn bulk_group(scene: &mut Scene, selection: &mut Selection, groups: &[GroupSpec]) -> Vec<NodeId> {
    let mut created = Vec::new();
    for spec in groups {
        let Some(container) = group(scene, selection, &spec.ids) else {
            tracing::debug!("Nothing to group for '{}'", spec.name);
            continue;
        };
        rename(scene, container, &spec.name);
        created.push(container);
    }
    created
}

/// Delete nodes and their subtrees. Returns how many nodes were removed.
pub fn delete(scene: &mut Scene, selection: &mut Selection, ids: &[NodeId]) -> usize {
    let mut removed = 0;
    for id in ids {
        if *id == scene.root() {
            tracing::debug!("Cannot delete the root");
            continue;
        }
        removed += scene.remove_subtree(*id).len();
    }
    selection.retain(|id| scene.contains(*id));
    removed
}

/// Set a node's local transform. The root keeps its identity transform.
pub fn set_transform(scene: &mut Scene, id: NodeId, transform: Transform) -> bool {
    if id == scene.root() {
        return false;
    }
    let Some(node) = scene.get_mut(id) else {
        tracing::debug!("Transform target {id} not found");
        return false;
    };
    if node.transform == transform {
        return false;
    }
    node.transform = transform;
    true
}
