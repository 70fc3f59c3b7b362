// SPDX-License-Identifier: MIT OR Apache-2.0
//! Detached, serializable projection of the live tree for display.

use crate::node::{NodeId, NodeKind};
use crate::scene::Scene;
use serde::{Deserialize, Serialize};

/// Plain-data copy of a scene node and its subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorNode {
    /// Node ID
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Type tag
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Children in live sibling order
    pub children: Vec<MirrorNode>,
}

impl MirrorNode {
    /// Find a node in this subtree
    pub fn find(&self, id: NodeId) -> Option<&MirrorNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(MirrorNode::count).sum::<usize>()
    }
}

/// Rebuild the mirror from the root's children.
pub fn refresh_mirror(scene: &Scene) -> Vec<MirrorNode> {
    scene
        .children_of(scene.root())
        .iter()
        .filter_map(|id| project(scene, *id))
        .collect()
}

fn project(scene: &Scene, id: NodeId) -> Option<MirrorNode> {
    let node = scene.get(id)?;
    Some(MirrorNode {
        id,
        name: node.name.clone(),
        kind: node.kind,
        children: node
            .children
            .iter()
            .filter_map(|c| project(scene, *c))
            .collect(),
    })
}

/// Depth-first walk of a mirror, yielding `(depth, node)` in display order
pub fn flatten(mirror: &[MirrorNode]) -> Vec<(usize, &MirrorNode)> {
    let mut rows = Vec::new();
    let mut stack: Vec<(usize, &MirrorNode)> = mirror.iter().rev().map(|n| (0, n)).collect();
    while let Some((depth, node)) = stack.pop() {
        rows.push((depth, node));
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
    }
    rows
}
