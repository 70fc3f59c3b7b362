// SPDX-License-Identifier: MIT OR Apache-2.0
//! Selection tracking.
//!
//! The selection is not validated against the tree. After a restore or a
//! merge it may hold ids that no longer resolve; consumers treat those as
//! not found.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// Ordered, duplicate-free set of selected nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Currently selected nodes
    nodes: Vec<NodeId>,
}

impl Selection {
    /// Create a new empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Click semantics.
    ///
    /// Single mode: clicking the sole selected node clears the selection,
    /// clicking anything else replaces it. Multi mode: add if absent, remove
    /// if present.
    pub fn toggle(&mut self, id: NodeId, multi: bool) {
        if multi {
            if self.contains(id) {
                self.remove(id);
            } else {
                self.nodes.push(id);
            }
            return;
        }

        if self.nodes.len() == 1 && self.nodes[0] == id {
            self.nodes.clear();
        } else {
            self.nodes.clear();
            self.nodes.push(id);
        }
    }

    /// Replace the selection outright, dropping duplicates
    pub fn set_all(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.nodes.clear();
        for id in ids {
            if !self.contains(id) {
                self.nodes.push(id);
            }
        }
    }

    /// Select exactly one node
    pub fn set_single(&mut self, id: NodeId) {
        self.nodes.clear();
        self.nodes.push(id);
    }

    /// Remove a node from the selection
    pub fn remove(&mut self, id: NodeId) {
        self.nodes.retain(|n| *n != id);
    }

    /// Keep only the nodes matching `keep`
    pub fn retain(&mut self, keep: impl FnMut(&NodeId) -> bool) {
        self.nodes.retain(keep);
    }

    /// Clear the selection
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Check if a node is selected
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Check if the selection is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the number of selected nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over selected nodes in selection order
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// Selected nodes as a slice
    pub fn ids(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Get the first selected node
    pub fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_toggle_deselects_on_reclick() {
        let a = NodeId::new();
        let mut selection = Selection::new();
        selection.toggle(a, false);
        assert_eq!(selection.ids(), &[a]);
        selection.toggle(a, false);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_single_toggle_replaces() {
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());
        let mut selection = Selection::new();
        selection.set_all([a, b]);
        selection.toggle(a, false);
        assert_eq!(selection.ids(), &[a]);
        selection.toggle(c, false);
        assert_eq!(selection.ids(), &[c]);
    }

    #[test]
    fn test_multi_toggle_preserves_order() {
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());
        let mut selection = Selection::new();
        selection.toggle(a, true);
        selection.toggle(b, true);
        selection.toggle(c, true);
        selection.toggle(b, true);
        assert_eq!(selection.ids(), &[a, c]);
    }

    #[test]
    fn test_set_all_dedups() {
        let (a, b) = (NodeId::new(), NodeId::new());
        let mut selection = Selection::new();
        selection.set_all([b, a, b, a]);
        assert_eq!(selection.ids(), &[b, a]);
        selection.clear();
        assert!(selection.is_empty());
    }
}
