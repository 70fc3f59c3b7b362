// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene store: the live tree, its mirror, the selection and undo history.
//!
//! Every mutating method snapshots the tree before it changes anything and
//! rebuilds the mirror afterwards. Requests that turn out to be no-ops leave
//! the history alone.

use crate::history::{History, HistoryError, HistoryStats, Result, Snapshot};
use crate::mirror::{refresh_mirror, MirrorNode};
use crate::node::{NodeId, Transform};
use crate::ops::{self, GroupSpec};
use crate::scene::Scene;
use crate::selection::Selection;

/// The single owner of the live tree
#[derive(Debug)]
pub struct SceneStore {
    /// Live tree
    scene: Scene,
    /// Display projection of `scene`
    mirror: Vec<MirrorNode>,
    /// Current selection
    selection: Selection,
    /// Undo/redo stacks
    history: History,
    /// Counter used to name merged meshes
    merge_counter: u32,
    /// Whether the tree changed since the last save
    dirty: bool,
}

impl SceneStore {
    /// Create a store holding an empty scene
    pub fn new() -> Self {
        Self::from_scene(Scene::new())
    }

    /// Create a store around an existing scene
    pub fn from_scene(scene: Scene) -> Self {
        let mirror = refresh_mirror(&scene);
        Self {
            scene,
            mirror,
            selection: Selection::new(),
            history: History::new(),
            merge_counter: 0,
            dirty: false,
        }
    }

    /// Live tree
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Current mirror
    pub fn mirror(&self) -> &[MirrorNode] {
        &self.mirror
    }

    /// Current selection
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Undo history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// History statistics
    pub fn history_stats(&self) -> HistoryStats {
        self.history.stats()
    }

    /// Whether the tree changed since the last [`SceneStore::mark_saved`]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Replace the tree wholesale, dropping history and selection
    pub fn replace_scene(&mut self, scene: Scene) {
        self.scene = scene;
        self.selection.clear();
        self.history.clear();
        self.dirty = false;
        self.refresh();
    }

    // Selection ----------------------------------------------------------

    /// Click a node
    pub fn toggle_select(&mut self, id: NodeId, multi: bool) -> &Selection {
        self.selection.toggle(id, multi);
        &self.selection
    }

    /// Replace the selection
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = NodeId>) -> &Selection {
        self.selection.set_all(ids);
        &self.selection
    }

    /// Empty the selection
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // Undo/redo ----------------------------------------------------------

    /// Push the current tree onto the undo stack
    pub fn snapshot(&mut self, label: &str) -> Result<()> {
        let snapshot = Snapshot::from_value(&self.scene)?;
        self.history.push(label, snapshot);
        Ok(())
    }

    /// Restore the previous state. Returns false when there is nothing to undo.
    ///
    /// A snapshot that fails to decode or validate is rejected and nothing
    /// changes.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(target) = self.history.peek_undo() else {
            return Ok(false);
        };
        let restored = decode(target)?;
        let current = Snapshot::from_value(&self.scene)?;
        self.history.undo(current)?;
        tracing::info!("Undo: {} nodes restored", restored.len());
        self.install(restored);
        Ok(true)
    }

    /// Re-apply an undone state. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        let Some(target) = self.history.peek_redo() else {
            return Ok(false);
        };
        let restored = decode(target)?;
        let current = Snapshot::from_value(&self.scene)?;
        self.history.redo(current)?;
        tracing::info!("Redo: {} nodes restored", restored.len());
        self.install(restored);
        Ok(true)
    }

    /// Run `edit` as one undoable step.
    ///
    /// `edit` must return `Some` exactly when it changed the tree; the
    /// pre-edit snapshot is only kept in that case.
    pub fn transact<T>(
        &mut self,
        label: &str,
        edit: impl FnOnce(&mut Scene, &mut Selection) -> Option<T>,
    ) -> Result<Option<T>> {
        let before = Snapshot::from_value(&self.scene)?;
        let outcome = edit(&mut self.scene, &mut self.selection);
        if outcome.is_some() {
            self.history.push(label, before);
            self.dirty = true;
            self.refresh();
        }
        Ok(outcome)
    }

    // Mutations ----------------------------------------------------------

    /// Rename a node
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<bool> {
        let label = format!("Rename to {}", new_name.trim());
        self.transact(&label, |scene, _| ops::rename(scene, id, new_name).then_some(()))
            .map(|o| o.is_some())
    }

    /// Group nodes under a new container
    pub fn group(&mut self, ids: &[NodeId]) -> Result<Option<NodeId>> {
        self.transact("Group", |scene, selection| ops::group(scene, selection, ids))
    }

    /// Group the current selection
    pub fn group_selected(&mut self) -> Result<Option<NodeId>> {
        let ids = self.selection.ids().to_vec();
        self.group(&ids)
    }

    /// Dissolve a group, selecting its former children
    pub fn ungroup(&mut self, id: NodeId) -> Result<Option<Vec<NodeId>>> {
        self.transact("Ungroup", |scene, selection| ops::ungroup(scene, selection, id))
    }

    /// Move `child` under `parent`
    pub fn reparent(&mut self, child: NodeId, parent: NodeId) -> Result<bool> {
        self.transact("Reparent", |scene, _| ops::reparent(scene, child, parent).then_some(()))
            .map(|o| o.is_some())
    }

    /// Merge leaf meshes into one
    pub fn merge(&mut self, ids: &[NodeId]) -> Result<Option<NodeId>> {
        let (number, name) = self.next_merge_name();
        let merged = self.transact("Merge", |scene, selection| ops::merge(scene, selection, ids, name))?;
        if merged.is_some() {
            self.merge_counter = number;
        }
        Ok(merged)
    }

    /// First `Merged_<n>` past the counter that no node already uses
    fn next_merge_name(&self) -> (u32, String) {
        let mut number = self.merge_counter + 1;
        loop {
            let name = format!("Merged_{number}");
            if !self.scene.nodes().any(|n| n.name == name) {
                return (number, name);
            }
            number += 1;
        }
    }

    /// Merge the current selection
    pub fn merge_selected(&mut self) -> Result<Option<NodeId>> {
        let ids = self.selection.ids().to_vec();
        self.merge(&ids)
    }

    /// Apply many renames as one undoable step
    pub fn bulk_rename(&mut self, pairs: &[(NodeId, String)]) -> Result<usize> {
        self.transact("Auto rename", |scene, _| {
            let renamed = ops::bulk_rename(scene, pairs);
            (renamed > 0).then_some(renamed)
        })
        .map(Option::unwrap_or_default)
    }

    /// Apply many groupings as one undoable step
    pub fn bulk_group(&mut self, groups: &[GroupSpec]) -> Result<Vec<NodeId>> {
        self.transact("Auto group", |scene, selection| {
            let created = ops::bulk_group(scene, selection, groups);
            (!created.is_empty()).then_some(created)
        })
        .map(Option::unwrap_or_default)
    }

    /// Delete nodes and their subtrees
    pub fn delete(&mut self, ids: &[NodeId]) -> Result<usize> {
        self.transact("Delete", |scene, selection| {
            let removed = ops::delete(scene, selection, ids);
            (removed > 0).then_some(removed)
        })
        .map(Option::unwrap_or_default)
    }

    /// Insert an imported asset under the root and select it
    pub fn import(&mut self, asset: Scene, name: &str) -> Result<Option<NodeId>> {
        let label = format!("Import {name}");
        self.transact(&label, |scene, selection| {
            let root = scene.root();
            let top = scene.graft(root, asset, name)?;
            selection.set_single(top);
            Some(top)
        })
    }

    /// Start a transform gesture: one snapshot for the whole drag
    pub fn begin_transform_gesture(&mut self) -> Result<()> {
        self.snapshot("Transform")?;
        self.dirty = true;
        Ok(())
    }

    /// Update a node's transform during a gesture. Does not snapshot.
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        let changed = ops::set_transform(&mut self.scene, id, transform);
        if changed {
            self.dirty = true;
        }
        changed
    }

    fn install(&mut self, scene: Scene) {
        self.scene = scene;
        let scene = &self.scene;
        self.selection.retain(|id| scene.contains(*id));
        self.dirty = true;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.mirror = refresh_mirror(&self.scene);
    }
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(snapshot: &Snapshot) -> Result<Scene> {
    let scene: Scene = snapshot.to_value()?;
    scene.validate().map_err(HistoryError::Corrupt)?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MAX_HISTORY;
    use crate::node::{Geometry, Material, SceneNode};

    fn mesh(name: &str) -> SceneNode {
        SceneNode::mesh(
            name,
            Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![0, 1, 2]),
            Material::default(),
        )
    }

    fn store_abc() -> (SceneStore, NodeId, NodeId, NodeId) {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.add_child(root, mesh("A")).unwrap();
        let b = scene.add_child(root, mesh("B")).unwrap();
        let c = scene.add_child(root, mesh("C")).unwrap();
        (SceneStore::from_scene(scene), a, b, c)
    }

    #[test]
    fn test_group_then_undo_redo() {
        let (mut store, a, b, _) = store_abc();
        let before = store.scene().clone();

        let g = store.group(&[a, b]).unwrap().unwrap();
        let after = store.scene().clone();
        assert_eq!(store.mirror().len(), 2);
        assert_eq!(store.selection().ids(), &[g]);

        assert!(store.undo().unwrap());
        assert_eq!(store.scene(), &before);
        assert_eq!(store.mirror(), refresh_mirror(&before).as_slice());
        // the group no longer exists, so it drops out of the selection
        assert!(store.selection().is_empty());

        assert!(store.redo().unwrap());
        assert_eq!(store.scene(), &after);
    }

    #[test]
    fn test_ungroup_is_undoable() {
        let (mut store, a, b, _) = store_abc();
        let g = store.group(&[a, b]).unwrap().unwrap();
        let grouped = store.scene().clone();

        assert_eq!(store.ungroup(g).unwrap(), Some(vec![a, b]));
        assert_eq!(store.selection().ids(), &[a, b]);
        assert_eq!(store.mirror().len(), 3);
        assert!(store.ungroup(a).unwrap().is_none());

        store.undo().unwrap();
        assert_eq!(store.scene(), &grouped);
    }

    #[test]
    fn test_noop_does_not_snapshot() {
        let (mut store, a, _, _) = store_abc();
        assert!(!store.rename(a, "").unwrap());
        assert!(!store.reparent(a, a).unwrap());
        assert!(store.merge(&[a]).unwrap().is_none());
        assert!(!store.history().can_undo());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_undo_redo_empty() {
        let mut store = SceneStore::new();
        assert!(!store.undo().unwrap());
        assert!(!store.redo().unwrap());
    }

    #[test]
    fn test_new_action_clears_redo() {
        let (mut store, a, b, _) = store_abc();
        store.rename(a, "One").unwrap();
        store.undo().unwrap();
        assert!(store.history().can_redo());

        store.rename(b, "Two").unwrap();
        assert!(!store.history().can_redo());
        assert!(!store.redo().unwrap());
    }

    #[test]
    fn test_history_bound() {
        let (mut store, a, _, _) = store_abc();
        for i in 0..25 {
            store.rename(a, &format!("Name {i}")).unwrap();
        }
        assert_eq!(store.history().undo_depth(), MAX_HISTORY);

        let mut undone = 0;
        while store.undo().unwrap() {
            undone += 1;
        }
        assert_eq!(undone, MAX_HISTORY);
        // the five oldest states are gone: "A", "Name 0".."Name 3"
        assert_eq!(store.scene().get(a).unwrap().name, "Name 4");
    }

    #[test]
    fn test_merge_names_are_unique() {
        let (mut store, a, b, c) = store_abc();
        let first = store.merge(&[a, b]).unwrap().unwrap();
        let root = store.scene().root();
        let d = {
            let mut scene = store.scene().clone();
            let d = scene.add_child(root, mesh("D")).unwrap();
            store.replace_scene(scene);
            d
        };
        let second = store.merge(&[c, d]).unwrap().unwrap();
        assert_eq!(store.scene().get(first).unwrap().name, "Merged_1");
        assert_eq!(store.scene().get(second).unwrap().name, "Merged_2");
    }

    #[test]
    fn test_merge_skips_names_already_in_scene() {
        let mut scene = Scene::new();
        let root = scene.root();
        let existing = scene.add_child(root, mesh("Merged_1")).unwrap();
        scene.add_child(root, mesh("Merged_2")).unwrap();
        let a = scene.add_child(root, mesh("A")).unwrap();
        let b = scene.add_child(root, mesh("B")).unwrap();
        let mut store = SceneStore::from_scene(scene);

        let merged = store.merge(&[a, b]).unwrap().unwrap();
        assert_eq!(store.scene().get(merged).unwrap().name, "Merged_3");
        assert_eq!(store.scene().get(existing).unwrap().name, "Merged_1");
    }

    #[test]
    fn test_transform_gesture_snapshots_once() {
        let (mut store, a, _, _) = store_abc();
        store.begin_transform_gesture().unwrap();
        for step in 1..=10 {
            store.set_transform(a, Transform::from_position([step as f32, 0.0, 0.0]));
        }
        assert_eq!(store.history().undo_depth(), 1);

        store.undo().unwrap();
        assert_eq!(store.scene().get(a).unwrap().transform, Transform::IDENTITY);
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() {
        let (mut store, a, _, _) = store_abc();
        let mut broken = store.scene().clone();
        broken.get_mut(a).unwrap().parent = None;
        store
            .history
            .push("broken", Snapshot::from_value(&broken).unwrap());
        let current = store.scene().clone();

        assert!(matches!(store.undo(), Err(HistoryError::Corrupt(_))));
        assert_eq!(store.scene(), &current);
        assert_eq!(store.history().undo_depth(), 1);
        assert!(!store.history().can_redo());
    }

    #[test]
    fn test_bulk_ops_are_single_steps() {
        let (mut store, a, b, c) = store_abc();
        let renamed = store
            .bulk_rename(&[(a, "Part".into()), (b, "Part".into()), (c, "Part".into())])
            .unwrap();
        assert_eq!(renamed, 3);
        let created = store
            .bulk_group(&[GroupSpec::new("Left", vec![a]), GroupSpec::new("Right", vec![b, c])])
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(store.history().undo_depth(), 2);

        store.undo().unwrap();
        assert_eq!(store.mirror().len(), 3);
        store.undo().unwrap();
        assert_eq!(store.scene().get(b).unwrap().name, "B");
    }

    #[test]
    fn test_import_selects_asset() {
        let mut store = SceneStore::new();
        let mut asset = Scene::new();
        let asset_root = asset.root();
        asset.add_child(asset_root, mesh("Part")).unwrap();

        let top = store.import(asset, "Robot").unwrap().unwrap();
        assert_eq!(store.selection().ids(), &[top]);
        assert_eq!(store.mirror()[0].name, "Robot");
        assert_eq!(store.mirror()[0].children[0].name, "Part");
    }
}
