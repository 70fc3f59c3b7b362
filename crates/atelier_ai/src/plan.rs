// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bridges between the scene and the grouping model.

use crate::protocol::{HierarchyKind, HierarchyNode};
use atelier_scene::history::Result;
use atelier_scene::ops;
use atelier_scene::{NodeId, Scene, SceneStore, Selection};
use serde_json::{json, Value};

/// List every leaf mesh with its world-space bounds
pub fn describe_parts(scene: &Scene) -> Value {
    let parts: Vec<Value> = scene
        .leaf_meshes()
        .into_iter()
        .filter_map(|id| {
            let node = scene.get(id)?;
            let bounds = node
                .geometry
                .as_ref()?
                .transformed(&scene.world_matrix(id))
                .bounds()?;
            Some(json!({
                "id": id.to_string(),
                "name": node.name,
                "center": round3(bounds.center().to_array()),
                "size": round3(bounds.size().to_array()),
            }))
        })
        .collect();
    json!({ "parts": parts })
}

fn round3(v: [f32; 3]) -> [f32; 3] {
    v.map(|x| (x * 1000.0).round() / 1000.0)
}

/// Apply a proposed hierarchy as one undoable step.
///
/// Mesh entries with one id rename that part; with several ids they group
/// the parts under a container named after the entry. Group entries wrap
/// whatever their children produced. Unknown or malformed ids are skipped.
/// Returns how many entries changed the tree.
pub fn apply_hierarchy(store: &mut SceneStore, hierarchy: &[HierarchyNode]) -> Result<usize> {
    let applied = store.transact("Auto group", |scene, selection| {
        let mut changes = 0;
        let top: Vec<NodeId> = hierarchy
            .iter()
            .filter_map(|entry| apply_entry(scene, selection, entry, &mut changes))
            .collect();
        if changes == 0 {
            return None;
        }
        selection.set_all(top);
        Some(changes)
    })?;
    let applied = applied.unwrap_or_default();
    tracing::info!("Applied {applied} hierarchy entries");
    Ok(applied)
}

fn apply_entry(scene: &mut Scene, selection: &mut Selection, entry: &HierarchyNode, changes: &mut usize) -> Option<NodeId> {
    let mut members: Vec<NodeId> = entry
        .ids
        .iter()
        .filter_map(|raw| {
            let id = NodeId::parse(raw.trim());
            if id.is_none() {
                tracing::debug!("Ignoring malformed part id '{raw}'");
            }
            id
        })
        .filter(|id| scene.contains(*id))
        .collect();

    if entry.kind == HierarchyKind::Mesh && members.len() == 1 {
        let id = members[0];
        if ops::rename(scene, id, &entry.name) {
            *changes += 1;
        }
        return Some(id);
    }

    for child in &entry.children {
        if let Some(id) = apply_entry(scene, selection, child, changes) {
            members.push(id);
        }
    }
    if members.is_empty() {
        tracing::debug!("Hierarchy entry '{}' matched no parts", entry.name);
        return None;
    }

    let container = ops::group(scene, selection, &members)?;
    ops::rename(scene, container, &entry.name);
    *changes += 1;
    Some(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_scene::{Geometry, Material, SceneNode, Transform};

    fn car() -> (SceneStore, Vec<NodeId>) {
        let mut scene = Scene::new();
        let root = scene.root();
        let tri = Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![0, 1, 2]);
        let ids = (0..4)
            .map(|i| {
                let node = SceneNode::mesh(format!("mesh_{i}"), tri.clone(), Material::default())
                    .with_transform(Transform::from_position([i as f32 * 2.0, 0.0, 0.0]));
                scene.add_child(root, node).unwrap()
            })
            .collect();
        (SceneStore::from_scene(scene), ids)
    }

    fn mesh(name: &str, ids: &[NodeId]) -> HierarchyNode {
        HierarchyNode {
            name: name.into(),
            kind: HierarchyKind::Mesh,
            children: Vec::new(),
            ids: ids.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_describe_parts() {
        let (store, ids) = car();
        let parts = describe_parts(store.scene());
        let list = parts["parts"].as_array().unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[1]["id"], ids[1].to_string());
        assert_eq!(list[1]["center"][0].as_f64().unwrap(), 2.5);
        assert_eq!(list[1]["size"][1].as_f64().unwrap(), 1.0);
    }

    #[test]
    fn test_apply_hierarchy() {
        let (mut store, ids) = car();
        let hierarchy = vec![
            HierarchyNode {
                name: "Wheels".into(),
                kind: HierarchyKind::Group,
                children: vec![mesh("Wheel_Front", &ids[0..1]), mesh("Wheel_Back", &ids[1..2])],
                ids: Vec::new(),
            },
            mesh("Body", &ids[2..4]),
            HierarchyNode {
                name: "Ghost".into(),
                kind: HierarchyKind::Mesh,
                children: Vec::new(),
                ids: vec!["not-a-uuid".into(), NodeId::new().to_string()],
            },
        ];

        let applied = apply_hierarchy(&mut store, &hierarchy).unwrap();
        assert_eq!(applied, 4);
        assert_eq!(store.history().undo_depth(), 1);

        let mirror = store.mirror();
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror[0].name, "Wheels");
        assert_eq!(mirror[0].children[0].name, "Wheel_Front");
        assert_eq!(mirror[1].name, "Body");
        assert_eq!(mirror[1].children.len(), 2);

        store.undo().unwrap();
        assert_eq!(store.mirror().len(), 4);
    }

    #[test]
    fn test_apply_empty_hierarchy_is_noop() {
        let (mut store, _) = car();
        assert_eq!(apply_hierarchy(&mut store, &[]).unwrap(), 0);
        assert!(!store.history().can_undo());
    }
}
