// SPDX-License-Identifier: MIT OR Apache-2.0
//! glTF/GLB import into a detached [`Scene`].
//!
//! The result is meant to be grafted into the live tree with
//! [`crate::store::SceneStore::import`]. Every glTF node becomes a scene
//! node with its local transform; a node whose mesh has a single triangle
//! primitive and no children becomes a mesh node directly, otherwise each
//! primitive becomes its own mesh child.

use crate::node::{Geometry, Material, NodeId, SceneNode, Transform};
use crate::scene::Scene;
use thiserror::Error;

/// Errors raised while importing an asset
#[derive(Debug, Error)]
pub enum ImportError {
    /// The glTF container could not be parsed
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// The document has no scene to import
    #[error("Asset contains no scene")]
    NoScene,

    /// Nothing drawable was found
    #[error("Asset contains no triangle meshes")]
    NoMeshes,
}

/// Parse a GLB (or embedded-buffer glTF) blob into a scene whose root is
/// named `name`.
pub fn import_gltf(bytes: &[u8], name: &str) -> Result<Scene, ImportError> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;
    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ImportError::NoScene)?;

    let mut scene = Scene::with_root_name(name);
    let root = scene.root();
    let mut reader = AssetReader {
        buffers: &buffers,
        mesh_count: 0,
    };
    for node in gltf_scene.nodes() {
        reader.import_node(&mut scene, root, &node);
    }

    if reader.mesh_count == 0 {
        return Err(ImportError::NoMeshes);
    }
    tracing::info!(
        "Imported '{name}': {} nodes, {} meshes",
        scene.len() - 1,
        reader.mesh_count
    );
    Ok(scene)
}

struct AssetReader<'a> {
    buffers: &'a [gltf::buffer::Data],
    mesh_count: usize,
}

impl AssetReader<'_> {
    fn import_node(&mut self, scene: &mut Scene, parent: NodeId, node: &gltf::Node<'_>) {
        let name = node
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("Node_{}", node.index()));
        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = Transform {
            position: translation,
            rotation,
            scale,
        };

        let primitives: Vec<(Geometry, Material)> = node
            .mesh()
            .map(|mesh| {
                mesh.primitives()
                    .filter_map(|primitive| self.read_primitive(&primitive))
                    .collect()
            })
            .unwrap_or_default();

        let has_children = node.children().next().is_some();
        let created = if primitives.len() == 1 && !has_children {
            let (geometry, material) = primitives.into_iter().next().unwrap_or_default();
            self.mesh_count += 1;
            scene.add_child(parent, SceneNode::mesh(name, geometry, material).with_transform(transform))
        } else {
            let group = scene.add_child(parent, SceneNode::group(name.clone()).with_transform(transform));
            if let Some(group) = group {
                for (index, (geometry, material)) in primitives.into_iter().enumerate() {
                    self.mesh_count += 1;
                    scene.add_child(group, SceneNode::mesh(format!("{name}_{index}"), geometry, material));
                }
            }
            group
        };

        if let Some(created) = created {
            for child in node.children() {
                self.import_node(scene, created, &child);
            }
        }
    }

    fn read_primitive(&self, primitive: &gltf::Primitive<'_>) -> Option<(Geometry, Material)> {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            tracing::debug!("Skipping non-triangle primitive {:?}", primitive.mode());
            return None;
        }

        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
        if positions.is_empty() {
            return None;
        }
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|normals| normals.collect())
            .unwrap_or_default();
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());

        let source = primitive.material();
        let pbr = source.pbr_metallic_roughness();
        let material = Material {
            name: source.name().unwrap_or("Material").to_string(),
            base_color: pbr.base_color_factor(),
            metallic: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
        };

        Some((
            Geometry {
                positions,
                normals,
                indices,
            },
            material,
        ))
    }
}
