// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene documents and mesh export.
//!
//! Scene documents are pretty RON files that round-trip the whole tree.
//! OBJ export writes every leaf mesh baked to world space, one object per
//! mesh, in depth-first order.

use crate::scene::{Scene, SceneError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Current scene document format version
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Errors raised while saving, loading or exporting
#[derive(Debug, Error)]
pub enum ExportError {
    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// RON parse error
    #[error("Deserialization error: {0}")]
    Deserialize(#[from] ron::error::SpannedError),

    /// Loaded tree breaks an invariant
    #[error("Invalid scene: {0}")]
    Invalid(#[from] SceneError),

    /// Document written by a newer build
    #[error("Unsupported document version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk scene document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Format version
    pub version: u32,
    /// The tree
    pub scene: Scene,
}

/// Save a scene as a RON document
pub fn save_document(scene: &Scene, path: &Path) -> Result<(), ExportError> {
    let document = SceneDocument {
        version: DOCUMENT_FORMAT_VERSION,
        scene: scene.clone(),
    };
    let ron_str = ron::ser::to_string_pretty(&document, ron::ser::PrettyConfig::default())?;
    std::fs::write(path, ron_str)?;
    tracing::info!("Saved scene to {:?}", path);
    Ok(())
}

/// Load and validate a RON scene document
pub fn load_document(path: &Path) -> Result<Scene, ExportError> {
    let content = std::fs::read_to_string(path)?;
    let document: SceneDocument = ron::from_str(&content)?;
    if document.version > DOCUMENT_FORMAT_VERSION {
        return Err(ExportError::UnsupportedVersion(document.version));
    }
    document.scene.validate()?;
    tracing::info!("Loaded scene from {:?}", path);
    Ok(document.scene)
}

/// Write every leaf mesh as Wavefront OBJ, baked to world space.
///
/// Returns the number of objects written.
pub fn write_obj(scene: &Scene, out: &mut impl Write) -> Result<usize, ExportError> {
    writeln!(out, "# Atelier OBJ export")?;
    let mut vertex_base = 1usize;
    let mut objects = 0;

    for id in scene.leaf_meshes() {
        let Some(node) = scene.get(id) else {
            continue;
        };
        let Some(geometry) = node.geometry.as_ref() else {
            continue;
        };
        let baked = geometry.transformed(&scene.world_matrix(id));

        writeln!(out, "o {}", obj_name(&node.name))?;
        for [x, y, z] in &baked.positions {
            writeln!(out, "v {x} {y} {z}")?;
        }
        let normals = baked.has_normals();
        if normals {
            for [x, y, z] in &baked.normals {
                writeln!(out, "vn {x} {y} {z}")?;
            }
        }
        for tri in baked.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize + vertex_base);
            if normals {
                writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}")?;
            } else {
                writeln!(out, "f {a} {b} {c}")?;
            }
        }

        vertex_base += baked.positions.len();
        objects += 1;
    }
    Ok(objects)
}

/// Export the scene to an OBJ file
pub fn export_obj(scene: &Scene, path: &Path) -> Result<usize, ExportError> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let objects = write_obj(scene, &mut file)?;
    file.flush()?;
    tracing::info!("Exported {objects} meshes to {:?}", path);
    Ok(objects)
}

fn obj_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Geometry, Material, SceneNode, Transform};

    fn sample() -> Scene {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = Geometry::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        );
        let group = scene.add_child(root, SceneNode::group("Body")).unwrap();
        scene
            .add_child(
                group,
                SceneNode::mesh("Left Door", geometry.clone(), Material::default())
                    .with_transform(Transform::from_position([0.0, 0.0, 2.0])),
            )
            .unwrap();
        scene
            .add_child(root, SceneNode::mesh("Wheel", geometry, Material::default()))
            .unwrap();
        scene
    }

    #[test]
    fn test_document_round_trip() {
        let scene = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.ron");

        save_document(&scene, &path).unwrap();
        let loaded = load_document(&path).unwrap();
        assert_eq!(loaded, scene);
    }

    #[test]
    fn test_load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_document(&dir.path().join("missing.ron")),
            Err(ExportError::Io(_))
        ));
    }

    #[test]
    fn test_write_obj() {
        let scene = sample();
        let mut out = Vec::new();
        let objects = write_obj(&scene, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(objects, 2);
        assert!(text.contains("o Left_Door"));
        assert!(text.contains("v 0 0 2"));
        assert!(text.contains("f 1 2 3"));
        // second object's indices continue after the first three vertices
        assert!(text.contains("f 4 5 6"));
    }
}
