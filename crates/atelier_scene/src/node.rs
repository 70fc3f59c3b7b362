// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene node definitions.

use crate::geometry::Aabb;
use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for scene nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a node ID from its hyphenated string form
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text.trim()).ok().map(Self)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Pure container
    #[default]
    Group,
    /// Renderable node carrying geometry and a material
    Mesh,
}

impl NodeKind {
    /// Tag used in mirrors and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Mesh => "mesh",
        }
    }
}

/// Local transform of a node relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position (x, y, z)
    pub position: [f32; 3],
    /// Rotation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    /// Scale (x, y, z)
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    };

    /// Identity rotation and scale at the given position
    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Decompose an affine matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            position: translation.to_array(),
            rotation: rotation.normalize().to_array(),
            scale: scale.to_array(),
        }
    }

    /// Compose into an affine matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            Quat::from_array(self.rotation).normalize(),
            Vec3::from_array(self.position),
        )
    }
}

/// Triangle geometry payload. Opaque to the structural operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals (empty or one per position)
    pub normals: Vec<[f32; 3]>,
    /// Triangle list indices into `positions`
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Create geometry from positions and triangle indices
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals: Vec::new(),
            indices,
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of whole triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether there is nothing to draw
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether the normals line up with the positions
    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty() && self.normals.len() == self.positions.len()
    }

    /// Axis-aligned bounds of the vertices
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().map(|p| Vec3::from_array(*p)))
    }

    /// Copy of this geometry with `matrix` baked into the vertices
    pub fn transformed(&self, matrix: &Mat4) -> Geometry {
        let positions = self
            .positions
            .iter()
            .map(|p| matrix.transform_point3(Vec3::from_array(*p)).to_array())
            .collect();

        let normals = if self.has_normals() {
            let normal_matrix = Mat3::from_mat4(*matrix).inverse().transpose();
            self.normals
                .iter()
                .map(|n| {
                    (normal_matrix * Vec3::from_array(*n))
                        .normalize_or_zero()
                        .to_array()
                })
                .collect()
        } else {
            Vec::new()
        };

        Geometry {
            positions,
            normals,
            indices: self.indices.clone(),
        }
    }

    /// Shift every vertex by `offset`
    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.positions {
            *p = (Vec3::from_array(*p) + offset).to_array();
        }
    }
}

/// Surface material. Carried along, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Base color (linear RGBA)
    pub base_color: [f32; 4],
    /// Metallic factor
    pub metallic: f32,
    /// Roughness factor
    pub roughness: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            base_color: [0.8, 0.8, 0.8, 1.0],
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

/// A node in the live scene tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    /// Stable identifier
    pub id: NodeId,
    /// Display name (not unique)
    pub name: String,
    /// Type tag
    pub kind: NodeKind,
    /// Transform relative to the parent
    pub transform: Transform,
    /// Geometry payload, mesh nodes only
    pub geometry: Option<Geometry>,
    /// Material, mesh nodes only
    pub material: Option<Material>,
    /// Parent node (None for the root and for detached nodes)
    pub parent: Option<NodeId>,
    /// Ordered children
    pub children: Vec<NodeId>,
}

impl SceneNode {
    /// Create an empty group node
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            kind: NodeKind::Group,
            transform: Transform::IDENTITY,
            geometry: None,
            material: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Create a mesh node
    pub fn mesh(name: impl Into<String>, geometry: Geometry, material: Material) -> Self {
        Self {
            kind: NodeKind::Mesh,
            geometry: Some(geometry),
            material: Some(material),
            ..Self::group(name)
        }
    }

    /// Builder-style transform override
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Whether this is a mesh with geometry and no children
    pub fn is_leaf_mesh(&self) -> bool {
        self.kind == NodeKind::Mesh && self.children.is_empty() && self.geometry.is_some()
    }
}
