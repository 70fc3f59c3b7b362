// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounding boxes and world-space geometry merging.

use crate::node::Geometry;
use glam::{Mat4, Vec3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box containing every point, None when there are no points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in points {
            bounds.min = bounds.min.min(p);
            bounds.max = bounds.max.max(p);
        }
        Some(bounds)
    }

    /// Union of two boxes
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Bake each part into world space and concatenate them.
///
/// Indices of later parts are offset by the vertex count before them. Normals
/// are kept only when every part carries them.
pub fn merge_world<'a>(parts: impl IntoIterator<Item = (&'a Geometry, Mat4)>) -> Geometry {
    let mut merged = Geometry::default();
    let mut all_normals = true;

    for (geometry, world) in parts {
        let baked = geometry.transformed(&world);
        let offset = merged.positions.len() as u32;

        all_normals &= baked.has_normals();
        merged.positions.extend(baked.positions);
        merged.normals.extend(baked.normals);
        merged.indices.extend(baked.indices.iter().map(|i| i + offset));
    }

    if !all_normals {
        merged.normals.clear();
    }
    merged
}

/// Move the vertices so the bounding-box center sits at the origin.
///
/// Returns the former center, which becomes the owning node's position.
pub fn recenter(geometry: &mut Geometry) -> Vec3 {
    let Some(bounds) = geometry.bounds() else {
        return Vec3::ZERO;
    };
    let center = bounds.center();
    geometry.translate(-center);
    center
}
