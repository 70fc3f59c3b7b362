// SPDX-License-Identifier: MIT OR Apache-2.0
//! Software-rendered previews of parts and scenes.
//!
//! Vision calls need an image of what they are asked to name. Previews are
//! flat-shaded orthographic renders from a fixed three-quarter view, framed
//! on the rendered geometry's bounds.

use crate::error::Result;
use atelier_scene::{NodeId, Scene};
use glam::{Mat4, Vec3};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Default preview size in pixels
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

/// Smallest preview worth sending to a vision model
pub const MIN_THUMBNAIL_SIZE: u32 = 16;

/// Largest preview size; bigger requests are clamped
pub const MAX_THUMBNAIL_SIZE: u32 = 4096;

const BACKGROUND: Rgba<u8> = Rgba([235, 235, 235, 255]);
const VIEW_DIRECTION: Vec3 = Vec3::new(1.0, 0.8, 1.0);
const LIGHT_DIRECTION: Vec3 = Vec3::new(0.4, 1.0, 0.6);
const AMBIENT: f32 = 0.3;

struct Triangle {
    corners: [Vec3; 3],
    color: [f32; 4],
}

/// Render every mesh in the scene
pub fn render_scene(scene: &Scene, size: u32) -> RgbaImage {
    render_subtree(scene, scene.root(), size)
}

/// Render the meshes in `id`'s subtree
pub fn render_subtree(scene: &Scene, id: NodeId, size: u32) -> RgbaImage {
    let triangles = collect_triangles(scene, id);
    rasterize(&triangles, size.clamp(1, MAX_THUMBNAIL_SIZE))
}

/// Clamp a configured preview size into the supported range
pub fn clamp_size(size: u32) -> u32 {
    size.clamp(MIN_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE)
}

/// Encode an image as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

fn collect_triangles(scene: &Scene, id: NodeId) -> Vec<Triangle> {
    let mut triangles = Vec::new();
    for leaf in scene.leaf_meshes() {
        if !scene.is_ancestor(id, leaf) {
            continue;
        }
        let Some(node) = scene.get(leaf) else {
            continue;
        };
        let Some(geometry) = node.geometry.as_ref() else {
            continue;
        };
        let color = node
            .material
            .as_ref()
            .map(|m| m.base_color)
            .unwrap_or([0.8, 0.8, 0.8, 1.0]);
        let world = geometry.transformed(&scene.world_matrix(leaf));

        for tri in world.indices.chunks_exact(3) {
            let corner = |i: u32| world.positions.get(i as usize).copied().map(Vec3::from);
            let (Some(a), Some(b), Some(c)) = (corner(tri[0]), corner(tri[1]), corner(tri[2])) else {
                continue;
            };
            triangles.push(Triangle {
                corners: [a, b, c],
                color,
            });
        }
    }
    triangles
}

fn rasterize(triangles: &[Triangle], size: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(size, size, BACKGROUND);
    let Some((center, radius)) = framing(triangles) else {
        return image;
    };

    let eye = center + VIEW_DIRECTION.normalize() * radius * 3.0;
    let view = Mat4::look_at_rh(eye, center, Vec3::Y);
    let light = LIGHT_DIRECTION.normalize();
    let scale = size as f32 * 0.45 / radius;
    let half = size as f32 / 2.0;

    let mut depth = vec![f32::INFINITY; size as usize * size as usize];

    for triangle in triangles {
        let [a, b, c] = triangle.corners;
        let normal = (b - a).cross(c - a).normalize_or_zero();
        let shade = AMBIENT + (1.0 - AMBIENT) * normal.dot(light).abs();
        let pixel = Rgba([
            to_byte(triangle.color[0] * shade),
            to_byte(triangle.color[1] * shade),
            to_byte(triangle.color[2] * shade),
            255,
        ]);

        // screen x, screen y, distance from the eye
        let projected = triangle.corners.map(|p| {
            let v = view.transform_point3(p);
            Vec3::new(half + v.x * scale, half - v.y * scale, -v.z)
        });
        fill(&mut image, &mut depth, projected, pixel);
    }
    image
}

fn fill(image: &mut RgbaImage, depth: &mut [f32], [p0, p1, p2]: [Vec3; 3], pixel: Rgba<u8>) {
    let area = edge(p0, p1, p2);
    if area.abs() < f32::EPSILON {
        return;
    }
    let (width, height) = image.dimensions();
    let min_x = p0.x.min(p1.x).min(p2.x).floor().max(0.0) as u32;
    let min_y = p0.y.min(p1.y).min(p2.y).floor().max(0.0) as u32;
    let max_x = (p0.x.max(p1.x).max(p2.x).ceil() as u32).min(width.saturating_sub(1));
    let max_y = (p0.y.max(p1.y).max(p2.y).ceil() as u32).min(height.saturating_sub(1));

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
            let w0 = edge(p1, p2, p) / area;
            let w1 = edge(p2, p0, p) / area;
            let w2 = edge(p0, p1, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * p0.z + w1 * p1.z + w2 * p2.z;
            let slot = (y * width + x) as usize;
            if z < depth[slot] {
                depth[slot] = z;
                image.put_pixel(x, y, pixel);
            }
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn framing(triangles: &[Triangle]) -> Option<(Vec3, f32)> {
    let mut points = triangles.iter().flat_map(|t| t.corners);
    let first = points.next()?;
    let (min, max) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
    let radius = ((max - min).length() / 2.0).max(1e-3);
    Some(((min + max) / 2.0, radius))
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_scene::{Geometry, Material, SceneNode};

    fn quad_scene() -> (Scene, NodeId) {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = Geometry::new(
            vec![[-1.0, 0.0, -1.0], [1.0, 0.0, -1.0], [1.0, 0.0, 1.0], [-1.0, 0.0, 1.0]],
            vec![0, 1, 2, 0, 2, 3],
        );
        let material = Material {
            base_color: [1.0, 0.0, 0.0, 1.0],
            ..Material::default()
        };
        let id = scene.add_child(root, SceneNode::mesh("Floor", geometry, material)).unwrap();
        (scene, id)
    }

    #[test]
    fn test_render_draws_geometry() {
        let (scene, id) = quad_scene();
        let image = render_subtree(&scene, id, 64);
        assert_eq!(image.dimensions(), (64, 64));

        let center = image.get_pixel(32, 32);
        assert_ne!(*center, BACKGROUND);
        assert!(center[0] > center[1] && center[1] == center[2]);
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn test_empty_subtree_is_background() {
        let (mut scene, _) = quad_scene();
        let root = scene.root();
        let empty = scene.add_child(root, SceneNode::group("Empty")).unwrap();
        let image = render_subtree(&scene, empty, 16);
        assert!(image.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn test_clamp_size() {
        assert_eq!(clamp_size(0), MIN_THUMBNAIL_SIZE);
        assert_eq!(clamp_size(DEFAULT_THUMBNAIL_SIZE), DEFAULT_THUMBNAIL_SIZE);
        assert_eq!(clamp_size(70_000), MAX_THUMBNAIL_SIZE);
        assert_eq!(clamp_size(u32::MAX), MAX_THUMBNAIL_SIZE);
    }

    #[test]
    fn test_encode_png() {
        let (scene, _) = quad_scene();
        let png = encode_png(&render_scene(&scene, 32)).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }
}
