//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! Angles are in degrees throughout, counter-clockwise positive.

use serde::{Deserialize, Serialize};

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }

    /// Rotates around the origin by `degrees`.
    pub fn rotated(self, degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Left-hand perpendicular.
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }
}

pub fn cos_deg(degrees: f32) -> f32 {
    degrees.to_radians().cos()
}

pub fn sin_deg(degrees: f32) -> f32 {
    degrees.to_radians().sin()
}

/// Convex polygon with a local shape and a world transform.
///
/// World vertices are `rotate(local - origin, rotation) + origin + position`,
/// so `position` is the placement of the shape's local (0, 0) corner and
/// `origin` is the pivot for rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    local: Vec<Vec2>,
    origin: Vec2,
    position: Vec2,
    rotation: f32,
}

impl Polygon {
    pub fn new(local: Vec<Vec2>) -> Self {
        Self {
            local,
            origin: Vec2::ZERO,
            position: Vec2::ZERO,
            rotation: 0.0,
        }
    }

    /// Axis-aligned rectangle with its pivot at the center.
    pub fn rect(width: f32, height: f32) -> Self {
        let mut poly = Self::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(width, 0.0),
            Vec2::new(width, height),
            Vec2::new(0.0, height),
        ]);
        poly.origin = Vec2::new(width / 2.0, height / 2.0);
        poly
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.position = self.position.add(Vec2::new(dx, dy));
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = degrees;
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.rotation += degrees;
    }

    /// Vertices after applying origin, rotation and position.
    pub fn world_vertices(&self) -> Vec<Vec2> {
        self.local
            .iter()
            .map(|v| {
                v.sub(self.origin)
                    .rotated(self.rotation)
                    .add(self.origin)
                    .add(self.position)
            })
            .collect()
    }

    /// Separating-axis test. Touching edges count as overlap.
    pub fn overlaps(&self, other: &Polygon) -> bool {
        let a = self.world_vertices();
        let b = other.world_vertices();
        if a.len() < 3 || b.len() < 3 {
            return false;
        }
        !has_separating_axis(&a, &b) && !has_separating_axis(&b, &a)
    }
}

fn has_separating_axis(edges_of: &[Vec2], other: &[Vec2]) -> bool {
    (0..edges_of.len()).any(|i| {
        let edge = edges_of[(i + 1) % edges_of.len()].sub(edges_of[i]);
        let axis = edge.perp();
        let (min_a, max_a) = project(edges_of, axis);
        let (min_b, max_b) = project(other, axis);
        max_a < min_b || max_b < min_a
    })
}

fn project(vertices: &[Vec2], axis: Vec2) -> (f32, f32) {
    vertices
        .iter()
        .map(|v| v.dot(axis))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn rotate_quarter_turn() {
        assert!(approx(Vec2::new(1.0, 0.0).rotated(90.0), Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn rect_rotates_around_center() {
        let mut poly = Polygon::rect(4.0, 2.0);
        poly.set_rotation(90.0);
        let verts = poly.world_vertices();
        // (0,0) relative to center (2,1) is (-2,-1); rotated 90 is (1,-2).
        assert!(approx(verts[0], Vec2::new(3.0, -1.0)));
    }

    #[test]
    fn overlapping_and_separated_rects() {
        let a = Polygon::rect(10.0, 10.0);
        let mut b = Polygon::rect(10.0, 10.0);
        b.set_position(5.0, 5.0);
        assert!(a.overlaps(&b));

        b.set_position(20.0, 0.0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn rotated_diamond_misses_corner() {
        let a = Polygon::rect(10.0, 10.0);
        let mut b = Polygon::rect(10.0, 10.0);
        b.set_position(11.5, 11.5);
        b.set_rotation(45.0);
        // The diamond's left tip reaches ~9.4 along the diagonal but the
        // separating axis along (1,1) still splits them.
        assert!(!a.overlaps(&b));
    }
}
