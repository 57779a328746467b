//! Axis-aligned bounding boxes (y grows downward)

use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub l: f32,
    pub t: f32,
    pub r: f32,
    pub b: f32,
}

impl Aabb {
    pub const fn new(l: f32, t: f32, r: f32, b: f32) -> Self {
        Self { l, t, r, b }
    }

    /// Box of size `w`×`h` centered on `center`
    pub fn from_center(center: Vec2, w: f32, h: f32) -> Self {
        Self::new(
            center.x - w * 0.5,
            center.y - h * 0.5,
            center.x + w * 0.5,
            center.y + h * 0.5,
        )
    }

    pub fn width(&self) -> f32 {
        self.r - self.l
    }

    pub fn height(&self) -> f32 {
        self.b - self.t
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new((self.l + self.r) * 0.5, (self.t + self.b) * 0.5)
    }

    /// Strict overlap; boxes sharing only an edge do not overlap
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.l < other.r && other.l < self.r && self.t < other.b && other.t < self.b
    }

    pub fn translated(&self, delta: Vec2) -> Self {
        Self::new(
            self.l + delta.x,
            self.t + delta.y,
            self.r + delta.x,
            self.b + delta.y,
        )
    }

    pub fn inflated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.l - dx, self.t - dy, self.r + dx, self.b + dy)
    }

    /// Squared distance from `point` to the closest point of the box
    pub fn distance_squared_to(&self, point: Vec2) -> f32 {
        let closest = Vec2::new(point.x.clamp(self.l, self.r), point.y.clamp(self.t, self.b));
        closest.distance_squared(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_touching_edges_do_not_overlap() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let b = Aabb::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&b.translated(Vec2::new(-0.5, 0.0))));
    }

    #[test]
    fn test_distance_to_point() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.distance_squared_to(Vec2::new(5.0, 5.0)), 0.0);
        assert_eq!(a.distance_squared_to(Vec2::new(13.0, 14.0)), 25.0);
    }

    fn arb_aabb() -> impl Strategy<Value = Aabb> {
        (-500.0f32..500.0, -500.0f32..500.0, 0.5f32..100.0, 0.5f32..100.0)
            .prop_map(|(x, y, w, h)| Aabb::new(x, y, x + w, y + h))
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in arb_aabb(), b in arb_aabb()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn translation_keeps_size(a in arb_aabb(), dx in -100.0f32..100.0, dy in -100.0f32..100.0) {
            let moved = a.translated(Vec2::new(dx, dy));
            prop_assert!((moved.width() - a.width()).abs() < 1e-3);
            prop_assert!((moved.height() - a.height()).abs() < 1e-3);
        }

        #[test]
        fn box_overlaps_its_inflation(a in arb_aabb(), d in 0.0f32..20.0) {
            prop_assert!(a.overlaps(&a.inflated(d, d)));
            prop_assert_eq!(a.inflated(d, d).distance_squared_to(a.center()), 0.0);
        }
    }
}
