//! Axis-aligned bounding boxes

use serde::{Deserialize, Serialize};

use crate::math::{transform_point, Matrix4, Vector3};

/// An axis-aligned bounding box
///
/// The empty box has `min = +inf`, `max = -inf` so that any union with it is
/// the other operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vector3,
    /// Maximum corner
    pub max: Vector3,
}

impl Aabb {
    /// Create from two corners
    pub fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// Box centred on the origin with the given half extents
    pub fn from_half_extents(hx: f64, hy: f64, hz: f64) -> Self {
        Self::new(Vector3::new(-hx, -hy, -hz), Vector3::new(hx, hy, hz))
    }

    /// The empty box
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    /// True when no point has been added
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Grow to contain a point
    pub fn expand_point(&mut self, p: &Vector3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Box size (zero when empty)
    pub fn size(&self) -> Vector3 {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Box centre (zero when empty)
    pub fn center(&self) -> Vector3 {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Bounds of this box after transforming its eight corners
    pub fn transformed(&self, m: &Matrix4) -> Aabb {
        let mut out = Aabb::empty();
        if self.is_empty() {
            return out;
        }
        for i in 0..8 {
            let corner = Vector3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_point(&transform_point(m, &corner));
        }
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quaternion;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_empty_union() {
        let b = Aabb::from_half_extents(1.0, 2.0, 3.0);
        assert!(Aabb::empty().is_empty());
        assert_eq!(Aabb::empty().union(&b), b);
        assert_eq!(Aabb::empty().size(), Vector3::zeros());
    }

    #[test]
    fn test_transformed_rotation() {
        let b = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 2.0));
        let m = Quaternion::from_axis_angle(&Vector3::x(), -PI / 2.0)
            .to_nalgebra()
            .to_homogeneous();
        let t = b.transformed(&m);
        assert_relative_eq!(t.max.y, 2.0, epsilon = 1e-10);
        assert_relative_eq!(t.min.y, 0.0, epsilon = 1e-10);
    }
}
