//! Quaternion implementation for joint and node rotations
//!
//! Wrapper around nalgebra's UnitQuaternion with a scene-graph friendly API.

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use super::{Matrix3, Vector3};

/// A unit quaternion representing a 3D rotation
///
/// Uses Hamilton convention (w, x, y, z) where w is the scalar part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar component (w)
    pub w: f64,
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Quaternion {
    /// Build from raw components, normalized
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        let mut q = Self { w, x, y, z };
        q.normalize();
        q
    }

    /// No rotation
    pub const fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Create from axis-angle representation
    ///
    /// A zero-length axis yields the identity.
    pub fn from_axis_angle(axis: &Vector3, angle: f64) -> Self {
        match nalgebra::Unit::try_new(*axis, 1e-10) {
            Some(unit_axis) => Self::from_nalgebra(UnitQuaternion::from_axis_angle(&unit_axis, angle)),
            None => Self::identity(),
        }
    }

    /// Create from intrinsic X-then-Y-then-Z Euler angles in radians
    ///
    /// Matches the convention of scene nodes authored as `rotation.set(x, y, z)`.
    pub fn from_euler_xyz(x: f64, y: f64, z: f64) -> Self {
        let qx = Self::from_axis_angle(&Vector3::x(), x);
        let qy = Self::from_axis_angle(&Vector3::y(), y);
        let qz = Self::from_axis_angle(&Vector3::z(), z);
        qx * qy * qz
    }

    /// From an orthonormal rotation matrix
    pub fn from_rotation_matrix(matrix: &Matrix3) -> Self {
        let rot = nalgebra::Rotation3::from_matrix_unchecked(*matrix);
        Self::from_nalgebra(UnitQuaternion::from_rotation_matrix(&rot))
    }

    pub fn from_nalgebra(uq: UnitQuaternion<f64>) -> Self {
        Self {
            w: uq.w,
            x: uq.i,
            y: uq.j,
            z: uq.k,
        }
    }

    pub fn to_nalgebra(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(self.w, self.x, self.y, self.z))
    }

    /// Roll, pitch and yaw in radians
    pub fn to_euler(&self) -> (f64, f64, f64) {
        self.to_nalgebra().euler_angles()
    }

    pub fn to_rotation_matrix(&self) -> Matrix3 {
        *self.to_nalgebra().to_rotation_matrix().matrix()
    }

    /// Compose rotations: `a.multiply(b)` applies `b` first, then `a`
    #[inline]
    pub fn multiply(&self, other: &Quaternion) -> Quaternion {
        Self::from_nalgebra(self.to_nalgebra() * other.to_nalgebra())
    }

    /// Conjugate, which is the inverse for unit quaternions
    #[inline]
    pub fn inverse(&self) -> Quaternion {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Rotate a vector into the parent frame
    #[inline]
    pub fn rotate_vector(&self, v: &Vector3) -> Vector3 {
        self.to_nalgebra() * v
    }

    /// Rescale to unit length; near-zero quaternions are left alone
    pub fn normalize(&mut self) {
        let q = nalgebra::Quaternion::new(self.w, self.x, self.y, self.z);
        if let Some(unit) = UnitQuaternion::try_new(q, 1e-10) {
            *self = Self::from_nalgebra(unit);
        }
    }

    /// 4D dot product of the components
    #[inline]
    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Smallest rotation angle taking `self` to `other`, in radians
    pub fn angular_distance(&self, other: &Quaternion) -> f64 {
        2.0 * self.dot(other).abs().min(1.0).acos()
    }

    /// True when all components are finite
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Self) -> Self::Output {
        self.multiply(&rhs)
    }
}

impl std::ops::Mul<&Quaternion> for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: &Self) -> Self::Output {
        self.multiply(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_new_normalizes() {
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0);
        assert_eq!(q, Quaternion::identity());
        let zero = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(zero.w, 0.0);
    }

    #[test]
    fn test_zero_axis_is_identity() {
        let q = Quaternion::from_axis_angle(&Vector3::zeros(), 1.0);
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn test_rotate_vector() {
        let q = Quaternion::from_axis_angle(&Vector3::z(), PI / 2.0);
        let rotated = q.rotate_vector(&Vector3::x());
        assert_relative_eq!(rotated, Vector3::y(), epsilon = 1e-10);
    }

    #[test]
    fn test_multiply_applies_right_first() {
        let yaw = Quaternion::from_axis_angle(&Vector3::y(), PI / 2.0);
        let pitch = Quaternion::from_axis_angle(&Vector3::x(), PI / 2.0);
        // pitch turns +Z into -Y, yaw leaves -Y alone
        let v = (yaw * pitch).rotate_vector(&Vector3::z());
        assert_relative_eq!(v, -Vector3::y(), epsilon = 1e-10);
    }

    #[test]
    fn test_inverse() {
        let q = Quaternion::from_euler_xyz(0.1, 0.2, 0.3);
        let result = q * q.inverse();
        assert_relative_eq!(result.dot(&Quaternion::identity()).abs(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_euler_xyz_order() {
        // -90° about X turns a Z-up asset Y-up
        let q = Quaternion::from_euler_xyz(-PI / 2.0, 0.0, 0.0);
        let up = q.rotate_vector(&Vector3::z());
        assert_relative_eq!(up, Vector3::y(), epsilon = 1e-10);
    }

    #[test]
    fn test_rotation_matrix_roundtrip() {
        let q = Quaternion::from_axis_angle(&Vector3::new(1.0, 2.0, 3.0), 0.7);
        let back = Quaternion::from_rotation_matrix(&q.to_rotation_matrix());
        assert!(q.angular_distance(&back) < 1e-9);
    }
}
