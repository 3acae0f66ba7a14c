//! Translation / rotation / scale transform for scene nodes
//!
//! Each node stores its transform relative to its parent; world matrices are
//! the product of the chain. Decomposition assumes no shear, which holds for
//! every transform the retargeting code produces.

use serde::{Deserialize, Serialize};

use super::{Matrix3, Matrix4, Quaternion, Vector3};

/// A local TRS transformation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    /// Position relative to the parent
    pub translation: Vector3,
    /// Orientation relative to the parent
    pub rotation: Quaternion,
    /// Per-axis scale
    pub scale: Vector3,
}

impl Transform {
    /// Identity transform (no translation, no rotation, unit scale)
    #[inline]
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Quaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Create from translation only
    #[inline]
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            translation: Vector3::new(x, y, z),
            ..Self::identity()
        }
    }

    /// Set the rotation
    #[inline]
    pub fn with_rotation(mut self, rotation: Quaternion) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set a uniform scale
    #[inline]
    pub fn with_uniform_scale(mut self, scale: f64) -> Self {
        self.scale = Vector3::new(scale, scale, scale);
        self
    }

    /// Convert to a 4x4 homogeneous matrix (`T · R · S`)
    pub fn to_matrix(&self) -> Matrix4 {
        let rs = self.rotation.to_rotation_matrix() * Matrix3::from_diagonal(&self.scale);
        let mut m = rs.to_homogeneous();
        m[(0, 3)] = self.translation.x;
        m[(1, 3)] = self.translation.y;
        m[(2, 3)] = self.translation.z;
        m
    }

    /// Decompose a homogeneous matrix into translation, rotation and scale
    ///
    /// A degenerate axis keeps zero scale and an identity rotation column.
    pub fn from_matrix(matrix: &Matrix4) -> Self {
        let translation = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let linear: Matrix3 = matrix.fixed_view::<3, 3>(0, 0).into_owned();

        let mut scale = Vector3::new(
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        );
        if linear.determinant() < 0.0 {
            scale.x = -scale.x;
        }

        let mut rot = Matrix3::identity();
        for axis in 0..3 {
            if scale[axis].abs() > 1e-12 {
                rot.set_column(axis, &(linear.column(axis) / scale[axis]));
            }
        }

        Self {
            translation,
            rotation: Quaternion::from_rotation_matrix(&rot),
            scale,
        }
    }

    /// Compose two transforms through their matrices: self * other
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform::from_matrix(&(self.to_matrix() * other.to_matrix()))
    }

    /// Transform a 3D point
    #[inline]
    pub fn transform_point(&self, point: &Vector3) -> Vector3 {
        self.rotation.rotate_vector(&point.component_mul(&self.scale)) + self.translation
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_identity_matrix() {
        assert_relative_eq!(Transform::identity().to_matrix(), Matrix4::identity());
    }

    #[test]
    fn test_transform_point_matches_matrix() {
        let t = Transform::from_translation(1.0, -2.0, 0.5)
            .with_rotation(Quaternion::from_axis_angle(&Vector3::y(), 0.6))
            .with_uniform_scale(1.25);
        let p = Vector3::new(0.3, 0.2, -0.7);
        let via_matrix = super::super::transform_point(&t.to_matrix(), &p);
        assert_relative_eq!(t.transform_point(&p), via_matrix, epsilon = 1e-12);
    }

    #[test]
    fn test_decompose_roundtrip() {
        let t = Transform::from_translation(0.1, 0.2, 0.3)
            .with_rotation(Quaternion::from_euler_xyz(-PI / 2.0, 0.3, 0.1))
            .with_uniform_scale(1.3);
        let back = Transform::from_matrix(&t.to_matrix());
        assert_relative_eq!(back.translation, t.translation, epsilon = 1e-12);
        assert_relative_eq!(back.scale, t.scale, epsilon = 1e-12);
        assert!(back.rotation.angular_distance(&t.rotation) < 1e-9);
    }

    #[test]
    fn test_compose_translation_then_rotation() {
        let parent = Transform::identity().with_rotation(Quaternion::from_axis_angle(&Vector3::z(), PI / 2.0));
        let child = Transform::from_translation(1.0, 0.0, 0.0);
        let world = parent.compose(&child);
        assert_relative_eq!(world.translation, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-10);
    }
}
