//! Math utilities for posing: quaternions, TRS transforms and smoothing
//!
//! Built on top of nalgebra. Scene nodes carry a full translation /
//! rotation / scale transform; joint rotations are quaternions composed
//! onto a captured baseline.

mod quaternion;
mod smoothing;
mod transform;

pub use quaternion::Quaternion;
pub use smoothing::{blend_toward, smoothing_factor, Bounds};
pub use transform::Transform;

/// Positions, axes and scales
pub type Vector3 = nalgebra::Vector3<f64>;

/// Homogeneous world and local matrices
pub type Matrix4 = nalgebra::Matrix4<f64>;

/// Type alias for 3x3 rotation matrices
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// True when every component is finite
#[inline]
pub fn is_finite_vec(v: &Vector3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Transform a point by a homogeneous matrix
#[inline]
pub fn transform_point(m: &Matrix4, p: &Vector3) -> Vector3 {
    m.transform_point(&nalgebra::Point3::from(*p)).coords
}
