//! Perspective camera and fit-to-view framing
//!
//! The camera orbits a focus point on the model's vertical axis. Framing
//! turns the model's bounding-box size into a camera distance, focus height
//! and (optionally) orbit distance limits.

use serde::{Deserialize, Serialize};

use crate::math::Vector3;

/// Perspective camera looking at a target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Vertical field of view in degrees
    pub fov_deg: f64,
    /// Width / height
    pub aspect: f64,
    /// Near clip distance
    pub near: f64,
    /// Far clip distance
    pub far: f64,
    /// Eye position
    pub position: Vector3,
    /// Orbit focus
    pub target: Vector3,
    /// Orbit distance limits (min, max)
    pub orbit_limits: Option<(f64, f64)>,
}

impl Camera {
    /// Create a camera at a default eye position
    pub fn new(fov_deg: f64, aspect: f64) -> Self {
        Self {
            fov_deg,
            aspect,
            near: 0.1,
            far: 100.0,
            position: Vector3::new(0.0, 1.35, 3.2),
            target: Vector3::new(0.0, 1.0, 0.0),
            orbit_limits: None,
        }
    }

    /// Update the aspect ratio, ignoring degenerate sizes
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f64 / height as f64;
        }
    }

    /// Distance from eye to target
    pub fn distance(&self) -> f64 {
        (self.position - self.target).norm()
    }
}

/// Orbit distance limits derived from the model size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitPolicy {
    /// `min = max(extent · min_ratio, min_floor)`
    pub min_ratio: f64,
    pub min_floor: f64,
    /// `max = max(extent · max_ratio, min + max_extra)`
    pub max_ratio: f64,
    pub max_extra: f64,
    /// The initial distance stays at least `min + clearance`
    pub clearance: f64,
}

/// How a camera is placed around a model of a given size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramingPolicy {
    /// Vertical field of view in degrees
    pub fov_deg: f64,
    /// Use half the largest extent instead of the full extent
    pub half_extent: bool,
    /// Lower bound applied to the largest extent
    pub min_extent: f64,
    /// Extent used when the model has no usable size
    pub fallback_extent: f64,
    /// Distance multiplier
    pub distance_scale: f64,
    /// Distance added after scaling
    pub distance_margin: f64,
    /// Lower bound on the distance
    pub min_distance: f64,
    /// Orbit limits, if the camera controls should be clamped
    pub orbit: Option<OrbitPolicy>,
    /// `focus_y = max(height · focus_ratio, focus_min)`
    pub focus_ratio: f64,
    pub focus_min: f64,
    /// `eye_y = focus_y + max(height · lift_ratio, lift_min)`
    pub lift_ratio: f64,
    pub lift_min: f64,
}

/// Result of fitting the camera to a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    pub distance: f64,
    pub focus_y: f64,
    pub eye_y: f64,
    pub orbit_limits: Option<(f64, f64)>,
}

impl FramingPolicy {
    /// Compute framing for a model bounding-box size
    pub fn frame(&self, size: &Vector3) -> Framing {
        let mut extent = size.x.max(size.y).max(size.z).max(self.min_extent);
        if !extent.is_finite() || extent <= 0.0 {
            extent = self.fallback_extent;
        }
        let basis = if self.half_extent { extent * 0.5 } else { extent };
        let half_fov = (self.fov_deg.to_radians() * 0.5).tan();

        let mut distance = (basis / half_fov) * self.distance_scale + self.distance_margin;
        distance = distance.max(self.min_distance);

        let orbit_limits = self.orbit.map(|orbit| {
            let min = (extent * orbit.min_ratio).max(orbit.min_floor);
            let max = (extent * orbit.max_ratio).max(min + orbit.max_extra);
            distance = distance.max(min + orbit.clearance);
            (min, max)
        });

        let height = if size.y.is_finite() { size.y } else { 0.0 };
        let focus_y = (height * self.focus_ratio).max(self.focus_min);
        let eye_y = focus_y + (height * self.lift_ratio).max(self.lift_min);

        Framing {
            distance,
            focus_y,
            eye_y,
            orbit_limits,
        }
    }

    /// Fit the camera to a model bounding-box size
    pub fn fit(&self, camera: &mut Camera, size: &Vector3) -> Framing {
        let framing = self.frame(size);
        camera.fov_deg = self.fov_deg;
        camera.target = Vector3::new(0.0, framing.focus_y, 0.0);
        camera.position = Vector3::new(0.0, framing.eye_y, framing.distance);
        camera.orbit_limits = framing.orbit_limits;
        framing
    }
}
