//! Frame-rate independent exponential smoothing
//!
//! Joints ease toward their target with a factor derived from a rate and the
//! frame delta, so motion looks the same at 30 or 144 frames per second and
//! no velocity state needs to be stored.

use serde::{Deserialize, Serialize};

/// Smoothing factor `1 - e^(-rate·dt)` clamped to `[0, 1]`
///
/// Negative rates count as zero. An infinite rate snaps (`1.0`) for any
/// positive `dt`; other non-finite inputs yield `0.0` (no step).
#[inline]
pub fn smoothing_factor(rate: f64, dt: f64) -> f64 {
    if !dt.is_finite() || rate.is_nan() {
        return 0.0;
    }
    if rate.is_infinite() {
        return if rate > 0.0 && dt > 0.0 { 1.0 } else { 0.0 };
    }
    let factor = 1.0 - (-rate.max(0.0) * dt).exp();
    factor.clamp(0.0, 1.0)
}

/// Move `current` toward `target` by one smoothing step
///
/// Returns `current` unchanged when either angle is non-finite.
#[inline]
pub fn blend_toward(current: f64, target: f64, rate: f64, dt: f64) -> f64 {
    if !current.is_finite() || !target.is_finite() {
        return current;
    }
    current + (target - current) * smoothing_factor(rate, dt)
}

/// Inclusive angle limits for a joint, in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower limit
    pub min: f64,
    /// Upper limit
    pub max: f64,
}

impl Bounds {
    /// Create new bounds
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp a value into the bounds
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Check if a value lies inside the bounds
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Bounds are usable when both ends are finite and ordered
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_smoothing_factor_range() {
        assert_relative_eq!(smoothing_factor(6.0, 0.0), 0.0);
        assert_relative_eq!(smoothing_factor(6.0, 1.0 / 60.0), 1.0 - (-0.1f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(smoothing_factor(6.0, 1e6), 1.0);
    }

    #[test]
    fn test_smoothing_factor_negative_rate_is_zero() {
        assert_eq!(smoothing_factor(-3.0, 0.5), 0.0);
    }

    #[test]
    fn test_smoothing_factor_non_finite() {
        assert_eq!(smoothing_factor(6.0, f64::NAN), 0.0);
        assert_eq!(smoothing_factor(f64::NAN, 0.1), 0.0);
        assert_eq!(smoothing_factor(f64::NEG_INFINITY, 0.1), 0.0);
        assert_eq!(smoothing_factor(6.0, -1.0), 0.0);
    }

    #[test]
    fn test_infinite_rate_snaps() {
        assert_eq!(smoothing_factor(f64::INFINITY, 0.1), 1.0);
        assert_eq!(smoothing_factor(f64::INFINITY, 0.0), 0.0);
        assert_relative_eq!(blend_toward(0.2, 0.9, f64::INFINITY, 1.0 / 60.0), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_split_frames_match_single_frame() {
        // Two half steps land where one full step does.
        let one = blend_toward(0.0, 1.0, 4.0, 0.2);
        let half = blend_toward(0.0, 1.0, 4.0, 0.1);
        let two = blend_toward(half, 1.0, 4.0, 0.1);
        assert_relative_eq!(one, two, epsilon = 1e-12);
    }

    #[test]
    fn test_blend_non_finite_target_holds() {
        assert_eq!(blend_toward(0.3, f64::NAN, 6.0, 0.016), 0.3);
    }

    #[test]
    fn test_bounds() {
        let b = Bounds::new(-1.0, 2.0);
        assert_eq!(b.clamp(3.0), 2.0);
        assert_eq!(b.clamp(-5.0), -1.0);
        assert_eq!(b.clamp(0.5), 0.5);
        assert!(b.contains(2.0));
        assert!(!b.contains(2.1));
        assert!(b.is_valid());
        assert!(!Bounds::new(1.0, 0.0).is_valid());
    }
}
