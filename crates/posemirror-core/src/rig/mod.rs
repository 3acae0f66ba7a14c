//! Joint rig descriptors
//!
//! A [`RigDescriptor`] is the static, per-robot-kind description of how
//! telemetry joint names map onto model nodes and how the model skeleton has
//! to be reshaped before it can be animated. Two built-in rigs exist
//! ([`RigDescriptor::pepper`], [`RigDescriptor::nao`]); custom rigs can be
//! loaded from JSON with [`RigDescriptor::from_json`].

mod nao;
mod pepper;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::camera::FramingPolicy;
use crate::hud::HudAlignment;
use crate::math::{is_finite_vec, Bounds, Vector3};
use crate::{Error, Result};

/// Robot families with distinct skeletons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotKind {
    /// Pepper-class: wheeled base, hip and knee in the upper body
    Wheeled,
    /// NAO-class: legs with ankles touching the ground
    Legged,
}

impl RobotKind {
    /// Short tag used in container metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotKind::Wheeled => "wheeled",
            RobotKind::Legged => "legged",
        }
    }
}

/// One-sided clamp applied to an idle wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveClamp {
    Positive,
    Negative,
}

fn default_speed() -> f64 {
    1.0
}

/// Ambient oscillation applied when a joint has no live telemetry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdleWaveform {
    #[serde(default)]
    pub amplitude: f64,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub phase: f64,
    /// Constant added to the neutral angle
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub clamp: Option<WaveClamp>,
}

impl IdleWaveform {
    /// Wave with the given amplitude and angular speed
    pub const fn new(amplitude: f64, speed: f64) -> Self {
        Self {
            amplitude,
            speed,
            phase: 0.0,
            offset: 0.0,
            invert: false,
            clamp: None,
        }
    }

    pub const fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    pub const fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub const fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub const fn clamped(mut self, clamp: WaveClamp) -> Self {
        self.clamp = Some(clamp);
        self
    }

    /// Displacement from neutral at animation time `elapsed`
    pub fn sample(&self, elapsed: f64) -> f64 {
        let mut wave = if self.amplitude != 0.0 {
            (elapsed * self.speed + self.phase).sin() * self.amplitude
        } else {
            0.0
        };
        if self.invert {
            wave = -wave;
        }
        match self.clamp {
            Some(WaveClamp::Positive) => wave = wave.max(0.0),
            Some(WaveClamp::Negative) => wave = wave.min(0.0),
            None => {}
        }
        self.offset + wave
    }
}

fn default_input_scale() -> f64 {
    1.0
}

fn default_live_smoothing() -> f64 {
    6.0
}

fn default_idle_smoothing() -> f64 {
    2.0
}

/// Static description of one animated joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDescriptor {
    /// Telemetry joint name
    pub joint: String,
    /// Model node the rotation is applied to
    pub node: String,
    /// Rotation axis in the node's local frame
    pub axis: Vector3,
    /// Resting angle
    #[serde(default)]
    pub neutral: f64,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// `target = neutral + (angle + input_offset) · input_scale`
    #[serde(default = "default_input_scale")]
    pub input_scale: f64,
    #[serde(default)]
    pub input_offset: f64,
    /// Smoothing rate while live, per second
    #[serde(default = "default_live_smoothing")]
    pub live_smoothing: f64,
    /// Smoothing rate while idle, per second
    #[serde(default = "default_idle_smoothing")]
    pub idle_smoothing: f64,
    #[serde(default)]
    pub idle: Option<IdleWaveform>,
}

impl JointDescriptor {
    /// Joint with default scale, offset and smoothing
    pub fn new(joint: impl Into<String>, node: impl Into<String>, axis: [f64; 3]) -> Self {
        Self {
            joint: joint.into(),
            node: node.into(),
            axis: Vector3::new(axis[0], axis[1], axis[2]),
            neutral: 0.0,
            bounds: None,
            input_scale: default_input_scale(),
            input_offset: 0.0,
            live_smoothing: default_live_smoothing(),
            idle_smoothing: default_idle_smoothing(),
            idle: None,
        }
    }

    pub fn with_neutral(mut self, neutral: f64) -> Self {
        self.neutral = neutral;
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some(Bounds::new(min, max));
        self
    }

    pub fn with_input_scale(mut self, scale: f64) -> Self {
        self.input_scale = scale;
        self
    }

    pub fn with_input_offset(mut self, offset: f64) -> Self {
        self.input_offset = offset;
        self
    }

    pub fn with_idle(mut self, idle: IdleWaveform) -> Self {
        self.idle = Some(idle);
        self
    }

    /// Check numeric fields
    pub fn validate(&self) -> Result<()> {
        if !is_finite_vec(&self.axis) || self.axis.norm() < 1e-9 {
            return Err(Error::Config(format!("joint {}: axis must be a non-zero vector", self.joint)));
        }
        if let Some(bounds) = self.bounds {
            if !bounds.is_valid() {
                return Err(Error::Config(format!(
                    "joint {}: bounds [{}, {}] are not ordered",
                    self.joint, bounds.min, bounds.max
                )));
            }
        }
        let scalars = [
            self.neutral,
            self.input_scale,
            self.input_offset,
            self.live_smoothing,
            self.idle_smoothing,
        ];
        if scalars.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config(format!("joint {}: non-finite parameter", self.joint)));
        }
        Ok(())
    }
}

/// Node encoding two rotations, split into nested pivots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotSplit {
    /// Node carrying both rotations
    pub node: String,
    /// Outer pivot name (child of the original parent)
    pub outer_pivot: String,
    /// Inner pivot name (parent of the node)
    pub inner_pivot: String,
    pub outer_joint: String,
    pub outer_axis: Vector3,
    pub inner_joint: String,
    pub inner_axis: Vector3,
}

/// Knee pivot placed at the knee, driving the above-knee subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KneePivot {
    pub knee_node: String,
    pub above_knee_node: String,
    /// Parent of the pivot; the above-knee node's parent when absent from the model
    pub torso_node: String,
    pub pivot_name: String,
    pub joint: String,
    pub axis: Vector3,
}

/// Pivot shared by coupled joints (hip yaw-pitch)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedPivot {
    pub torso_node: String,
    /// Nodes detached from the torso and re-attached to its parent
    pub roots: Vec<String>,
    /// Joints redirected onto the pivot
    pub joints: Vec<String>,
    pub pivot_name: String,
    /// Input scale multiplier for redirected joints
    pub shared_scale: f64,
}

/// Base that stays planted whatever the upper body does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedBaseSpec {
    /// Node the helper is created under
    pub anchor_node: String,
    pub helper_name: String,
    /// Nodes moved under the helper
    pub nodes: Vec<String>,
    /// Nodes whose lowest point defines the helper origin
    pub contact_nodes: Vec<String>,
}

/// Ground plane and contact configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundSpec {
    pub plane_radius: f64,
    pub texture_repeat: f64,
    /// Added to the lowest contact bound when anchoring the plane
    pub padding: f64,
    /// Nodes whose bounds anchor the plane
    pub plane_contacts: Vec<String>,
    /// Nodes whose origins define the per-frame contact height
    pub baseline_contacts: Vec<String>,
}

/// Battery HUD placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HudSpec {
    /// Candidate anchor nodes, first found wins
    pub anchors: Vec<String>,
    pub panel_name: String,
    pub alignment: HudAlignment,
}

/// Stage lights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    pub sky_color: u32,
    pub ground_color: u32,
    pub hemisphere_intensity: f64,
    pub directional_color: u32,
    pub directional_intensity: f64,
    pub directional_position: Vector3,
}

/// Everything the visualizer needs to know about one robot kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigDescriptor {
    pub kind: RobotKind,
    /// Short robot name used in container metadata
    pub name: String,
    /// Engine version tag
    pub version: String,
    pub model_url: String,
    /// Name of the group wrapping the model
    pub root_name: String,
    pub model_scale: f64,
    /// Euler XYZ rotation applied to the model (Z-up assets → Y-up)
    pub orientation_fix: [f64; 3],
    /// Yaw applied to the root group so the robot faces the camera
    pub facing_yaw: f64,
    /// Extra lift after grounding
    #[serde(default)]
    pub model_ground_offset: f64,
    /// Seconds a telemetry update keeps a joint live
    pub freshness_window: f64,
    /// Message shown when setup fails
    pub fallback_message: String,
    pub framing: FramingPolicy,
    pub lighting: Lighting,
    pub ground: GroundSpec,
    pub joints: Vec<JointDescriptor>,
    #[serde(default)]
    pub pivot_split: Option<PivotSplit>,
    #[serde(default)]
    pub knee_pivot: Option<KneePivot>,
    #[serde(default)]
    pub shared_pivot: Option<SharedPivot>,
    #[serde(default)]
    pub pinned_base: Option<PinnedBaseSpec>,
    #[serde(default)]
    pub hud: Option<HudSpec>,
    /// Joints sampled by the debug sink
    #[serde(default)]
    pub debug_joints: Vec<String>,
}

impl RigDescriptor {
    /// Parse and validate a rig from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let rig: RigDescriptor = serde_json::from_str(json)?;
        rig.validate()?;
        Ok(rig)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a joint descriptor
    pub fn joint(&self, name: &str) -> Option<&JointDescriptor> {
        self.joints.iter().find(|j| j.joint == name)
    }

    /// Check descriptor consistency
    pub fn validate(&self) -> Result<()> {
        if !(self.model_scale.is_finite() && self.model_scale > 0.0) {
            return Err(Error::Config(format!("model_scale must be positive, got {}", self.model_scale)));
        }
        if !(self.freshness_window.is_finite() && self.freshness_window > 0.0) {
            return Err(Error::Config(format!(
                "freshness_window must be positive, got {}",
                self.freshness_window
            )));
        }
        if !(self.ground.plane_radius.is_finite() && self.ground.plane_radius > 0.0) {
            return Err(Error::Config("ground plane radius must be positive".into()));
        }
        let mut seen = HashSet::new();
        for joint in &self.joints {
            joint.validate()?;
            if !seen.insert(joint.joint.as_str()) {
                return Err(Error::Config(format!("duplicate joint {}", joint.joint)));
            }
        }
        if let Some(shared) = &self.shared_pivot {
            if !shared.shared_scale.is_finite() {
                return Err(Error::Config("shared_scale must be finite".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_builtin_rigs_validate() {
        RigDescriptor::pepper().validate().unwrap();
        RigDescriptor::nao().validate().unwrap();
    }

    #[test]
    fn test_json_roundtrip_keeps_rig() {
        let rig = RigDescriptor::nao();
        let back = RigDescriptor::from_json(&rig.to_json().unwrap()).unwrap();
        let names = |r: &RigDescriptor| r.joints.iter().map(|j| j.joint.clone()).collect::<Vec<_>>();
        assert_eq!(names(&back), names(&rig));
        assert_eq!(back.kind, RobotKind::Legged);
        assert_relative_eq!(back.freshness_window, rig.freshness_window);
        assert_eq!(back.shared_pivot.map(|s| s.roots), rig.shared_pivot.map(|s| s.roots));
    }

    #[test]
    fn test_joint_defaults_from_json() {
        let joint: JointDescriptor =
            serde_json::from_str(r#"{"joint":"HeadYaw","node":"HeadYaw_link","axis":[0.0,1.0,0.0]}"#).unwrap();
        assert_eq!(joint.input_scale, 1.0);
        assert_eq!(joint.live_smoothing, 6.0);
        assert_eq!(joint.idle_smoothing, 2.0);
        assert!(joint.bounds.is_none());
        assert!(joint.idle.is_none());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut rig = RigDescriptor::pepper();
        rig.joints[0].bounds = Some(Bounds::new(1.0, -1.0));
        assert!(matches!(rig.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_joint_rejected() {
        let mut rig = RigDescriptor::nao();
        let dup = rig.joints[0].clone();
        rig.joints.push(dup);
        assert!(matches!(rig.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_axis_rejected() {
        let joint = JointDescriptor::new("X", "x_link", [0.0, 0.0, 0.0]);
        assert!(joint.validate().is_err());
    }

    #[test]
    fn test_idle_wave_sample() {
        let wave = IdleWaveform::new(0.4, 0.9).with_phase(PI / 2.0).with_offset(0.05);
        assert_relative_eq!(wave.sample(0.0), 0.45, epsilon = 1e-12);

        let inverted = IdleWaveform::new(0.4, 1.0).with_phase(PI / 2.0).inverted();
        assert_relative_eq!(inverted.sample(0.0), -0.4, epsilon = 1e-12);

        let clamped = IdleWaveform::new(0.4, 1.0)
            .with_phase(-PI / 2.0)
            .clamped(WaveClamp::Positive);
        assert_eq!(clamped.sample(0.0), 0.0);
    }

    #[test]
    fn test_idle_wave_json_defaults() {
        let wave: IdleWaveform = serde_json::from_str(r#"{"amplitude":0.2,"clamp":"negative"}"#).unwrap();
        assert_eq!(wave.speed, 1.0);
        assert_eq!(wave.clamp, Some(WaveClamp::Negative));
    }
}
