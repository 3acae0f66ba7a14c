//! Legged biped (NAO-class) rig

use std::f64::consts::PI;

use super::{GroundSpec, IdleWaveform, JointDescriptor, Lighting, RigDescriptor, RobotKind, SharedPivot};
use crate::camera::FramingPolicy;
use crate::math::Vector3;

/// Hip roots detached from the torso so the legs stay put
pub const TORSO_PIVOT_ROOTS: [&str; 2] = ["LHipYawPitch_link", "RHipYawPitch_link"];

/// Joints driving the torso pivot
pub const TORSO_PIVOT_JOINTS: [&str; 6] = [
    "LHipYawPitch",
    "RHipYawPitch",
    "LHipPitch",
    "RHipPitch",
    "LHipRoll",
    "RHipRoll",
];

/// Two coupled hip joints each contribute half of the torso motion
pub const TORSO_SHARED_SCALE: f64 = 0.5;

/// Nodes whose bounds anchor the ground plane
pub const GROUND_NODE_NAMES: [&str; 10] = [
    "LAnkleRoll_link",
    "RAnkleRoll_link",
    "LAnklePitch_link",
    "RAnklePitch_link",
    "LAnkleRoll",
    "RAnkleRoll",
    "LAnklePitch",
    "RAnklePitch",
    "LFoot",
    "RFoot",
];

/// Ankle nodes whose origins are tracked every frame
pub const CONTACT_NODE_NAMES: [&str; 4] = [
    "LAnkleRoll_link",
    "RAnkleRoll_link",
    "LAnklePitch_link",
    "RAnklePitch_link",
];

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn joints() -> Vec<JointDescriptor> {
    let z = [0.0, 0.0, 1.0];
    vec![
        JointDescriptor::new("HeadYaw", "HeadYaw_link", [0.0, 1.0, 0.0])
            .with_bounds(-2.08, 2.08)
            .with_idle(IdleWaveform::new(0.35, 0.6)),
        JointDescriptor::new("HeadPitch", "HeadPitch_link", [1.0, 0.0, 0.0])
            .with_bounds(-0.67, 0.51)
            .with_idle(IdleWaveform::new(0.22, 0.75).with_phase(PI / 2.0).with_offset(0.05)),
        JointDescriptor::new("LShoulderPitch", "LShoulderPitch_link", z)
            .with_neutral(1.45)
            .with_input_offset(-1.5)
            .with_bounds(-2.08, 2.09)
            .with_idle(IdleWaveform::new(0.4, 0.9).with_phase(PI)),
        JointDescriptor::new("RShoulderPitch", "RShoulderPitch_link", z)
            .with_neutral(1.45)
            .with_input_offset(-1.5)
            .with_bounds(-2.08, 2.09)
            .with_idle(IdleWaveform::new(0.4, 0.9)),
        JointDescriptor::new("LShoulderRoll", "LShoulderRoll_link", z)
            .with_neutral(0.1)
            .with_bounds(-0.31, 1.32)
            .with_idle(IdleWaveform::new(0.2, 0.95).with_phase(PI / 2.0).with_offset(0.05)),
        JointDescriptor::new("RShoulderRoll", "RShoulderRoll_link", z)
            .with_neutral(-0.1)
            .with_bounds(-1.32, 0.31)
            .with_idle(IdleWaveform::new(0.2, 0.95).with_phase(-PI / 2.0).with_offset(-0.05)),
        JointDescriptor::new("LElbowYaw", "LElbowYaw_link", z)
            .with_bounds(-2.09, 2.09)
            .with_idle(IdleWaveform::new(0.25, 1.15).with_phase(PI / 3.0)),
        JointDescriptor::new("RElbowYaw", "RElbowYaw_link", z)
            .with_bounds(-2.09, 2.09)
            .with_idle(IdleWaveform::new(0.25, 1.15).with_phase(-PI / 3.0)),
        JointDescriptor::new("LElbowRoll", "LElbowRoll_link", z)
            .with_neutral(-0.2)
            .with_bounds(-1.56, -0.03)
            .with_idle(IdleWaveform::new(0.3, 1.05).with_phase(PI / 2.0)),
        JointDescriptor::new("RElbowRoll", "RElbowRoll_link", z)
            .with_neutral(0.2)
            .with_bounds(0.03, 1.56)
            .with_idle(IdleWaveform::new(0.3, 1.05).with_phase(-PI / 2.0)),
        JointDescriptor::new("LWristYaw", "LWristYaw_link", z)
            .with_bounds(-1.82, 1.82)
            .with_idle(IdleWaveform::new(0.18, 1.3).with_phase(PI / 2.0)),
        JointDescriptor::new("RWristYaw", "RWristYaw_link", z)
            .with_bounds(-1.82, 1.82)
            .with_idle(IdleWaveform::new(0.18, 1.3).with_phase(-PI / 2.0)),
        JointDescriptor::new("LHipYawPitch", "LHipYawPitch_link", z).with_bounds(-1.14, 0.44),
        JointDescriptor::new("RHipYawPitch", "RHipYawPitch_link", z).with_bounds(-1.14, 0.44),
        // Legs follow live data only
        JointDescriptor::new("LHipPitch", "LHipPitch_link", z).with_bounds(-1.04, 0.79),
        JointDescriptor::new("RHipPitch", "RHipPitch_link", z).with_bounds(-1.04, 0.79),
        JointDescriptor::new("LKneePitch", "LKneePitch_link", z).with_bounds(0.0, 2.08),
        JointDescriptor::new("RKneePitch", "RKneePitch_link", z).with_bounds(0.0, 2.08),
        JointDescriptor::new("LAnklePitch", "LAnklePitch_link", z).with_bounds(-1.18, 0.93),
        JointDescriptor::new("RAnklePitch", "RAnklePitch_link", z).with_bounds(-1.18, 0.93),
    ]
}

impl RigDescriptor {
    /// Built-in rig for the legged biped
    pub fn nao() -> Self {
        Self {
            kind: RobotKind::Legged,
            name: "nao".to_string(),
            version: "nao-idle-20240701".to_string(),
            model_url: "modeles3D/nao/nao.glb".to_string(),
            root_name: "NAORoot".to_string(),
            model_scale: 1.3,
            orientation_fix: [-PI / 2.0, 0.0, 0.0],
            facing_yaw: -PI / 2.0,
            model_ground_offset: 0.0,
            freshness_window: 1.5,
            fallback_message: "Unable to load the NAO model".to_string(),
            framing: FramingPolicy {
                fov_deg: 45.0,
                half_extent: false,
                min_extent: 0.6,
                fallback_extent: 0.6,
                distance_scale: 0.85,
                distance_margin: 0.1,
                min_distance: 0.7,
                orbit: None,
                focus_ratio: 0.45,
                focus_min: 0.6,
                lift_ratio: 0.2,
                lift_min: 0.14,
            },
            lighting: Lighting {
                sky_color: 0xffffff,
                ground_color: 0x1b2435,
                hemisphere_intensity: 0.92,
                directional_color: 0xffffff,
                directional_intensity: 0.85,
                directional_position: Vector3::new(2.3, 3.0, 1.4),
            },
            ground: GroundSpec {
                plane_radius: 1.65,
                texture_repeat: 3.0,
                padding: 0.0,
                plane_contacts: names(&GROUND_NODE_NAMES),
                baseline_contacts: names(&CONTACT_NODE_NAMES),
            },
            joints: joints(),
            pivot_split: None,
            knee_pivot: None,
            shared_pivot: Some(SharedPivot {
                torso_node: "Torso_link".to_string(),
                roots: names(&TORSO_PIVOT_ROOTS),
                joints: names(&TORSO_PIVOT_JOINTS),
                pivot_name: "NaoTorsoPivot".to_string(),
                shared_scale: TORSO_SHARED_SCALE,
            }),
            pinned_base: None,
            hud: None,
            debug_joints: names(&[
                "LHipYawPitch",
                "RHipYawPitch",
                "LHipPitch",
                "RHipPitch",
                "LHipRoll",
                "RHipRoll",
                "LKneePitch",
                "RKneePitch",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legs_have_no_idle() {
        let rig = RigDescriptor::nao();
        for name in ["LHipPitch", "RKneePitch", "LAnklePitch", "LHipYawPitch"] {
            assert!(rig.joint(name).unwrap().idle.is_none(), "{} should be live-only", name);
        }
        assert!(rig.joint("HeadYaw").unwrap().idle.is_some());
    }

    #[test]
    fn test_neutrals_inside_bounds() {
        for joint in RigDescriptor::nao().joints {
            if let Some(bounds) = joint.bounds {
                assert!(bounds.contains(joint.neutral), "{}", joint.joint);
            }
        }
    }
}
