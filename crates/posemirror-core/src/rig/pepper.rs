//! Wheeled biped (Pepper-class) rig

use std::f64::consts::PI;

use super::{
    GroundSpec, HudSpec, JointDescriptor, KneePivot, Lighting, PinnedBaseSpec, PivotSplit,
    RigDescriptor, RobotKind,
};
use crate::camera::{FramingPolicy, OrbitPolicy};
use crate::hud::HudAlignment;
use crate::math::Vector3;

/// Lift compensating the wheel geometry offset
pub const MODEL_GROUND_OFFSET: f64 = 0.07;

/// Extra clearance between wheels and ground plane
pub const GROUND_EXTRA_CLEARANCE: f64 = 0.015;

/// Nodes that belong to the wheeled base and must not follow the knee
pub const BASE_NODE_NAMES: [&str; 25] = [
    "AccelerometerBase",
    "Battery",
    "Bumper/Back",
    "Bumper/FrontLeft",
    "Bumper/FrontRight",
    "DeadAngle/Left",
    "DeadAngle/Right",
    "GyrometerBaseX",
    "GyrometerBaseY",
    "GyrometerBaseZ",
    "LaserSensor/Front",
    "LaserSensor/Left",
    "LaserSensor/Right",
    "LaserSensor/Shovel",
    "LaserSensor/VerticalLeft",
    "LaserSensor/VerticalRight",
    "PowerHatch",
    "Sonar/Back",
    "Sonar/Front",
    "KneePitch",
    "KneePitch_link_visual_0",
    "Leg",
    "WheelB_link",
    "WheelFL_link",
    "WheelFR_link",
];

/// Wheel meshes touching the floor
pub const WHEEL_CONTACT_NAMES: [&str; 3] = [
    "WheelB_link_visual_0",
    "WheelFL_link_visual_0",
    "WheelFR_link_visual_0",
];

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn joints() -> Vec<JointDescriptor> {
    vec![
        JointDescriptor::new("HipPitch", "PepperUpperBody", [0.0, 1.0, 0.0])
            .with_bounds(-1.0, 1.0)
            .with_input_scale(-1.0),
        JointDescriptor::new("HipRoll", "PepperUpperBody", [1.0, 0.0, 0.0])
            .with_bounds(-0.8, 0.8)
            .with_input_scale(-1.0),
        JointDescriptor::new("KneePitch", "PepperAboveKnee", [0.0, 1.0, 0.0])
            .with_bounds(-0.514872, 0.514872)
            .with_input_scale(-1.0),
        JointDescriptor::new("HeadYaw", "HeadYaw_link", [0.0, 0.0, 1.0]),
        JointDescriptor::new("HeadPitch", "HeadPitch_link", [0.0, 0.0, 1.0]),
        JointDescriptor::new("LShoulderPitch", "LShoulderPitch_link", [0.0, 0.0, 1.0])
            .with_neutral(1.5)
            .with_input_offset(-1.5),
        JointDescriptor::new("RShoulderPitch", "RShoulderPitch_link", [0.0, 0.0, 1.0])
            .with_neutral(1.5)
            .with_input_offset(-1.5),
        JointDescriptor::new("LShoulderRoll", "LShoulderRoll_link", [0.0, 0.0, 1.0]).with_bounds(-1.0, 1.0),
        JointDescriptor::new("RShoulderRoll", "RShoulderRoll_link", [0.0, 0.0, 1.0]).with_bounds(-1.0, 1.0),
        JointDescriptor::new("LElbowYaw", "LElbowYaw_link", [0.0, 0.0, 1.0]).with_bounds(-2.09, 2.09),
        JointDescriptor::new("RElbowYaw", "RElbowYaw_link", [0.0, 0.0, 1.0]).with_bounds(-2.09, 2.09),
        JointDescriptor::new("LElbowRoll", "LElbowRoll_link", [0.0, 0.0, 1.0]).with_bounds(-1.56, 0.0),
        JointDescriptor::new("RElbowRoll", "RElbowRoll_link", [0.0, 0.0, 1.0]).with_bounds(0.0, 1.56207),
        JointDescriptor::new("LWristYaw", "LWristYaw_link", [0.0, 0.0, 1.0])
            .with_input_scale(-1.0)
            .with_bounds(-1.82, 1.82),
        JointDescriptor::new("RWristYaw", "RWristYaw_link", [0.0, 0.0, 1.0]).with_bounds(-1.82, 1.82),
    ]
}

impl RigDescriptor {
    /// Built-in rig for the wheeled biped
    pub fn pepper() -> Self {
        let mut plane_contacts = names(&WHEEL_CONTACT_NAMES);
        plane_contacts.extend(names(&["WheelB_link", "WheelFL_link", "WheelFR_link", "PepperBaseHelper"]));

        Self {
            kind: RobotKind::Wheeled,
            name: "pepper".to_string(),
            version: "hud-battery-20240610-01".to_string(),
            model_url: "modeles3D/pepper/pepper.glb".to_string(),
            root_name: "RobotVirtuelRoot".to_string(),
            model_scale: 1.25,
            orientation_fix: [-PI / 2.0, 0.0, 0.0],
            facing_yaw: -PI / 2.0,
            model_ground_offset: MODEL_GROUND_OFFSET,
            freshness_window: 1.6,
            fallback_message: "Unable to load the 3D model".to_string(),
            framing: FramingPolicy {
                fov_deg: 40.0,
                half_extent: true,
                min_extent: 0.0,
                fallback_extent: 1.2,
                distance_scale: 1.05,
                distance_margin: 0.15,
                min_distance: 0.0,
                orbit: Some(OrbitPolicy {
                    min_ratio: 0.5,
                    min_floor: 0.7,
                    max_ratio: 3.8,
                    max_extra: 1.2,
                    clearance: 0.2,
                }),
                focus_ratio: 0.48,
                focus_min: 0.8,
                lift_ratio: 0.18,
                lift_min: 0.12,
            },
            lighting: Lighting {
                sky_color: 0xffffff,
                ground_color: 0x1b2636,
                hemisphere_intensity: 0.85,
                directional_color: 0xffffff,
                directional_intensity: 0.9,
                directional_position: Vector3::new(2.5, 3.0, 1.2),
            },
            ground: GroundSpec {
                plane_radius: 1.8,
                texture_repeat: 3.0,
                padding: -MODEL_GROUND_OFFSET - GROUND_EXTRA_CLEARANCE,
                plane_contacts,
                // The pinned base keeps the wheels planted; no per-frame correction
                baseline_contacts: Vec::new(),
            },
            joints: joints(),
            pivot_split: Some(PivotSplit {
                node: "PepperUpperBody".to_string(),
                outer_pivot: "PepperUpperBodyRollPivot".to_string(),
                inner_pivot: "PepperUpperBodyPitchPivot".to_string(),
                outer_joint: "HipRoll".to_string(),
                outer_axis: Vector3::x(),
                inner_joint: "HipPitch".to_string(),
                inner_axis: Vector3::y(),
            }),
            knee_pivot: Some(KneePivot {
                knee_node: "KneePitch_link".to_string(),
                above_knee_node: "PepperAboveKnee".to_string(),
                torso_node: "Torso_link".to_string(),
                pivot_name: "PepperKneePivot".to_string(),
                joint: "KneePitch".to_string(),
                axis: Vector3::y(),
            }),
            shared_pivot: None,
            pinned_base: Some(PinnedBaseSpec {
                anchor_node: "KneePitch_link".to_string(),
                helper_name: "PepperBaseHelper".to_string(),
                nodes: names(&BASE_NODE_NAMES),
                contact_nodes: names(&WHEEL_CONTACT_NAMES),
            }),
            hud: Some(HudSpec {
                anchors: names(&["Tablet", "Tablet_display"]),
                panel_name: "PepperBatteryHUD".to_string(),
                alignment: HudAlignment::tablet(),
            }),
            debug_joints: names(&["HipPitch", "HipRoll", "KneePitch", "HeadYaw", "HeadPitch"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shoulder_offset_maps_rest_to_neutral() {
        let rig = RigDescriptor::pepper();
        let shoulder = rig.joint("LShoulderPitch").unwrap();
        // Robot rest reading 1.5 rad lands on the neutral pose.
        let target = shoulder.neutral + (1.5 + shoulder.input_offset) * shoulder.input_scale;
        assert_eq!(target, 1.5);
    }

    #[test]
    fn test_ground_padding_sinks_plane() {
        let rig = RigDescriptor::pepper();
        assert!((rig.ground.padding + 0.085).abs() < 1e-12);
        assert_eq!(rig.joints.len(), 15);
        assert!(rig.hud.is_some());
    }
}
