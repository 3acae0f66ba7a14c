//! Synthetic robot models
//!
//! Small stand-ins for the real model files, authored Z-up with the node
//! names the built-in rigs look for. Used by tests, benches and the replay
//! tool when no decoded model is supplied.

use std::f64::consts::FRAC_PI_2;

use crate::backend::{AssetNode, AssetScene, HeadlessBackend, HeadlessContainer};
use crate::math::{Quaternion, Transform, Vector3};
use crate::rig::RigDescriptor;
use crate::scene::Aabb;

/// Ground texture served by [`headless_backend`]
pub const GROUND_TEXTURE_URL: &str = "modeles3D/sol.jpg";

/// Selector the fixture container is registered under
pub const CONTAINER_SELECTOR: &str = "#robot-virtuel";

#[derive(Default)]
struct AssetBuilder {
    nodes: Vec<AssetNode>,
}

impl AssetBuilder {
    fn node(&mut self, name: &str, parent: Option<usize>, at: [f64; 3], half: Option<[f64; 3]>) -> usize {
        self.nodes.push(AssetNode {
            name: name.to_string(),
            parent,
            transform: Transform::from_translation(at[0], at[1], at[2]),
            bounds: half.map(|h| Aabb::from_half_extents(h[0], h[1], h[2])),
        });
        self.nodes.len() - 1
    }

    /// Group whose local Z axis is turned to point sideways (pitch joints)
    fn pitch_group(&mut self, name: &str, parent: usize, at: [f64; 3]) -> usize {
        let id = self.group(name, parent, at);
        self.nodes[id].transform.rotation = Quaternion::from_axis_angle(&Vector3::x(), FRAC_PI_2);
        id
    }

    fn group(&mut self, name: &str, parent: usize, at: [f64; 3]) -> usize {
        self.node(name, Some(parent), at, None)
    }

    fn mesh(&mut self, name: &str, parent: usize, at: [f64; 3], half: [f64; 3]) -> usize {
        self.node(name, Some(parent), at, Some(half))
    }

    /// Shoulder → wrist chain on one side (`side` is +1 left, -1 right)
    fn arm(&mut self, prefix: &str, parent: usize, shoulder: [f64; 3], side: f64) {
        let pitch = self.group(&format!("{prefix}ShoulderPitch_link"), parent, shoulder);
        let roll = self.mesh(&format!("{prefix}ShoulderRoll_link"), pitch, [0.0, 0.0, 0.0], [0.04, 0.04, 0.04]);
        let yaw = self.group(&format!("{prefix}ElbowYaw_link"), roll, [0.105, 0.015 * side, 0.0]);
        let elbow = self.mesh(&format!("{prefix}ElbowRoll_link"), yaw, [0.0, 0.0, 0.0], [0.03, 0.03, 0.03]);
        let wrist = self.group(&format!("{prefix}WristYaw_link"), elbow, [0.056, 0.0, 0.0]);
        self.mesh(&format!("{prefix}Hand"), wrist, [0.03, 0.0, 0.0], [0.03, 0.02, 0.03]);
    }

    fn build(self) -> AssetScene {
        AssetScene { nodes: self.nodes }
    }
}

/// Wheeled biped with a tablet, three wheels and a separate above-knee group
pub fn wheeled_asset() -> AssetScene {
    let mut b = AssetBuilder::default();
    let torso = b.node("Torso_link", None, [0.0, 0.0, 0.0], None);

    let knee = b.group("KneePitch_link", torso, [0.0, 0.0, 0.3]);
    b.mesh("KneePitch_link_visual_0", knee, [0.0, 0.0, 0.0], [0.05, 0.05, 0.05]);
    b.mesh("Battery", knee, [0.0, 0.0, -0.05], [0.04, 0.06, 0.03]);
    let leg = b.mesh("Leg", knee, [0.0, 0.0, -0.1], [0.12, 0.12, 0.1]);
    for (name, at) in [
        ("WheelB", [-0.15, 0.0, -0.2]),
        ("WheelFL", [0.1, 0.1, -0.2]),
        ("WheelFR", [0.1, -0.1, -0.2]),
    ] {
        let wheel = b.group(&format!("{name}_link"), leg, at);
        b.mesh(&format!("{name}_link_visual_0"), wheel, [0.0, 0.0, 0.0], [0.05, 0.03, 0.05]);
    }

    let above = b.group("PepperAboveKnee", torso, [0.0, 0.0, 0.3]);
    let upper = b.group("PepperUpperBody", above, [0.0, 0.0, 0.3]);
    b.mesh("Chest", upper, [0.0, 0.0, 0.2], [0.12, 0.15, 0.2]);
    b.mesh("Tablet", upper, [0.13, 0.0, 0.2], [0.01, 0.1, 0.07]);
    let head_yaw = b.group("HeadYaw_link", upper, [0.0, 0.0, 0.5]);
    let head_pitch = b.group("HeadPitch_link", head_yaw, [0.0, 0.0, 0.05]);
    b.mesh("Head", head_pitch, [0.0, 0.0, 0.1], [0.1, 0.1, 0.1]);
    b.arm("L", upper, [0.0, 0.15, 0.35], 1.0);
    b.arm("R", upper, [0.0, -0.15, 0.35], -1.0);
    b.build()
}

/// Legged biped with hips hanging from the torso
pub fn legged_asset() -> AssetScene {
    let mut b = AssetBuilder::default();
    let torso = b.node("Torso_link", None, [0.0, 0.0, 0.33], Some([0.06, 0.08, 0.1]));

    let head_yaw = b.group("HeadYaw_link", torso, [0.0, 0.0, 0.126]);
    let head_pitch = b.group("HeadPitch_link", head_yaw, [0.0, 0.0, 0.0]);
    b.mesh("Head", head_pitch, [0.0, 0.0, 0.06], [0.06, 0.06, 0.06]);
    b.arm("L", torso, [0.0, 0.098, 0.1], 1.0);
    b.arm("R", torso, [0.0, -0.098, 0.1], -1.0);

    // Below the hip pitch link, local -Y points down and Z is the pitch axis
    for (prefix, side) in [("L", 1.0), ("R", -1.0)] {
        let yaw_pitch = b.group(&format!("{prefix}HipYawPitch_link"), torso, [0.0, 0.05 * side, -0.085]);
        let roll = b.group(&format!("{prefix}HipRoll_link"), yaw_pitch, [0.0, 0.0, 0.0]);
        let pitch = b.pitch_group(&format!("{prefix}HipPitch_link"), roll, [0.0, 0.0, 0.0]);
        b.mesh(&format!("{prefix}Thigh"), pitch, [0.0, -0.05, 0.0], [0.03, 0.05, 0.03]);
        let knee = b.group(&format!("{prefix}KneePitch_link"), pitch, [0.0, -0.1, 0.0]);
        b.mesh(&format!("{prefix}Tibia"), knee, [0.0, -0.05, 0.0], [0.03, 0.05, 0.03]);
        let ankle_pitch = b.group(&format!("{prefix}AnklePitch_link"), knee, [0.0, -0.1029, 0.0]);
        let ankle_roll = b.group(&format!("{prefix}AnkleRoll_link"), ankle_pitch, [0.0, 0.0, 0.0]);
        b.mesh(&format!("{prefix}Foot"), ankle_roll, [0.02, -0.035, 0.0], [0.08, 0.01, 0.04]);
    }
    b.build()
}

/// Fixture model matching a rig's kind
pub fn asset_for(rig: &RigDescriptor) -> AssetScene {
    match rig.kind {
        crate::rig::RobotKind::Wheeled => wheeled_asset(),
        crate::rig::RobotKind::Legged => legged_asset(),
    }
}

/// Headless backend serving the rig's model, the ground texture and a container
pub fn headless_backend(rig: &RigDescriptor, container: &HeadlessContainer) -> HeadlessBackend {
    HeadlessBackend::new()
        .with_asset(rig.model_url.clone(), asset_for(rig))
        .with_texture(GROUND_TEXTURE_URL)
        .with_container(CONTAINER_SELECTOR, container.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;

    #[test]
    fn test_fixtures_cover_rig_nodes() {
        for rig in [RigDescriptor::pepper(), RigDescriptor::nao()] {
            let asset = asset_for(&rig);
            asset.validate().unwrap();
            let mut graph = SceneGraph::new();
            let root = graph.root();
            let model = asset.instantiate(&mut graph, root, "model").unwrap();
            for joint in &rig.joints {
                assert!(
                    graph.find_by_name(model, &joint.node).is_some(),
                    "{}: node {} missing",
                    rig.name,
                    joint.node
                );
            }
        }
    }
}
