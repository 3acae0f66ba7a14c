//! Runtime skeleton surgery
//!
//! Model skeletons rarely expose one node per telemetry joint. Before the
//! first frame the loaded model is reshaped:
//!
//! - nodes carrying two rotations get nested zero-offset pivots (one per joint)
//! - the knee gets a pivot placed at its world position
//! - coupled hip roots are hoisted out of the torso, which is re-hung from a
//!   pivot at the hip centre driven by several joints at once
//! - the wheeled base is parked under a helper whose world pose is pinned
//!
//! Missing nodes only produce warnings and fewer controllers.

use crate::controller::{ControllerSet, JointController};
use crate::math::{Matrix4, Quaternion, Transform, Vector3};
use crate::rig::{KneePivot, PinnedBaseSpec, PivotSplit, RigDescriptor, SharedPivot};
use crate::scene::{NodeId, NodeKind, SceneGraph};
use crate::{Error, Result};

/// What retargeting did, for logging and tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetargetReport {
    /// Joints that received a controller
    pub bound: Vec<String>,
    /// Joints whose node was not found
    pub missing: Vec<String>,
    /// Synthetic nodes created
    pub pivots: Vec<String>,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

impl RetargetReport {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Base helper kept at a fixed world pose
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedBase {
    helper: NodeId,
    world: Matrix4,
    local_scale: Vector3,
}

impl PinnedBase {
    pub fn helper(&self) -> NodeId {
        self.helper
    }

    /// World matrix the helper is pinned to
    pub fn world(&self) -> &Matrix4 {
        &self.world
    }

    /// Recompute the helper's local transform so its world pose is unchanged
    pub fn apply(&self, graph: &mut SceneGraph) -> Result<()> {
        let parent = graph
            .parent(self.helper)
            .ok_or_else(|| Error::Scene(format!("pinned base helper {} is detached", self.helper)))?;
        let inv = graph
            .world_matrix(parent)?
            .try_inverse()
            .ok_or_else(|| Error::Scene(format!("helper parent {} has a singular transform", parent)))?;
        let local = Transform::from_matrix(&(inv * self.world));
        let node = graph
            .local_mut(self.helper)
            .ok_or_else(|| Error::Scene(format!("unknown node {}", self.helper)))?;
        node.translation = local.translation;
        node.rotation = local.rotation;
        node.scale = self.local_scale;
        Ok(())
    }
}

/// Result of reshaping a model for a rig
#[derive(Debug, Clone, Default)]
pub struct Retargeted {
    pub controllers: ControllerSet,
    /// Pivot whose pose is reported to the debug sink
    pub torso_pivot: Option<NodeId>,
    pub pinned_base: Option<PinnedBase>,
    pub report: RetargetReport,
}

/// Nested pivots created for a [`PivotSplit`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitPivots {
    pub outer: Option<NodeId>,
    pub inner: Option<NodeId>,
}

fn find(graph: &SceneGraph, root: NodeId, name: &str) -> Option<NodeId> {
    graph.find_by_name(root, name)
}

/// Insert outer → inner pivots between the split node and its parent
///
/// The node keeps its local transform, so nothing moves until a joint
/// rotates a pivot.
pub fn split_node(
    graph: &mut SceneGraph,
    root: NodeId,
    spec: &PivotSplit,
    report: &mut RetargetReport,
) -> SplitPivots {
    let Some(node) = find(graph, root, &spec.node) else {
        report.warn(format!("pivot split skipped: node '{}' not found", spec.node));
        return SplitPivots::default();
    };
    let Some(parent) = graph.parent(node) else {
        report.warn(format!("pivot split skipped: node '{}' has no parent", spec.node));
        return SplitPivots::default();
    };
    let outer = match graph.add_child(parent, spec.outer_pivot.clone(), NodeKind::Group, Transform::identity()) {
        Ok(id) => id,
        Err(e) => {
            report.warn(format!("pivot split skipped: {}", e));
            return SplitPivots::default();
        }
    };
    report.pivots.push(spec.outer_pivot.clone());
    let inner = match graph.add_child(outer, spec.inner_pivot.clone(), NodeKind::Group, Transform::identity()) {
        Ok(id) => id,
        Err(e) => {
            report.warn(format!("inner pivot '{}' not created: {}", spec.inner_pivot, e));
            return SplitPivots {
                outer: Some(outer),
                inner: None,
            };
        }
    };
    report.pivots.push(spec.inner_pivot.clone());
    if let Err(e) = graph.set_parent(node, inner) {
        report.warn(format!("could not hang '{}' under its pivots: {}", spec.node, e));
    }
    SplitPivots {
        outer: Some(outer),
        inner: Some(inner),
    }
}

/// Rebind the split joints onto their pivots
///
/// With a single pivot available both joints share it.
pub fn bind_split(
    graph: &SceneGraph,
    controllers: &mut ControllerSet,
    spec: &PivotSplit,
    pivots: SplitPivots,
    report: &mut RetargetReport,
) {
    let bindings = [
        (&spec.inner_joint, spec.inner_axis, pivots.inner, pivots.outer),
        (&spec.outer_joint, spec.outer_axis, pivots.outer, pivots.inner),
    ];
    for (joint, axis, own, other) in bindings {
        let Some(controller) = controllers.get_mut(joint) else {
            continue;
        };
        let pivot = match (own, other) {
            (Some(pivot), _) => pivot,
            (None, Some(pivot)) => {
                report.warn(format!("{} falls back to pivot '{}'", joint, graph.name(pivot)));
                pivot
            }
            (None, None) => {
                report.warn(format!("{} has no pivot, staying on '{}'", joint, graph.name(controller.node)));
                continue;
            }
        };
        let base = graph.local(pivot).map(|t| t.rotation).unwrap_or_default();
        controller.rebind(pivot, base, axis);
    }
}

/// Create the knee pivot and hang the above-knee subtree from it
pub fn knee_pivot(graph: &mut SceneGraph, root: NodeId, spec: &KneePivot, report: &mut RetargetReport) -> Option<NodeId> {
    let knee = find(graph, root, &spec.knee_node);
    let above = find(graph, root, &spec.above_knee_node);
    let (Some(knee), Some(above)) = (knee, above) else {
        report.warn(format!(
            "knee pivot skipped: '{}' or '{}' not found",
            spec.knee_node, spec.above_knee_node
        ));
        return None;
    };
    let torso = find(graph, root, &spec.torso_node).or_else(|| graph.parent(above))?;
    let build = |graph: &mut SceneGraph| -> Result<NodeId> {
        let knee_world = graph.world_position(knee)?;
        let local = graph.world_to_local(torso, &knee_world)?;
        let pivot = graph.add_child(
            torso,
            spec.pivot_name.clone(),
            NodeKind::Group,
            Transform::from_translation(local.x, local.y, local.z),
        )?;
        graph.attach(above, pivot)?;
        Ok(pivot)
    };
    match build(graph) {
        Ok(pivot) => {
            report.pivots.push(spec.pivot_name.clone());
            Some(pivot)
        }
        Err(e) => {
            report.warn(format!("knee pivot not created: {}", e));
            None
        }
    }
}

/// Park the base nodes under a helper and capture its world pose
pub fn pin_base(
    graph: &mut SceneGraph,
    root: NodeId,
    spec: &PinnedBaseSpec,
    report: &mut RetargetReport,
) -> Option<PinnedBase> {
    let Some(anchor) = find(graph, root, &spec.anchor_node) else {
        report.warn(format!("pinned base skipped: '{}' not found", spec.anchor_node));
        return None;
    };
    let helper = match graph.add_child(anchor, spec.helper_name.clone(), NodeKind::Group, Transform::identity()) {
        Ok(id) => id,
        Err(e) => {
            report.warn(format!("pinned base skipped: {}", e));
            return None;
        }
    };
    report.pivots.push(spec.helper_name.clone());

    for name in &spec.nodes {
        let Some(node) = find(graph, root, name) else {
            continue;
        };
        if let Err(e) = graph.attach(node, helper) {
            report.warn(format!("base node '{}' not moved: {}", name, e));
        }
    }

    let contact_y = spec
        .contact_nodes
        .iter()
        .filter_map(|name| find(graph, root, name))
        .filter_map(|node| graph.world_bounds(node).ok())
        .filter(|b| !b.is_empty())
        .map(|b| b.min.y)
        .filter(|y| y.is_finite())
        .reduce(f64::min)
        .or_else(|| graph.world_bounds(helper).ok().filter(|b| !b.is_empty()).map(|b| b.min.y));

    // Lower the helper in world space so the wheel contact sits at its origin height
    if let Some(offset) = contact_y.filter(|y| y.is_finite() && y.abs() > 1e-6) {
        let lowered = graph.world_position(helper).and_then(|p| {
            let target = p - Vector3::new(0.0, offset, 0.0);
            graph.world_to_local(anchor, &target)
        });
        match (lowered, graph.local_mut(helper)) {
            (Ok(local), Some(transform)) => transform.translation = local,
            (Err(e), _) => report.warn(format!("base helper not lowered: {}", e)),
            _ => {}
        }
    }

    let world = graph.world_matrix(helper).ok()?;
    let local_scale = graph.local(helper).map(|t| t.scale).unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
    Some(PinnedBase {
        helper,
        world,
        local_scale,
    })
}

/// Hoist the coupled roots out of the torso and hang the torso from a pivot
pub fn shared_pivot(graph: &mut SceneGraph, root: NodeId, spec: &SharedPivot, report: &mut RetargetReport) -> Option<NodeId> {
    let Some(torso) = find(graph, root, &spec.torso_node) else {
        report.warn(format!("shared pivot skipped: '{}' not found", spec.torso_node));
        return None;
    };
    let Some(parent) = graph.parent(torso) else {
        report.warn(format!("shared pivot skipped: '{}' has no parent", spec.torso_node));
        return None;
    };
    let roots: Vec<NodeId> = spec.roots.iter().filter_map(|name| find(graph, root, name)).collect();
    if roots.len() != 2 {
        report.warn(format!(
            "shared pivot expects two coupled roots, found {}; input scale stays {}",
            roots.len(),
            spec.shared_scale
        ));
    }

    let build = |graph: &mut SceneGraph| -> Result<NodeId> {
        for &node in &roots {
            graph.attach(node, parent)?;
        }
        let position = if roots.is_empty() {
            graph.local(torso).map(|t| t.translation).unwrap_or_else(Vector3::zeros)
        } else {
            let mut sum = Vector3::zeros();
            for &node in &roots {
                sum += graph.world_position(node)?;
            }
            graph.world_to_local(parent, &(sum / roots.len() as f64))?
        };
        let pivot = graph.add_child(
            parent,
            spec.pivot_name.clone(),
            NodeKind::Group,
            Transform::from_translation(position.x, position.y, position.z),
        )?;
        graph.attach(torso, pivot)?;
        Ok(pivot)
    };
    match build(graph) {
        Ok(pivot) => {
            report.pivots.push(spec.pivot_name.clone());
            Some(pivot)
        }
        Err(e) => {
            report.warn(format!("shared pivot not created: {}", e));
            None
        }
    }
}

/// Redirect the listed joints onto the shared pivot
///
/// Each joint keeps its world-space axis: the axis is taken from the bind
/// node's world orientation and re-expressed in the pivot frame. The input
/// scale is multiplied by the shared scale.
pub fn redirect_to_pivot(
    graph: &SceneGraph,
    controllers: &mut ControllerSet,
    pivot: NodeId,
    spec: &SharedPivot,
) -> Result<usize> {
    let pivot_world = graph.world_rotation(pivot)?;
    let pivot_inv = pivot_world.inverse();
    let base = graph.local(pivot).map(|t| t.rotation).unwrap_or_default();
    let mut redirected = 0;
    for joint in &spec.joints {
        let Some(controller) = controllers.get_mut(joint) else {
            continue;
        };
        let source = graph.world_rotation(controller.bind_node).unwrap_or(pivot_world);
        let world_axis = source.rotate_vector(&controller.bind_axis).normalize();
        let pivot_axis = pivot_inv.rotate_vector(&world_axis);
        controller.rebind(pivot, base, pivot_axis);
        controller.input_scale *= spec.shared_scale;
        redirected += 1;
    }
    Ok(redirected)
}

/// Create a controller per descriptor and pose its node at neutral
pub fn bind_controllers(graph: &mut SceneGraph, root: NodeId, rig: &RigDescriptor, report: &mut RetargetReport) -> ControllerSet {
    let index = graph.name_index(root);
    let mut controllers = ControllerSet::new();
    for desc in &rig.joints {
        let Some(&node) = index.get(&desc.node) else {
            tracing::warn!("joint {}: node '{}' not found", desc.joint, desc.node);
            report.missing.push(desc.joint.clone());
            continue;
        };
        let base = graph.local(node).map(|t| t.rotation).unwrap_or_default();
        let controller = JointController::from_descriptor(desc, node, base);
        if let Some(local) = graph.local_mut(node) {
            local.rotation = controller.neutral_rotation();
        }
        report.bound.push(desc.joint.clone());
        controllers.insert(controller);
    }
    controllers
}

/// Reshape the model under `root` for `rig` and bind its controllers
pub fn retarget(graph: &mut SceneGraph, root: NodeId, rig: &RigDescriptor) -> Retargeted {
    let mut report = RetargetReport::default();

    let split = rig
        .pivot_split
        .as_ref()
        .map(|spec| split_node(graph, root, spec, &mut report));
    let knee = rig
        .knee_pivot
        .as_ref()
        .and_then(|spec| knee_pivot(graph, root, spec, &mut report));
    let pinned_base = rig
        .pinned_base
        .as_ref()
        .and_then(|spec| pin_base(graph, root, spec, &mut report));
    let shared = rig
        .shared_pivot
        .as_ref()
        .and_then(|spec| shared_pivot(graph, root, spec, &mut report));

    let mut controllers = bind_controllers(graph, root, rig, &mut report);

    if let (Some(spec), Some(pivots)) = (&rig.pivot_split, split) {
        bind_split(graph, &mut controllers, spec, pivots, &mut report);
    }
    if let (Some(spec), Some(pivot)) = (&rig.knee_pivot, knee) {
        if let Some(controller) = controllers.get_mut(&spec.joint) {
            let base = graph.local(pivot).map(|t| t.rotation).unwrap_or_else(Quaternion::identity);
            controller.rebind(pivot, base, spec.axis);
        }
    }
    if let (Some(spec), Some(pivot)) = (&rig.shared_pivot, shared) {
        match redirect_to_pivot(graph, &mut controllers, pivot, spec) {
            Ok(n) => tracing::debug!("{} joints redirected to '{}'", n, spec.pivot_name),
            Err(e) => report.warn(format!("joints not redirected: {}", e)),
        }
    }

    tracing::info!(
        "{}: {} joints bound, {} missing, pivots {:?}",
        rig.name,
        report.bound.len(),
        report.missing.len(),
        report.pivots
    );

    Retargeted {
        controllers,
        torso_pivot: shared.or(split.and_then(|s| s.inner)),
        pinned_base,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::apply_rotations;
    use crate::fixtures;
    use approx::assert_relative_eq;

    fn instantiate(asset: &crate::backend::AssetScene) -> (SceneGraph, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let model = asset.instantiate(&mut graph, root, "model").unwrap();
        (graph, model)
    }

    #[test]
    fn test_split_preserves_world_pose() {
        let rig = RigDescriptor::pepper();
        let (mut graph, root) = instantiate(&fixtures::wheeled_asset());
        let upper = graph.find_by_name(root, "PepperUpperBody").unwrap();
        let before = graph.world_matrix(upper).unwrap();

        let mut report = RetargetReport::default();
        let pivots = split_node(&mut graph, root, rig.pivot_split.as_ref().unwrap(), &mut report);
        let (outer, inner) = (pivots.outer.unwrap(), pivots.inner.unwrap());
        assert_eq!(graph.parent(upper), Some(inner));
        assert_eq!(graph.parent(inner), Some(outer));
        assert_relative_eq!(graph.world_matrix(upper).unwrap(), before, epsilon = 1e-12);
    }

    #[test]
    fn test_single_pivot_fallback() {
        let rig = RigDescriptor::pepper();
        let spec = rig.pivot_split.clone().unwrap();
        let (mut graph, root) = instantiate(&fixtures::wheeled_asset());
        let mut report = RetargetReport::default();
        let mut controllers = bind_controllers(&mut graph, root, &rig, &mut report);
        let pivots = split_node(&mut graph, root, &spec, &mut report);
        let partial = SplitPivots {
            outer: None,
            inner: pivots.inner,
        };
        bind_split(&graph, &mut controllers, &spec, partial, &mut report);
        assert_eq!(controllers.get("HipRoll").unwrap().node, pivots.inner.unwrap());
        assert_eq!(controllers.get("HipPitch").unwrap().node, pivots.inner.unwrap());
        assert!(report.warnings.iter().any(|w| w.contains("HipRoll")));
    }

    #[test]
    fn test_wheeled_retarget_binds_pivots() {
        let rig = RigDescriptor::pepper();
        let (mut graph, root) = instantiate(&fixtures::wheeled_asset());
        let out = retarget(&mut graph, root, &rig);

        assert!(out.report.missing.is_empty(), "{:?}", out.report.missing);
        let pitch = out.controllers.get("HipPitch").unwrap();
        let roll = out.controllers.get("HipRoll").unwrap();
        let knee = out.controllers.get("KneePitch").unwrap();
        assert_eq!(graph.name(pitch.node), "PepperUpperBodyPitchPivot");
        assert_eq!(graph.name(roll.node), "PepperUpperBodyRollPivot");
        assert_eq!(graph.name(knee.node), "PepperKneePivot");
        assert_eq!(roll.axis, Vector3::x());
        assert!(out.pinned_base.is_some());

        // knee pivot sits where the knee is
        let knee_link = graph.find_by_name(root, "KneePitch_link").unwrap();
        assert_relative_eq!(
            graph.world_position(knee.node).unwrap(),
            graph.world_position(knee_link).unwrap(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_pinned_base_holds_world_pose() {
        let rig = RigDescriptor::pepper();
        let (mut graph, root) = instantiate(&fixtures::wheeled_asset());
        let mut out = retarget(&mut graph, root, &rig);
        let base = out.pinned_base.clone().unwrap();
        let knee_link = graph.find_by_name(root, "KneePitch_link").unwrap();

        graph.local_mut(knee_link).unwrap().rotation = Quaternion::from_axis_angle(&Vector3::y(), 0.4);
        base.apply(&mut graph).unwrap();
        assert_relative_eq!(graph.world_matrix(base.helper()).unwrap(), *base.world(), epsilon = 1e-9);

        // Animating the joints does not move the wheels
        let wheel = graph.find_by_name(root, "WheelB_link_visual_0").unwrap();
        let wheel_before = graph.world_position(wheel).unwrap();
        for c in out.controllers.iter_mut() {
            c.current_angle = c.clamp(c.neutral + 0.3);
        }
        apply_rotations(&mut graph, &out.controllers);
        base.apply(&mut graph).unwrap();
        assert_relative_eq!(graph.world_position(wheel).unwrap(), wheel_before, epsilon = 1e-9);
    }

    #[test]
    fn test_shared_pivot_keeps_world_axis() {
        let rig = RigDescriptor::nao();
        let spec = rig.shared_pivot.clone().unwrap();
        let (mut graph, root) = instantiate(&fixtures::legged_asset());
        let mut report = RetargetReport::default();
        let pivot = shared_pivot(&mut graph, root, &spec, &mut report).unwrap();
        let mut controllers = bind_controllers(&mut graph, root, &rig, &mut report);

        let hip = controllers.get("LHipPitch").unwrap().clone();
        let world_axis = graph
            .world_rotation(hip.bind_node)
            .unwrap()
            .rotate_vector(&hip.bind_axis)
            .normalize();

        let n = redirect_to_pivot(&graph, &mut controllers, pivot, &spec).unwrap();
        assert_eq!(n, 4);
        let redirected = controllers.get("LHipPitch").unwrap();
        assert_eq!(redirected.node, pivot);
        assert_relative_eq!(redirected.input_scale, hip.input_scale * 0.5);
        let back = graph.world_rotation(pivot).unwrap().rotate_vector(&redirected.axis);
        assert_relative_eq!(back, world_axis, epsilon = 1e-9);

        // legs no longer hang from the torso
        let torso = graph.find_by_name(root, "Torso_link").unwrap();
        let lhip = graph.find_by_name(root, "LHipYawPitch_link").unwrap();
        assert!(!graph.is_ancestor(torso, lhip));
        assert_eq!(graph.parent(torso), Some(pivot));
    }

    #[test]
    fn test_missing_bones_never_abort() {
        let rig = RigDescriptor::nao();
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let model = graph
            .add_child(root, "model", NodeKind::Group, Transform::identity())
            .unwrap();
        graph
            .add_child(model, "HeadYaw_link", NodeKind::Group, Transform::identity())
            .unwrap();
        let out = retarget(&mut graph, model, &rig);
        assert_eq!(out.controllers.names(), vec!["HeadYaw"]);
        assert_eq!(out.report.missing.len(), rig.joints.len() - 1);
        assert!(out.torso_pivot.is_none());
        assert!(!out.report.warnings.is_empty());
    }
}
