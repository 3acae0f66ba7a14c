//! Joint controllers and the per-frame blend step
//!
//! A [`JointController`] is the mutable runtime state of one rig joint. The
//! frame step is split into a pure function, [`advance`], which decides
//! liveness and computes the next angle, and an applier,
//! [`apply_rotations`], which writes rotations into the scene graph.

use std::collections::{HashMap, HashSet};

use crate::math::{blend_toward, Bounds, Quaternion, Vector3};
use crate::rig::{IdleWaveform, JointDescriptor};
use crate::scene::{NodeId, SceneGraph};

/// Runtime state of one animated joint
#[derive(Debug, Clone, PartialEq)]
pub struct JointController {
    /// Telemetry joint name
    pub joint: String,
    /// Node the rotation is currently written to
    pub node: NodeId,
    /// Node the controller was created on (before any pivot rebinding)
    pub bind_node: NodeId,
    /// Rotation of `node` before any joint motion
    pub base_rotation: Quaternion,
    /// Rotation axis in `node`'s local frame (unit length)
    pub axis: Vector3,
    /// Axis in `bind_node`'s local frame
    pub bind_axis: Vector3,
    pub current_angle: f64,
    pub target_angle: f64,
    pub neutral: f64,
    pub bounds: Option<Bounds>,
    pub input_scale: f64,
    pub input_offset: f64,
    pub live_rate: f64,
    pub idle_rate: f64,
    pub has_live_data: bool,
    /// Animation-clock time of the last accepted reading
    pub last_live_time: f64,
    pub idle: Option<IdleWaveform>,
}

fn unit(axis: &Vector3) -> Vector3 {
    let norm = axis.norm();
    if norm > 1e-12 && norm.is_finite() {
        *axis / norm
    } else {
        Vector3::z()
    }
}

impl JointController {
    /// Controller for `desc` bound to `node`, resting at its neutral angle
    pub fn from_descriptor(desc: &JointDescriptor, node: NodeId, base_rotation: Quaternion) -> Self {
        let axis = unit(&desc.axis);
        Self {
            joint: desc.joint.clone(),
            node,
            bind_node: node,
            base_rotation,
            axis,
            bind_axis: axis,
            current_angle: desc.neutral,
            target_angle: desc.neutral,
            neutral: desc.neutral,
            bounds: desc.bounds,
            input_scale: desc.input_scale,
            input_offset: desc.input_offset,
            live_rate: desc.live_smoothing,
            idle_rate: desc.idle_smoothing,
            has_live_data: false,
            last_live_time: 0.0,
            idle: desc.idle,
        }
    }

    /// Clamp into the joint bounds, if any
    #[inline]
    pub fn clamp(&self, angle: f64) -> f64 {
        match self.bounds {
            Some(bounds) => bounds.clamp(angle),
            None => angle,
        }
    }

    /// Model-space target for a robot-space reading
    pub fn target_for(&self, angle: f64) -> f64 {
        self.clamp(self.neutral + (angle + self.input_offset) * self.input_scale)
    }

    /// Accept a telemetry reading taken at animation time `now`
    ///
    /// Non-finite readings are ignored. Returns whether the reading was used.
    pub fn command(&mut self, angle: f64, now: f64) -> bool {
        if !angle.is_finite() {
            return false;
        }
        let target = self.target_for(angle);
        if !target.is_finite() {
            return false;
        }
        self.target_angle = target;
        self.has_live_data = true;
        self.last_live_time = now;
        true
    }

    /// Whether the last reading is still fresh at `elapsed`
    #[inline]
    pub fn is_live(&self, elapsed: f64, window: f64) -> bool {
        self.has_live_data && elapsed - self.last_live_time < window
    }

    /// Move the controller onto another node (synthetic pivot)
    pub fn rebind(&mut self, node: NodeId, base_rotation: Quaternion, axis: Vector3) {
        self.node = node;
        self.base_rotation = base_rotation;
        self.axis = unit(&axis);
    }

    /// Local rotation of the node at the neutral pose
    pub fn neutral_rotation(&self) -> Quaternion {
        self.base_rotation * Quaternion::from_axis_angle(&self.axis, self.neutral)
    }

    /// Run [`advance`] and commit the result
    pub fn step(&mut self, dt: f64, elapsed: f64, window: f64) -> Advance {
        let next = advance(self, dt, elapsed, window);
        self.current_angle = next.angle;
        if !next.live {
            self.has_live_data = false;
        }
        next
    }
}

/// Outcome of one frame for one controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advance {
    /// New current angle
    pub angle: f64,
    /// Whether live telemetry drove this frame
    pub live: bool,
    /// Clamped target the angle is moving toward
    pub target: f64,
}

/// Compute the next angle of a controller without mutating it
///
/// Live controllers move toward their telemetry target at the live rate.
/// Otherwise the idle waveform (or the neutral angle) is the target and the
/// idle rate applies. Non-finite `dt` leaves the angle unchanged.
pub fn advance(controller: &JointController, dt: f64, elapsed: f64, window: f64) -> Advance {
    let live = controller.is_live(elapsed, window);
    let raw = if live {
        controller.target_angle
    } else if let Some(idle) = &controller.idle {
        controller.neutral + idle.sample(elapsed)
    } else {
        controller.neutral
    };
    let target = controller.clamp(raw);
    let rate = if live { controller.live_rate } else { controller.idle_rate };
    let angle = controller.clamp(blend_toward(controller.current_angle, target, rate, dt));
    Advance { angle, live, target }
}

/// Ordered set of controllers with lookup by joint name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSet {
    controllers: Vec<JointController>,
    index: HashMap<String, usize>,
}

impl ControllerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller, replacing one with the same joint name
    pub fn insert(&mut self, controller: JointController) {
        match self.index.get(&controller.joint) {
            Some(&i) => self.controllers[i] = controller,
            None => {
                self.index.insert(controller.joint.clone(), self.controllers.len());
                self.controllers.push(controller);
            }
        }
    }

    pub fn get(&self, joint: &str) -> Option<&JointController> {
        self.index.get(joint).map(|&i| &self.controllers[i])
    }

    pub fn get_mut(&mut self, joint: &str) -> Option<&mut JointController> {
        match self.index.get(joint) {
            Some(&i) => self.controllers.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, joint: &str) -> bool {
        self.index.contains_key(joint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JointController> {
        self.controllers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut JointController> {
        self.controllers.iter_mut()
    }

    /// Joint names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.controllers.iter().map(|c| c.joint.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn clear(&mut self) {
        self.controllers.clear();
        self.index.clear();
    }

    /// Step every controller; returns how many were live
    pub fn step_all(&mut self, dt: f64, elapsed: f64, window: f64) -> usize {
        self.controllers
            .iter_mut()
            .map(|c| c.step(dt, elapsed, window))
            .filter(|a| a.live)
            .count()
    }
}

/// Write controller rotations into the scene graph
///
/// Each node is reset to its base rotation once, then every controller
/// bound to it composes its axis-angle rotation in insertion order.
pub fn apply_rotations(graph: &mut SceneGraph, controllers: &ControllerSet) {
    let mut reset = HashSet::new();
    for controller in controllers.iter() {
        let Some(local) = graph.local_mut(controller.node) else {
            continue;
        };
        if reset.insert(controller.node) {
            local.rotation = controller.base_rotation;
        }
        local.rotation = local.rotation * Quaternion::from_axis_angle(&controller.axis, controller.current_angle);
    }
}
