//! Optional inspection hooks
//!
//! A [`DebugSink`] is handed to the visualizer at construction and receives
//! per-frame diagnostics. The default sink drops everything.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::ground::GroundCorrection;
use crate::math::{Quaternion, Vector3};

/// World pose of the shared torso pivot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotPose {
    pub position: Vector3,
    pub rotation: Quaternion,
}

/// Sampled state of one joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointSample {
    pub current: f64,
    pub target: f64,
    pub live: bool,
}

/// Receiver of visualizer diagnostics
pub trait DebugSink: Send {
    /// A ground correction was applied
    fn ground(&mut self, _correction: &GroundCorrection) {}

    /// Torso pivot pose after the joint update
    fn torso(&mut self, _pose: &PivotPose) {}

    /// Sampled debug joints after the joint update
    fn joints(&mut self, _samples: &BTreeMap<String, JointSample>) {}

    /// Readings accepted from the last telemetry snapshot
    fn commands(&mut self, _commands: &[(String, f64)]) {}

    /// Whether per-frame samples (torso, joints) are wanted
    fn wants_frame_capture(&self) -> bool {
        false
    }
}

/// Sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDebugSink;

impl DebugSink for NoopDebugSink {}

/// Latest diagnostics, as kept by [`RecordingDebugSink`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugSnapshot {
    pub last_ground: Option<GroundCorrection>,
    pub ground_corrections: u64,
    pub torso: Option<PivotPose>,
    pub joints: BTreeMap<String, JointSample>,
    /// Last accepted reading per joint, accumulated across snapshots
    pub last_commands: BTreeMap<String, f64>,
    pub frames_captured: u64,
}

/// Sink keeping the latest diagnostics behind a shared handle
#[derive(Debug, Clone, Default)]
pub struct RecordingDebugSink {
    state: Arc<Mutex<DebugSnapshot>>,
}

impl RecordingDebugSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current diagnostics
    pub fn snapshot(&self) -> DebugSnapshot {
        self.state.lock().clone()
    }
}

impl DebugSink for RecordingDebugSink {
    fn ground(&mut self, correction: &GroundCorrection) {
        let mut state = self.state.lock();
        state.last_ground = Some(*correction);
        state.ground_corrections += 1;
    }

    fn torso(&mut self, pose: &PivotPose) {
        self.state.lock().torso = Some(*pose);
    }

    fn joints(&mut self, samples: &BTreeMap<String, JointSample>) {
        let mut state = self.state.lock();
        state.joints = samples.clone();
        state.frames_captured += 1;
    }

    fn commands(&mut self, commands: &[(String, f64)]) {
        let mut state = self.state.lock();
        for (joint, angle) in commands {
            state.last_commands.insert(joint.clone(), *angle);
        }
    }

    fn wants_frame_capture(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_accumulates_commands() {
        let sink = RecordingDebugSink::new();
        let mut boxed: Box<dyn DebugSink> = Box::new(sink.clone());
        boxed.commands(&[("HeadYaw".into(), 0.1), ("HeadPitch".into(), 0.2)]);
        boxed.commands(&[("HeadYaw".into(), 0.3)]);
        let snap = sink.snapshot();
        assert_eq!(snap.last_commands.get("HeadYaw"), Some(&0.3));
        assert_eq!(snap.last_commands.get("HeadPitch"), Some(&0.2));
        assert!(boxed.wants_frame_capture());
        assert!(!NoopDebugSink.wants_frame_capture());
    }
}
