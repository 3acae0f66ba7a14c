//! Joint telemetry parsing, ingestion and the cross-thread feed
//!
//! Snapshots are sparse: a poll only carries the joints the robot reported.
//! Each value is either a bare number or an object with an `angle` field;
//! anything else is skipped without error.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crossbeam_channel::{self as cc, TryRecvError, TrySendError};
use serde_json::Value;

use crate::controller::ControllerSet;
use crate::{Error, Result};

/// One joint entry of a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointReading {
    /// Bare angle in radians
    Angle(f64),
    /// Object form; the angle may be missing
    Object { angle: Option<f64> },
    /// Neither a number nor an object
    Malformed,
}

impl JointReading {
    /// Classify a JSON value
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(JointReading::Angle).unwrap_or(JointReading::Malformed),
            Value::Object(map) => JointReading::Object {
                angle: map.get("angle").and_then(Value::as_f64),
            },
            _ => JointReading::Malformed,
        }
    }

    /// Usable angle, if finite
    pub fn angle(&self) -> Option<f64> {
        let angle = match *self {
            JointReading::Angle(a) => Some(a),
            JointReading::Object { angle } => angle,
            JointReading::Malformed => None,
        };
        angle.filter(|a| a.is_finite())
    }
}

impl From<f64> for JointReading {
    fn from(angle: f64) -> Self {
        JointReading::Angle(angle)
    }
}

/// A sparse joint → reading map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    readings: BTreeMap<String, JointReading>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; other JSON values give an empty snapshot
    pub fn from_json_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            tracing::debug!("ignoring non-object joint snapshot");
            return Self::default();
        };
        let readings = map
            .iter()
            .map(|(joint, v)| (joint.clone(), JointReading::from_value(v)))
            .collect();
        Self { readings }
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_json_value(&value))
    }

    /// Build from typed readings
    pub fn from_readings<I, S, R>(readings: I) -> Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: Into<String>,
        R: Into<JointReading>,
    {
        Self {
            readings: readings
                .into_iter()
                .map(|(joint, reading)| (joint.into(), reading.into()))
                .collect(),
        }
    }

    /// Add or replace one reading
    pub fn insert(&mut self, joint: impl Into<String>, reading: impl Into<JointReading>) {
        self.readings.insert(joint.into(), reading.into());
    }

    pub fn get(&self, joint: &str) -> Option<&JointReading> {
        self.readings.get(joint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JointReading)> {
        self.readings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// What happened to the entries of one snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Accepted readings as received (robot space)
    pub applied: Vec<(String, f64)>,
    /// Joints without a controller
    pub unknown: usize,
    /// Malformed or non-finite entries
    pub invalid: usize,
}

/// Apply a snapshot to the controllers at animation time `now`
pub fn ingest(controllers: &mut ControllerSet, snapshot: &Snapshot, now: f64) -> IngestReport {
    let mut report = IngestReport::default();
    for (joint, reading) in snapshot.iter() {
        let Some(controller) = controllers.get_mut(joint) else {
            report.unknown += 1;
            continue;
        };
        let accepted = reading.angle().filter(|&angle| controller.command(angle, now));
        match accepted {
            Some(angle) => report.applied.push((joint.to_string(), angle)),
            None => report.invalid += 1,
        }
    }
    report
}

/// Sending half of the telemetry feed
///
/// Cheap to clone; hand one to each poller thread. The feed is latest-wins:
/// when it is full the oldest queued snapshot is evicted, never the new one.
#[derive(Debug, Clone)]
pub struct TelemetryFeed {
    inner: cc::Sender<Snapshot>,
    evict: cc::Receiver<Snapshot>,
    alive: Weak<()>,
}

impl TelemetryFeed {
    /// Create a bounded feed
    pub fn bounded(capacity: usize) -> (TelemetryFeed, FeedReceiver) {
        let (tx, rx) = cc::bounded(capacity.max(1));
        let alive = Arc::new(());
        let feed = TelemetryFeed {
            inner: tx,
            evict: rx.clone(),
            alive: Arc::downgrade(&alive),
        };
        (feed, FeedReceiver { inner: rx, _alive: alive })
    }

    /// Queue a snapshot without blocking
    ///
    /// Fails only with `ChannelClosed` once the visualizer is gone.
    pub fn try_send(&self, snapshot: Snapshot) -> Result<()> {
        if self.alive.strong_count() == 0 {
            return Err(Error::ChannelClosed);
        }
        let mut snapshot = snapshot;
        loop {
            match self.inner.try_send(snapshot) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.evict.try_recv().is_ok() {
                        tracing::trace!("telemetry feed full, oldest snapshot evicted");
                    }
                    snapshot = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// Queue a raw JSON snapshot
    pub fn send_value(&self, value: &Value) -> Result<()> {
        self.try_send(Snapshot::from_json_value(value))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }
}

/// Receiving half of the telemetry feed, owned by the visualizer
#[derive(Debug)]
pub struct FeedReceiver {
    inner: cc::Receiver<Snapshot>,
    _alive: Arc<()>,
}

impl FeedReceiver {
    /// Drain all queued snapshots in arrival order
    #[inline]
    pub fn drain(&self) -> Vec<Snapshot> {
        let mut v = Vec::with_capacity(self.inner.len());
        while let Ok(msg) = self.inner.try_recv() {
            v.push(msg);
        }
        v
    }

    /// Latest queued snapshot, discarding older ones
    #[inline]
    pub fn latest(&self) -> Option<Snapshot> {
        let mut latest = self.inner.try_recv().ok()?;
        while let Ok(v) = self.inner.try_recv() {
            latest = v;
        }
        Some(latest)
    }

    /// Next snapshot, `Err(ChannelClosed)` once every sender is gone and the queue is empty
    pub fn try_recv(&self) -> Result<Option<Snapshot>> {
        match self.inner.try_recv() {
            Ok(v) => Ok(Some(v)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::JointController;
    use crate::math::Quaternion;
    use crate::rig::JointDescriptor;
    use crate::scene::{NodeKind, SceneGraph};
    use crate::math::Transform;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn controllers() -> ControllerSet {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let mut set = ControllerSet::new();
        for desc in [
            JointDescriptor::new("HeadYaw", "head", [0.0, 0.0, 1.0]).with_bounds(-2.0, 2.0),
            JointDescriptor::new("LShoulderPitch", "shoulder", [0.0, 0.0, 1.0])
                .with_neutral(1.5)
                .with_input_offset(-1.5),
        ] {
            let node = graph
                .add_child(root, desc.node.clone(), NodeKind::Group, Transform::identity())
                .unwrap();
            set.insert(JointController::from_descriptor(&desc, node, Quaternion::identity()));
        }
        set
    }

    #[test]
    fn test_reading_forms() {
        assert_eq!(JointReading::from_value(&json!(0.4)).angle(), Some(0.4));
        assert_eq!(JointReading::from_value(&json!({"angle": -0.2})).angle(), Some(-0.2));
        assert_eq!(JointReading::from_value(&json!({"value": 1})).angle(), None);
        assert_eq!(JointReading::from_value(&json!("0.4")), JointReading::Malformed);
        assert_eq!(JointReading::from_value(&json!(null)).angle(), None);
        assert_eq!(JointReading::Angle(f64::NAN).angle(), None);
    }

    #[test]
    fn test_ingest_skips_bad_entries() {
        let mut set = controllers();
        let snapshot = Snapshot::from_json_value(&json!({
            "HeadYaw": {"angle": 3.0},
            "LShoulderPitch": "up",
            "Unknown": 1.0,
        }));
        let report = ingest(&mut set, &snapshot, 4.0);
        assert_eq!(report.applied, vec![("HeadYaw".to_string(), 3.0)]);
        assert_eq!(report.unknown, 1);
        assert_eq!(report.invalid, 1);

        let head = set.get("HeadYaw").unwrap();
        assert_relative_eq!(head.target_angle, 2.0);
        assert!(head.has_live_data);
        assert_eq!(head.last_live_time, 4.0);
        assert!(!set.get("LShoulderPitch").unwrap().has_live_data);
    }

    #[test]
    fn test_input_offset_applied() {
        let mut set = controllers();
        ingest(&mut set, &Snapshot::from_readings([("LShoulderPitch", 1.0)]), 0.0);
        assert_relative_eq!(set.get("LShoulderPitch").unwrap().target_angle, 1.0);
    }

    #[test]
    fn test_non_object_snapshot_is_empty() {
        assert!(Snapshot::from_json_value(&json!([1, 2])).is_empty());
        assert!(Snapshot::from_json("not json").is_err());
    }

    #[test]
    fn test_full_feed_evicts_oldest() {
        let (feed, rx) = TelemetryFeed::bounded(2);
        for angle in [0.1, 0.2, 0.3, 0.4] {
            feed.try_send(Snapshot::from_readings([("HeadYaw", angle)])).unwrap();
        }
        assert!(feed.is_full());
        let kept: Vec<_> = rx
            .drain()
            .iter()
            .filter_map(|s| s.get("HeadYaw").and_then(JointReading::angle))
            .collect();
        assert_eq!(kept, vec![0.3, 0.4]);
    }

    #[test]
    fn test_feed_closes_with_receiver() {
        let (feed, rx) = TelemetryFeed::bounded(1);
        feed.try_send(Snapshot::new()).unwrap();
        drop(rx);
        assert!(matches!(feed.try_send(Snapshot::new()), Err(Error::ChannelClosed)));
    }

    #[test]
    fn test_feed_latest_keeps_newest() {
        let (feed, rx) = TelemetryFeed::bounded(4);
        let cloned = feed.clone();
        feed.send_value(&json!({"HeadYaw": 0.1})).unwrap();
        cloned.send_value(&json!({"HeadYaw": 0.2})).unwrap();
        let latest = rx.latest().unwrap();
        assert_eq!(latest.get("HeadYaw").and_then(JointReading::angle), Some(0.2));
        assert!(rx.is_empty());
        drop(feed);
        drop(cloned);
        assert!(matches!(rx.try_recv(), Err(Error::ChannelClosed)));
    }
}
