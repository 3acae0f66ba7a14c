//! Paced frame driver for headless hosts
//!
//! In a browser the display calls [`Visualizer::on_frame`] once per refresh.
//! Headless hosts (the replay tool, soak tests) have no display, so
//! [`FrameLoop`] stands in for it: it calls `on_frame` on a fixed deadline
//! schedule and folds every [`FrameReport`] into [`FrameStats`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::visualizer::{FrameReport, Visualizer};
use crate::{Error, Result};

/// Configuration for a frame loop
#[derive(Debug, Clone)]
pub struct FrameLoopConfig {
    /// Display refresh being emulated, in Hz
    pub rate_hz: f64,
    /// Name for logging
    pub name: Arc<str>,
    /// Work-time jitter coefficient above which the run is reported unstable
    pub max_jitter_ratio: f64,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60.0,
            name: "frames".into(),
            max_jitter_ratio: 0.5,
        }
    }
}

impl FrameLoopConfig {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Copy, Default)]
struct Running {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Running {
    fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn std_dev(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            (self.m2 / (self.n - 1) as f64).sqrt()
        }
    }
}

/// What a run of frames did
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub frames: u64,
    /// Frames that finished past their deadline
    pub late_frames: u64,
    /// Longest `on_frame` call
    pub max_work: Duration,
    /// Snapshots drained from the telemetry feed
    pub snapshots: u64,
    /// Most joints driven by live telemetry in one frame
    pub peak_live_joints: usize,
    pub ground_corrections: u64,
    /// Largest absolute ground correction applied in one frame
    pub max_correction: f64,
    pub hud_repaints: u64,
    /// Animation time of the last frame
    pub elapsed: f64,
    work: Running,
}

impl FrameStats {
    /// Fold one frame in
    pub fn record(&mut self, report: &FrameReport, work: Duration, late: bool) {
        self.frames += 1;
        self.late_frames += u64::from(late);
        self.max_work = self.max_work.max(work);
        self.work.push(work.as_secs_f64());

        self.snapshots += report.snapshots as u64;
        self.peak_live_joints = self.peak_live_joints.max(report.live_joints);
        if let Some(c) = &report.correction {
            self.ground_corrections += 1;
            self.max_correction = self.max_correction.max(c.applied.abs());
        }
        self.hud_repaints += u64::from(report.hud_repainted);
        self.elapsed = report.elapsed;
    }

    /// Mean `on_frame` time
    pub fn mean_work(&self) -> Duration {
        Duration::from_secs_f64(self.work.mean.max(0.0))
    }

    /// Fraction of frames that missed their deadline
    pub fn late_ratio(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.late_frames as f64 / self.frames as f64
        }
    }

    /// Standard deviation over mean of the `on_frame` time
    pub fn jitter_coefficient(&self) -> f64 {
        if self.work.mean <= 0.0 {
            0.0
        } else {
            self.work.std_dev() / self.work.mean
        }
    }
}

/// Calls [`Visualizer::on_frame`] at a fixed rate
#[derive(Debug)]
pub struct FrameLoop {
    config: FrameLoopConfig,
    period: Duration,
    deadline: Option<Instant>,
    stats: FrameStats,
}

impl FrameLoop {
    /// Fails with `Error::Config` unless the rate is finite and positive
    pub fn new(config: FrameLoopConfig) -> Result<Self> {
        if !(config.rate_hz.is_finite() && config.rate_hz > 0.0) {
            return Err(Error::Config(format!(
                "{}: frame rate must be positive, got {}",
                config.name, config.rate_hz
            )));
        }
        let period = Duration::from_secs_f64(1.0 / config.rate_hz);
        Ok(Self {
            config,
            period,
            deadline: None,
            stats: FrameStats::default(),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Run one frame, then sleep until the next deadline
    ///
    /// Returns `None` without waiting when the visualizer is not animating.
    /// A late frame resets the schedule instead of bursting to catch up.
    pub fn step(&mut self, viz: &mut Visualizer) -> Option<FrameReport> {
        let start = Instant::now();
        let report = viz.on_frame()?;
        let work = start.elapsed();

        let deadline = self.deadline.unwrap_or(start) + self.period;
        let now = Instant::now();
        let late = now > deadline;
        self.stats.record(&report, work, late);
        if late {
            tracing::debug!(
                "{}: frame {} late by {:?}",
                self.config.name,
                self.stats.frames,
                now - deadline
            );
            self.deadline = Some(now);
        } else {
            thread::sleep(deadline - now);
            self.deadline = Some(deadline);
        }
        Some(report)
    }

    /// Drive `viz` for at most `duration`
    ///
    /// `host` runs before every frame and does the host's side of the page
    /// (battery polls, stepping a manual clock, logging); returning `false`
    /// ends the run. The run also ends once the visualizer stops animating.
    pub fn drive<F>(&mut self, viz: &mut Visualizer, duration: Duration, mut host: F) -> FrameStats
    where
        F: FnMut(&mut Visualizer, &FrameStats) -> bool,
    {
        let started = Instant::now();
        while started.elapsed() < duration {
            if !host(viz, &self.stats) {
                break;
            }
            if self.step(viz).is_none() {
                tracing::debug!("{}: visualizer stopped animating ({:?})", self.config.name, viz.lifecycle());
                break;
            }
        }
        self.summarize();
        self.stats
    }

    fn summarize(&self) {
        let stats = &self.stats;
        let jitter = stats.jitter_coefficient();
        if stats.frames > 1 && jitter > self.config.max_jitter_ratio {
            tracing::warn!(
                "{}: uneven frame work, jitter {:.3} over {} frames",
                self.config.name,
                jitter,
                stats.frames
            );
        }
        tracing::debug!(
            "{}: {} frames, {} late, {} snapshots",
            self.config.name,
            stats.frames,
            stats.late_frames,
            stats.snapshots
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessContainer;
    use crate::clock::ManualClock;
    use crate::fixtures;
    use crate::rig::RigDescriptor;
    use crate::visualizer::ContainerTarget;
    use serde_json::json;

    fn visualizer(rig: RigDescriptor, clock: &ManualClock, init: bool) -> Visualizer {
        let container = HeadlessContainer::new(320, 240);
        let backend = fixtures::headless_backend(&rig, &container);
        let mut viz = Visualizer::new(rig, backend).with_clock(clock.clone());
        if init {
            viz.initialize(ContainerTarget::Element(Box::new(container)));
        }
        viz
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(FrameLoop::new(FrameLoopConfig::new(0.0)).is_err());
        assert!(FrameLoop::new(FrameLoopConfig::new(f64::NAN)).is_err());
        let frames = FrameLoop::new(FrameLoopConfig::new(50.0)).unwrap();
        assert_eq!(frames.period(), Duration::from_millis(20));
    }

    #[test]
    fn test_host_ends_the_run() {
        let clock = ManualClock::new();
        let mut viz = visualizer(RigDescriptor::pepper(), &clock, true);
        let mut frames = FrameLoop::new(FrameLoopConfig::new(1000.0)).unwrap();
        let stats = frames.drive(&mut viz, Duration::from_secs(5), |_, stats| {
            clock.advance(1.0 / 60.0);
            stats.frames < 10
        });
        assert_eq!(stats.frames, 10);
        assert!((stats.elapsed - 10.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_is_paced() {
        let clock = ManualClock::new();
        let mut viz = visualizer(RigDescriptor::nao(), &clock, true);
        let mut frames = FrameLoop::new(FrameLoopConfig::new(100.0)).unwrap();
        let start = Instant::now();
        let stats = frames.drive(&mut viz, Duration::from_millis(100), |_, _| true);
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert!(
            stats.frames >= 5 && stats.frames <= 12,
            "expected ~10 frames, got {}",
            stats.frames
        );
    }

    #[test]
    fn test_stops_when_not_animating() {
        let clock = ManualClock::new();
        let mut idle = visualizer(RigDescriptor::nao(), &clock, false);
        let mut frames = FrameLoop::new(FrameLoopConfig::new(1000.0)).unwrap();
        assert!(frames.step(&mut idle).is_none());
        assert_eq!(frames.drive(&mut idle, Duration::from_secs(1), |_, _| true).frames, 0);

        let mut viz = visualizer(RigDescriptor::nao(), &clock, true);
        let mut frames = FrameLoop::new(FrameLoopConfig::new(1000.0)).unwrap();
        let stats = frames.drive(&mut viz, Duration::from_secs(5), |viz, stats| {
            if stats.frames == 3 {
                viz.dispose();
            }
            true
        });
        assert_eq!(stats.frames, 3);
    }

    #[test]
    fn test_reports_are_folded() {
        let clock = ManualClock::new();
        let mut viz = visualizer(RigDescriptor::nao(), &clock, true);
        let feed = viz.telemetry_feed();
        let mut frames = FrameLoop::new(FrameLoopConfig::new(1000.0)).unwrap();
        let stats = frames.drive(&mut viz, Duration::from_secs(5), |_, stats| {
            clock.advance(1.0 / 60.0);
            feed.send_value(&json!({"LKneePitch": 1.0, "RKneePitch": 1.0})).unwrap();
            stats.frames < 30
        });
        assert_eq!(stats.frames, 30);
        assert_eq!(stats.snapshots, 30);
        assert_eq!(stats.peak_live_joints, 2);
        assert!(stats.ground_corrections > 0);
        assert!(stats.max_correction > 0.0 && stats.max_correction <= 0.3 + 1e-12);
    }

    #[test]
    fn test_running_std_dev() {
        let mut work = Running::default();
        for ms in [10.0, 12.0, 14.0, 20.0] {
            work.push(ms / 1000.0);
        }
        // sample std dev of [10, 12, 14, 20] ms
        assert!((work.std_dev() - 0.004320).abs() < 1e-5);
        assert!((work.mean - 0.014).abs() < 1e-12);
    }
}
