//! The robot visualizer component
//!
//! One [`Visualizer`] drives one robot avatar inside one host container. It
//! owns the scene graph and every runtime object built during setup, and is
//! advanced by the host calling [`Visualizer::on_frame`] once per display
//! frame.
//!
//! # Example
//! ```ignore
//! use posemirror_core::{fixtures, ContainerTarget, RigDescriptor, Visualizer};
//! use posemirror_core::backend::HeadlessContainer;
//!
//! let rig = RigDescriptor::nao();
//! let container = HeadlessContainer::new(640, 480);
//! let backend = fixtures::headless_backend(&rig, &container);
//! let mut viz = Visualizer::new(rig, backend);
//! viz.initialize(ContainerTarget::Element(Box::new(container)));
//! viz.set_joint_angles(&serde_json::json!({"HeadYaw": 0.4}));
//! viz.on_frame();
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::backend::{FrameHandle, HostContainer, RenderBackend, ResizeWatch};
use crate::bootstrap::{self, GroundPlane, Placement, Stage};
use crate::camera::Camera;
use crate::clock::{AnimationClock, MonotonicClock};
use crate::config::VisualizerConfig;
use crate::controller::{apply_rotations, ControllerSet, JointController};
use crate::debug::{DebugSink, JointSample, NoopDebugSink, PivotPose};
use crate::ground::{anchor_plane, GroundCorrection, GroundStabilizer};
use crate::hud::{normalize_battery, BatteryHud, BatteryReading, BatteryStatus};
use crate::retarget::{retarget, PinnedBase, RetargetReport};
use crate::rig::RigDescriptor;
use crate::scene::{NodeId, SceneGraph};
use crate::telemetry::{ingest, FeedReceiver, IngestReport, JointReading, Snapshot, TelemetryFeed};
use crate::{Error, Result};

/// Container data key holding the lifecycle state
pub const STATE_KEY: &str = "state";

/// Visualizer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Constructed, not initialized
    Created,
    /// Setup in progress
    Loading,
    /// Animating
    Ready,
    /// Setup failed, fallback shown
    Failed,
    /// Resources released
    Disposed,
}

impl Lifecycle {
    /// Value written to the container's `state` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Created => "created",
            Lifecycle::Loading => "loading",
            Lifecycle::Ready => "ready",
            Lifecycle::Failed => "error",
            Lifecycle::Disposed => "disposed",
        }
    }
}

/// Result of [`Visualizer::initialize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    /// Setup failed; the container shows this message
    Fallback(String),
    /// The container could not be found; nothing changed
    NoContainer,
    /// Initialize was already called
    AlreadyInitialized,
}

/// Where to mount the visualizer
pub enum ContainerTarget {
    Element(Box<dyn HostContainer>),
    /// Resolved through [`RenderBackend::resolve_container`]
    Selector(String),
    /// [`VisualizerConfig::default_selector`]
    Default,
}

impl From<&str> for ContainerTarget {
    fn from(selector: &str) -> Self {
        ContainerTarget::Selector(selector.to_string())
    }
}

/// What one frame did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub dt: f64,
    pub elapsed: f64,
    /// Controllers driven by live telemetry
    pub live_joints: usize,
    /// Snapshots drained from the feed
    pub snapshots: usize,
    pub correction: Option<GroundCorrection>,
    pub hud_repainted: bool,
}

/// Robot pose visualizer
pub struct Visualizer {
    rig: RigDescriptor,
    config: VisualizerConfig,
    backend: Box<dyn RenderBackend>,
    clock: Box<dyn AnimationClock>,
    debug: Box<dyn DebugSink>,
    lifecycle: Lifecycle,
    container: Option<Box<dyn HostContainer>>,
    graph: SceneGraph,
    stage: Option<Stage>,
    ground: Option<GroundPlane>,
    placement: Option<Placement>,
    controllers: ControllerSet,
    torso_pivot: Option<NodeId>,
    pinned_base: Option<PinnedBase>,
    stabilizer: Option<GroundStabilizer>,
    hud: Option<BatteryHud>,
    battery: Option<BatteryStatus>,
    resize: Option<ResizeWatch>,
    frame: Option<FrameHandle>,
    pending: Option<Snapshot>,
    feed: TelemetryFeed,
    feed_rx: FeedReceiver,
    retarget_report: Option<RetargetReport>,
}

impl Visualizer {
    /// Create a visualizer for `rig` rendering through `backend`
    pub fn new(rig: RigDescriptor, backend: impl RenderBackend + 'static) -> Self {
        Self::with_backend(rig, Box::new(backend))
    }

    /// Create from an already boxed backend
    pub fn with_backend(rig: RigDescriptor, backend: Box<dyn RenderBackend>) -> Self {
        let config = VisualizerConfig::default();
        let (feed, feed_rx) = TelemetryFeed::bounded(config.feed_capacity);
        Self {
            rig,
            config,
            backend,
            clock: Box::new(MonotonicClock::new()),
            debug: Box::new(NoopDebugSink),
            lifecycle: Lifecycle::Created,
            container: None,
            graph: SceneGraph::new(),
            stage: None,
            ground: None,
            placement: None,
            controllers: ControllerSet::new(),
            torso_pivot: None,
            pinned_base: None,
            stabilizer: None,
            hud: None,
            battery: None,
            resize: None,
            frame: None,
            pending: None,
            feed,
            feed_rx,
            retarget_report: None,
        }
    }

    /// Replace the configuration
    ///
    /// Recreates the telemetry feed, so call it before handing out
    /// [`Visualizer::telemetry_feed`] senders. Returns `Error::Config` when
    /// the config does not validate.
    pub fn with_config(mut self, config: VisualizerConfig) -> Result<Self> {
        config.validate()?;
        let (feed, feed_rx) = TelemetryFeed::bounded(config.feed_capacity);
        self.feed = feed;
        self.feed_rx = feed_rx;
        self.config = config;
        Ok(self)
    }

    /// Use another animation clock
    pub fn with_clock(mut self, clock: impl AnimationClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Route diagnostics to `sink`
    pub fn with_debug_sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.debug = Box::new(sink);
        self
    }

    /// Build the scene, load the model and start animating
    ///
    /// Never fails past this point: setup errors turn into a fallback
    /// message in the container.
    pub fn initialize(&mut self, target: ContainerTarget) -> InitOutcome {
        if self.lifecycle != Lifecycle::Created {
            tracing::warn!("{}: initialize called in state {:?}", self.rig.name, self.lifecycle);
            return InitOutcome::AlreadyInitialized;
        }
        let container = match target {
            ContainerTarget::Element(container) => Some(container),
            ContainerTarget::Selector(selector) => self.resolve(&selector),
            ContainerTarget::Default => {
                let selector = self.config.default_selector.clone();
                self.resolve(&selector)
            }
        };
        let Some(mut container) = container else {
            return InitOutcome::NoContainer;
        };

        self.lifecycle = Lifecycle::Loading;
        container.set_data(STATE_KEY, Lifecycle::Loading.as_str());
        container.set_data("version", &self.rig.version);
        container.set_data("kind", self.rig.kind.as_str());
        self.container = Some(container);
        self.absorb_feed();

        match self.setup() {
            Ok(()) => {
                self.lifecycle = Lifecycle::Ready;
                if let Some(container) = self.container.as_mut() {
                    container.set_data(STATE_KEY, Lifecycle::Ready.as_str());
                }
                self.handle_resize();
                if let Some(snapshot) = self.pending.take() {
                    self.apply_snapshot(&snapshot);
                }
                tracing::info!(
                    "{}: ready on {} with {} joints",
                    self.rig.name,
                    self.backend.name(),
                    self.controllers.len()
                );
                InitOutcome::Ready
            }
            Err(e) => {
                tracing::error!("{}: visualizer setup failed: {}", self.rig.name, e);
                self.teardown();
                self.lifecycle = Lifecycle::Failed;
                let message = self.rig.fallback_message.clone();
                if let Some(container) = self.container.as_mut() {
                    container.show_fallback(&message);
                    container.set_data(STATE_KEY, Lifecycle::Failed.as_str());
                }
                InitOutcome::Fallback(message)
            }
        }
    }

    fn resolve(&mut self, selector: &str) -> Option<Box<dyn HostContainer>> {
        let found = self.backend.resolve_container(selector);
        if found.is_none() {
            tracing::warn!("{}: container '{}' not found", self.rig.name, selector);
        }
        found
    }

    /// Move the newest queued feed snapshot into the pending slot
    fn absorb_feed(&mut self) {
        if let Some(snapshot) = self.feed_rx.latest() {
            self.pending = Some(snapshot);
        }
    }

    fn setup(&mut self) -> Result<()> {
        if !self.backend.graphics_available() {
            return Err(Error::GraphicsUnavailable(format!(
                "{} backend cannot create a graphics context",
                self.backend.name()
            )));
        }
        let size = self
            .container
            .as_ref()
            .map(|c| c.client_size())
            .ok_or_else(|| Error::Container("no container".into()))?;

        let stage = bootstrap::build_stage(&mut self.graph, self.backend.as_mut(), &self.rig, &self.config, size)?;
        if let Some(container) = self.container.as_mut() {
            container.mount_surface(stage.surface);
        }
        let surface = stage.surface;
        let stage = self.stage.insert(stage);

        self.ground = Some(GroundPlane::build(
            &mut self.graph,
            self.backend.as_mut(),
            &self.rig,
            &self.config.ground_texture_url,
        )?);

        let asset = self.backend.load_asset(&self.rig.model_url)?;
        let placement = bootstrap::place_model(&mut self.graph, &asset, &self.rig, &mut stage.camera)?;
        self.placement = Some(placement);

        let retargeted = retarget(&mut self.graph, placement.asset_root, &self.rig);
        self.controllers = retargeted.controllers;
        self.torso_pivot = retargeted.torso_pivot;
        self.pinned_base = retargeted.pinned_base;
        self.retarget_report = Some(retargeted.report);

        let ground = &self.rig.ground;
        if !ground.baseline_contacts.is_empty() {
            self.stabilizer = Some(GroundStabilizer::capture(
                &self.graph,
                placement.model_root,
                &ground.baseline_contacts,
                placement.initial_min_y,
                self.config.max_ground_correction,
                self.config.ground_epsilon,
            ));
        }
        if let Some(plane) = &self.ground {
            anchor_plane(
                &mut self.graph,
                plane.node,
                placement.model_root,
                &ground.plane_contacts,
                ground.padding,
                self.config.ground_epsilon,
            );
        }

        if let Some(spec) = &self.rig.hud {
            self.hud = BatteryHud::attach(
                &mut self.graph,
                self.backend.as_mut(),
                placement.model_root,
                spec,
                self.config.hud_canvas,
                self.config.hud_panel_width,
            );
            if let Some(hud) = self.hud.as_mut() {
                hud.refresh(self.battery.as_ref(), self.backend.as_mut(), true);
            }
        }

        self.resize = Some(match self.backend.observe_resize(surface) {
            Some(id) => ResizeWatch::Observer(id),
            None => {
                tracing::debug!("{}: no resize observer, listening on the window", self.rig.name);
                ResizeWatch::WindowListener(self.backend.listen_window_resize())
            }
        });
        self.frame = Some(self.backend.request_frame());
        Ok(())
    }

    /// Advance one display frame
    ///
    /// Returns `None` until the visualizer is ready. Before readiness the
    /// newest queued snapshot is kept as the pending one.
    pub fn on_frame(&mut self) -> Option<FrameReport> {
        match self.lifecycle {
            Lifecycle::Ready => {}
            Lifecycle::Created | Lifecycle::Loading => {
                self.absorb_feed();
                return None;
            }
            Lifecycle::Failed | Lifecycle::Disposed => return None,
        }
        self.frame = None;

        let (dt, elapsed) = self.clock.tick();
        let snapshots = self.feed_rx.drain();
        for snapshot in &snapshots {
            self.apply_snapshot(snapshot);
        }

        let window = self.freshness_window();
        let live_joints = self.controllers.step_all(dt, elapsed, window);
        apply_rotations(&mut self.graph, &self.controllers);

        if let Some(base) = &self.pinned_base {
            if let Err(e) = base.apply(&mut self.graph) {
                tracing::debug!("pinned base not updated: {}", e);
            }
        }
        let correction = self
            .stabilizer
            .as_mut()
            .and_then(|stabilizer| stabilizer.stabilize(&mut self.graph));
        if let Some(correction) = &correction {
            self.debug.ground(correction);
        }
        if self.debug.wants_frame_capture() {
            self.capture_debug();
        }

        let hud_repainted = match self.hud.as_mut() {
            Some(hud) => hud.refresh(self.battery.as_ref(), self.backend.as_mut(), false),
            None => false,
        };

        if let Some(stage) = &self.stage {
            if let Err(e) = self.backend.render(stage.surface, &self.graph, &stage.camera) {
                tracing::warn!("{}: render failed: {}", self.rig.name, e);
            }
        }
        self.frame = Some(self.backend.request_frame());

        Some(FrameReport {
            dt,
            elapsed,
            live_joints,
            snapshots: snapshots.len(),
            correction,
            hud_repainted,
        })
    }

    fn capture_debug(&mut self) {
        if let Some(pivot) = self.torso_pivot {
            if let (Ok(position), Ok(rotation)) = (self.graph.world_position(pivot), self.graph.world_rotation(pivot)) {
                self.debug.torso(&PivotPose { position, rotation });
            }
        }
        let samples: BTreeMap<String, JointSample> = self
            .rig
            .debug_joints
            .iter()
            .filter_map(|joint| {
                self.controllers.get(joint).map(|c| {
                    let sample = JointSample {
                        current: c.current_angle,
                        target: c.target_angle,
                        live: c.has_live_data,
                    };
                    (joint.clone(), sample)
                })
            })
            .collect();
        self.debug.joints(&samples);
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> IngestReport {
        let report = ingest(&mut self.controllers, snapshot, self.clock.elapsed());
        if !report.applied.is_empty() {
            self.debug.commands(&report.applied);
        }
        if report.invalid > 0 {
            tracing::trace!("{}: {} malformed joint readings skipped", self.rig.name, report.invalid);
        }
        report
    }

    fn submit(&mut self, snapshot: Snapshot) -> Option<IngestReport> {
        match self.lifecycle {
            Lifecycle::Ready => Some(self.apply_snapshot(&snapshot)),
            Lifecycle::Disposed => {
                tracing::debug!("{}: snapshot dropped after dispose", self.rig.name);
                None
            }
            _ => {
                // Queued feed snapshots arrived before this one
                self.absorb_feed();
                self.pending = Some(snapshot);
                None
            }
        }
    }

    /// Apply a raw joint snapshot (`{"HeadYaw": 0.2, "HipPitch": {"angle": -0.1}}`)
    ///
    /// Before readiness the snapshot replaces the pending one and `None` is
    /// returned.
    pub fn set_joint_angles(&mut self, snapshot: &Value) -> Option<IngestReport> {
        self.submit(Snapshot::from_json_value(snapshot))
    }

    /// Apply typed readings
    pub fn set_joint_readings<I, S>(&mut self, readings: I) -> Option<IngestReport>
    where
        I: IntoIterator<Item = (S, JointReading)>,
        S: Into<String>,
    {
        self.submit(Snapshot::from_readings(readings))
    }

    /// Update the battery shown by the HUD; `None` means no data
    pub fn update_battery_status(&mut self, reading: Option<BatteryReading>) {
        self.battery = normalize_battery(reading);
        if let Some(hud) = self.hud.as_mut() {
            hud.refresh(self.battery.as_ref(), self.backend.as_mut(), false);
        }
    }

    /// Sync surface size and camera aspect with the container
    pub fn handle_resize(&mut self) {
        let (Some(stage), Some(container)) = (self.stage.as_mut(), self.container.as_ref()) else {
            return;
        };
        let (w, h) = container.client_size();
        let (w, h) = (w.max(1), h.max(1));
        self.backend.resize_surface(stage.surface, w, h);
        stage.camera.set_viewport(w, h);
    }

    fn teardown(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.backend.cancel_frame(frame);
        }
        if let Some(watch) = self.resize.take() {
            self.backend.unwatch_resize(watch);
        }
        if let Some(hud) = self.hud.take() {
            hud.dispose(&mut self.graph, self.backend.as_mut());
        }
        if let Some(ground) = self.ground.take() {
            ground.release(&mut self.graph, self.backend.as_mut());
        }
        if let Some(stage) = self.stage.take() {
            if let Some(container) = self.container.as_mut() {
                container.unmount_surface(stage.surface);
            }
            self.backend.release_surface(stage.surface);
            for light in [stage.lights.hemisphere, stage.lights.directional] {
                if let Err(e) = self.graph.detach(light) {
                    tracing::warn!("{}: light not detached: {}", self.rig.name, e);
                }
            }
        }
        if let Some(placement) = self.placement.take() {
            if let Err(e) = self.graph.detach(placement.model_root) {
                tracing::warn!("{}: model root not detached: {}", self.rig.name, e);
            }
        }
        self.controllers.clear();
        self.torso_pivot = None;
        self.pinned_base = None;
        self.stabilizer = None;
    }

    /// Release everything; safe to call more than once
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.teardown();
        self.pending = None;
        self.container = None;
        self.lifecycle = Lifecycle::Disposed;
        tracing::debug!("{}: disposed", self.rig.name);
    }

    /// Sender for snapshots polled on another thread
    pub fn telemetry_feed(&self) -> TelemetryFeed {
        self.feed.clone()
    }

    /// Freshness window in effect (seconds)
    pub fn freshness_window(&self) -> f64 {
        self.config.freshness_override.unwrap_or(self.rig.freshness_window)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    pub fn rig(&self) -> &RigDescriptor {
        &self.rig
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn controllers(&self) -> &ControllerSet {
        &self.controllers
    }

    pub fn controller(&self, joint: &str) -> Option<&JointController> {
        self.controllers.get(joint)
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.stage.as_ref().map(|s| &s.camera)
    }

    /// Group carrying the model (facing yaw and ground corrections)
    pub fn model_root(&self) -> Option<NodeId> {
        self.placement.map(|p| p.model_root)
    }

    pub fn ground_plane(&self) -> Option<NodeId> {
        self.ground.map(|g| g.node)
    }

    pub fn hud(&self) -> Option<&BatteryHud> {
        self.hud.as_ref()
    }

    pub fn battery_status(&self) -> Option<BatteryStatus> {
        self.battery
    }

    pub fn stabilizer(&self) -> Option<&GroundStabilizer> {
        self.stabilizer.as_ref()
    }

    pub fn pinned_base(&self) -> Option<&PinnedBase> {
        self.pinned_base.as_ref()
    }

    pub fn torso_pivot(&self) -> Option<NodeId> {
        self.torso_pivot
    }

    pub fn retarget_report(&self) -> Option<&RetargetReport> {
        self.retarget_report.as_ref()
    }

    /// Whether a snapshot is waiting for readiness
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Read a data attribute of the container
    pub fn container_data(&self, key: &str) -> Option<String> {
        self.container.as_ref().and_then(|c| c.data(key))
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.dispose();
    }
}
