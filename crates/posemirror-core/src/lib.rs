//! posemirror-core: joint retargeting and pose animation engine
//!
//! Drives a 3D avatar of a humanoid robot (wheeled Pepper-class or legged
//! NAO-class) from sparse, lossy joint-angle telemetry.
//!
//! # Modules
//!
//! - [`math`] - Quaternion, TRS transform and smoothing utilities
//! - [`rig`] - Per-robot joint rig descriptors
//! - [`scene`] - Scene graph arena with world transforms and bounds
//! - [`backend`] - Rendering backend abstraction and the headless backend
//! - [`bootstrap`] / [`camera`] - Stage construction, model placement, framing
//! - [`retarget`] - Runtime skeleton surgery (pivots, pinned base)
//! - [`controller`] - Joint controllers and the per-frame blend step
//! - [`telemetry`] - Snapshot parsing, ingestion and the cross-thread feed
//! - [`ground`] - Ground plane anchoring and per-frame contact correction
//! - [`hud`] - Battery overlay painted on the chest tablet
//! - [`visualizer`] - The component tying it all together
//!
//! # Architecture
//!
//! ```text
//!  poller thread                       frame thread
//! ┌──────────────┐                   ┌──────────────────────────────┐
//! │ TelemetryFeed│───snapshots──────►│ Visualizer::on_frame         │
//! └──────────────┘                   │  drain → advance → ground    │
//!                                    │  → hud → RenderBackend       │
//!                                    └──────────────────────────────┘
//! ```

#![warn(unused_must_use)]

pub mod backend;
pub mod bootstrap;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controller;
pub mod debug;
pub mod fixtures;
pub mod frame_loop;
pub mod ground;
pub mod hud;
pub mod math;
pub mod retarget;
pub mod rig;
pub mod scene;
pub mod telemetry;
pub mod visualizer;

// Re-exports for convenience
pub use backend::{HeadlessBackend, HostContainer, RenderBackend};
pub use clock::{AnimationClock, ManualClock, MonotonicClock};
pub use config::VisualizerConfig;
pub use controller::{advance, Advance, ControllerSet, JointController};
pub use debug::{DebugSink, NoopDebugSink, RecordingDebugSink};
pub use frame_loop::{FrameLoop, FrameLoopConfig, FrameStats};
pub use hud::{BatteryReading, SeverityBand};
pub use math::{Quaternion, Transform};
pub use rig::{JointDescriptor, RigDescriptor, RobotKind};
pub use scene::{NodeId, SceneGraph};
pub use telemetry::{JointReading, Snapshot, TelemetryFeed};
pub use visualizer::{ContainerTarget, FrameReport, InitOutcome, Lifecycle, Visualizer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for posemirror-core
///
/// Setup failures surface through [`Visualizer::initialize`] as a fallback
/// state rather than as an `Err`; everything below that boundary propagates
/// with `?`.
///
/// # Example
/// ```ignore
/// match backend.load_asset(&rig.model_url) {
///     Ok(asset) => { /* place it */ },
///     Err(Error::AssetLoad(msg)) => eprintln!("model missing: {}", msg),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// No graphics context could be created on the host.
    /// Handle by: showing the fallback message, not retrying.
    #[error("Graphics unavailable: {0}")]
    GraphicsUnavailable(String),

    /// The robot model or a texture could not be fetched or decoded.
    /// Handle by: checking the asset URL, falling back to a flat material for textures.
    #[error("Asset load error: {0}")]
    AssetLoad(String),

    /// The backend has no loader for the requested asset format.
    /// Handle by: enabling the loader on the backend.
    #[error("Loader unavailable: {0}")]
    LoaderUnavailable(String),

    /// The host container is missing or rejected the render surface.
    /// Handle by: checking the selector, mounting the container before initializing.
    #[error("Container error: {0}")]
    Container(String),

    /// Invalid configuration or rig descriptor.
    /// Handle by: validating config before use, checking parameter ranges.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scene graph operation on an unknown node or one that would create a cycle.
    /// Handle by: resolving node ids from the same graph, checking parentage first.
    #[error("Scene error: {0}")]
    Scene(String),

    /// Rendering backend failure outside of setup.
    /// Handle by: logging and continuing with the next frame.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Telemetry feed was disconnected.
    /// Handle by: recreating the feed from the visualizer.
    #[error("Channel closed")]
    ChannelClosed,

    /// Operation attempted in invalid state (e.g., initializing a disposed visualizer).
    /// Handle by: checking [`Visualizer::lifecycle`] before operations.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(format!("JSON error: {}", e))
    }
}

/// Result type alias for posemirror-core operations
pub type Result<T> = std::result::Result<T, Error>;
