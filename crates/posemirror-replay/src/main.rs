//! Headless replay of captured joint telemetry
//!
//! Feeds a JSON-lines capture through the visualizer from a poller thread,
//! the way a page polls the robot, and logs what the avatar does.
//!
//! ```text
//! RUST_LOG=posemirror=debug posemirror-replay --rig nao capture.jsonl --duration 20
//! ```

mod capture;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossbeam_channel::Receiver;
use posemirror_core::backend::HeadlessContainer;
use posemirror_core::{
    fixtures, BatteryReading, ContainerTarget, FrameLoop, FrameLoopConfig, InitOutcome, ManualClock, MonotonicClock,
    RigDescriptor, TelemetryFeed, Visualizer, VisualizerConfig,
};
use tracing_subscriber::EnvFilter;

use capture::{load_capture, synthetic_sweep, CaptureFrame, ReplayError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RigKind {
    Pepper,
    Nao,
}

#[derive(Debug, Parser)]
#[command(name = "posemirror-replay")]
#[command(about = "Replay joint telemetry through the pose animation engine")]
struct Cli {
    /// JSON-lines capture; a synthetic sweep is played when omitted
    capture: Option<PathBuf>,

    /// Built-in rig
    #[arg(long, value_enum, default_value = "pepper")]
    rig: RigKind,

    /// Rig descriptor JSON, overrides --rig
    #[arg(long)]
    rig_json: Option<PathBuf>,

    /// Visualizer config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Poll interval of the telemetry thread in milliseconds
    #[arg(long, default_value_t = 450)]
    interval_ms: u64,

    /// Frame rate of the headless loop
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Seconds to run
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Restart the capture when it runs out
    #[arg(long = "loop")]
    repeat: bool,

    /// Advance the animation clock by exactly 1/fps per frame
    #[arg(long)]
    manual_clock: bool,
}

fn load_rig(cli: &Cli) -> Result<RigDescriptor, ReplayError> {
    match &cli.rig_json {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(RigDescriptor::from_json(&json)?)
        }
        None => Ok(match cli.rig {
            RigKind::Pepper => RigDescriptor::pepper(),
            RigKind::Nao => RigDescriptor::nao(),
        }),
    }
}

fn load_config(cli: &Cli) -> Result<VisualizerConfig, ReplayError> {
    let Some(path) = &cli.config else {
        return Ok(VisualizerConfig::default());
    };
    let json = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(VisualizerConfig::from_json(&json)?)
}

/// Poll the capture into the feed until it runs out or `running` drops
fn spawn_poller(
    frames: Vec<CaptureFrame>,
    feed: TelemetryFeed,
    battery: crossbeam_channel::Sender<Option<BatteryReading>>,
    interval: Duration,
    repeat: bool,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut sent = 0usize;
        'poll: loop {
            for frame in &frames {
                if !running.load(Ordering::Relaxed) {
                    break 'poll;
                }
                match feed.send_value(&frame.joints) {
                    Ok(()) => sent += 1,
                    Err(posemirror_core::Error::ChannelClosed) => break 'poll,
                    Err(e) => tracing::debug!("poll dropped: {}", e),
                }
                if frame.battery.is_some() && battery.send(frame.battery).is_err() {
                    break 'poll;
                }
                thread::sleep(interval);
            }
            if !repeat {
                break;
            }
        }
        tracing::debug!("poller done after {} snapshots", sent);
        sent
    })
}

fn apply_battery(viz: &mut Visualizer, rx: &Receiver<Option<BatteryReading>>) {
    while let Ok(reading) = rx.try_recv() {
        viz.update_battery_status(reading);
    }
}

fn log_joints(viz: &Visualizer) {
    for joint in &viz.rig().debug_joints {
        if let Some(c) = viz.controller(joint) {
            tracing::info!(
                "{:>16} current {:+.3} target {:+.3} {}",
                joint,
                c.current_angle,
                c.target_angle,
                if c.has_live_data { "live" } else { "idle" }
            );
        }
    }
}

fn run(cli: Cli) -> Result<(), ReplayError> {
    let rig = load_rig(&cli)?;
    let config = load_config(&cli)?;
    rig.validate()?;

    let frames = match &cli.capture {
        Some(path) => load_capture(path)?,
        None => {
            let joints: Vec<String> = rig.joints.iter().map(|j| j.joint.clone()).collect();
            synthetic_sweep(&joints, 40)
        }
    };
    tracing::info!("{}: replaying {} frames", rig.name, frames.len());

    let container = HeadlessContainer::new(960, 720);
    let backend = fixtures::headless_backend(&rig, &container);
    let stats = backend.stats_handle();
    let fps = cli.fps;
    let manual = ManualClock::new();
    let viz = Visualizer::new(rig, backend).with_config(config)?;
    let mut viz = if cli.manual_clock {
        viz.with_clock(manual.clone())
    } else {
        viz.with_clock(MonotonicClock::new())
    };

    match viz.initialize(ContainerTarget::Element(Box::new(container))) {
        InitOutcome::Ready => {}
        other => {
            return Err(ReplayError::Core(posemirror_core::Error::InvalidState(format!(
                "visualizer not ready: {:?}",
                other
            ))))
        }
    }
    if let Some(report) = viz.retarget_report() {
        for warning in &report.warnings {
            tracing::warn!("retarget: {}", warning);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let (battery_tx, battery_rx) = crossbeam_channel::unbounded();
    let poller = spawn_poller(
        frames,
        viz.telemetry_feed(),
        battery_tx,
        Duration::from_millis(cli.interval_ms),
        cli.repeat,
        Arc::clone(&running),
    );

    let log_every = fps.round().max(1.0) as u64;
    let mut frame_loop = FrameLoop::new(FrameLoopConfig::new(fps).with_name("replay"))?;
    let frame_stats = frame_loop.drive(&mut viz, Duration::from_secs_f64(cli.duration.max(0.0)), |viz, progress| {
        apply_battery(viz, &battery_rx);
        if cli.manual_clock {
            manual.advance(1.0 / fps);
        }
        if progress.frames > 0 && progress.frames % log_every == 0 {
            let live = viz.controllers().iter().filter(|c| c.has_live_data).count();
            tracing::info!("t={:.2}s live={} snapshots={}", progress.elapsed, live, progress.snapshots);
            log_joints(viz);
        }
        true
    });

    running.store(false, Ordering::Relaxed);
    let sent = poller
        .join()
        .map_err(|_| posemirror_core::Error::InvalidState("poller thread panicked".into()))?;

    tracing::info!(
        "{} frames, {} late, mean work {:?}, jitter {:.3}",
        frame_stats.frames,
        frame_stats.late_frames,
        frame_stats.mean_work(),
        frame_stats.jitter_coefficient()
    );
    tracing::info!(
        "{} snapshots polled, {} drained, {} ground corrections (max {:.4})",
        sent,
        frame_stats.snapshots,
        frame_stats.ground_corrections,
        frame_stats.max_correction
    );
    if let Some(hud) = viz.hud() {
        tracing::info!("hud repainted {} times, showing {:?}", hud.repaint_count(), hud.last_label());
    }

    viz.dispose();
    let leaked = stats.lock().live_resources();
    if leaked > 0 {
        tracing::warn!("{} backend resources still live after dispose", leaked);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["posemirror-replay"]);
        assert_eq!(cli.interval_ms, 450);
        assert_eq!(cli.fps, 60.0);
        assert!(cli.capture.is_none());
        assert!(matches!(load_rig(&cli).unwrap().kind, posemirror_core::RobotKind::Wheeled));
    }

    #[test]
    fn test_short_manual_replay() {
        let cli = Cli::parse_from([
            "posemirror-replay",
            "--rig",
            "nao",
            "--interval-ms",
            "1",
            "--fps",
            "200",
            "--duration",
            "0.1",
            "--manual-clock",
        ]);
        run(cli).unwrap();
    }
}
