//! Animation clocks
//!
//! Liveness is measured against the animation clock, never wall time, so a
//! [`ManualClock`] makes every time-dependent behaviour reproducible in tests.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Source of frame deltas and elapsed animation time
pub trait AnimationClock: Send {
    /// Advance to "now": returns `(dt, elapsed)` in seconds
    fn tick(&mut self) -> (f64, f64);

    /// Elapsed seconds as of the last tick
    fn elapsed(&self) -> f64;
}

/// Clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
    last: Instant,
    elapsed: f64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            elapsed: 0.0,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationClock for MonotonicClock {
    fn tick(&mut self) -> (f64, f64) {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.elapsed = now.duration_since(self.start).as_secs_f64();
        (dt, self.elapsed)
    }

    fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    ticked: f64,
}

/// Clock advanced explicitly by the caller
///
/// Clones share the same time, so a test can keep a handle after moving the
/// clock into a visualizer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `secs` (negative values are ignored)
    pub fn advance(&self, secs: f64) {
        if secs.is_finite() && secs > 0.0 {
            self.state.lock().now += secs;
        }
    }

    /// Current time, regardless of ticks
    pub fn now(&self) -> f64 {
        self.state.lock().now
    }
}

impl AnimationClock for ManualClock {
    fn tick(&mut self) -> (f64, f64) {
        let mut state = self.state.lock();
        let dt = state.now - state.ticked;
        state.ticked = state.now;
        (dt, state.now)
    }

    fn elapsed(&self) -> f64 {
        self.state.lock().ticked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_manual_clock_ticks() {
        let mut clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(0.5);
        assert_eq!(clock.elapsed(), 0.0);
        let (dt, elapsed) = clock.tick();
        assert_relative_eq!(dt, 0.5);
        assert_relative_eq!(elapsed, 0.5);
        let (dt, _) = clock.tick();
        assert_eq!(dt, 0.0);
        handle.advance(-1.0);
        assert_relative_eq!(handle.now(), 0.5);
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let mut clock = MonotonicClock::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let (dt, elapsed) = clock.tick();
        assert!(dt > 0.0);
        assert_relative_eq!(elapsed, clock.elapsed());
    }
}
