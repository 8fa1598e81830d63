//! Timing utilities for export progress reporting.
//!
//! Progress observers must not be flooded with one event per frame, and the
//! ETA has to come from measured throughput rather than a guess. This module
//! provides:
//! - A throttle deciding when the next progress report is due
//! - A throughput meter deriving frames-per-second and ETA

use std::time::{Duration, Instant};

/// Decides when a progress report is due.
///
/// A report fires when either `every_frames` frames have completed or
/// `min_interval` has elapsed since the last report, whichever comes first.
/// The first call always fires.
#[derive(Debug)]
pub struct ProgressThrottle {
    every_frames: u64,
    min_interval: Duration,
    last_frame: Option<u64>,
    last_at: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(every_frames: u64, min_interval: Duration) -> Self {
        Self {
            every_frames: every_frames.max(1),
            min_interval,
            last_frame: None,
            last_at: None,
        }
    }

    /// Check whether a report is due for `frames_done` at `now`.
    /// Returns true and records the tick if so.
    pub fn should_report(&mut self, frames_done: u64, now: Instant) -> bool {
        let due = match (self.last_frame, self.last_at) {
            (None, _) | (_, None) => true,
            (Some(frame), Some(at)) => {
                frames_done >= frame + self.every_frames
                    || now.saturating_duration_since(at) >= self.min_interval
            }
        };
        if due {
            self.last_frame = Some(frames_done);
            self.last_at = Some(now);
        }
        due
    }
}

/// Measures work throughput since a start instant.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    started: Instant,
}

impl ThroughputMeter {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Seconds elapsed since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Units per second given `done` units after `elapsed_secs`.
    pub fn rate(done: u64, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        done as f64 / elapsed_secs
    }

    /// Remaining seconds for `total - done` units at the measured rate.
    /// Zero when nothing has been measured yet.
    pub fn eta_secs(done: u64, total: u64, elapsed_secs: f64) -> f64 {
        let rate = Self::rate(done, elapsed_secs);
        if rate <= 0.0 || done >= total {
            return 0.0;
        }
        (total - done) as f64 / rate
    }
}
