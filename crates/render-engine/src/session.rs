//! Export session state: phase machine, counters, warnings, progress.

use std::time::{Duration, Instant};

use serde::Serialize;
use zoomreel_common::clock::{ProgressThrottle, ThroughputMeter};
use zoomreel_common::error::{ZoomreelError, ZoomreelResult};

use crate::cancel::CancellationToken;
use crate::io::ExportArtifact;

/// Phases of an export.
///
/// ```text
/// Idle → Initializing → Rendering → Finalizing → Complete
///             │             │            │
///             └─────────────┴────────────┴──→ Error
///                           └──→ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Idle,
    Initializing,
    Rendering,
    Finalizing,
    Complete,
    Error,
    Cancelled,
}

impl ExportPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportPhase::Idle => "idle",
            ExportPhase::Initializing => "initializing",
            ExportPhase::Rendering => "rendering",
            ExportPhase::Finalizing => "finalizing",
            ExportPhase::Complete => "complete",
            ExportPhase::Error => "error",
            ExportPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportPhase::Complete | ExportPhase::Error | ExportPhase::Cancelled
        )
    }

    pub fn can_transition_to(self, next: ExportPhase) -> bool {
        use ExportPhase::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Idle, Error)
                | (Initializing, Rendering)
                | (Initializing, Error)
                | (Initializing, Cancelled)
                | (Rendering, Finalizing)
                | (Rendering, Error)
                | (Rendering, Cancelled)
                | (Finalizing, Complete)
                | (Finalizing, Error)
        )
    }
}

/// Progress event delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// Completion in `[0, 100]`.
    pub percent: f64,
    /// Source timestamp of the latest frame.
    pub current_time_secs: f64,
    pub frames_rendered: u64,
    pub total_frames: u64,
    /// Remaining seconds from measured throughput; zero until measurable.
    pub eta_secs: f64,
    pub message: String,
}

/// Progress observer.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// How a frame without source pixels was filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRecovery {
    /// The last decoded source frame was composited at this frame's time.
    RepeatedPrevious,
    /// A background-only frame was emitted.
    BackgroundOnly,
}

/// Non-fatal per-frame problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameWarning {
    pub frame_index: u64,
    pub time_secs: f64,
    pub recovery: FrameRecovery,
    pub message: String,
}

/// Summary of an export run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub total_frames: u64,
    /// Frames delivered to the encoder.
    pub frames_rendered: u64,
    /// Frames filled in after a seek miss.
    pub frames_skipped: u64,
    pub warnings: Vec<FrameWarning>,
    pub elapsed_secs: f64,
    pub average_fps: f64,
}

/// Result of an export that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Completed {
        artifact: ExportArtifact,
        report: ExportReport,
    },
    /// Stopped on request. `artifact` is the valid, truncated output, or
    /// `None` when nothing had been encoded yet.
    Cancelled {
        artifact: Option<ExportArtifact>,
        frames_rendered: u64,
        report: ExportReport,
    },
}

impl ExportOutcome {
    pub fn report(&self) -> &ExportReport {
        match self {
            ExportOutcome::Completed { report, .. } | ExportOutcome::Cancelled { report, .. } => {
                report
            }
        }
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        match self {
            ExportOutcome::Completed { artifact, .. } => Some(artifact),
            ExportOutcome::Cancelled { artifact, .. } => artifact.as_ref(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportOutcome::Cancelled { .. })
    }
}

/// Mutable state of one export. Owned by the pipeline for the duration of
/// a single run.
#[derive(Debug)]
pub struct ExportSession {
    phase: ExportPhase,
    total_frames: u64,
    frames_rendered: u64,
    frames_skipped: u64,
    current_time_secs: f64,
    warnings: Vec<FrameWarning>,
    cancel: CancellationToken,
    meter: ThroughputMeter,
    throttle: ProgressThrottle,
}

impl ExportSession {
    pub fn new(
        cancel: CancellationToken,
        progress_every_frames: u64,
        progress_interval: Duration,
    ) -> Self {
        Self {
            phase: ExportPhase::Idle,
            total_frames: 0,
            frames_rendered: 0,
            frames_skipped: 0,
            current_time_secs: 0.0,
            warnings: Vec::new(),
            cancel,
            meter: ThroughputMeter::start(),
            throttle: ProgressThrottle::new(progress_every_frames, progress_interval),
        }
    }

    pub fn phase(&self) -> ExportPhase {
        self.phase
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn warnings(&self) -> &[FrameWarning] {
        &self.warnings
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_total_frames(&mut self, total: u64) {
        self.total_frames = total;
    }

    /// Move to `next`, rejecting transitions the phase machine forbids.
    pub fn transition(&mut self, next: ExportPhase) -> ZoomreelResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(ZoomreelError::Other(anyhow::anyhow!(
                "illegal export phase transition {} -> {}",
                self.phase.as_str(),
                next.as_str()
            )));
        }
        tracing::info!(
            from = self.phase.as_str(),
            to = next.as_str(),
            frames_rendered = self.frames_rendered,
            "Export phase changed"
        );
        self.phase = next;
        Ok(())
    }

    /// Move to `Error` unless already terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = ExportPhase::Error;
            tracing::info!(frames_rendered = self.frames_rendered, "Export phase changed to error");
        }
    }

    /// Record a frame handed to the encoder.
    pub fn record_frame(&mut self, time_secs: f64) {
        self.frames_rendered += 1;
        self.current_time_secs = time_secs;
    }

    /// Set the progress position without a frame (engine-driven backends).
    pub fn record_position(&mut self, frames_rendered: u64, time_secs: f64) {
        self.frames_rendered = frames_rendered;
        self.current_time_secs = time_secs;
    }

    pub fn record_warning(&mut self, warning: FrameWarning) {
        tracing::warn!(
            frame = warning.frame_index,
            total_frames = self.total_frames,
            time_secs = warning.time_secs,
            recovery = ?warning.recovery,
            "{}",
            warning.message
        );
        self.frames_skipped += 1;
        self.warnings.push(warning);
    }

    /// Progress snapshot for the current state.
    pub fn snapshot(&self, message: impl Into<String>) -> ExportProgress {
        let percent = match self.phase {
            ExportPhase::Complete => 100.0,
            _ if self.total_frames == 0 => 0.0,
            _ => (self.frames_rendered as f64 / self.total_frames as f64 * 100.0).clamp(0.0, 100.0),
        };
        ExportProgress {
            phase: self.phase,
            percent,
            current_time_secs: self.current_time_secs,
            frames_rendered: self.frames_rendered,
            total_frames: self.total_frames,
            eta_secs: ThroughputMeter::eta_secs(
                self.frames_rendered,
                self.total_frames,
                self.meter.elapsed_secs(),
            ),
            message: message.into(),
        }
    }

    /// Snapshot if the progress cadence says a report is due.
    pub fn throttled_snapshot(&mut self, now: Instant) -> Option<ExportProgress> {
        if self.throttle.should_report(self.frames_rendered, now) {
            Some(self.snapshot(format!(
                "Rendered {} of {} frames",
                self.frames_rendered, self.total_frames
            )))
        } else {
            None
        }
    }

    pub fn report(&self) -> ExportReport {
        let elapsed_secs = self.meter.elapsed_secs();
        ExportReport {
            total_frames: self.total_frames,
            frames_rendered: self.frames_rendered,
            frames_skipped: self.frames_skipped,
            warnings: self.warnings.clone(),
            elapsed_secs,
            average_fps: ThroughputMeter::rate(self.frames_rendered, elapsed_secs),
        }
    }
}
