//! Boundary contracts between the export pipeline and media I/O.
//!
//! The pipeline never decodes or encodes by itself. It talks to a
//! [`FrameSource`] for decoded frames, an [`EncoderSink`] for the output
//! stream, and (filter-graph backend only) a [`CodecEngine`] that executes a
//! compiled graph end to end. The ffmpeg adapters live in [`crate::ffmpeg`];
//! tests substitute in-memory fakes.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::Serialize;
use zoomreel_common::error::ZoomreelResult;
use zoomreel_edit_model::Quality;

use crate::cancel::CancellationToken;
use crate::filter_graph::FilterGraph;

/// Static facts about a decodable source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

impl SourceInfo {
    pub fn new(width: u32, height: u32, duration_secs: f64) -> Self {
        Self {
            width,
            height,
            duration_secs,
        }
    }

    /// True when the source has a frame size and a positive duration.
    pub fn is_usable(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.duration_secs.is_finite()
            && self.duration_secs > 0.0
    }
}

/// A decodable source video.
pub trait FrameSource: Send {
    /// Size and duration. Reading these must not decode frames.
    fn info(&self) -> SourceInfo;

    /// Decode the frame displayed at `time_secs` (source time).
    ///
    /// `Ok(None)` means the frame is unavailable (seek miss); `Err` is a
    /// decoder failure. Both are retried and then skipped by the pipeline.
    fn seek(&mut self, time_secs: f64) -> ZoomreelResult<Option<RgbaImage>>;
}

/// Encoder parameters fixed for one export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub quality: Quality,
}

/// Streaming encoder receiving composited frames in timestamp order.
pub trait EncoderSink: Send {
    /// Allocate the encoder. Called once before the first frame.
    fn begin(&mut self, settings: &EncoderSettings) -> ZoomreelResult<()>;

    /// Append one frame. `pts_secs` is relative to the start of the output.
    fn push_frame(&mut self, frame: &RgbaImage, pts_secs: f64) -> ZoomreelResult<()>;

    /// Flush and mux everything pushed so far into the final artifact.
    fn finalize(&mut self) -> ZoomreelResult<ExportArtifact>;

    /// Tear down without producing output. Must be safe to call after a
    /// failed `push_frame` or `finalize`.
    fn abort(&mut self);
}

/// The finished output of an export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExportArtifact {
    /// A muxed file on disk.
    File { path: PathBuf, bytes: u64 },
    /// An in-memory byte buffer.
    Memory { data: Vec<u8> },
}

impl ExportArtifact {
    /// Describe a file that already exists on disk.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self::File { path, bytes }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Memory { .. } => None,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::File { bytes, .. } => *bytes,
            Self::Memory { data } => data.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input and output locations for an engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocationPaths {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Everything an external engine needs to execute a compiled graph.
#[derive(Debug, Clone)]
pub struct EngineInvocation {
    pub paths: EngineInvocationPaths,
    pub graph: FilterGraph,
    pub trim_start: f64,
    pub trim_end: f64,
    pub fps: u32,
    pub quality: Quality,
}

impl EngineInvocation {
    pub fn duration_secs(&self) -> f64 {
        (self.trim_end - self.trim_start).max(0.0)
    }
}

/// Progress reported by an engine while it runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineProgress {
    /// Output time encoded so far.
    pub out_time_secs: f64,
    /// The engine reported its final progress block.
    pub finished: bool,
}

/// How an engine run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed,
    /// Stopped early on request; the output holds what was encoded so far.
    Cancelled,
}

/// External filter/codec engine. Constructed once by the caller and
/// injected into the pipeline.
pub trait CodecEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can be executed on this system.
    fn is_available(&self) -> bool;

    /// Execute `invocation`, reporting progress and polling `cancel`.
    fn run(
        &self,
        invocation: &EngineInvocation,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(EngineProgress),
    ) -> ZoomreelResult<EngineOutcome>;
}
