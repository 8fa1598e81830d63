//! Zoomreel Render Engine
//!
//! Offline export of a source video with an edit model applied
//! (trim, crop, padding, rounded corners, background, zoom effects).
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ──► FrameSource::seek(t) ──┐
//!                                       ├── FrameCompositor (background,
//! edit model ───────────────────────────┘    crop, zoom, corner clip)
//!                                                   │
//!                                                   ▼
//!                                        EncoderSink::push_frame
//!                                                   │
//!                                                   ▼
//!                                              output.mp4
//!
//! edit model ──► FilterGraph::compile ──► CodecEngine::run ──► output.mp4
//! ```
//!
//! The first path is the frame backend, the reference rendering. The second
//! is the filter-graph backend, which hands the whole edit to an external
//! engine in one invocation.

pub mod cancel;
pub mod compositor;
pub mod export;
pub mod ffmpeg;
pub mod filter_graph;
pub mod io;
pub mod scratch;
pub mod session;

pub use cancel::CancellationToken;
pub use compositor::{FrameCompositor, RenderFrame};
pub use export::{export_project, ExportPipeline, ExportRequest, PipelineConfig};
pub use filter_graph::{FilterGraph, FilterStage, GraphInput};
pub use io::{
    CodecEngine, EncoderSettings, EncoderSink, EngineInvocation, EngineInvocationPaths,
    EngineOutcome, EngineProgress, ExportArtifact, FrameSource, SourceInfo,
};
pub use session::{
    ExportOutcome, ExportPhase, ExportProgress, ExportReport, FrameRecovery, FrameWarning,
    ProgressCallback,
};
