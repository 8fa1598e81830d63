//! Export pipeline: drives a backend through a full export.
//!
//! The frame backend validates the edit, then seeks, composites, and
//! pushes every output frame to an [`EncoderSink`] in timestamp order. The
//! filter-graph backend compiles the edit once and hands it to a
//! [`CodecEngine`]. Both share the phase machine in [`crate::session`],
//! report progress at a bounded cadence, and poll a [`CancellationToken`].
//!
//! A cancelled export finalizes a valid, truncated file in both backends.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use image::RgbaImage;
use zoomreel_common::config::{ExportBackend, ExportDefaults};
use zoomreel_common::error::{ErrorContext, ZoomreelError, ZoomreelResult};
use zoomreel_edit_model::{Background, EditModel};

use crate::cancel::CancellationToken;
use crate::compositor::FrameCompositor;
use crate::ffmpeg::{probe_source, FfmpegEncoderSink, FfmpegEngine, FfmpegFrameSource};
use crate::filter_graph::FilterGraph;
use crate::io::{
    CodecEngine, EncoderSettings, EncoderSink, EngineInvocation, EngineInvocationPaths,
    EngineOutcome, EngineProgress, ExportArtifact, FrameSource, SourceInfo,
};
use crate::session::{
    ExportOutcome, ExportPhase, ExportProgress, ExportSession, FrameRecovery, FrameWarning,
    ProgressCallback,
};

/// Tunables of the pipeline itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Report progress at least every N frames.
    pub progress_every_frames: u64,
    /// Report progress at least this often.
    pub progress_interval: Duration,
    /// Extra seek attempts before a frame counts as missing.
    pub seek_retries: u32,
    /// Frames decoded ahead on a worker thread; 0 decodes inline.
    pub prefetch_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl From<&ExportDefaults> for PipelineConfig {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            progress_every_frames: defaults.progress_every_frames.max(1),
            progress_interval: Duration::from_millis(defaults.progress_interval_ms),
            seek_retries: defaults.seek_retries,
            prefetch_depth: defaults.prefetch_depth,
        }
    }
}

/// Drives exports. Holds no per-export state, so one pipeline can run
/// several exports one after another.
pub struct ExportPipeline {
    config: PipelineConfig,
    progress: Option<ProgressCallback>,
}

impl ExportPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Attach a progress observer.
    pub fn with_progress(mut self, callback: impl Fn(ExportProgress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    fn emit(&self, progress: ExportProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }

    fn new_session(&self, cancel: &CancellationToken) -> ExportSession {
        ExportSession::new(
            cancel.clone(),
            self.config.progress_every_frames,
            self.config.progress_interval,
        )
    }

    fn fail(&self, session: &mut ExportSession, err: ZoomreelError) -> ZoomreelError {
        session.fail();
        tracing::error!(
            error = %err,
            kind = err.kind(),
            frames_rendered = session.frames_rendered(),
            total_frames = session.total_frames(),
            "Export failed"
        );
        self.emit(session.snapshot(err.to_string()));
        err
    }

    /// Render every frame in-process and stream it to `sink`.
    ///
    /// The edit is validated before the source is asked for a single frame.
    pub fn run_frames(
        &self,
        model: &EditModel,
        source: &mut dyn FrameSource,
        sink: &mut dyn EncoderSink,
        cancel: &CancellationToken,
    ) -> ZoomreelResult<ExportOutcome> {
        let mut session = self.new_session(cancel);
        tracing::info!(backend = ExportBackend::Frames.as_str(), "Starting export");
        self.render_frames(&mut session, model, source, sink)
            .map_err(|err| self.fail(&mut session, err))
    }

    fn render_frames(
        &self,
        session: &mut ExportSession,
        model: &EditModel,
        source: &mut dyn FrameSource,
        sink: &mut dyn EncoderSink,
    ) -> ZoomreelResult<ExportOutcome> {
        session.transition(ExportPhase::Initializing)?;
        self.emit(session.snapshot("Validating edit"));
        model.validate(None)?;

        let info = source.info();
        if !info.is_usable() {
            return Err(ZoomreelError::source(
                format!(
                    "source reports {}x{} over {:.3}s",
                    info.width, info.height, info.duration_secs
                ),
                ErrorContext::stage("initializing"),
            ));
        }
        model.validate(Some(info.duration_secs))?;

        let model = model.sanitized();
        let total = model.total_frames();
        session.set_total_frames(total);

        let background = load_background(&model.background)?;
        let compositor = FrameCompositor::new(&model, background.as_ref());
        tracing::info!(
            total_frames = total,
            fps = model.output_size.fps,
            width = model.output_size.width,
            height = model.output_size.height,
            trim_start = model.trim_start,
            trim_end = model.trim_end,
            effects = model.zoom_effects.len(),
            prefetch_depth = self.config.prefetch_depth,
            "Export plan built"
        );

        if session.is_cancelled() {
            session.transition(ExportPhase::Cancelled)?;
            return Ok(self.cancelled_outcome(session, None));
        }

        let settings = EncoderSettings {
            width: model.output_size.width,
            height: model.output_size.height,
            fps: model.output_size.fps,
            quality: model.quality,
        };
        sink.begin(&settings)
            .map_err(|err| as_encoder_failure(err, ErrorContext::stage("initializing")))?;
        let mut sink = SinkGuard::new(sink);

        session.transition(ExportPhase::Rendering)?;
        self.emit(session.snapshot("Rendering frames"));

        let end = if self.config.prefetch_depth > 0 && total > 1 {
            self.render_prefetched(session, &compositor, &mut sink, source, &model)?
        } else {
            let retries = self.config.seek_retries;
            let (trim_start, fps) = (model.trim_start, model.output_size.fps);
            let frames = (0..total).map(|index| {
                fetch_frame(&mut *source, index, frame_time(trim_start, fps, index), retries)
            });
            self.render_loop(session, &compositor, &mut sink, &model, frames)?
        };

        match end {
            LoopEnd::Finished => {}
            LoopEnd::Cancelled => return self.finish_cancelled(session, &mut sink),
            LoopEnd::Exhausted if session.is_cancelled() => {
                return self.finish_cancelled(session, &mut sink)
            }
            LoopEnd::Exhausted => {
                return Err(ZoomreelError::source(
                    "decoder stopped delivering frames",
                    ErrorContext::stage("rendering").at_frame(session.frames_rendered(), total),
                ))
            }
        }

        session.transition(ExportPhase::Finalizing)?;
        self.emit(session.snapshot("Finalizing output"));
        let artifact = sink.finalize().map_err(|err| {
            as_encoder_failure(
                err,
                ErrorContext::stage("finalizing").at_frame(session.frames_rendered(), total),
            )
        })?;

        session.transition(ExportPhase::Complete)?;
        let report = session.report();
        tracing::info!(
            frames_rendered = report.frames_rendered,
            frames_skipped = report.frames_skipped,
            elapsed_secs = report.elapsed_secs,
            average_fps = report.average_fps,
            bytes = artifact.len(),
            "Export finished"
        );
        self.emit(session.snapshot("Export complete"));
        Ok(ExportOutcome::Completed { artifact, report })
    }

    /// Decode on a scoped worker thread while the current frame is
    /// composited. The single bounded FIFO keeps frames in order.
    fn render_prefetched(
        &self,
        session: &mut ExportSession,
        compositor: &FrameCompositor,
        sink: &mut SinkGuard<'_>,
        source: &mut dyn FrameSource,
        model: &EditModel,
    ) -> ZoomreelResult<LoopEnd> {
        let total = session.total_frames();
        let retries = self.config.seek_retries;
        let depth = self.config.prefetch_depth;
        let cancel = session.cancel_token();
        let (trim_start, fps) = (model.trim_start, model.output_size.fps);

        std::thread::scope(|scope| {
            let (tx, rx) = crossbeam_channel::bounded::<FetchedFrame>(depth);
            let worker = scope.spawn(move || {
                for index in 0..total {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let time_secs = frame_time(trim_start, fps, index);
                    let fetched = fetch_frame(&mut *source, index, time_secs, retries);
                    if tx.send(fetched).is_err() {
                        break;
                    }
                }
                tracing::debug!("Decode-ahead worker finished");
            });

            let result = self.render_loop(session, compositor, sink, model, rx.iter());
            drop(rx);

            match (result, worker.join()) {
                (Err(err), _) => Err(err),
                (Ok(_), Err(_)) => Err(ZoomreelError::source(
                    "decode-ahead worker panicked",
                    ErrorContext::stage("rendering"),
                )),
                (Ok(end), Ok(())) => Ok(end),
            }
        })
    }

    fn render_loop(
        &self,
        session: &mut ExportSession,
        compositor: &FrameCompositor,
        sink: &mut SinkGuard<'_>,
        model: &EditModel,
        mut frames: impl Iterator<Item = FetchedFrame>,
    ) -> ZoomreelResult<LoopEnd> {
        let total = session.total_frames();
        let mut last_source: Option<RgbaImage> = None;
        let mut pushed = 0u64;

        while pushed < total {
            if session.is_cancelled() {
                tracing::info!(
                    frames_rendered = pushed,
                    total_frames = total,
                    "Stopping at cancellation"
                );
                return Ok(LoopEnd::Cancelled);
            }
            let Some(fetched) = frames.next() else {
                return Ok(LoopEnd::Exhausted);
            };
            let (index, time_secs) = (fetched.index, fetched.time_secs);

            let frame = match fetched.image {
                Some(image) => {
                    let frame = compositor.render_frame(Some(&image), time_secs, index);
                    last_source = Some(image);
                    frame
                }
                None => {
                    let (frame, recovery) = match &last_source {
                        Some(previous) => (
                            compositor.render_frame(Some(previous), time_secs, index),
                            FrameRecovery::RepeatedPrevious,
                        ),
                        None => (
                            compositor.render_frame(None, time_secs, index),
                            FrameRecovery::BackgroundOnly,
                        ),
                    };
                    session.record_warning(FrameWarning {
                        frame_index: index,
                        time_secs,
                        recovery,
                        message: format!(
                            "Seek miss after {} attempt(s): {}",
                            fetched.attempts,
                            fetched.error.as_deref().unwrap_or("frame unavailable")
                        ),
                    });
                    frame
                }
            };

            sink.push(&frame.image, time_secs - model.trim_start)
                .map_err(|err| {
                    as_encoder_failure(
                        err,
                        ErrorContext::stage("rendering")
                            .at_time(time_secs)
                            .at_frame(index, total),
                    )
                })?;
            tracing::trace!(
                frame = index,
                time_secs,
                zoom = frame.zoom.amount,
                "Frame pushed"
            );

            session.record_frame(time_secs);
            pushed += 1;
            if let Some(progress) = session.throttled_snapshot(Instant::now()) {
                self.emit(progress);
            }
        }

        Ok(LoopEnd::Finished)
    }

    fn finish_cancelled(
        &self,
        session: &mut ExportSession,
        sink: &mut SinkGuard<'_>,
    ) -> ZoomreelResult<ExportOutcome> {
        let frames = session.frames_rendered();
        let artifact = if frames > 0 {
            Some(sink.finalize().map_err(|err| {
                as_encoder_failure(
                    err,
                    ErrorContext::stage("finalizing").at_frame(frames, session.total_frames()),
                )
            })?)
        } else {
            sink.abort();
            None
        };
        session.transition(ExportPhase::Cancelled)?;
        Ok(self.cancelled_outcome(session, artifact))
    }

    fn cancelled_outcome(
        &self,
        session: &ExportSession,
        artifact: Option<ExportArtifact>,
    ) -> ExportOutcome {
        let report = session.report();
        tracing::info!(
            frames_rendered = report.frames_rendered,
            total_frames = report.total_frames,
            truncated_output = artifact.is_some(),
            "Export cancelled"
        );
        self.emit(session.snapshot("Export cancelled"));
        ExportOutcome::Cancelled {
            artifact,
            frames_rendered: report.frames_rendered,
            report,
        }
    }

    /// Compile the edit to a filter graph and run it on `engine`.
    pub fn run_filter_graph(
        &self,
        model: &EditModel,
        source: &SourceInfo,
        engine: &dyn CodecEngine,
        paths: &EngineInvocationPaths,
        cancel: &CancellationToken,
    ) -> ZoomreelResult<ExportOutcome> {
        let mut session = self.new_session(cancel);
        tracing::info!(
            backend = ExportBackend::FilterGraph.as_str(),
            engine = engine.name(),
            "Starting export"
        );
        self.run_engine(&mut session, model, source, engine, paths, cancel)
            .map_err(|err| self.fail(&mut session, err))
    }

    fn run_engine(
        &self,
        session: &mut ExportSession,
        model: &EditModel,
        source: &SourceInfo,
        engine: &dyn CodecEngine,
        paths: &EngineInvocationPaths,
        cancel: &CancellationToken,
    ) -> ZoomreelResult<ExportOutcome> {
        session.transition(ExportPhase::Initializing)?;
        self.emit(session.snapshot("Validating edit"));
        model.validate(None)?;
        if !source.is_usable() {
            return Err(ZoomreelError::source(
                format!("source reports {}x{}", source.width, source.height),
                ErrorContext::stage("initializing"),
            ));
        }
        model.validate(Some(source.duration_secs))?;

        if !engine.is_available() {
            return Err(ZoomreelError::backend_unavailable(
                engine.name(),
                "codec engine is not installed or not executable",
            ));
        }

        let model = model.sanitized();
        let total = model.total_frames();
        session.set_total_frames(total);

        let graph = FilterGraph::compile(&model, source);
        for limitation in &graph.limitations {
            tracing::warn!(
                limitation = %limitation,
                "Filter-graph output differs from the frame compositor"
            );
        }
        tracing::info!(
            stages = graph.stage_count(),
            total_frames = total,
            "Filter graph compiled"
        );

        if cancel.is_cancelled() {
            session.transition(ExportPhase::Cancelled)?;
            return Ok(self.cancelled_outcome(session, None));
        }

        let invocation = EngineInvocation {
            paths: paths.clone(),
            graph,
            trim_start: model.trim_start,
            trim_end: model.trim_end,
            fps: model.output_size.fps,
            quality: model.quality,
        };

        session.transition(ExportPhase::Rendering)?;
        self.emit(session.snapshot(format!("Running {}", engine.name())));

        let fps = model.output_size.fps as f64;
        let trim_start = model.trim_start;
        let outcome = {
            let mut on_progress = |progress: EngineProgress| {
                let frames = ((progress.out_time_secs * fps).round().max(0.0) as u64).min(total);
                session.record_position(frames, trim_start + progress.out_time_secs);
                if let Some(snapshot) = session.throttled_snapshot(Instant::now()) {
                    self.emit(snapshot);
                }
            };
            engine.run(&invocation, cancel, &mut on_progress)
        }
        .map_err(|err| err.with_context(ErrorContext::stage("rendering")))?;

        match outcome {
            EngineOutcome::Cancelled => {
                let artifact = paths
                    .output
                    .exists()
                    .then(|| ExportArtifact::from_file(&paths.output));
                session.transition(ExportPhase::Cancelled)?;
                Ok(self.cancelled_outcome(session, artifact))
            }
            EngineOutcome::Completed => {
                session.transition(ExportPhase::Finalizing)?;
                session.record_position(total, model.trim_end);
                if !paths.output.exists() {
                    return Err(ZoomreelError::encoder(
                        format!(
                            "{} produced no output at {}",
                            engine.name(),
                            paths.output.display()
                        ),
                        ErrorContext::stage("finalizing"),
                    ));
                }
                let artifact = ExportArtifact::from_file(&paths.output);
                session.transition(ExportPhase::Complete)?;
                let report = session.report();
                tracing::info!(
                    elapsed_secs = report.elapsed_secs,
                    bytes = artifact.len(),
                    "Export finished"
                );
                self.emit(session.snapshot("Export complete"));
                Ok(ExportOutcome::Completed { artifact, report })
            }
        }
    }
}

/// A request to export `model` from `source` into `output`.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub model: EditModel,
    pub source: PathBuf,
    pub output: PathBuf,
    pub backend: ExportBackend,
}

/// Export with the ffmpeg adapters.
///
/// This is the main entry point for rendering a request end to end.
pub fn export_project(
    request: &ExportRequest,
    defaults: &ExportDefaults,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
) -> ZoomreelResult<ExportOutcome> {
    tracing::info!(
        source = %request.source.display(),
        output = %request.output.display(),
        backend = request.backend.as_str(),
        "Export requested"
    );

    if !request.source.exists() {
        return Err(ZoomreelError::FileNotFound {
            path: request.source.clone(),
        });
    }
    if let Some(parent) = request.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut pipeline = ExportPipeline::new(PipelineConfig::from(defaults));
    pipeline.progress = progress;

    match request.backend {
        ExportBackend::Frames => {
            let mut source = FfmpegFrameSource::open(
                &defaults.ffmpeg_binary,
                &defaults.ffprobe_binary,
                &request.source,
                request.model.output_size.fps,
            )?;
            let mut sink = FfmpegEncoderSink::new(&defaults.ffmpeg_binary, &request.output);
            pipeline.run_frames(&request.model, &mut source, &mut sink, cancel)
        }
        ExportBackend::FilterGraph => {
            let engine = FfmpegEngine::new(&defaults.ffmpeg_binary);
            let info = probe_source(&defaults.ffprobe_binary, &request.source)?;
            let paths = EngineInvocationPaths {
                source: request.source.clone(),
                output: request.output.clone(),
            };
            pipeline.run_filter_graph(&request.model, &info, &engine, &paths, cancel)
        }
    }
}

enum LoopEnd {
    Finished,
    Cancelled,
    /// The frame supply ended before every frame was rendered.
    Exhausted,
}

struct FetchedFrame {
    index: u64,
    time_secs: f64,
    image: Option<RgbaImage>,
    attempts: u32,
    error: Option<String>,
}

/// Source time of output frame `index`.
fn frame_time(trim_start: f64, fps: u32, index: u64) -> f64 {
    trim_start + index as f64 / fps.max(1) as f64
}

/// Seek with bounded retries. Never fails: a miss is reported in the
/// returned frame.
fn fetch_frame(
    source: &mut dyn FrameSource,
    index: u64,
    time_secs: f64,
    retries: u32,
) -> FetchedFrame {
    let mut error = None;
    let mut attempts = 0;
    for _ in 0..=retries {
        attempts += 1;
        match source.seek(time_secs) {
            Ok(Some(image)) => {
                return FetchedFrame {
                    index,
                    time_secs,
                    image: Some(image),
                    attempts,
                    error: None,
                }
            }
            Ok(None) => error = Some("frame unavailable".to_string()),
            Err(err) => {
                tracing::debug!(
                    frame = index,
                    time_secs,
                    attempt = attempts,
                    error = %err,
                    "Seek failed"
                );
                error = Some(err.to_string());
            }
        }
    }
    FetchedFrame {
        index,
        time_secs,
        image: None,
        attempts,
        error,
    }
}

/// Attach `context` to an encoder error, wrapping foreign errors as
/// encoder failures.
fn as_encoder_failure(err: ZoomreelError, context: ErrorContext) -> ZoomreelError {
    match err {
        ZoomreelError::EncoderFailure { .. } | ZoomreelError::SourceUnreadable { .. } => {
            err.with_context(context)
        }
        other => ZoomreelError::encoder(other.to_string(), context),
    }
}

fn load_background(background: &Background) -> ZoomreelResult<Option<RgbaImage>> {
    match background {
        Background::Color { .. } => Ok(None),
        Background::Image { source, .. } => {
            let image = image::open(source).map_err(|e| {
                ZoomreelError::source(
                    format!("background image {}: {e}", source.display()),
                    ErrorContext::stage("initializing"),
                )
            })?;
            Ok(Some(image.to_rgba8()))
        }
    }
}

/// Calls `abort` on the sink unless it was finalized.
struct SinkGuard<'a> {
    sink: &'a mut dyn EncoderSink,
    open: bool,
}

impl<'a> SinkGuard<'a> {
    fn new(sink: &'a mut dyn EncoderSink) -> Self {
        Self { sink, open: true }
    }

    fn push(&mut self, frame: &RgbaImage, pts_secs: f64) -> ZoomreelResult<()> {
        self.sink.push_frame(frame, pts_secs)
    }

    fn finalize(&mut self) -> ZoomreelResult<ExportArtifact> {
        let artifact = self.sink.finalize()?;
        self.open = false;
        Ok(artifact)
    }

    fn abort(&mut self) {
        if self.open {
            self.open = false;
            self.sink.abort();
        }
    }
}

impl Drop for SinkGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            tracing::debug!("Aborting encoder sink");
            self.abort();
        }
    }
}
