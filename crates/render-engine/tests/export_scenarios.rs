//! End-to-end export scenarios against in-memory media fakes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use zoomreel_common::error::{ZoomreelError, ZoomreelResult};
use zoomreel_edit_model::{CropRect, EditModel, OutputSize, ZoomEffect};
use zoomreel_render_engine::{
    CancellationToken, CodecEngine, EncoderSettings, EncoderSink, EngineInvocation,
    EngineInvocationPaths, EngineOutcome, EngineProgress, ExportArtifact, ExportOutcome,
    ExportPhase, ExportPipeline, ExportProgress, FrameCompositor, FrameRecovery, FrameSource,
    PipelineConfig, SourceInfo,
};

struct FakeSource {
    info: SourceInfo,
    seeks: Vec<f64>,
    /// Source times (rounded to frames at 30fps) that never decode.
    missing_frames: Vec<u64>,
}

impl FakeSource {
    fn new(duration_secs: f64) -> Self {
        Self {
            info: SourceInfo::new(32, 18, duration_secs),
            seeks: Vec::new(),
            missing_frames: Vec::new(),
        }
    }
}

impl FrameSource for FakeSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn seek(&mut self, time_secs: f64) -> ZoomreelResult<Option<RgbaImage>> {
        self.seeks.push(time_secs);
        let frame = (time_secs * 30.0).round() as u64;
        if self.missing_frames.contains(&frame) {
            return Ok(None);
        }
        let shade = (frame % 200) as u8 + 40;
        Ok(Some(RgbaImage::from_pixel(
            self.info.width,
            self.info.height,
            Rgba([shade, 0, 0, 255]),
        )))
    }
}

#[derive(Default)]
struct RecordingSink {
    settings: Option<EncoderSettings>,
    pts: Vec<f64>,
    finalized: bool,
    aborted: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    fail_at: Option<usize>,
}

impl EncoderSink for RecordingSink {
    fn begin(&mut self, settings: &EncoderSettings) -> ZoomreelResult<()> {
        self.settings = Some(*settings);
        Ok(())
    }

    fn push_frame(&mut self, frame: &RgbaImage, pts_secs: f64) -> ZoomreelResult<()> {
        if self.fail_at == Some(self.pts.len()) {
            return Err(ZoomreelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder went away",
            )));
        }
        let settings = self.settings.expect("begin before push");
        assert_eq!(frame.dimensions(), (settings.width, settings.height));
        self.pts.push(pts_secs);
        if let Some((n, token)) = &self.cancel_after {
            if self.pts.len() == *n {
                token.cancel();
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> ZoomreelResult<ExportArtifact> {
        self.finalized = true;
        Ok(ExportArtifact::Memory {
            data: vec![0; self.pts.len()],
        })
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

fn small_model(duration_secs: f64) -> EditModel {
    let mut model = EditModel::new(duration_secs);
    model.output_size = OutputSize::new(64, 36, 30);
    model
}

fn pipeline(prefetch_depth: usize) -> ExportPipeline {
    ExportPipeline::new(PipelineConfig {
        progress_every_frames: 30,
        progress_interval: Duration::from_secs(3600),
        seek_retries: 1,
        prefetch_depth,
    })
}

fn scenario_model() -> EditModel {
    let mut model = small_model(10.0);
    model.trim_start = 2.0;
    model.trim_end = 6.0;
    model.zoom_effects = vec![ZoomEffect::new("z1", 3.0, 5.0, 2.0, 1.0, (3, 3))];
    model
}

#[test]
fn test_trimmed_export_with_zoom() {
    let model = scenario_model();
    let mut source = FakeSource::new(10.0);
    let mut sink = RecordingSink::default();

    let outcome = pipeline(0)
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap();

    let ExportOutcome::Completed { artifact, report } = outcome else {
        panic!("expected completed export");
    };
    assert_eq!(report.total_frames, 120);
    assert_eq!(report.frames_rendered, 120);
    assert_eq!(report.frames_skipped, 0);
    assert_eq!(artifact.len(), 120);
    assert!(sink.finalized);
    assert!(!sink.aborted);

    // 4s of output at 30fps, timestamps relative to the trim start.
    assert_eq!(sink.pts.len(), 120);
    assert_eq!(sink.pts[0], 0.0);
    assert!((sink.pts[119] - 119.0 / 30.0).abs() < 1e-9);
    assert!(sink.pts.windows(2).all(|w| w[1] > w[0]));
    assert!((source.seeks[0] - 2.0).abs() < 1e-9);

    let compositor = FrameCompositor::new(&model, None);
    let amount = |t: f64| compositor.transform_at(t).0.amount;
    assert!((amount(3.0) - 1.0).abs() < 1e-9);
    let mid = amount(3.5);
    assert!(mid > 1.2 && mid < 1.8, "mid-transition amount {mid}");
    assert_eq!(amount(4.0), 2.0);
    assert!((amount(5.0) - 1.0).abs() < 1e-9);
}

#[test]
fn test_prefetch_keeps_frame_order() {
    let model = scenario_model();
    let mut source = FakeSource::new(10.0);
    let mut sink = RecordingSink::default();

    let outcome = pipeline(4)
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap();

    assert!(!outcome.is_cancelled());
    assert_eq!(sink.pts.len(), 120);
    assert!(sink.pts.windows(2).all(|w| w[1] > w[0]));
    assert!(source.seeks.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_cancel_after_ten_frames() {
    for depth in [0, 4] {
        let model = scenario_model();
        let token = CancellationToken::new();
        let mut source = FakeSource::new(10.0);
        let mut sink = RecordingSink {
            cancel_after: Some((10, token.clone())),
            ..RecordingSink::default()
        };
        let phases = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&phases);

        let outcome = pipeline(depth)
            .with_progress(move |p: ExportProgress| seen.lock().unwrap().push(p.phase))
            .run_frames(&model, &mut source, &mut sink, &token)
            .unwrap();

        let ExportOutcome::Cancelled {
            artifact,
            frames_rendered,
            ..
        } = outcome
        else {
            panic!("expected cancelled export");
        };
        assert_eq!(frames_rendered, 10);
        assert_eq!(sink.pts.len(), 10);
        assert!(artifact.is_some());
        assert!(sink.finalized);

        let phases = phases.lock().unwrap();
        assert_eq!(phases.last(), Some(&ExportPhase::Cancelled));
        assert!(!phases.contains(&ExportPhase::Error));
    }
}

#[test]
fn test_cancel_before_start_produces_no_output() {
    let model = scenario_model();
    let token = CancellationToken::new();
    token.cancel();
    let mut source = FakeSource::new(10.0);
    let mut sink = RecordingSink::default();

    let outcome = pipeline(0)
        .run_frames(&model, &mut source, &mut sink, &token)
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.artifact().is_none());
    assert!(sink.pts.is_empty());
    assert!(source.seeks.is_empty());
}

#[test]
fn test_invalid_crop_fails_before_decode() {
    let mut model = small_model(10.0);
    model.crop = CropRect::new(60.0, 0.0, 50.0, 50.0);
    let mut source = FakeSource::new(10.0);
    let mut sink = RecordingSink::default();
    let phases = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&phases);

    let err = pipeline(4)
        .with_progress(move |p: ExportProgress| seen.lock().unwrap().push(p.phase))
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, ZoomreelError::InvalidEditModel { .. }));
    assert!(source.seeks.is_empty());
    assert!(sink.settings.is_none());
    assert_eq!(phases.lock().unwrap().last(), Some(&ExportPhase::Error));
}

#[test]
fn test_trim_beyond_source_is_invalid() {
    let mut model = small_model(10.0);
    model.trim_end = 12.0;
    let mut source = FakeSource::new(10.0);
    let mut sink = RecordingSink::default();

    let err = pipeline(0)
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_edit_model");
    assert!(source.seeks.is_empty());
}

#[test]
fn test_seek_misses_are_recovered() {
    let mut model = small_model(1.0);
    model.trim_end = 1.0;
    let mut source = FakeSource::new(1.0);
    source.missing_frames = vec![0, 5];
    let mut sink = RecordingSink::default();

    let outcome = pipeline(0)
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap();

    let report = outcome.report();
    assert_eq!(report.frames_rendered, 30);
    assert_eq!(report.frames_skipped, 2);
    assert_eq!(report.warnings[0].frame_index, 0);
    assert_eq!(report.warnings[0].recovery, FrameRecovery::BackgroundOnly);
    assert_eq!(report.warnings[1].frame_index, 5);
    assert_eq!(report.warnings[1].recovery, FrameRecovery::RepeatedPrevious);
    // One retry per missing frame.
    assert_eq!(source.seeks.len(), 30 + 2);
    assert_eq!(sink.pts.len(), 30);
}

#[test]
fn test_encoder_failure_reports_frame_and_aborts() {
    let model = small_model(2.0);
    let mut source = FakeSource::new(2.0);
    let mut sink = RecordingSink {
        fail_at: Some(7),
        ..RecordingSink::default()
    };

    let err = pipeline(0)
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap_err();

    assert_eq!(err.kind(), "encoder_failure");
    assert!(err.to_string().contains("frame 7 of 60"), "{err}");
    assert!(sink.aborted);
    assert!(!sink.finalized);
}

#[test]
fn test_progress_cadence() {
    let model = scenario_model();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let mut source = FakeSource::new(10.0);
    let mut sink = RecordingSink::default();

    pipeline(0)
        .with_progress(move |p: ExportProgress| seen.lock().unwrap().push(p))
        .run_frames(&model, &mut source, &mut sink, &CancellationToken::new())
        .unwrap();

    let events = events.lock().unwrap();
    let frame_reports: Vec<u64> = events
        .iter()
        .filter(|p| p.message.starts_with("Rendered"))
        .map(|p| p.frames_rendered)
        .collect();
    assert_eq!(frame_reports, vec![1, 31, 61, 91]);
    assert!(events.windows(2).all(|w| w[1].percent >= w[0].percent));

    let last = events.last().unwrap();
    assert_eq!(last.phase, ExportPhase::Complete);
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.total_frames, 120);
}

#[test]
fn test_first_listed_effect_wins() {
    let mut model = small_model(10.0);
    model.zoom_effects = vec![
        ZoomEffect::new("late-but-first", 4.0, 8.0, 1.5, 0.0, (0, 0)),
        ZoomEffect::new("early", 2.0, 6.0, 3.0, 0.0, (7, 7)),
    ];
    let compositor = FrameCompositor::new(&model, None);

    assert_eq!(compositor.transform_at(3.0).0.amount, 3.0);
    let overlap = compositor.transform_at(5.0).0;
    assert_eq!(overlap.amount, 1.5);
    assert!(overlap.origin_x < 0.5);

    let graph =
        zoomreel_render_engine::FilterGraph::compile(&model, &SourceInfo::new(1920, 1080, 10.0));
    let zoompan = graph
        .stages
        .iter()
        .find(|s| s.filter.contains("zoompan="))
        .expect("zoompan stage");
    let first = zoompan.filter.find("between(it,4.000000,8.000000)").unwrap();
    let second = zoompan.filter.find("between(it,2.000000,6.000000)").unwrap();
    assert!(first < second);
}

struct FakeEngine {
    available: bool,
    cancel_at_secs: Option<f64>,
    invocations: Mutex<Vec<EngineInvocation>>,
    availability_checks: AtomicUsize,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            available: true,
            cancel_at_secs: None,
            invocations: Mutex::new(Vec::new()),
            availability_checks: AtomicUsize::new(0),
        }
    }
}

impl CodecEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    fn run(
        &self,
        invocation: &EngineInvocation,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(EngineProgress),
    ) -> ZoomreelResult<EngineOutcome> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let mut t = 0.0;
        while t < invocation.duration_secs() {
            t += 0.5;
            on_progress(EngineProgress {
                out_time_secs: t,
                finished: false,
            });
            if self.cancel_at_secs.is_some_and(|at| t >= at) {
                cancel.cancel();
            }
            if cancel.is_cancelled() {
                std::fs::write(&invocation.paths.output, b"partial")?;
                return Ok(EngineOutcome::Cancelled);
            }
        }
        std::fs::write(&invocation.paths.output, b"complete")?;
        Ok(EngineOutcome::Completed)
    }
}

fn engine_paths(name: &str) -> EngineInvocationPaths {
    let dir = std::env::temp_dir().join(format!("zoomreel-scenarios-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    EngineInvocationPaths {
        source: PathBuf::from("/in/source.mp4"),
        output: dir.join(name),
    }
}

#[test]
fn test_filter_graph_passthrough_is_single_stage() {
    let model = small_model(10.0);
    let engine = FakeEngine::new();
    let paths = engine_paths("passthrough.mp4");

    let outcome = pipeline(0)
        .run_filter_graph(
            &model,
            &SourceInfo::new(1920, 1080, 10.0),
            &engine,
            &paths,
            &CancellationToken::new(),
        )
        .unwrap();

    let ExportOutcome::Completed { artifact, report } = outcome else {
        panic!("expected completed export");
    };
    assert_eq!(artifact.path(), Some(paths.output.as_path()));
    assert_eq!(report.frames_rendered, 300);

    let invocations = engine.invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].graph.stage_count(), 1);
    assert!(invocations[0].graph.limitations.is_empty());
    std::fs::remove_file(&paths.output).unwrap();
}

#[test]
fn test_filter_graph_cancellation() {
    let model = scenario_model();
    let engine = FakeEngine {
        cancel_at_secs: Some(1.0),
        ..FakeEngine::new()
    };
    let paths = engine_paths("cancelled.mp4");

    let outcome = pipeline(0)
        .run_filter_graph(
            &model,
            &SourceInfo::new(1920, 1080, 10.0),
            &engine,
            &paths,
            &CancellationToken::new(),
        )
        .unwrap();

    let ExportOutcome::Cancelled {
        artifact,
        frames_rendered,
        ..
    } = outcome
    else {
        panic!("expected cancelled export");
    };
    assert_eq!(frames_rendered, 30);
    assert!(artifact.is_some());
    std::fs::remove_file(&paths.output).unwrap();
}

#[test]
fn test_unavailable_engine() {
    let model = small_model(10.0);
    let engine = FakeEngine {
        available: false,
        ..FakeEngine::new()
    };

    let phases = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&phases);

    let err = pipeline(0)
        .with_progress(move |p: ExportProgress| seen.lock().unwrap().push(p.phase))
        .run_filter_graph(
            &model,
            &SourceInfo::new(1920, 1080, 10.0),
            &engine,
            &engine_paths("never.mp4"),
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert!(matches!(err, ZoomreelError::BackendUnavailable { .. }));
    assert!(engine.invocations.lock().unwrap().is_empty());
    assert_eq!(engine.availability_checks.load(Ordering::SeqCst), 1);
    let phases = phases.lock().unwrap();
    assert_eq!(phases.iter().filter(|p| **p == ExportPhase::Error).count(), 1);
    assert_eq!(phases.last(), Some(&ExportPhase::Error));
}
