//! ffmpeg adapters for the media boundaries.
//!
//! - [`FfmpegFrameSource`] decodes RGBA frames from a raw-video pipe.
//! - [`FfmpegEncoderSink`] encodes RGBA frames written to ffmpeg's stdin.
//! - [`FfmpegEngine`] runs a compiled [`FilterGraph`](crate::FilterGraph)
//!   end to end, reading `-progress` output and quitting on cancellation.
//!
//! Outputs are written to a `.partial` file and renamed once ffmpeg exits
//! cleanly, so a failed export never leaves a corrupt file at the target path.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use image::RgbaImage;
use serde::Deserialize;
use zoomreel_common::error::{ErrorContext, ZoomreelError, ZoomreelResult};
use zoomreel_edit_model::Quality;

use crate::cancel::CancellationToken;
use crate::filter_graph::GraphInput;
use crate::io::{
    CodecEngine, EncoderSettings, EncoderSink, EngineInvocation, EngineOutcome, EngineProgress,
    ExportArtifact, FrameSource, SourceInfo,
};
use crate::scratch::{partial_path, ScratchFiles};

const CANCEL_POLL: Duration = Duration::from_millis(50);
const STALL_WARNING: Duration = Duration::from_secs(10);

/// Whether `binary` can be executed.
pub fn command_exists(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Read frame size and duration of the first video stream.
pub fn probe_source(ffprobe: &str, path: &Path) -> ZoomreelResult<SourceInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            ZoomreelError::backend_unavailable(ffprobe, format!("failed to start: {e}"))
        })?;

    if !output.status.success() {
        return Err(ZoomreelError::source(
            format!(
                "ffprobe failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            ErrorContext::stage("initializing"),
        ));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
    tracing::debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        duration_secs = info.duration_secs,
        "Probed source"
    );
    Ok(info)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_output(raw: &str) -> ZoomreelResult<SourceInfo> {
    let probe: ProbeOutput = serde_json::from_str(raw)?;
    let unreadable = |msg: &str| ZoomreelError::source(msg, ErrorContext::stage("initializing"));

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| unreadable("no video stream"))?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(unreadable("video stream has no frame size")),
    };

    // Container duration wins; some muxers leave the stream duration empty.
    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| unreadable("source has no duration"))?;

    Ok(SourceInfo::new(width, height, duration_secs))
}

/// Encoder arguments for a quality preset.
pub fn codec_args(quality: Quality) -> Vec<String> {
    let preset = quality.preset();
    vec![
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        preset.encoder_preset.into(),
        "-crf".into(),
        preset.crf.to_string(),
        "-maxrate".into(),
        format!("{}k", preset.max_bitrate_kbps),
        "-bufsize".into(),
        format!("{}k", preset.max_bitrate_kbps * 2),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-an".into(),
    ]
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

/// Runs compiled filter graphs with the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: String,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Full argument list for `invocation`, writing to `output`.
    pub fn build_args(&self, invocation: &EngineInvocation, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostats".into(),
            "-progress".into(),
            "pipe:1".into(),
        ];

        for input in &invocation.graph.inputs {
            match input {
                GraphInput::Source => {
                    args.extend([
                        "-ss".into(),
                        format!("{:.6}", invocation.trim_start),
                        "-to".into(),
                        format!("{:.6}", invocation.trim_end),
                        "-i".into(),
                        invocation.paths.source.display().to_string(),
                    ]);
                }
                GraphInput::Image { path } => {
                    args.extend([
                        "-loop".into(),
                        "1".into(),
                        "-framerate".into(),
                        invocation.fps.to_string(),
                        "-i".into(),
                        path.display().to_string(),
                    ]);
                }
            }
        }

        args.extend([
            "-filter_complex".into(),
            invocation.graph.to_filter_complex(),
            "-map".into(),
            format!("[{}]", invocation.graph.output_label),
            "-t".into(),
            format!("{:.6}", invocation.duration_secs()),
            "-r".into(),
            invocation.fps.to_string(),
        ]);
        args.extend(codec_args(invocation.quality));
        args.push(output.display().to_string());
        args
    }
}

impl CodecEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn run(
        &self,
        invocation: &EngineInvocation,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(EngineProgress),
    ) -> ZoomreelResult<EngineOutcome> {
        let output = &invocation.paths.output;
        let mut scratch = ScratchFiles::new();
        let partial = scratch.track(partial_path(output));
        let args = self.build_args(invocation, &partial);
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ZoomreelError::backend_unavailable(&self.binary, format!("failed to start: {e}"))
            })?;
        tracing::info!(
            pid = child.id(),
            args_len = args.len(),
            duration_secs = invocation.duration_secs(),
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ZoomreelError::encoder("ffmpeg stdout not captured", rendering()))?;
        let stdin = child.stdin.take();
        let stderr_task = drain_stderr(&mut child);

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let watcher_cancel = cancel.clone();
        let watcher = std::thread::spawn(move || -> bool {
            let mut stdin = stdin;
            loop {
                match done_rx.recv_timeout(CANCEL_POLL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return false,
                    Err(RecvTimeoutError::Timeout) if watcher_cancel.is_cancelled() => {
                        // `q` makes ffmpeg flush and close the output cleanly.
                        if let Some(pipe) = stdin.as_mut() {
                            if let Err(err) = pipe.write_all(b"q\n").and_then(|_| pipe.flush()) {
                                tracing::warn!(error = %err, "Failed to send quit to ffmpeg");
                            }
                        }
                        return true;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        });

        let read_result = read_progress(stdout, on_progress);
        drop(done_tx);
        let quit_sent = watcher.join().unwrap_or(false);

        let status = child
            .wait()
            .map_err(|e| {
                ZoomreelError::encoder(format!("failed to wait on ffmpeg: {e}"), rendering())
            })?;
        let stderr_output = join_stderr(stderr_task);
        read_result?;

        if quit_sent || cancel.is_cancelled() {
            if partial.exists() {
                std::fs::rename(&partial, output)?;
                tracing::info!(
                    output = %output.display(),
                    "ffmpeg stopped early; truncated output kept"
                );
            }
            return Ok(EngineOutcome::Cancelled);
        }

        if !status.success() {
            return Err(ZoomreelError::encoder(
                format!("ffmpeg exited with {status}: {}", stderr_output.trim()),
                rendering(),
            ));
        }

        std::fs::rename(&partial, output)?;
        scratch.keep(&partial);
        tracing::info!(output = %output.display(), "ffmpeg export finished");
        Ok(EngineOutcome::Completed)
    }
}

fn rendering() -> ErrorContext {
    ErrorContext::stage("rendering")
}

fn read_progress(
    stdout: ChildStdout,
    on_progress: &mut dyn FnMut(EngineProgress),
) -> ZoomreelResult<()> {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let mut state = ProgressState::default();
    let mut last_advance_secs = 0.0f64;
    let mut last_advance_wall = Instant::now();

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).map_err(|e| {
            ZoomreelError::encoder(format!("failed reading ffmpeg progress: {e}"), rendering())
        })?;
        if bytes == 0 {
            return Ok(());
        }

        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        state.update(key, value);
        if key != "progress" {
            continue;
        }

        if state.out_time_secs > last_advance_secs + 0.001 {
            last_advance_secs = state.out_time_secs;
            last_advance_wall = Instant::now();
        } else if last_advance_wall.elapsed() >= STALL_WARNING {
            tracing::warn!(
                out_time_secs = state.out_time_secs,
                "No ffmpeg progress advancement for 10s"
            );
            last_advance_wall = Instant::now();
        }

        on_progress(EngineProgress {
            out_time_secs: state.out_time_secs,
            finished: state.complete,
        });
    }
}

// Drained concurrently so ffmpeg never blocks on a full stderr pipe.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut output = String::new();
        match BufReader::new(stderr).read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    }))
}

fn join_stderr(task: Option<JoinHandle<String>>) -> String {
    task.map(|t| {
        t.join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
    })
    .unwrap_or_default()
}

/// Decodes frames through an `ffmpeg ... -f rawvideo -pix_fmt rgba` pipe.
///
/// Forward seeks read through the pipe; backward or far-forward seeks
/// restart the decoder at the requested time.
pub struct FfmpegFrameSource {
    binary: String,
    path: PathBuf,
    info: SourceInfo,
    fps: u32,
    decoder: Option<RawDecoder>,
}

struct RawDecoder {
    child: Child,
    stdout: ChildStdout,
    start_secs: f64,
    frames_read: u64,
    last: Option<(f64, RgbaImage)>,
    exhausted: bool,
}

impl RawDecoder {
    fn next_time(&self, fps: u32) -> f64 {
        self.start_secs + self.frames_read as f64 / fps as f64
    }
}

impl Drop for RawDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl FfmpegFrameSource {
    /// Probe `path` and prepare to decode it at `fps`.
    pub fn open(ffmpeg: &str, ffprobe: &str, path: &Path, fps: u32) -> ZoomreelResult<Self> {
        if !path.exists() {
            return Err(ZoomreelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let info = probe_source(ffprobe, path)?;
        Ok(Self {
            binary: ffmpeg.to_string(),
            path: path.to_path_buf(),
            info,
            fps: fps.max(1),
            decoder: None,
        })
    }

    fn frame_bytes(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 4
    }

    fn spawn_decoder(&self, start_secs: f64) -> ZoomreelResult<RawDecoder> {
        tracing::debug!(path = %self.path.display(), start_secs, "Starting decoder");
        let mut child = Command::new(&self.binary)
            .args(["-v", "error", "-nostdin", "-ss"])
            .arg(format!("{start_secs:.6}"))
            .arg("-i")
            .arg(&self.path)
            .args(["-an", "-vf"])
            .arg(format!("fps={}", self.fps))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ZoomreelError::source(
                    format!("failed to start decoder: {e}"),
                    ErrorContext::stage("rendering").at_time(start_secs),
                )
            })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ZoomreelError::source("decoder stdout not captured", ErrorContext::stage("rendering"))
        })?;
        Ok(RawDecoder {
            child,
            stdout,
            start_secs,
            frames_read: 0,
            last: None,
            exhausted: false,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn seek(&mut self, time_secs: f64) -> ZoomreelResult<Option<RgbaImage>> {
        if time_secs < 0.0 || time_secs > self.info.duration_secs {
            return Ok(None);
        }
        let half_frame = 0.5 / self.fps as f64;

        let restart = match &self.decoder {
            None => true,
            Some(d) => {
                let behind = d
                    .last
                    .as_ref()
                    .map(|(t, _)| time_secs < t - half_frame)
                    .unwrap_or(time_secs < d.start_secs - half_frame);
                behind || time_secs > d.next_time(self.fps) + 1.0
            }
        };
        if restart {
            self.decoder = Some(self.spawn_decoder(time_secs)?);
        }

        let frame_bytes = self.frame_bytes();
        let (width, height, fps) = (self.info.width, self.info.height, self.fps);
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        if let Some((t, image)) = &decoder.last {
            if (t - time_secs).abs() <= half_frame {
                return Ok(Some(image.clone()));
            }
        }

        while !decoder.exhausted {
            let frame_time = decoder.next_time(fps);
            let mut buf = vec![0u8; frame_bytes];
            match decoder.stdout.read_exact(&mut buf) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    decoder.exhausted = true;
                    break;
                }
                Err(err) => {
                    return Err(ZoomreelError::source(
                        format!("decoder read failed: {err}"),
                        ErrorContext::stage("rendering").at_time(time_secs),
                    ))
                }
            }
            decoder.frames_read += 1;
            let image = RgbaImage::from_raw(width, height, buf).ok_or_else(|| {
                ZoomreelError::source("short decoded frame", ErrorContext::stage("rendering"))
            })?;
            decoder.last = Some((frame_time, image));
            if frame_time >= time_secs - half_frame {
                return Ok(decoder.last.as_ref().map(|(_, image)| image.clone()));
            }
        }

        Ok(None)
    }
}

/// Streams RGBA frames into `ffmpeg -f rawvideo -i pipe:0`.
pub struct FfmpegEncoderSink {
    binary: String,
    output: PathBuf,
    scratch: ScratchFiles,
    process: Option<EncoderProcess>,
}

struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    partial: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

impl FfmpegEncoderSink {
    pub fn new(ffmpeg: &str, output: &Path) -> Self {
        Self {
            binary: ffmpeg.to_string(),
            output: output.to_path_buf(),
            scratch: ScratchFiles::new(),
            process: None,
        }
    }

    pub fn build_args(settings: &EncoderSettings, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", settings.width, settings.height),
            "-framerate".into(),
            settings.fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
        ];
        args.extend(codec_args(settings.quality));
        args.push(output.display().to_string());
        args
    }
}

impl EncoderSink for FfmpegEncoderSink {
    fn begin(&mut self, settings: &EncoderSettings) -> ZoomreelResult<()> {
        let init = || ErrorContext::stage("initializing");
        if self.process.is_some() {
            return Err(ZoomreelError::encoder("encoder already started", init()));
        }
        let partial = self.scratch.track(partial_path(&self.output));
        let args = Self::build_args(settings, &partial);
        tracing::debug!(args = ?args, "Starting encoder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ZoomreelError::backend_unavailable(&self.binary, format!("failed to start: {e}"))
            })?;
        let stdin = child.stdin.take();
        let stderr = drain_stderr(&mut child);
        self.process = Some(EncoderProcess {
            child,
            stdin,
            stderr,
            partial,
            width: settings.width,
            height: settings.height,
            frames: 0,
        });
        Ok(())
    }

    fn push_frame(&mut self, frame: &RgbaImage, pts_secs: f64) -> ZoomreelResult<()> {
        let context = || ErrorContext::stage("rendering").at_time(pts_secs);
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| ZoomreelError::encoder("encoder not started", context()))?;
        if frame.width() != process.width || frame.height() != process.height {
            return Err(ZoomreelError::encoder(
                format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(),
                    frame.height(),
                    process.width,
                    process.height
                ),
                context(),
            ));
        }
        let stdin = process
            .stdin
            .as_mut()
            .ok_or_else(|| ZoomreelError::encoder("encoder input closed", context()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| ZoomreelError::encoder(format!("writing frame: {e}"), context()))?;
        process.frames += 1;
        Ok(())
    }

    fn finalize(&mut self) -> ZoomreelResult<ExportArtifact> {
        let context = || ErrorContext::stage("finalizing");
        let mut process = self
            .process
            .take()
            .ok_or_else(|| ZoomreelError::encoder("encoder not started", context()))?;
        drop(process.stdin.take());

        let status = process
            .child
            .wait()
            .map_err(|e| {
                ZoomreelError::encoder(format!("failed to wait on ffmpeg: {e}"), context())
            })?;
        let stderr_output = join_stderr(process.stderr.take());
        if !status.success() {
            return Err(ZoomreelError::encoder(
                format!("ffmpeg exited with {status}: {}", stderr_output.trim()),
                context(),
            ));
        }

        std::fs::rename(&process.partial, &self.output)?;
        self.scratch.keep(&process.partial);
        tracing::info!(
            output = %self.output.display(),
            frames = process.frames,
            "Encoder finalized"
        );
        Ok(ExportArtifact::from_file(&self.output))
    }

    fn abort(&mut self) {
        if let Some(mut process) = self.process.take() {
            drop(process.stdin.take());
            let _ = process.child.kill();
            let _ = process.child.wait();
            join_stderr(process.stderr.take());
            tracing::debug!(frames = process.frames, "Encoder aborted");
        }
        self.scratch.cleanup();
    }
}

impl Drop for FfmpegEncoderSink {
    fn drop(&mut self) {
        self.abort();
    }
}
