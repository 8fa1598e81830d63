//! Error types shared across Zoomreel crates.

use std::fmt;
use std::path::PathBuf;

/// Where in the export timeline a failure happened.
///
/// Rendered as e.g. `during rendering at 40.000s (frame 1200 of 1800)` so a
/// failure report points at a concrete position instead of a bare message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    /// Pipeline stage (`initializing`, `rendering`, `finalizing`, ...).
    pub stage: String,
    /// Source timestamp in seconds, when known.
    pub time_secs: Option<f64>,
    /// Zero-based frame index, when known.
    pub frame: Option<u64>,
    /// Total frames in the export, when known.
    pub total_frames: Option<u64>,
}

impl ErrorContext {
    pub fn stage(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }

    pub fn at_time(mut self, time_secs: f64) -> Self {
        self.time_secs = Some(time_secs);
        self
    }

    pub fn at_frame(mut self, frame: u64, total_frames: u64) -> Self {
        self.frame = Some(frame);
        self.total_frames = Some(total_frames);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "during {}", self.stage)?;
        if let Some(t) = self.time_secs {
            write!(f, " at {t:.3}s")?;
        }
        match (self.frame, self.total_frames) {
            (Some(frame), Some(total)) => write!(f, " (frame {frame} of {total})"),
            (Some(frame), None) => write!(f, " (frame {frame})"),
            _ => Ok(()),
        }
    }
}

/// Top-level error type for Zoomreel operations.
#[derive(Debug, thiserror::Error)]
pub enum ZoomreelError {
    /// Bad trim/crop/effect bounds; raised before any decode happens.
    #[error("Invalid edit model: {message}")]
    InvalidEditModel { message: String },

    #[error("Source unreadable {context}: {message}")]
    SourceUnreadable {
        message: String,
        context: ErrorContext,
    },

    #[error("Encoder failure {context}: {message}")]
    EncoderFailure {
        message: String,
        context: ErrorContext,
    },

    /// The external filter/codec engine could not be used.
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ZoomreelError.
pub type ZoomreelResult<T> = Result<T, ZoomreelError>;

impl ZoomreelError {
    pub fn invalid_edit_model(msg: impl Into<String>) -> Self {
        Self::InvalidEditModel {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>, context: ErrorContext) -> Self {
        Self::SourceUnreadable {
            message: msg.into(),
            context,
        }
    }

    pub fn encoder(msg: impl Into<String>, context: ErrorContext) -> Self {
        Self::EncoderFailure {
            message: msg.into(),
            context,
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Attach or replace the timeline context of a source/encoder failure.
    pub fn with_context(self, context: ErrorContext) -> Self {
        match self {
            Self::SourceUnreadable { message, .. } => Self::SourceUnreadable { message, context },
            Self::EncoderFailure { message, .. } => Self::EncoderFailure { message, context },
            other => other,
        }
    }

    /// Short machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEditModel { .. } => "invalid_edit_model",
            Self::SourceUnreadable { .. } => "source_unreadable",
            Self::EncoderFailure { .. } => "encoder_failure",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::Config { .. } => "config",
            Self::FileNotFound { .. } => "file_not_found",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}
