//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ZoomreelError, ZoomreelResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default export settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which rendering backend drives an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExportBackend {
    /// Render every frame in-process and stream it to an encoder.
    #[default]
    Frames,
    /// Compile a filter graph and hand it to the external codec engine.
    FilterGraph,
}

impl ExportBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportBackend::Frames => "frames",
            ExportBackend::FilterGraph => "filter-graph",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "frames" | "frame" | "compositor" => Some(ExportBackend::Frames),
            "filter-graph" | "filter_graph" | "filtergraph" | "ffmpeg" => {
                Some(ExportBackend::FilterGraph)
            }
            _ => None,
        }
    }
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Default output width in pixels.
    pub width: u32,

    /// Default output height in pixels.
    pub height: u32,

    /// Default output frame rate.
    pub fps: u32,

    /// Default quality preset name (`low`, `medium`, `high`).
    pub quality: String,

    /// Default backend.
    pub backend: ExportBackend,

    /// Minimum wall-clock interval between progress reports.
    pub progress_interval_ms: u64,

    /// Report progress at least every N frames.
    pub progress_every_frames: u64,

    /// Extra seek attempts per frame before the frame counts as a miss.
    pub seek_retries: u32,

    /// Frames decoded ahead of the compositor (0 disables decode-ahead).
    pub prefetch_depth: usize,

    /// ffmpeg executable name or path.
    pub ffmpeg_binary: String,

    /// ffprobe executable name or path.
    pub ffprobe_binary: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "zoomreel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            quality: "medium".to_string(),
            backend: ExportBackend::Frames,
            progress_interval_ms: 250,
            progress_every_frames: 15,
            seek_retries: 2,
            prefetch_depth: 4,
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
        }
    }
}

impl ExportDefaults {
    /// Reject defaults no export could run with.
    pub fn validate(&self) -> ZoomreelResult<()> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ZoomreelError::config(format!(
                "export size must be even and non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=240).contains(&self.fps) {
            return Err(ZoomreelError::config(format!(
                "export fps must be in 1..=240, got {}",
                self.fps
            )));
        }
        if !["low", "medium", "high"]
            .iter()
            .any(|q| q.eq_ignore_ascii_case(self.quality.trim()))
        {
            return Err(ZoomreelError::config(format!(
                "unknown export quality: {}",
                self.quality
            )));
        }
        if self.ffmpeg_binary.trim().is_empty() || self.ffprobe_binary.trim().is_empty() {
            return Err(ZoomreelError::config("ffmpeg and ffprobe binaries must be set"));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("zoomreel").join("config.json")
}
