//! Edit model: everything an export needs to know about the user's edits.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zoomreel_common::error::ZoomreelError;

use crate::zoom::ZoomEffect;

/// Slack allowed when comparing percent sums and trim bounds, to tolerate
/// values that went through float formatting in the editor.
const BOUNDS_EPSILON: f64 = 1e-6;

/// The immutable-per-render description of an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditModel {
    /// Trim window start on the source timeline (seconds).
    pub trim_start: f64,

    /// Trim window end on the source timeline (seconds).
    pub trim_end: f64,

    /// Crop rectangle in percent of the source frame.
    #[serde(default)]
    pub crop: CropRect,

    /// Padding in percent `[0, 100)`; the video occupies `100 - padding`
    /// percent of the canvas, centered.
    #[serde(default)]
    pub padding: f64,

    /// Corner radius in editor pixels.
    #[serde(default)]
    pub corner_radius_px: f64,

    /// Canvas background.
    #[serde(default)]
    pub background: Background,

    /// Ordered zoom effects. List order is the priority order when windows
    /// overlap.
    #[serde(default)]
    pub zoom_effects: Vec<ZoomEffect>,

    /// Encoder quality preset.
    #[serde(default)]
    pub quality: Quality,

    /// Target resolution and frame rate.
    #[serde(default)]
    pub output_size: OutputSize,
}

/// Crop rectangle in percent of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    /// Full-frame crop (no cropping).
    pub const FULL: CropRect = CropRect {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether this crop keeps the whole frame.
    pub fn is_full(&self) -> bool {
        self.x.abs() < BOUNDS_EPSILON
            && self.y.abs() < BOUNDS_EPSILON
            && (self.width - 100.0).abs() < BOUNDS_EPSILON
            && (self.height - 100.0).abs() < BOUNDS_EPSILON
    }

    /// Center of the crop in percent.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    fn validate(&self) -> Result<(), EditModelError> {
        let values = [self.x, self.y, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EditModelError::invalid("crop", "contains a non-finite value"));
        }
        if self.x < 0.0 || self.y < 0.0 {
            return Err(EditModelError::invalid(
                "crop",
                format!("origin ({}, {}) must be non-negative", self.x, self.y),
            ));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(EditModelError::invalid(
                "crop",
                format!("size {}x{} must be positive", self.width, self.height),
            ));
        }
        if self.x + self.width > 100.0 + BOUNDS_EPSILON {
            return Err(EditModelError::invalid(
                "crop",
                format!("x + width = {} exceeds 100%", self.x + self.width),
            ));
        }
        if self.y + self.height > 100.0 + BOUNDS_EPSILON {
            return Err(EditModelError::invalid(
                "crop",
                format!("y + height = {} exceeds 100%", self.y + self.height),
            ));
        }
        Ok(())
    }
}

impl Default for CropRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// How a background image is fitted onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundFit {
    /// Scale to cover the canvas, then center-crop.
    #[default]
    Cover,
    /// Scale to fit inside the canvas, then letterbox.
    Contain,
    /// Stretch non-uniformly to the canvas.
    Fill,
}

impl BackgroundFit {
    pub fn as_str(self) -> &'static str {
        match self {
            BackgroundFit::Cover => "cover",
            BackgroundFit::Contain => "contain",
            BackgroundFit::Fill => "fill",
        }
    }
}

/// Canvas background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Background {
    /// Solid color as a hex string (`#rgb`, `#rrggbb`, or `#rrggbbaa`).
    Color { hex: String },
    /// Image file scaled onto the canvas.
    Image {
        source: PathBuf,
        #[serde(default)]
        fit: BackgroundFit,
    },
}

impl Default for Background {
    fn default() -> Self {
        Background::Color {
            hex: "#000000".to_string(),
        }
    }
}

impl Background {
    pub fn color(hex: impl Into<String>) -> Self {
        Background::Color { hex: hex.into() }
    }

    pub fn image(source: impl Into<PathBuf>, fit: BackgroundFit) -> Self {
        Background::Image {
            source: source.into(),
            fit,
        }
    }

    /// Parse a `#rgb`, `#rrggbb`, or `#rrggbbaa` color into RGBA bytes.
    pub fn parse_hex(hex: &str) -> Option<[u8; 4]> {
        let digits = hex.trim().trim_start_matches('#');
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            3 => {
                let mut out = [255u8; 4];
                for (i, c) in digits.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some(out)
            }
            6 => Some([
                byte(digits.get(0..2)?)?,
                byte(digits.get(2..4)?)?,
                byte(digits.get(4..6)?)?,
                255,
            ]),
            8 => Some([
                byte(digits.get(0..2)?)?,
                byte(digits.get(2..4)?)?,
                byte(digits.get(4..6)?)?,
                byte(digits.get(6..8)?)?,
            ]),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), EditModelError> {
        match self {
            Background::Color { hex } => {
                if Self::parse_hex(hex).is_none() {
                    return Err(EditModelError::invalid(
                        "background",
                        format!("'{hex}' is not a hex color"),
                    ));
                }
            }
            Background::Image { source, .. } => {
                if source.as_os_str().is_empty() {
                    return Err(EditModelError::invalid(
                        "background",
                        "image source path is empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Encoder quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

/// Concrete encoder settings behind a [`Quality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    /// Constant rate factor for x264.
    pub crf: u8,
    /// x264 speed preset.
    pub encoder_preset: &'static str,
    /// Bitrate ceiling in kbps for bitrate-driven encoders.
    pub max_bitrate_kbps: u32,
}

impl Quality {
    pub fn preset(self) -> QualityPreset {
        match self {
            Quality::Low => QualityPreset {
                crf: 28,
                encoder_preset: "veryfast",
                max_bitrate_kbps: 4_000,
            },
            Quality::Medium => QualityPreset {
                crf: 23,
                encoder_preset: "medium",
                max_bitrate_kbps: 8_000,
            },
            Quality::High => QualityPreset {
                crf: 18,
                encoder_preset: "slow",
                max_bitrate_kbps: 16_000,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl FromStr for Quality {
    type Err = EditModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" | "med" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(EditModelError::invalid(
                "quality",
                format!("unknown preset '{other}' (use low, medium, high)"),
            )),
        }
    }
}

/// Target resolution and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl OutputSize {
    pub const HD_1080: OutputSize = OutputSize {
        width: 1920,
        height: 1080,
        fps: 30,
    };

    pub const QHD_1440: OutputSize = OutputSize {
        width: 2560,
        height: 1440,
        fps: 30,
    };

    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    fn validate(&self) -> Result<(), EditModelError> {
        if self.width == 0 || self.height == 0 {
            return Err(EditModelError::invalid(
                "outputSize",
                format!("{}x{} has a zero dimension", self.width, self.height),
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(EditModelError::invalid(
                "outputSize",
                format!("{}x{} must have even dimensions", self.width, self.height),
            ));
        }
        if !(1..=240).contains(&self.fps) {
            return Err(EditModelError::invalid(
                "outputSize",
                format!("fps {} outside 1..=240", self.fps),
            ));
        }
        Ok(())
    }
}

impl Default for OutputSize {
    fn default() -> Self {
        Self::HD_1080
    }
}

impl EditModel {
    /// An edit that exports the whole source unchanged.
    pub fn new(source_duration_secs: f64) -> Self {
        Self {
            trim_start: 0.0,
            trim_end: source_duration_secs,
            crop: CropRect::FULL,
            padding: 0.0,
            corner_radius_px: 0.0,
            background: Background::default(),
            zoom_effects: vec![],
            quality: Quality::Medium,
            output_size: OutputSize::HD_1080,
        }
    }

    /// Length of the trim window in seconds.
    pub fn trimmed_duration(&self) -> f64 {
        (self.trim_end - self.trim_start).max(0.0)
    }

    /// Number of output frames for the trim window at the output frame rate.
    pub fn total_frames(&self) -> u64 {
        (self.trimmed_duration() * self.output_size.fps as f64).round() as u64
    }

    /// Check every invariant of the model.
    ///
    /// `source_duration_secs` bounds the trim window when known.
    pub fn validate(&self, source_duration_secs: Option<f64>) -> Result<(), EditModelError> {
        if !self.trim_start.is_finite() || !self.trim_end.is_finite() {
            return Err(EditModelError::invalid("trim", "contains a non-finite value"));
        }
        if self.trim_start < 0.0 {
            return Err(EditModelError::invalid(
                "trimStart",
                format!("{} is negative", self.trim_start),
            ));
        }
        if self.trim_end <= self.trim_start {
            return Err(EditModelError::invalid(
                "trimEnd",
                format!(
                    "{} must be greater than trimStart {}",
                    self.trim_end, self.trim_start
                ),
            ));
        }
        if let Some(duration) = source_duration_secs {
            if self.trim_end > duration + BOUNDS_EPSILON {
                return Err(EditModelError::invalid(
                    "trimEnd",
                    format!("{} exceeds source duration {duration}", self.trim_end),
                ));
            }
        }

        self.crop.validate()?;

        if !self.padding.is_finite() || !(0.0..100.0).contains(&self.padding) {
            return Err(EditModelError::invalid(
                "padding",
                format!("{} outside [0, 100)", self.padding),
            ));
        }
        if !self.corner_radius_px.is_finite() || self.corner_radius_px < 0.0 {
            return Err(EditModelError::invalid(
                "cornerRadiusPx",
                format!("{} must be a non-negative number", self.corner_radius_px),
            ));
        }

        self.background.validate()?;
        self.output_size.validate()?;

        for effect in &self.zoom_effects {
            effect.validate()?;
        }

        Ok(())
    }

    /// Render-ready copy with every zoom effect normalized.
    pub fn sanitized(&self) -> EditModel {
        let mut model = self.clone();
        model.zoom_effects = self.zoom_effects.iter().map(ZoomEffect::normalized).collect();
        model
    }
}

/// Errors raised by the edit model.
#[derive(Debug, thiserror::Error)]
pub enum EditModelError {
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<EditModelError> for ZoomreelError {
    fn from(err: EditModelError) -> Self {
        match err {
            EditModelError::Invalid { .. } => ZoomreelError::invalid_edit_model(err.to_string()),
            EditModelError::Io { source, .. } => ZoomreelError::Io(source),
            EditModelError::Parse { source, .. } => ZoomreelError::Json(source),
        }
    }
}

impl EditModelError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
