//! Zoomreel Processing Core
//!
//! The math behind every exported frame:
//! - **Coordinates:** percent crops and grid targets to pixel/normalized space
//! - **Easing:** the closed-form cubic used for zoom transitions
//! - **Zoom:** per-effect enter/hold/exit envelopes and active-effect lookup
//! - **Transform:** affine composition of the video layer
//!
//! This crate is pure computation with no I/O and no platform dependencies.
//! All inputs are data; all outputs are data.

pub mod coords;
pub mod easing;
pub mod transform;
pub mod zoom;

pub use coords::{PixelRect, RectF};
pub use easing::{ease, progress};
pub use transform::{layer_transform, AffineTransform};
pub use zoom::{active_effect, sample_zoom, zoom_at_time, ZoomEnvelope, ZoomPhase, ZoomSample};
