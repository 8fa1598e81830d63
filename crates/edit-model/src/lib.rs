//! Zoomreel Edit Model
//!
//! Defines the data contract between the editor and the export core:
//! - **EditModel:** trim window, crop, padding, corner radius, background,
//!   quality, output size, and the ordered zoom-effect list
//! - **ZoomEffect:** a time-windowed zoom toward an 8x8 grid target
//! - **EditDocument:** the on-disk JSON wrapper around an edit model
//!
//! Crop and padding are expressed in percent of the source frame / canvas so
//! an edit survives changes of source or output resolution. An `EditModel`
//! is immutable for the duration of a render pass.

pub mod document;
pub mod model;
pub mod zoom;

pub use document::*;
pub use model::*;
pub use zoom::*;
