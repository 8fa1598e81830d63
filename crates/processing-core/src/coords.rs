//! Coordinate mapping between editor space and pixel space.
//!
//! The editor stores crops and padding in percent and zoom targets as cells
//! of an 8x8 grid. Rendering needs pixel rectangles and normalized points
//! for a concrete frame size.

use serde::{Deserialize, Serialize};
use zoomreel_edit_model::{BackgroundFit, CropRect, GRID_SIZE};

/// Lower bound for a zoom origin coordinate.
pub const ZOOM_ORIGIN_MIN: f64 = 0.10;

/// Upper bound for a zoom origin coordinate.
pub const ZOOM_ORIGIN_MAX: f64 = 0.90;

/// Integer pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Floating-point rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl RectF {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle of size `w`x`h` centered inside `outer`.
    pub fn centered_in(outer: &RectF, w: f64, h: f64) -> Self {
        Self {
            x: outer.x + (outer.w - w) / 2.0,
            y: outer.y + (outer.h - h) / 2.0,
            w,
            h,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

/// Convert a percent crop into integer source pixels.
///
/// The result is clamped to the source bounds instead of failing so that
/// rounding at the frame edge never produces an out-of-range rectangle.
pub fn crop_to_pixels(crop: &CropRect, source_w: u32, source_h: u32) -> PixelRect {
    if source_w == 0 || source_h == 0 {
        return PixelRect::new(0, 0, 0, 0);
    }
    let (x, width) = axis_to_pixels(crop.x, crop.width, source_w);
    let (y, height) = axis_to_pixels(crop.y, crop.height, source_h);
    PixelRect::new(x, y, width, height)
}

fn axis_to_pixels(offset_pct: f64, size_pct: f64, extent: u32) -> (u32, u32) {
    let extent_f = extent as f64;
    let start = (offset_pct / 100.0 * extent_f).round();
    let start = if start.is_finite() { start } else { 0.0 };
    let start = start.clamp(0.0, (extent - 1) as f64) as u32;

    let size = (size_pct / 100.0 * extent_f).round();
    let size = if size.is_finite() { size } else { extent_f };
    let size = size.clamp(1.0, (extent - start) as f64) as u32;
    (start, size)
}

/// Center of grid cell `(target_x, target_y)` in normalized frame space,
/// without clamping.
pub fn grid_cell_center(target_x: u8, target_y: u8) -> (f64, f64) {
    let cells = GRID_SIZE as f64;
    let gx = target_x.min(GRID_SIZE - 1) as f64;
    let gy = target_y.min(GRID_SIZE - 1) as f64;
    ((gx + 0.5) / cells, (gy + 0.5) / cells)
}

/// Map a grid target to the normalized zoom origin.
///
/// Each coordinate is clamped to `[0.10, 0.90]`: an origin on the very edge
/// of the frame pushes zoomed content off the canvas.
pub fn zoom_target_to_normalized(target_x: u8, target_y: u8) -> (f64, f64) {
    let (nx, ny) = grid_cell_center(target_x, target_y);
    (
        nx.clamp(ZOOM_ORIGIN_MIN, ZOOM_ORIGIN_MAX),
        ny.clamp(ZOOM_ORIGIN_MIN, ZOOM_ORIGIN_MAX),
    )
}

/// Offset that re-centers a cropped region inside the display box.
///
/// Units are box-relative with the box spanning 2.0 on each axis, so the
/// pixel shift is `dx * box_width / 2`. A crop keeping only the right half
/// yields a negative `dx` (content moves left); keeping the left half moves
/// content right.
pub fn centering_offset_for_crop(crop: &CropRect) -> (f64, f64) {
    let (cx, cy) = crop.center();
    ((50.0 - cx) * 2.0 / 100.0, (50.0 - cy) * 2.0 / 100.0)
}

/// Display rectangle: the canvas scaled by `(100 - padding) / 100`, centered.
pub fn display_rect(canvas_w: u32, canvas_h: u32, padding_pct: f64) -> RectF {
    let scale = ((100.0 - padding_pct) / 100.0).clamp(0.0, 1.0);
    let canvas = RectF::new(0.0, 0.0, canvas_w as f64, canvas_h as f64);
    RectF::centered_in(&canvas, canvas.w * scale, canvas.h * scale)
}

/// Place content of `content_w`x`content_h` into `target` according to `fit`.
///
/// `Cover` may return a rectangle larger than `target` (the overflow is
/// cropped by the caller), `Contain` a smaller one, `Fill` exactly `target`.
pub fn fit_rect(content_w: f64, content_h: f64, target: &RectF, fit: BackgroundFit) -> RectF {
    if content_w <= 0.0 || content_h <= 0.0 {
        return *target;
    }
    match fit {
        BackgroundFit::Fill => *target,
        BackgroundFit::Cover => {
            let scale = (target.w / content_w).max(target.h / content_h);
            RectF::centered_in(target, content_w * scale, content_h * scale)
        }
        BackgroundFit::Contain => {
            let scale = (target.w / content_w).min(target.h / content_h);
            RectF::centered_in(target, content_w * scale, content_h * scale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_crop_is_identity_rect() {
        let rect = crop_to_pixels(&CropRect::FULL, 1920, 1080);
        assert_eq!(rect, PixelRect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn test_crop_rounds_and_clamps() {
        let rect = crop_to_pixels(&CropRect::new(50.0, 25.0, 50.0, 50.0), 1920, 1080);
        assert_eq!(rect, PixelRect::new(960, 270, 960, 540));

        // Slight overshoot from float formatting is clamped, not rejected.
        let rect = crop_to_pixels(&CropRect::new(33.34, 0.0, 66.67, 100.0), 101, 10);
        assert!(rect.right() <= 101);
        assert_eq!(rect.height, 10);
    }

    #[test]
    fn test_crop_on_empty_source() {
        assert_eq!(
            crop_to_pixels(&CropRect::FULL, 0, 1080),
            PixelRect::new(0, 0, 0, 0)
        );
    }

    #[test]
    fn test_grid_target_mapping() {
        let (nx, ny) = zoom_target_to_normalized(3, 4);
        assert!((nx - 0.4375).abs() < 1e-12);
        assert!((ny - 0.5625).abs() < 1e-12);
    }

    #[test]
    fn test_grid_target_edges_are_clamped() {
        assert_eq!(zoom_target_to_normalized(0, 7), (0.10, 0.90));
        assert_eq!(grid_cell_center(0, 7), (0.0625, 0.9375));
        // Out-of-grid values behave like the last cell.
        assert_eq!(zoom_target_to_normalized(200, 8), (0.90, 0.90));
    }

    #[test]
    fn test_centering_offset() {
        assert_eq!(centering_offset_for_crop(&CropRect::FULL), (0.0, 0.0));

        // Keeping the right half shifts content left by half a box width.
        let (dx, dy) = centering_offset_for_crop(&CropRect::new(50.0, 0.0, 50.0, 100.0));
        assert!((dx + 0.5).abs() < 1e-12);
        assert_eq!(dy, 0.0);

        let (dx, _) = centering_offset_for_crop(&CropRect::new(0.0, 0.0, 50.0, 100.0));
        assert!((dx - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_display_rect_padding() {
        let rect = display_rect(1920, 1080, 10.0);
        assert!((rect.w - 1728.0).abs() < 1e-9);
        assert!((rect.h - 972.0).abs() < 1e-9);
        assert!((rect.x - 96.0).abs() < 1e-9);
        assert!((rect.y - 54.0).abs() < 1e-9);
        assert_eq!(display_rect(1920, 1080, 0.0), RectF::new(0.0, 0.0, 1920.0, 1080.0));
    }

    #[test]
    fn test_fit_modes() {
        let target = RectF::new(0.0, 0.0, 1920.0, 1080.0);
        // Square content
        let cover = fit_rect(100.0, 100.0, &target, BackgroundFit::Cover);
        assert!((cover.w - 1920.0).abs() < 1e-9);
        assert!((cover.h - 1920.0).abs() < 1e-9);
        assert!((cover.y + 420.0).abs() < 1e-9);

        let contain = fit_rect(100.0, 100.0, &target, BackgroundFit::Contain);
        assert!((contain.w - 1080.0).abs() < 1e-9);
        assert!((contain.x - 420.0).abs() < 1e-9);

        assert_eq!(fit_rect(100.0, 100.0, &target, BackgroundFit::Fill), target);
    }
}
