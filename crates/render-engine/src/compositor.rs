//! Frame compositor: background, cropped video layer, corner clip, zoom.
//!
//! One output frame is produced in a fixed order:
//!
//! 1. Fill the canvas with the background (solid color or fitted image)
//! 2. Compute the display rect (canvas shrunk by the padding, centered)
//! 3. Clip to a rounded rectangle over the display rect
//! 4. Compose the layer transform (crop centering offset, then zoom)
//! 5. Blit the cropped source region through the transform in one
//!    bilinear pass
//! 6. Alpha-blend the result onto the background
//!
//! The background layer does not change between frames, so it is rendered
//! once per export and cloned for each frame.

use image::{Rgba, RgbaImage};
use zoomreel_edit_model::{Background, BackgroundFit, EditModel};
use zoomreel_processing_core::coords::{
    centering_offset_for_crop, crop_to_pixels, display_rect, fit_rect,
};
use zoomreel_processing_core::{layer_transform, sample_zoom, AffineTransform, RectF, ZoomSample};

/// Corner radii are authored against this reference extent.
pub const CORNER_RADIUS_REFERENCE_PX: f64 = 1080.0;

/// One composited output frame.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    /// Zero-based output frame index.
    pub frame_index: u64,
    /// Source timestamp the frame was rendered for.
    pub time_secs: f64,
    /// Zoom state at `time_secs`.
    pub zoom: ZoomSample,
    /// Layer transform used for the video.
    pub transform: AffineTransform,
    /// The composited canvas.
    pub image: RgbaImage,
    /// No source pixels were available; the canvas shows only background.
    pub background_only: bool,
}

/// Renders output frames for one export. Holds no state that changes
/// between frames, so it is never shared across sessions.
#[derive(Debug, Clone)]
pub struct FrameCompositor {
    model: EditModel,
    background: RgbaImage,
    display: RectF,
    corner_radius: f64,
    crop_offset: (f64, f64),
}

impl FrameCompositor {
    /// Build a compositor for `model`.
    ///
    /// `background_image` is the decoded image for an image background; when
    /// missing, the canvas falls back to black.
    pub fn new(model: &EditModel, background_image: Option<&RgbaImage>) -> Self {
        let model = model.sanitized();
        let width = model.output_size.width.max(1);
        let height = model.output_size.height.max(1);
        let display = display_rect(width, height, model.padding);
        let corner_radius = effective_corner_radius(model.corner_radius_px, &display);
        let crop_offset = centering_offset_for_crop(&model.crop);
        let background = render_background(&model.background, background_image, width, height);

        Self {
            model,
            background,
            display,
            corner_radius,
            crop_offset,
        }
    }

    pub fn model(&self) -> &EditModel {
        &self.model
    }

    /// The background-only canvas.
    pub fn background(&self) -> &RgbaImage {
        &self.background
    }

    pub fn display_rect(&self) -> RectF {
        self.display
    }

    /// Corner radius in canvas pixels after scaling.
    pub fn corner_radius(&self) -> f64 {
        self.corner_radius
    }

    /// Zoom and layer transform at source time `time_secs`.
    pub fn transform_at(&self, time_secs: f64) -> (ZoomSample, AffineTransform) {
        let zoom = sample_zoom(&self.model.zoom_effects, time_secs);
        let transform = layer_transform(&self.display, self.crop_offset, &zoom);
        (zoom, transform)
    }

    /// Render the frame at source time `time_secs`.
    ///
    /// With `source == None` the result is a background-only frame.
    pub fn render_frame(
        &self,
        source: Option<&RgbaImage>,
        time_secs: f64,
        frame_index: u64,
    ) -> RenderFrame {
        let (zoom, transform) = self.transform_at(time_secs);
        let mut image = self.background.clone();
        let mut background_only = true;

        if let Some(frame) = source {
            if frame.width() > 0 && frame.height() > 0 {
                self.draw_video_layer(&mut image, frame, &transform);
                background_only = false;
            }
        }

        RenderFrame {
            frame_index,
            time_secs,
            zoom,
            transform,
            image,
            background_only,
        }
    }

    fn draw_video_layer(
        &self,
        canvas: &mut RgbaImage,
        frame: &RgbaImage,
        transform: &AffineTransform,
    ) {
        let (src_w, src_h) = frame.dimensions();
        let Some(inverse) = transform.inverse() else {
            tracing::debug!("Singular layer transform, skipping video layer");
            return;
        };

        // Untransformed placement: the whole source fitted into the display
        // rect, and the crop region at its position inside that fit.
        let video = fit_rect(src_w as f64, src_h as f64, &self.display, BackgroundFit::Contain);
        let crop = crop_to_pixels(&self.model.crop, src_w, src_h);
        let scale_x = video.w / src_w as f64;
        let scale_y = video.h / src_h as f64;
        let dest = RectF::new(
            video.x + crop.x as f64 * scale_x,
            video.y + crop.y as f64 * scale_y,
            crop.width as f64 * scale_x,
            crop.height as f64 * scale_y,
        );
        if dest.w <= 0.0 || dest.h <= 0.0 {
            return;
        }

        let placed = transform.map_rect(&dest);
        let (canvas_w, canvas_h) = canvas.dimensions();
        let x0 = placed.x.max(self.display.x).floor().max(0.0) as u32;
        let y0 = placed.y.max(self.display.y).floor().max(0.0) as u32;
        let x1 = (placed.right().min(self.display.right()).ceil().max(0.0) as u32).min(canvas_w);
        let y1 = (placed.bottom().min(self.display.bottom()).ceil().max(0.0) as u32).min(canvas_h);

        let crop_left = crop.x as f64;
        let crop_top = crop.y as f64;
        let crop_right = crop.right() as f64;
        let crop_bottom = crop.bottom() as f64;

        for py in y0..y1 {
            let cy = py as f64 + 0.5;
            for px in x0..x1 {
                let cx = px as f64 + 0.5;
                let clip = rounded_rect_coverage(cx, cy, &self.display, self.corner_radius);
                if clip <= 0.0 {
                    continue;
                }
                let (lx, ly) = inverse.apply(cx, cy);
                if !dest.contains(lx, ly) {
                    continue;
                }
                let sx = (crop_left + (lx - dest.x) / scale_x).clamp(crop_left, crop_right);
                let sy = (crop_top + (ly - dest.y) / scale_y).clamp(crop_top, crop_bottom);
                let rgba = sample_bilinear(frame, sx, sy, &crop);
                blend_over(canvas.get_pixel_mut(px, py), rgba, clip);
            }
        }
    }
}

/// Scale an authored corner radius to the display rect and cap it at half
/// the shorter side.
pub fn effective_corner_radius(radius_px: f64, display: &RectF) -> f64 {
    if !radius_px.is_finite() || radius_px <= 0.0 {
        return 0.0;
    }
    let min_side = display.w.min(display.h).max(0.0);
    (radius_px * min_side / CORNER_RADIUS_REFERENCE_PX).min(min_side / 2.0)
}

/// Coverage of pixel center `(px, py)` by a rounded rectangle, with a
/// one-pixel anti-aliased edge.
pub fn rounded_rect_coverage(px: f64, py: f64, rect: &RectF, radius: f64) -> f64 {
    let (cx, cy) = rect.center();
    let qx = (px - cx).abs() - rect.w / 2.0 + radius;
    let qy = (py - cy).abs() - rect.h / 2.0 + radius;
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    let inside = qx.max(qy).min(0.0);
    let distance = outside + inside - radius;
    (0.5 - distance).clamp(0.0, 1.0)
}

/// Opaque RGB for a background hex color. Translucent colors are flattened
/// onto black; unparsable ones become black.
pub fn flattened_color(hex: &str) -> [u8; 3] {
    let [r, g, b, a] = Background::parse_hex(hex).unwrap_or([0, 0, 0, 255]);
    let flatten = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
    [flatten(r), flatten(g), flatten(b)]
}

fn render_background(
    background: &Background,
    image: Option<&RgbaImage>,
    width: u32,
    height: u32,
) -> RgbaImage {
    match background {
        Background::Color { hex } => {
            let [r, g, b] = flattened_color(hex);
            RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]))
        }
        Background::Image { source, fit } => {
            let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
            let Some(img) = image.filter(|img| img.width() > 0 && img.height() > 0) else {
                tracing::warn!(
                    source = %source.display(),
                    "Background image not loaded, using black"
                );
                return canvas;
            };
            draw_fitted_image(&mut canvas, img, *fit);
            canvas
        }
    }
}

fn draw_fitted_image(canvas: &mut RgbaImage, img: &RgbaImage, fit: BackgroundFit) {
    let (canvas_w, canvas_h) = canvas.dimensions();
    let (img_w, img_h) = img.dimensions();
    let target = RectF::new(0.0, 0.0, canvas_w as f64, canvas_h as f64);
    let placed = fit_rect(img_w as f64, img_h as f64, &target, fit);
    let full = zoomreel_processing_core::PixelRect::new(0, 0, img_w, img_h);

    let x0 = placed.x.max(0.0).floor() as u32;
    let y0 = placed.y.max(0.0).floor() as u32;
    let x1 = (placed.right().ceil().max(0.0) as u32).min(canvas_w);
    let y1 = (placed.bottom().ceil().max(0.0) as u32).min(canvas_h);

    for py in y0..y1 {
        let cy = py as f64 + 0.5;
        for px in x0..x1 {
            let cx = px as f64 + 0.5;
            if !placed.contains(cx, cy) {
                continue;
            }
            let sx = (cx - placed.x) / placed.w * img_w as f64;
            let sy = (cy - placed.y) / placed.h * img_h as f64;
            let rgba = sample_bilinear(img, sx, sy, &full);
            blend_over(canvas.get_pixel_mut(px, py), rgba, 1.0);
        }
    }
}

/// Bilinear sample at continuous pixel coordinates (pixel centers at
/// `i + 0.5`), never reading outside `bounds`.
fn sample_bilinear(
    img: &RgbaImage,
    x: f64,
    y: f64,
    bounds: &zoomreel_processing_core::PixelRect,
) -> [f64; 4] {
    let min_x = bounds.x as f64;
    let min_y = bounds.y as f64;
    let max_x = (bounds.right().saturating_sub(1)).max(bounds.x) as f64;
    let max_y = (bounds.bottom().saturating_sub(1)).max(bounds.y) as f64;

    let u = (x - 0.5).clamp(min_x, max_x);
    let v = (y - 0.5).clamp(min_y, max_y);
    let ix = u.floor();
    let iy = v.floor();
    let fx = u - ix;
    let fy = v - iy;
    let ix0 = ix as u32;
    let iy0 = iy as u32;
    let ix1 = ((ix + 1.0).min(max_x)) as u32;
    let iy1 = ((iy + 1.0).min(max_y)) as u32;

    let p00 = img.get_pixel(ix0, iy0).0;
    let p10 = img.get_pixel(ix1, iy0).0;
    let p01 = img.get_pixel(ix0, iy1).0;
    let p11 = img.get_pixel(ix1, iy1).0;

    let mut out = [0.0; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    out
}

/// Source-over blend of `src` (straight alpha, 0..255 floats) scaled by
/// `coverage` onto an opaque destination pixel.
fn blend_over(dst: &mut Rgba<u8>, src: [f64; 4], coverage: f64) {
    let alpha = (src[3] / 255.0 * coverage).clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    for c in 0..3 {
        let blended = src[c] * alpha + dst.0[c] as f64 * (1.0 - alpha);
        dst.0[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = 255;
}
