//! Affine transforms for the video layer.
//!
//! The layer transform is built by explicit matrix composition instead of a
//! mutable graphics-context stack, so the order of operations is a value
//! that can be inspected and tested.

use crate::coords::RectF;
use crate::zoom::ZoomSample;

/// 2D affine transform stored as the top two rows of a 3x3 matrix.
///
/// `apply` maps `(x, y)` to `(m[0][0]·x + m[0][1]·y + m[0][2],
/// m[1][0]·x + m[1][1]·y + m[1][2])`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [[f64; 3]; 2],
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty]],
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            m: [[sx, 0.0, 0.0], [0.0, sy, 0.0]],
        }
    }

    /// Uniform scale keeping `(px, py)` fixed.
    pub fn scale_about(s: f64, px: f64, py: f64) -> Self {
        Self::translate(px, py)
            .then_apply(&Self::scale(s, s))
            .then_apply(&Self::translate(-px, -py))
    }

    /// Matrix product `self · rhs`: the result applies `rhs` first, then
    /// `self`. Chaining `a.then_apply(b).then_apply(c)` reads like pushing
    /// operations onto a graphics context.
    pub fn then_apply(&self, rhs: &AffineTransform) -> AffineTransform {
        let a = &self.m;
        let b = &rhs.m;
        AffineTransform {
            m: [
                [
                    a[0][0] * b[0][0] + a[0][1] * b[1][0],
                    a[0][0] * b[0][1] + a[0][1] * b[1][1],
                    a[0][0] * b[0][2] + a[0][1] * b[1][2] + a[0][2],
                ],
                [
                    a[1][0] * b[0][0] + a[1][1] * b[1][0],
                    a[1][0] * b[0][1] + a[1][1] * b[1][1],
                    a[1][0] * b[0][2] + a[1][1] * b[1][2] + a[1][2],
                ],
            ],
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[0][0] * x + self.m[0][1] * y + self.m[0][2],
            self.m[1][0] * x + self.m[1][1] * y + self.m[1][2],
        )
    }

    /// Inverse transform, or `None` when the matrix is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let ia = d * inv_det;
        let ib = -b * inv_det;
        let ic = -c * inv_det;
        let id = a * inv_det;
        Some(AffineTransform {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }

    /// Horizontal scale factor (for axis-aligned transforms).
    pub fn scale_x(&self) -> f64 {
        self.m[0][0]
    }

    /// Map an axis-aligned rectangle; exact for scale/translate transforms.
    pub fn map_rect(&self, rect: &RectF) -> RectF {
        let (x0, y0) = self.apply(rect.x, rect.y);
        let (x1, y1) = self.apply(rect.right(), rect.bottom());
        RectF::new(x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Transform of the video layer inside `display`.
///
/// Order, each step relative to the untransformed display center `c`:
/// translate to `c` → crop centering offset → zoom about the zoom origin →
/// translate back by `-c`. `crop_offset` is in box-relative units where the
/// display box spans 2.0 (see `coords::centering_offset_for_crop`).
pub fn layer_transform(
    display: &RectF,
    crop_offset: (f64, f64),
    zoom: &ZoomSample,
) -> AffineTransform {
    let (cx, cy) = display.center();
    let offset_x = crop_offset.0 * display.w / 2.0;
    let offset_y = crop_offset.1 * display.h / 2.0;

    // Zoom origin relative to the display center.
    let origin_x = (zoom.origin_x - 0.5) * display.w;
    let origin_y = (zoom.origin_y - 0.5) * display.h;

    AffineTransform::translate(cx, cy)
        .then_apply(&AffineTransform::translate(offset_x, offset_y))
        .then_apply(&AffineTransform::scale_about(zoom.amount, origin_x, origin_y))
        .then_apply(&AffineTransform::translate(-cx, -cy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_composition_order() {
        // Scale first, then translate.
        let t = AffineTransform::translate(10.0, 0.0).then_apply(&AffineTransform::scale(2.0, 2.0));
        assert!(close(t.apply(1.0, 1.0), (12.0, 2.0)));

        // Translate first, then scale.
        let t = AffineTransform::scale(2.0, 2.0).then_apply(&AffineTransform::translate(10.0, 0.0));
        assert!(close(t.apply(1.0, 1.0), (22.0, 2.0)));
    }

    #[test]
    fn test_scale_about_keeps_pivot() {
        let t = AffineTransform::scale_about(3.0, 40.0, 25.0);
        assert!(close(t.apply(40.0, 25.0), (40.0, 25.0)));
        assert!(close(t.apply(41.0, 25.0), (43.0, 25.0)));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = AffineTransform::translate(5.0, -3.0)
            .then_apply(&AffineTransform::scale_about(1.7, 100.0, 50.0));
        let inv = t.inverse().unwrap();
        let p = t.apply(123.0, 77.0);
        assert!(close(inv.apply(p.0, p.1), (123.0, 77.0)));
        assert!(AffineTransform::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_identity_layer_transform() {
        let display = RectF::new(96.0, 54.0, 1728.0, 972.0);
        let t = layer_transform(&display, (0.0, 0.0), &ZoomSample::IDENTITY);
        assert!(close(t.apply(96.0, 54.0), (96.0, 54.0)));
        assert!(close(t.apply(1000.0, 700.0), (1000.0, 700.0)));
    }

    #[test]
    fn test_layer_offset_moves_half_crop_to_center() {
        let display = RectF::new(0.0, 0.0, 1000.0, 500.0);
        // Crop keeping the left half: its center sits at x=250.
        let t = layer_transform(&display, (0.5, 0.0), &ZoomSample::IDENTITY);
        assert!(close(t.apply(250.0, 250.0), (500.0, 250.0)));
    }

    #[test]
    fn test_layer_zoom_keeps_origin_fixed() {
        let display = RectF::new(0.0, 0.0, 800.0, 800.0);
        let zoom = ZoomSample {
            amount: 2.0,
            origin_x: 0.25,
            origin_y: 0.75,
        };
        let t = layer_transform(&display, (0.0, 0.0), &zoom);
        assert!(close(t.apply(200.0, 600.0), (200.0, 600.0)));
        assert!(close(t.apply(400.0, 400.0), (600.0, 200.0)));
    }

    #[test]
    fn test_offset_shifts_zoom_pivot() {
        let display = RectF::new(0.0, 0.0, 1000.0, 1000.0);
        let zoom = ZoomSample {
            amount: 2.0,
            origin_x: 0.5,
            origin_y: 0.5,
        };
        let t = layer_transform(&display, (0.2, 0.0), &zoom);
        assert!(close(t.apply(500.0, 500.0), (600.0, 500.0)));
    }
}
