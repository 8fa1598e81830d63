//! Zoom transition easing.
//!
//! The editor preview animates zooms with a `cubic-bezier(0.4, 0, 0.2, 1)`
//! style curve. Exports reproduce it as a closed-form cubic in `t` built from
//! the x control points, `a·t³ + b·t² + c·t`, rather than solving the bezier
//! numerically. The same coefficients are emitted into filter-graph
//! expressions, so both backends evaluate the identical polynomial.

/// First control point x.
pub const EASE_X1: f64 = 0.4;

/// Second control point x.
pub const EASE_X2: f64 = 0.2;

/// Coefficients of `a·t³ + b·t² + c·t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicEase {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl CubicEase {
    /// Derive coefficients: `c = 3·x1`, `b = 3·(x2 - x1) - c`, `a = 1 - c - b`.
    pub fn from_control_points(x1: f64, x2: f64) -> Self {
        let c = 3.0 * x1;
        let b = 3.0 * (x2 - x1) - c;
        let a = 1.0 - c - b;
        Self { a, b, c }
    }

    /// The curve used for zoom transitions.
    pub fn zoom() -> Self {
        Self::from_control_points(EASE_X1, EASE_X2)
    }

    /// Evaluate at `t` (Horner form).
    pub fn apply(&self, t: f64) -> f64 {
        ((self.a * t + self.b) * t + self.c) * t
    }
}

/// Fraction of `duration` covered by `elapsed`, clamped to `[0, 1]`.
///
/// A non-positive duration counts as already complete.
pub fn progress(elapsed: f64, duration: f64) -> f64 {
    if duration <= 0.0 || !duration.is_finite() {
        return 1.0;
    }
    if !elapsed.is_finite() {
        return 0.0;
    }
    (elapsed / duration).clamp(0.0, 1.0)
}

/// Eased progress for the zoom curve.
pub fn ease(t: f64) -> f64 {
    CubicEase::zoom().apply(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficients() {
        let curve = CubicEase::zoom();
        assert!((curve.c - 1.2).abs() < 1e-12);
        assert!((curve.b + 1.8).abs() < 1e-12);
        assert!((curve.a - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(ease(0.0), 0.0);
        assert!((ease(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_values() {
        assert!((ease(0.5) - 0.35).abs() < 1e-12);
        assert!((ease(0.625) - 0.4375).abs() < 1e-12);
    }

    #[test]
    fn test_progress_clamps() {
        assert_eq!(progress(-1.0, 2.0), 0.0);
        assert_eq!(progress(1.0, 2.0), 0.5);
        assert_eq!(progress(3.0, 2.0), 1.0);
        assert_eq!(progress(0.0, 0.0), 1.0);
    }
}
