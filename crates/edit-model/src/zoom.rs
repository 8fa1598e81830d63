//! Zoom effect definitions.

use serde::{Deserialize, Serialize};

use crate::model::EditModelError;

/// Side length of the zoom target grid.
pub const GRID_SIZE: u8 = 8;

/// Smallest zoom amount (no magnification).
pub const MIN_ZOOM_AMOUNT: f64 = 1.0;

/// Largest zoom amount the editor offers.
pub const MAX_ZOOM_AMOUNT: f64 = 3.0;

/// Number of effects the editor lets a user create. The core does not rely
/// on this cap.
pub const EDITOR_MAX_EFFECTS: usize = 5;

/// A time-windowed instruction to scale the frame toward a grid target.
///
/// Times are in seconds on the source timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomEffect {
    /// Editor-assigned identifier.
    pub id: String,

    /// Window start (seconds, inclusive).
    pub start_time: f64,

    /// Window end (seconds, inclusive).
    pub end_time: f64,

    /// Peak magnification in `[1.0, 3.0]`.
    pub zoom_amount: f64,

    /// Transition duration in seconds.
    pub zoom_speed: f64,

    /// Grid column in `0..=7`.
    pub target_x: u8,

    /// Grid row in `0..=7`.
    pub target_y: u8,
}

impl ZoomEffect {
    pub fn new(
        id: impl Into<String>,
        start_time: f64,
        end_time: f64,
        zoom_amount: f64,
        zoom_speed: f64,
        target: (u8, u8),
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time,
            zoom_amount,
            zoom_speed,
            target_x: target.0,
            target_y: target.1,
        }
    }

    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether `time_secs` falls inside the (inclusive) window.
    pub fn contains(&self, time_secs: f64) -> bool {
        time_secs >= self.start_time && time_secs <= self.end_time
    }

    /// Reject effects that cannot be rendered at all.
    pub fn validate(&self) -> Result<(), EditModelError> {
        let field = format!("zoomEffects[{}]", self.id);
        if !self.start_time.is_finite()
            || !self.end_time.is_finite()
            || !self.zoom_amount.is_finite()
            || !self.zoom_speed.is_finite()
        {
            return Err(EditModelError::invalid(field, "contains a non-finite value"));
        }
        if self.start_time < 0.0 {
            return Err(EditModelError::invalid(
                field,
                format!("startTime {} is negative", self.start_time),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(EditModelError::invalid(
                field,
                format!(
                    "endTime {} must be greater than startTime {}",
                    self.end_time, self.start_time
                ),
            ));
        }
        Ok(())
    }

    /// Render-ready copy: amount clamped to `[1, 3]`, speed clamped to
    /// `[0, duration / 2]`, grid target clamped to the grid.
    pub fn normalized(&self) -> ZoomEffect {
        let half = (self.duration() / 2.0).max(0.0);
        ZoomEffect {
            id: self.id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            zoom_amount: self.zoom_amount.clamp(MIN_ZOOM_AMOUNT, MAX_ZOOM_AMOUNT),
            zoom_speed: self.zoom_speed.clamp(0.0, half),
            target_x: self.target_x.min(GRID_SIZE - 1),
            target_y: self.target_y.min(GRID_SIZE - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let effect = ZoomEffect::new("z", 3.0, 5.0, 2.0, 1.0, (3, 3));
        assert!(effect.contains(3.0));
        assert!(effect.contains(5.0));
        assert!(!effect.contains(5.0001));
        assert!(!effect.contains(2.9999));
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let effect = ZoomEffect::new("z", 5.0, 5.0, 2.0, 1.0, (3, 3));
        assert!(effect.validate().is_err());

        let effect = ZoomEffect::new("z", 5.0, 4.0, 2.0, 1.0, (3, 3));
        assert!(effect.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let effect = ZoomEffect::new("z", 1.0, 2.0, f64::NAN, 1.0, (3, 3));
        assert!(effect.validate().is_err());
    }

    #[test]
    fn test_normalized_clamps_values() {
        let effect = ZoomEffect::new("z", 1.0, 3.0, 7.5, 4.0, (12, 200)).normalized();
        assert_eq!(effect.zoom_amount, MAX_ZOOM_AMOUNT);
        assert_eq!(effect.zoom_speed, 1.0);
        assert_eq!(effect.target_x, 7);
        assert_eq!(effect.target_y, 7);

        let effect = ZoomEffect::new("z", 1.0, 3.0, 0.2, -1.0, (0, 0)).normalized();
        assert_eq!(effect.zoom_amount, MIN_ZOOM_AMOUNT);
        assert_eq!(effect.zoom_speed, 0.0);
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = r#"{"id":"a","startTime":1.0,"endTime":2.0,"zoomAmount":1.5,"zoomSpeed":0.5,"targetX":2,"targetY":6}"#;
        let effect: ZoomEffect = serde_json::from_str(json).unwrap();
        assert_eq!(effect.target_y, 6);
        assert!((effect.duration() - 1.0).abs() < 1e-12);
    }
}
