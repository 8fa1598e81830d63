//! Zoom magnitude and origin over time.
//!
//! Each effect follows an envelope with three phases inside
//! `[start_time, end_time]`:
//!
//! ```text
//! amount
//!   Z ┤        ┌────────┐
//!     │      ╱            ╲
//!   1 ┼────╱                ╲────
//!          │ enter │ hold │ exit │
//! ```
//!
//! Enter and exit each last `min(zoom_speed, 40% of duration)`, leaving at
//! least 20% of the window as hold. Effects of one second or less skip the
//! hold: they ease in over the first half and out over the second.
//!
//! When windows overlap, the first effect in list order wins. The
//! filter-graph backend nests its conditionals so it resolves ties the same
//! way.

use serde::{Deserialize, Serialize};
use zoomreel_edit_model::ZoomEffect;

use crate::coords::zoom_target_to_normalized;
use crate::easing::{ease, progress};

/// Effects at or below this length have no hold phase.
pub const SHORT_EFFECT_SECS: f64 = 1.0;

/// Largest share of an effect a single transition may take.
pub const MAX_TRANSITION_SHARE: f64 = 0.4;

/// Zoom state at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomSample {
    /// Magnification, `1.0` means none.
    pub amount: f64,
    /// Normalized origin x in `[0, 1]`.
    pub origin_x: f64,
    /// Normalized origin y in `[0, 1]`.
    pub origin_y: f64,
}

impl ZoomSample {
    /// No zoom, origin at frame center.
    pub const IDENTITY: ZoomSample = ZoomSample {
        amount: 1.0,
        origin_x: 0.5,
        origin_y: 0.5,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for ZoomSample {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Phase of an effect at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomPhase {
    Enter,
    Hold,
    Exit,
}

/// Resolved timing of one effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomEnvelope {
    pub start: f64,
    pub end: f64,
    pub amount: f64,
    pub zoom_in: f64,
    pub zoom_out: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl ZoomEnvelope {
    /// Build the envelope of a (normalized) effect.
    pub fn from_effect(effect: &ZoomEffect) -> Self {
        let effect = effect.normalized();
        let duration = effect.duration().max(0.0);
        let (zoom_in, zoom_out) = if duration <= SHORT_EFFECT_SECS {
            (duration / 2.0, duration / 2.0)
        } else {
            let transition = effect.zoom_speed.min(duration * MAX_TRANSITION_SHARE);
            (transition, transition)
        };
        let (origin_x, origin_y) = zoom_target_to_normalized(effect.target_x, effect.target_y);

        Self {
            start: effect.start_time,
            end: effect.end_time,
            amount: effect.zoom_amount,
            zoom_in,
            zoom_out,
            origin_x,
            origin_y,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time_secs: f64) -> bool {
        time_secs >= self.start && time_secs <= self.end
    }

    /// Time at which the hold phase begins.
    pub fn hold_start(&self) -> f64 {
        self.start + self.zoom_in
    }

    /// Time at which the exit phase begins.
    pub fn exit_start(&self) -> f64 {
        self.end - self.zoom_out
    }

    /// Phase at `time_secs`, or `None` outside the window.
    pub fn phase_at(&self, time_secs: f64) -> Option<ZoomPhase> {
        if !self.contains(time_secs) {
            return None;
        }
        if time_secs < self.hold_start() {
            Some(ZoomPhase::Enter)
        } else if time_secs > self.exit_start() {
            Some(ZoomPhase::Exit)
        } else {
            Some(ZoomPhase::Hold)
        }
    }

    /// Magnification at `time_secs`; exactly `1.0` outside the window.
    pub fn amount_at(&self, time_secs: f64) -> f64 {
        match self.phase_at(time_secs) {
            None => 1.0,
            Some(ZoomPhase::Enter) => {
                let t = ease(progress(time_secs - self.start, self.zoom_in));
                1.0 + (self.amount - 1.0) * t
            }
            Some(ZoomPhase::Hold) => self.amount,
            Some(ZoomPhase::Exit) => {
                let t = ease(progress(time_secs - self.exit_start(), self.zoom_out));
                self.amount + (1.0 - self.amount) * t
            }
        }
    }

    pub fn sample(&self, time_secs: f64) -> ZoomSample {
        if !self.contains(time_secs) {
            return ZoomSample::IDENTITY;
        }
        ZoomSample {
            amount: self.amount_at(time_secs),
            origin_x: self.origin_x,
            origin_y: self.origin_y,
        }
    }
}

/// Zoom of a single effect at `time_secs`.
pub fn zoom_at_time(effect: &ZoomEffect, time_secs: f64) -> ZoomSample {
    ZoomEnvelope::from_effect(effect).sample(time_secs)
}

/// The effect governing `time_secs`: the first in list order whose window
/// contains it.
pub fn active_effect(effects: &[ZoomEffect], time_secs: f64) -> Option<(usize, &ZoomEffect)> {
    effects
        .iter()
        .enumerate()
        .find(|(_, effect)| effect.contains(time_secs))
}

/// Zoom at `time_secs` across all effects.
pub fn sample_zoom(effects: &[ZoomEffect], time_secs: f64) -> ZoomSample {
    match active_effect(effects, time_secs) {
        Some((_, effect)) => zoom_at_time(effect, time_secs),
        None => ZoomSample::IDENTITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_effect() -> ZoomEffect {
        ZoomEffect::new("z1", 3.0, 5.0, 2.0, 1.0, (3, 3))
    }

    #[test]
    fn test_envelope_caps_transitions() {
        let env = ZoomEnvelope::from_effect(&scenario_effect());
        assert!((env.zoom_in - 0.8).abs() < 1e-12);
        assert!((env.zoom_out - 0.8).abs() < 1e-12);
        assert!(env.exit_start() - env.hold_start() >= 0.2 * env.duration() - 1e-12);
    }

    #[test]
    fn test_scenario_samples() {
        let effect = scenario_effect();
        assert!((zoom_at_time(&effect, 3.0).amount - 1.0).abs() < 1e-9);

        let mid = zoom_at_time(&effect, 3.5).amount;
        assert!((mid - 1.4375).abs() < 1e-9);
        assert!(mid > 1.0 && mid < 2.0);

        assert_eq!(zoom_at_time(&effect, 4.0).amount, 2.0);
        assert!((zoom_at_time(&effect, 5.0).amount - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_outside_window_is_identity() {
        let effect = scenario_effect();
        assert_eq!(zoom_at_time(&effect, 2.99), ZoomSample::IDENTITY);
        assert_eq!(zoom_at_time(&effect, 5.01), ZoomSample::IDENTITY);
    }

    #[test]
    fn test_origin_from_grid() {
        let sample = zoom_at_time(&scenario_effect(), 4.0);
        assert!((sample.origin_x - 0.4375).abs() < 1e-12);
        assert!((sample.origin_y - 0.4375).abs() < 1e-12);
    }

    #[test]
    fn test_short_effect_has_no_hold() {
        let effect = ZoomEffect::new("s", 1.0, 1.8, 3.0, 0.1, (4, 4));
        let env = ZoomEnvelope::from_effect(&effect);
        assert!((env.zoom_in - 0.4).abs() < 1e-12);
        assert!((env.hold_start() - env.exit_start()).abs() < 1e-12);
        assert!((env.amount_at(1.4) - 3.0).abs() < 1e-9);
        assert!(env.amount_at(1.2) < 3.0);
        assert!(env.amount_at(1.6) < 3.0);
    }

    #[test]
    fn test_zero_speed_is_instant() {
        let effect = ZoomEffect::new("i", 0.0, 4.0, 1.5, 0.0, (4, 4));
        assert_eq!(zoom_at_time(&effect, 0.0).amount, 1.5);
        assert_eq!(zoom_at_time(&effect, 4.0).amount, 1.5);
        assert_eq!(zoom_at_time(&effect, 4.1).amount, 1.0);
    }

    #[test]
    fn test_speed_longer_than_half_is_clamped() {
        let effect = ZoomEffect::new("l", 0.0, 10.0, 2.0, 9.0, (4, 4));
        let env = ZoomEnvelope::from_effect(&effect);
        assert!((env.zoom_in - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_effect_wins_on_overlap() {
        let effects = vec![
            ZoomEffect::new("first", 2.0, 6.0, 1.5, 0.5, (0, 0)),
            ZoomEffect::new("second", 1.0, 8.0, 3.0, 0.5, (7, 7)),
        ];
        let (idx, effect) = active_effect(&effects, 4.0).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(effect.id, "first");
        assert_eq!(sample_zoom(&effects, 4.0).amount, 1.5);

        // Only the second window covers t=7.
        let (idx, _) = active_effect(&effects, 7.0).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_list_order_beats_start_time() {
        let effects = vec![
            ZoomEffect::new("late", 3.0, 6.0, 2.0, 0.5, (1, 1)),
            ZoomEffect::new("early", 1.0, 6.0, 3.0, 0.5, (6, 6)),
        ];
        assert_eq!(active_effect(&effects, 4.0).unwrap().1.id, "late");
    }

    #[test]
    fn test_no_effects_is_identity() {
        assert_eq!(sample_zoom(&[], 1.0), ZoomSample::IDENTITY);
    }
}
