//! Stick intent values shared by the sampler, the throttler and the actuators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized 2D stick intent, each component nominally in `[-1, 1]`.
///
/// Equality is exact float equality. Change detection that needs a tolerance
/// goes through [`crate::throttle::ChangeDetection`] instead of this impl.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StickPosition {
    pub x: f64,
    pub y: f64,
}

/// The fully stationary stick.
pub const ZERO_STICK_POSITION: StickPosition = StickPosition { x: 0.0, y: 0.0 };

impl StickPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        *self == ZERO_STICK_POSITION
    }
}

impl fmt::Display for StickPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Chassis and gimbal intent for a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentPair {
    pub chassis: StickPosition,
    pub gimbal: StickPosition,
}

impl IntentPair {
    pub const STATIONARY: IntentPair = IntentPair {
        chassis: ZERO_STICK_POSITION,
        gimbal: ZERO_STICK_POSITION,
    };

    pub const fn new(chassis: StickPosition, gimbal: StickPosition) -> Self {
        Self { chassis, gimbal }
    }

    /// Both sticks at rest.
    pub fn is_stationary(&self) -> bool {
        self.chassis.is_zero() && self.gimbal.is_zero()
    }
}

/// Bounds `value` to `[-bound, bound]`.
///
/// `bound` must be non-negative. Values already inside the range are returned
/// untouched.
pub fn clamp_value_to(value: f32, bound: f32) -> f32 {
    if value > bound {
        bound
    } else if value < -bound {
        -bound
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamp_caps_both_directions() {
        assert_eq!(clamp_value_to(250.0, 100.0), 100.0);
        assert_eq!(clamp_value_to(-250.0, 100.0), -100.0);
        assert_eq!(clamp_value_to(42.5, 100.0), 42.5);
        assert_eq!(clamp_value_to(-100.0, 100.0), -100.0);
    }

    #[test]
    fn test_clamp_zero_bound() {
        assert_eq!(clamp_value_to(3.0, 0.0), 0.0);
        assert_eq!(clamp_value_to(-3.0, 0.0), 0.0);
        assert_eq!(clamp_value_to(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_zero_detection() {
        assert!(ZERO_STICK_POSITION.is_zero());
        assert!(StickPosition::default().is_zero());
        assert!(!StickPosition::new(0.0, -0.01).is_zero());
        // -0.0 == 0.0 under IEEE comparison
        assert!(StickPosition::new(-0.0, 0.0).is_zero());
    }

    #[test]
    fn test_intent_pair_stationary() {
        assert!(IntentPair::STATIONARY.is_stationary());
        let moving = IntentPair::new(ZERO_STICK_POSITION, StickPosition::new(0.2, 0.0));
        assert!(!moving.is_stationary());
    }

    proptest! {
        #[test]
        fn prop_clamp_is_bounded(value in -1.0e6f32..1.0e6f32, bound in 0.0f32..1.0e4f32) {
            let clamped = clamp_value_to(value, bound);
            prop_assert!(clamped >= -bound && clamped <= bound);
        }

        #[test]
        fn prop_clamp_keeps_in_range_values(bound in 0.0f32..1.0e4f32, ratio in -1.0f32..=1.0f32) {
            let value = bound * ratio;
            prop_assert_eq!(clamp_value_to(value, bound), value);
        }

        #[test]
        fn prop_clamp_is_idempotent(value in -1.0e6f32..1.0e6f32, bound in 0.0f32..1.0e4f32) {
            let once = clamp_value_to(value, bound);
            prop_assert_eq!(clamp_value_to(once, bound), once);
        }
    }
}
