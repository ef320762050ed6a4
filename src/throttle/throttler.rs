//! Per-frame dispatch decision
//!
//! The throttler sits between the sampler and the actuators and answers one
//! question per frame: does the current intent warrant a new move command?
//!
//! # State Machine
//!
//! ```text
//!              intent changed to non-zero
//!   Stationary ──────────────────────────► Moving
//!       ▲                                    │  │
//!       │      intent changed to zero        │  │ unchanged for > keep-alive
//!       └────────────────────────────────────┘  └──► re-dispatch (stay Moving)
//! ```
//!
//! - Unchanged and stationary: never dispatch.
//! - Unchanged and moving: dispatch only once the keep-alive interval has
//!   elapsed since the last dispatch, so the actuator's own command timeout
//!   never expires while the operator holds a stick.
//! - Changed: dispatch on the same frame, whatever the timer says.
//!
//! The stored previous intent is always the intent of the last *dispatched*
//! command, never of a skipped frame.

use crate::controller::stick::IntentPair;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Maximum gap between commands while a non-zero intent is held.
///
/// Chosen under the assumption that the actuator stops on its own after one
/// second without a command.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(900);

/// Time source for the control loop.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// How two intents are compared to decide whether the operator changed input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// Any difference in any component counts.
    #[default]
    Exact,
    /// Differences up to and including the given magnitude are ignored.
    Tolerance(f64),
}

impl ChangeDetection {
    pub fn changed(&self, previous: &IntentPair, current: &IntentPair) -> bool {
        match self {
            ChangeDetection::Exact => previous != current,
            ChangeDetection::Tolerance(epsilon) => {
                let components = [
                    (previous.chassis.x, current.chassis.x),
                    (previous.chassis.y, current.chassis.y),
                    (previous.gimbal.x, current.gimbal.x),
                    (previous.gimbal.y, current.gimbal.y),
                ];
                components
                    .iter()
                    .any(|(before, after)| (before - after).abs() > *epsilon)
            }
        }
    }
}

// Throttler settings
#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    pub keep_alive: Duration,
    pub change_detection: ChangeDetection,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
            change_detection: ChangeDetection::Exact,
        }
    }
}

/// State owned by exactly one throttler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleState {
    /// Intent of the most recently dispatched command
    pub previous: IntentPair,
    /// When that command was dispatched
    pub last_dispatch: Instant,
}

impl ThrottleState {
    pub fn new(previous: IntentPair, last_dispatch: Instant) -> Self {
        Self {
            previous,
            last_dispatch,
        }
    }

    /// Stationary state as of `now`.
    pub fn stationary(now: Instant) -> Self {
        Self::new(IntentPair::STATIONARY, now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePhase {
    Stationary,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReason {
    /// Intent differs from the last dispatched one
    Changed,
    /// Intent unchanged but the keep-alive interval ran out
    KeepAlive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing changed and everything is at rest
    Stationary,
    /// Nothing changed and the last command is still fresh
    Fresh,
}

/// Outcome of one frame's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Dispatch(DispatchReason),
    Skip(SkipReason),
}

impl Decision {
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Decision::Dispatch(_))
    }
}

#[derive(Debug, Clone)]
pub struct CommandThrottler {
    state: ThrottleState,
    settings: ThrottleSettings,
}

impl CommandThrottler {
    /// Stationary throttler created at `now`.
    pub fn new(settings: ThrottleSettings, now: Instant) -> Self {
        Self::from_state(ThrottleState::stationary(now), settings)
    }

    pub fn from_state(state: ThrottleState, settings: ThrottleSettings) -> Self {
        debug!(
            "Creating command throttler: keep_alive={:?}, change_detection={:?}",
            settings.keep_alive, settings.change_detection
        );
        Self { state, settings }
    }

    pub fn state(&self) -> &ThrottleState {
        &self.state
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    pub fn phase(&self) -> ThrottlePhase {
        if self.state.previous.is_stationary() {
            ThrottlePhase::Stationary
        } else {
            ThrottlePhase::Moving
        }
    }

    /// Decides whether `current` should be dispatched at `now`.
    ///
    /// On a dispatch decision the stored intent and timestamp are updated
    /// before returning, so the caller only has to fan the command out.
    pub fn decide(&mut self, current: IntentPair, now: Instant) -> Decision {
        let changed = self
            .settings
            .change_detection
            .changed(&self.state.previous, &current);

        let decision = if changed {
            Decision::Dispatch(DispatchReason::Changed)
        } else if self.state.previous.is_stationary() {
            Decision::Skip(SkipReason::Stationary)
        } else if now.saturating_duration_since(self.state.last_dispatch) > self.settings.keep_alive
        {
            Decision::Dispatch(DispatchReason::KeepAlive)
        } else {
            Decision::Skip(SkipReason::Fresh)
        };

        match decision {
            Decision::Dispatch(reason) => {
                debug!(
                    "Dispatching ({:?}): chassis {} gimbal {}",
                    reason, current.chassis, current.gimbal
                );
                self.state = ThrottleState::new(current, now);
            }
            Decision::Skip(reason) => trace!("Skipping frame ({:?})", reason),
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::stick::{StickPosition, ZERO_STICK_POSITION};
    use proptest::prelude::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn pair(cx: f64, cy: f64, gx: f64, gy: f64) -> IntentPair {
        IntentPair::new(StickPosition::new(cx, cy), StickPosition::new(gx, gy))
    }

    fn throttler_with(previous: IntentPair, t0: Instant) -> CommandThrottler {
        CommandThrottler::from_state(ThrottleState::new(previous, t0), ThrottleSettings::default())
    }

    #[test]
    fn test_scenario_a_stationary_no_dispatch() {
        let t0 = Instant::now();
        let mut throttler = throttler_with(IntentPair::STATIONARY, t0);

        let decision = throttler.decide(IntentPair::STATIONARY, t0 + ms(16));

        assert_eq!(decision, Decision::Skip(SkipReason::Stationary));
        assert_eq!(throttler.state().last_dispatch, t0);
    }

    #[test]
    fn test_scenario_b_unchanged_within_keep_alive() {
        let t0 = Instant::now();
        let held = pair(1.0, 0.0, 0.0, 0.0);
        let mut throttler = throttler_with(held, t0);

        let decision = throttler.decide(held, t0 + ms(500));

        assert_eq!(decision, Decision::Skip(SkipReason::Fresh));
        assert_eq!(throttler.state().last_dispatch, t0);
    }

    #[test]
    fn test_scenario_c_keep_alive_refresh() {
        let t0 = Instant::now();
        let held = pair(1.0, 0.0, 0.0, 0.0);
        let mut throttler = throttler_with(held, t0);

        let decision = throttler.decide(held, t0 + ms(950));

        assert_eq!(decision, Decision::Dispatch(DispatchReason::KeepAlive));
        assert_eq!(throttler.state().last_dispatch, t0 + ms(950));
        assert_eq!(throttler.state().previous, held);
    }

    #[test]
    fn test_scenario_d_change_dispatches_immediately() {
        let t0 = Instant::now();
        let mut throttler = throttler_with(pair(1.0, 0.0, 0.0, 0.0), t0);

        let current = pair(0.5, 0.0, 0.0, 0.0);
        let decision = throttler.decide(current, t0 + ms(10));

        assert_eq!(decision, Decision::Dispatch(DispatchReason::Changed));
        assert_eq!(throttler.state().previous, current);
        assert_eq!(throttler.state().last_dispatch, t0 + ms(10));
    }

    #[test]
    fn test_keep_alive_boundary_is_exclusive() {
        let t0 = Instant::now();
        let held = pair(0.0, 0.0, 0.3, 0.0);
        let mut throttler = throttler_with(held, t0);

        assert!(!throttler.decide(held, t0 + ms(900)).is_dispatch());
        assert!(throttler.decide(held, t0 + ms(901)).is_dispatch());
    }

    #[test]
    fn test_stationary_suppression_over_many_frames() {
        let t0 = Instant::now();
        let mut throttler = CommandThrottler::new(ThrottleSettings::default(), t0);

        for frame in 1..=600u64 {
            let decision = throttler.decide(IntentPair::STATIONARY, t0 + ms(frame * 16));
            assert_eq!(decision, Decision::Skip(SkipReason::Stationary));
        }
        assert_eq!(throttler.phase(), ThrottlePhase::Stationary);
    }

    #[test]
    fn test_every_component_change_is_detected() {
        let base = pair(0.1, 0.2, 0.3, 0.4);
        let variants = [
            pair(0.15, 0.2, 0.3, 0.4),
            pair(0.1, 0.25, 0.3, 0.4),
            pair(0.1, 0.2, 0.35, 0.4),
            pair(0.1, 0.2, 0.3, 0.45),
        ];

        for variant in variants {
            let t0 = Instant::now();
            let mut throttler = throttler_with(base, t0);
            assert_eq!(
                throttler.decide(variant, t0 + ms(1)),
                Decision::Dispatch(DispatchReason::Changed)
            );
        }
    }

    #[test]
    fn test_return_to_rest_dispatches_stop_then_goes_quiet() {
        let t0 = Instant::now();
        let mut throttler = throttler_with(pair(0.0, -1.0, 0.0, 0.0), t0);
        assert_eq!(throttler.phase(), ThrottlePhase::Moving);

        assert!(throttler
            .decide(IntentPair::STATIONARY, t0 + ms(100))
            .is_dispatch());
        assert_eq!(throttler.phase(), ThrottlePhase::Stationary);

        assert!(!throttler
            .decide(IntentPair::STATIONARY, t0 + ms(5000))
            .is_dispatch());
    }

    #[test]
    fn test_skipped_frames_do_not_update_previous() {
        let t0 = Instant::now();
        let held = pair(0.4, 0.0, 0.0, 0.0);
        let mut throttler = throttler_with(held, t0);

        throttler.decide(held, t0 + ms(16));
        throttler.decide(held, t0 + ms(32));

        assert_eq!(*throttler.state(), ThrottleState::new(held, t0));
    }

    #[test]
    fn test_tolerance_ignores_jitter() {
        let t0 = Instant::now();
        let settings = ThrottleSettings {
            change_detection: ChangeDetection::Tolerance(0.01),
            ..Default::default()
        };
        let mut throttler =
            CommandThrottler::from_state(ThrottleState::new(pair(0.5, 0.0, 0.0, 0.0), t0), settings);

        assert!(!throttler
            .decide(pair(0.505, 0.0, 0.0, 0.0), t0 + ms(16))
            .is_dispatch());
        assert!(throttler
            .decide(pair(0.52, 0.0, 0.0, 0.0), t0 + ms(32))
            .is_dispatch());
    }

    #[test]
    fn test_exact_detection_treats_signed_zero_as_equal() {
        let previous = IntentPair::STATIONARY;
        let current = IntentPair::new(StickPosition::new(-0.0, 0.0), ZERO_STICK_POSITION);
        assert!(!ChangeDetection::Exact.changed(&previous, &current));
    }

    proptest! {
        #[test]
        fn prop_keep_alive_held_input(
            frame_gaps in prop::collection::vec(1u64..=50, 100..600),
            x in -1.0f64..1.0,
            y in 0.01f64..1.0,
        ) {
            let t0 = Instant::now();
            let held = pair(x, y, 0.0, 0.0);
            let mut throttler = CommandThrottler::new(ThrottleSettings::default(), t0);

            let mut now = t0;
            let mut last_dispatch = None;
            for gap in frame_gaps {
                now += ms(gap);
                if throttler.decide(held, now).is_dispatch() {
                    if let Some(previous) = last_dispatch {
                        let since: Duration = now - previous;
                        // a refresh never comes early
                        prop_assert!(since > DEFAULT_KEEP_ALIVE);
                        // and is never later than the first frame past the interval
                        prop_assert!(since <= DEFAULT_KEEP_ALIVE + ms(gap));
                    }
                    last_dispatch = Some(now);
                } else if let Some(previous) = last_dispatch {
                    prop_assert!(now - previous <= DEFAULT_KEEP_ALIVE);
                }
            }
            prop_assert!(last_dispatch.is_some());
        }
    }
}
