//! Command throttling core.
//!
//! [`throttler`] decides once per frame whether a move command goes out;
//! [`registry`] holds the actuators the decision is fanned out to.

pub mod registry;
pub mod throttler;

pub use registry::{ActuatorRegistry, EntityAllocator, EntityId};
pub use throttler::{
    ChangeDetection, Clock, CommandThrottler, Decision, DispatchReason, SkipReason, SystemClock,
    ThrottlePhase, ThrottleSettings, ThrottleState, DEFAULT_KEEP_ALIVE,
};
