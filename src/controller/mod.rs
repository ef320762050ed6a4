//! Operator input handling
//!
//! Turns whatever the operator is holding into per-frame stick intents:
//!
//! 1. [`gamepad`] - gilrs events folded into a per-frame [`input::InputSnapshot`]
//! 2. [`input`] - the [`InputSource`] seam the sampler reads through
//! 3. [`sampler`] - chassis/gimbal intents plus exit and start/stop triggers
//! 4. [`stick`] - the intent value types and the aim-delta clamp
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► InputSnapshot ──► InputSampler ──► FrameInput
//!             (per frame)       (clamp/scale)
//! ```
//!
//! Nothing in here ever talks to an actuator.

pub mod gamepad;
pub mod input;
pub mod sampler;
pub mod stick;

pub use gamepad::{GamepadInput, GamepadSettings, InputError};
pub use input::{ButtonType, InputAxis, InputButton, InputSnapshot, InputSource};
pub use sampler::{FrameInput, InputSampler, SamplerSettings};
pub use stick::{clamp_value_to, IntentPair, StickPosition, ZERO_STICK_POSITION};
