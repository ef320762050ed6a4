//! Per-frame input state consumed by the sampler.
//!
//! The sampler never talks to a device directly. Anything that can answer
//! "what is this axis right now" and "was this button pressed this frame"
//! implements [`InputSource`]: the gilrs gamepad adapter at runtime and a
//! plain [`InputSnapshot`] in tests.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// Logical axes bound by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputAxis {
    /// Chassis strafe, already normalized to `[-1, 1]`
    LeftRight,
    /// Chassis drive, already normalized to `[-1, 1]`
    ForwardBackward,
    /// Raw horizontal aim delta, unbounded
    MouseX,
    /// Raw vertical aim delta, unbounded
    MouseY,
}

// Logical edge-triggered buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputButton {
    Exit,
    StartStop,
}

// Physical gamepad buttons that can be bound to an InputButton
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonType {
    A,
    B,
    X,
    Y,
    Start,
    Select,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Guide,
}

/// Read-only view of the current frame's input.
pub trait InputSource {
    /// Refreshes device state for a new frame. Called once before sampling.
    fn poll(&mut self) {}

    /// Current value of `axis`; unbound axes read as `0.0`.
    fn axis(&self, axis: InputAxis) -> f32;

    /// True only on the frame the button went down, never while held.
    fn just_pressed(&self, button: InputButton) -> bool;
}

/// Plain per-frame input state.
///
/// Axis values persist across frames until overwritten; button edges are
/// cleared by [`InputSnapshot::begin_frame`].
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    axes: HashMap<InputAxis, f32>,
    pressed: HashSet<InputButton>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_axis(&mut self, axis: InputAxis, value: f32) {
        self.axes.insert(axis, value);
    }

    pub fn with_axis(mut self, axis: InputAxis, value: f32) -> Self {
        self.set_axis(axis, value);
        self
    }

    pub fn press(&mut self, button: InputButton) {
        self.pressed.insert(button);
    }

    pub fn with_pressed(mut self, button: InputButton) -> Self {
        self.press(button);
        self
    }

    /// Drops the previous frame's button edges.
    pub fn begin_frame(&mut self) {
        self.pressed.clear();
    }
}

impl InputSource for InputSnapshot {
    fn axis(&self, axis: InputAxis) -> f32 {
        self.axes.get(&axis).copied().unwrap_or(0.0)
    }

    fn just_pressed(&self, button: InputButton) -> bool {
        self.pressed.contains(&button)
    }
}
