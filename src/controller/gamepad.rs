use super::input::{ButtonType, InputAxis, InputButton, InputSnapshot, InputSource};
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use tracing::{debug, error, info, warn};

// Gamepad settings
#[derive(Clone, Debug)]
pub struct GamepadSettings {
    pub joystick_deadzone: f32,
    // Right stick deflection is scaled into raw aim-delta units
    pub gimbal_axis_scale: f32,
    // gilrs reports stick-up as positive, the robot expects forward negative
    pub invert_y: bool,
    pub exit_button: ButtonType,
    pub start_stop_button: ButtonType,
}

impl Default for GamepadSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05,
            gimbal_axis_scale: 100.0,
            invert_y: true,
            exit_button: ButtonType::Select,
            start_stop_button: ButtonType::Start,
        }
    }
}

// Input errors
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Failed to initialize gamepad input: {0}")]
    InitializationError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum GamepadState {
    Initializing,
    Polling,
}

#[machine]
pub struct GamepadInput<S: GamepadState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    settings: GamepadSettings,

    // Current frame state handed to the sampler
    snapshot: InputSnapshot,
}

impl<S: GamepadState> GamepadInput<S> {
    pub fn settings(&self) -> &GamepadSettings {
        &self.settings
    }
}

impl GamepadInput<Initializing> {
    pub fn create(settings: Option<GamepadSettings>) -> Result<Self, InputError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating gamepad input with settings: {:?}", settings);

        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(InputError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings, InputSnapshot::new()))
    }

    /// Picks the first connected gamepad and transitions to Polling.
    ///
    /// With no gamepad connected the input stays idle until one shows up.
    pub fn initialize(mut self) -> GamepadInput<Polling> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, continuing in idle mode");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!(
                    "  [{}] ID: {}, Name: {}, UUID: {:?}",
                    idx,
                    id,
                    gamepad.name(),
                    gamepad.uuid()
                );
            }
            let (id, gamepad) = &gamepads[0];
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
            self.active_gamepad = Some(*id);
        }

        self.transition()
    }
}

impl GamepadInput<Polling> {
    pub fn has_gamepad(&self) -> bool {
        self.active_gamepad.is_some()
    }

    fn apply_event(&mut self, event: EventType) {
        match event {
            EventType::AxisChanged(axis, value, _) => match map_axis(axis, value, &self.settings) {
                Some((input_axis, mapped)) => self.snapshot.set_axis(input_axis, mapped),
                None => debug!("Ignoring unsupported axis: {:?}", axis),
            },
            EventType::ButtonPressed(button, _) => {
                let Some(button_type) = map_button(button) else {
                    debug!("Unmapped button pressed: {:?}", button);
                    return;
                };
                info!(
                    "Button pressed: {:?} at {}",
                    button_type,
                    Local::now().format("%H:%M:%S.%3f")
                );
                if button_type == self.settings.exit_button {
                    self.snapshot.press(InputButton::Exit);
                }
                if button_type == self.settings.start_stop_button {
                    self.snapshot.press(InputButton::StartStop);
                }
            }
            EventType::Disconnected => {
                warn!("Active gamepad disconnected, releasing all axes");
                self.active_gamepad = None;
                release_axes(&mut self.snapshot);
            }
            _ => {}
        }
    }
}

impl InputSource for GamepadInput<Polling> {
    /// Drains pending gilrs events into the frame snapshot.
    ///
    /// Call once per frame before sampling. Button edges from the previous
    /// frame are dropped first so a held button reads as pressed only once.
    fn poll(&mut self) {
        self.snapshot.begin_frame();

        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match self.active_gamepad {
                Some(active_id) if id != active_id => {
                    debug!("Skipping event from non-active gamepad: {:?}", id);
                    continue;
                }
                None => {
                    if matches!(event, EventType::Connected) {
                        info!("Adopting newly connected gamepad: {}", id);
                        self.active_gamepad = Some(id);
                    }
                    continue;
                }
                _ => {}
            }

            self.apply_event(event);
        }
    }

    fn axis(&self, axis: InputAxis) -> f32 {
        self.snapshot.axis(axis)
    }

    fn just_pressed(&self, button: InputButton) -> bool {
        self.snapshot.just_pressed(button)
    }
}

// Routes a gilrs axis to its logical axis, applying deadzone, y inversion and
// the right stick scaling into raw aim-delta units
fn map_axis(axis: Axis, value: f32, settings: &GamepadSettings) -> Option<(InputAxis, f32)> {
    let value = apply_deadzone(value, settings.joystick_deadzone);
    let y_sign = if settings.invert_y { -1.0 } else { 1.0 };
    let scale = settings.gimbal_axis_scale;

    match axis {
        Axis::LeftStickX => Some((InputAxis::LeftRight, value)),
        Axis::LeftStickY => Some((InputAxis::ForwardBackward, y_sign * value)),
        Axis::RightStickX => Some((InputAxis::MouseX, value * scale)),
        Axis::RightStickY => Some((InputAxis::MouseY, y_sign * value * scale)),
        _ => None,
    }
}

// A vanished gamepad must read as sticks at rest so the next frame stops the robot
fn release_axes(snapshot: &mut InputSnapshot) {
    for axis in [
        InputAxis::LeftRight,
        InputAxis::ForwardBackward,
        InputAxis::MouseX,
        InputAxis::MouseY,
    ] {
        snapshot.set_axis(axis, 0.0);
    }
}

// Helper function to map gilrs Button to our ButtonType
fn map_button(button: Button) -> Option<ButtonType> {
    match button {
        Button::South => Some(ButtonType::A),
        Button::East => Some(ButtonType::B),
        Button::West => Some(ButtonType::Y),
        Button::North => Some(ButtonType::X),
        Button::Start => Some(ButtonType::Start),
        Button::Select => Some(ButtonType::Select),
        Button::LeftTrigger => Some(ButtonType::LeftBumper),
        Button::RightTrigger => Some(ButtonType::RightBumper),
        Button::LeftThumb => Some(ButtonType::LeftStick),
        Button::RightThumb => Some(ButtonType::RightStick),
        Button::DPadUp => Some(ButtonType::DPadUp),
        Button::DPadDown => Some(ButtonType::DPadDown),
        Button::DPadLeft => Some(ButtonType::DPadLeft),
        Button::DPadRight => Some(ButtonType::DPadRight),
        Button::Mode => Some(ButtonType::Guide),
        _ => None,
    }
}

// Zeroes stick drift and rescales the remaining travel back to [-1, 1].
// Resting sticks must read exactly 0.0 for stationary suppression to hold.
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::sampler::InputSampler;
    use crate::controller::stick::StickPosition;

    fn settings(invert_y: bool) -> GamepadSettings {
        GamepadSettings {
            joystick_deadzone: 0.0,
            invert_y,
            ..Default::default()
        }
    }

    #[test]
    fn test_invert_y_applies_to_both_sticks() {
        let inverted = settings(true);
        assert_eq!(
            map_axis(Axis::LeftStickY, 0.5, &inverted),
            Some((InputAxis::ForwardBackward, -0.5))
        );
        assert_eq!(
            map_axis(Axis::RightStickY, 0.5, &inverted),
            Some((InputAxis::MouseY, -50.0))
        );

        let upright = settings(false);
        assert_eq!(
            map_axis(Axis::LeftStickY, 0.5, &upright),
            Some((InputAxis::ForwardBackward, 0.5))
        );
        assert_eq!(
            map_axis(Axis::RightStickY, 0.5, &upright),
            Some((InputAxis::MouseY, 50.0))
        );
    }

    #[test]
    fn test_x_axes_never_inverted() {
        let inverted = settings(true);
        assert_eq!(
            map_axis(Axis::LeftStickX, -0.25, &inverted),
            Some((InputAxis::LeftRight, -0.25))
        );
        assert_eq!(
            map_axis(Axis::RightStickX, -0.25, &inverted),
            Some((InputAxis::MouseX, -25.0))
        );
    }

    #[test]
    fn test_right_stick_scaled_before_clamp() {
        let scaled = GamepadSettings {
            joystick_deadzone: 0.0,
            gimbal_axis_scale: 400.0,
            ..Default::default()
        };
        let (axis, raw) = map_axis(Axis::RightStickX, 0.5, &scaled).expect("right stick is bound");
        assert_eq!((axis, raw), (InputAxis::MouseX, 200.0));

        // 200 raw units saturate the default clamp of 100
        let input = InputSnapshot::new().with_axis(axis, raw);
        let frame = InputSampler::default().sample(&input);
        assert_eq!(frame.intent.gimbal, StickPosition::new(1.0, 0.0));
    }

    #[test]
    fn test_deadzone_applied_before_routing() {
        let defaults = GamepadSettings::default();
        assert_eq!(
            map_axis(Axis::RightStickX, 0.02, &defaults),
            Some((InputAxis::MouseX, 0.0))
        );
        assert_eq!(map_axis(Axis::LeftZ, 1.0, &defaults), None);
    }

    #[test]
    fn test_release_axes_yields_stationary_frame() {
        let mut snapshot = InputSnapshot::new()
            .with_axis(InputAxis::LeftRight, 0.4)
            .with_axis(InputAxis::ForwardBackward, -1.0)
            .with_axis(InputAxis::MouseX, 80.0)
            .with_axis(InputAxis::MouseY, -30.0);

        release_axes(&mut snapshot);

        let frame = InputSampler::default().sample(&snapshot);
        assert!(frame.intent.is_stationary());
    }

    #[test]
    fn test_deadzone_zeroes_drift() {
        assert_eq!(apply_deadzone(0.03, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.049, 0.05), 0.0);
    }

    #[test]
    fn test_deadzone_rescales_full_travel() {
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < 1e-6);
        assert!((apply_deadzone(-1.0, 0.05) + 1.0).abs() < 1e-6);
        assert!(apply_deadzone(0.5, 0.05) < 0.5);
    }

    #[test]
    fn test_map_button() {
        assert_eq!(map_button(Button::Start), Some(ButtonType::Start));
        assert_eq!(map_button(Button::Select), Some(ButtonType::Select));
        assert_eq!(map_button(Button::South), Some(ButtonType::A));
        assert_eq!(map_button(Button::Unknown), None);
    }
}
