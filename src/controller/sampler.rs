use super::input::{InputAxis, InputButton, InputSource};
use super::stick::{clamp_value_to, IntentPair, StickPosition};
use tracing::trace;

/// Magnitude the raw aim deltas are capped to before normalizing.
pub const DEFAULT_GIMBAL_CLAMP: f32 = 100.0;

// Sampler settings
#[derive(Clone, Debug)]
pub struct SamplerSettings {
    pub gimbal_clamp: f32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            gimbal_clamp: DEFAULT_GIMBAL_CLAMP,
        }
    }
}

/// Everything the control loop needs from one frame of input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub intent: IntentPair,
    pub exit: bool,
    pub start_stop: bool,
}

/// Turns raw axis/button state into stick intents and triggers.
///
/// Chassis axes are taken as-is since the input source already normalizes
/// them. Aim deltas are clamped to `±gimbal_clamp` and divided by the same
/// bound, which lands them in `[-1, 1]`.
#[derive(Clone, Debug, Default)]
pub struct InputSampler {
    settings: SamplerSettings,
}

impl InputSampler {
    pub fn new(settings: SamplerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn sample(&self, input: &dyn InputSource) -> FrameInput {
        let chassis = StickPosition::new(
            f64::from(input.axis(InputAxis::LeftRight)),
            f64::from(input.axis(InputAxis::ForwardBackward)),
        );

        let gimbal = StickPosition::new(
            self.normalize_delta(input.axis(InputAxis::MouseX)),
            self.normalize_delta(input.axis(InputAxis::MouseY)),
        );

        let frame = FrameInput {
            intent: IntentPair::new(chassis, gimbal),
            exit: input.just_pressed(InputButton::Exit),
            start_stop: input.just_pressed(InputButton::StartStop),
        };
        trace!("Sampled frame: {:?}", frame);
        frame
    }

    fn normalize_delta(&self, raw: f32) -> f64 {
        let bound = self.settings.gimbal_clamp;
        if bound == 0.0 {
            return 0.0;
        }
        f64::from(clamp_value_to(raw, bound) / bound)
    }
}
