use super::{Actuator, ActuatorError, ControlMode};
use crate::controller::stick::StickPosition;
use tracing::info;

/// Actuator that only logs what it would have sent.
#[derive(Debug, Clone)]
pub struct DryRunActuator {
    name: String,
    commands: u64,
}

impl DryRunActuator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: 0,
        }
    }

    /// Number of commands received so far
    pub fn commands(&self) -> u64 {
        self.commands
    }
}

impl Actuator for DryRunActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn move_sticks(
        &mut self,
        chassis: &StickPosition,
        gimbal: &StickPosition,
        mode: ControlMode,
    ) -> Result<(), ActuatorError> {
        self.commands += 1;
        info!(
            "[{}] move #{} mode={} chassis={} gimbal={}",
            self.name, self.commands, mode, chassis, gimbal
        );
        Ok(())
    }
}
