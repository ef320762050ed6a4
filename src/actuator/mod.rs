//! Command sinks driven by the control loop
//!
//! An [`Actuator`] accepts a chassis intent, a gimbal intent and a control
//! mode and performs the motion request synchronously. The control loop
//! blocks on that call; a slow sink stalls the frame.
//!
//! Some actuators sit behind a link that can be brought up and torn down at
//! runtime. Those expose it through [`Actuator::connection`] so the
//! start/stop trigger can toggle it.
//!
//! Implementations:
//! - [`dry_run::DryRunActuator`] - logs every command, moves nothing
//! - [`mqtt_link::MqttLink`] - publishes commands to an MQTT broker

pub mod dry_run;
pub mod error;
pub mod mqtt_link;

pub use error::ActuatorError;

use crate::controller::stick::StickPosition;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// How the robot combines chassis and gimbal intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// First-person: the gimbal aims, the chassis follows the camera frame
    #[default]
    Fpv,
    /// Chassis and gimbal move independently
    Free,
    /// Chassis turns to follow the gimbal
    GimbalLead,
    /// Gimbal turns to follow the chassis
    ChassisLead,
}

impl Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Fpv => write!(f, "fpv"),
            ControlMode::Free => write!(f, "free"),
            ControlMode::GimbalLead => write!(f, "gimbal_lead"),
            ControlMode::ChassisLead => write!(f, "chassis_lead"),
        }
    }
}

/// A link that can be started and stopped at runtime.
pub trait Connection {
    fn connected(&self) -> bool;

    fn start(&mut self) -> Result<(), ActuatorError>;

    fn stop(&mut self) -> Result<(), ActuatorError>;
}

/// Something that executes move commands.
pub trait Actuator {
    fn name(&self) -> &str;

    /// Requests motion. Errors are never retried by the caller.
    fn move_sticks(
        &mut self,
        chassis: &StickPosition,
        gimbal: &StickPosition,
        mode: ControlMode,
    ) -> Result<(), ActuatorError>;

    /// The link behind this actuator, if it has a toggleable one.
    fn connection(&mut self) -> Option<&mut dyn Connection> {
        None
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn move_sticks(
        &mut self,
        chassis: &StickPosition,
        gimbal: &StickPosition,
        mode: ControlMode,
    ) -> Result<(), ActuatorError> {
        (**self).move_sticks(chassis, gimbal, mode)
    }

    fn connection(&mut self) -> Option<&mut dyn Connection> {
        (**self).connection()
    }
}
