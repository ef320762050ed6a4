//! Gamepad-driven teleoperation for RoboMaster-style robots.
//!
//! Once per frame the [`control_loop`] samples input, asks the
//! [`throttle`] core whether a move command is due and fans it out to every
//! registered [`actuator`].

pub mod actuator;
pub mod config;
pub mod control_loop;
pub mod controller;
pub mod throttle;
