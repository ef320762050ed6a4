use thiserror::Error;

/// Errors raised by command sinks and their connections
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// A move was requested while the link is down
    #[error("Actuator not connected: {0}")]
    NotConnected(String),

    /// The actuator refused or could not execute the command
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The link could not be brought up
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// The link could not be shut down cleanly
    #[error("Failed to disconnect: {0}")]
    DisconnectFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
