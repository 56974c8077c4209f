//! Error types for the StandRig system

use thiserror::Error;

/// Core error type for StandRig operations
#[derive(Error, Debug)]
pub enum StandRigError {
    /// The instrument transport could not be opened
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Operation attempted on a transport that is closed or was never opened
    #[error("Transport not open: {0}")]
    NotOpen(String),

    /// Command channel failure on an open transport
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Instrument response contained no extractable number
    #[error("Parse error: {0}")]
    Parse(String),

    /// Software interface not implemented by the controller
    #[error("Unsupported interface: {0}")]
    UnsupportedInterface(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Setpoint read-back did not match the requested value
    #[error("{quantity} setpoint not applied: requested {requested}, instrument reports {readback}")]
    Verification {
        quantity: String,
        requested: f64,
        readback: f64,
    },

    /// Operator console closed or unreadable
    #[error("Operator console error: {0}")]
    Operator(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for StandRig operations
pub type Result<T> = std::result::Result<T, StandRigError>;

impl From<serde_json::Error> for StandRigError {
    fn from(err: serde_json::Error) -> Self {
        StandRigError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for StandRigError {
    fn from(err: toml::de::Error) -> Self {
        StandRigError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StandRigError {
    fn from(err: toml::ser::Error) -> Self {
        StandRigError::Serialization(err.to_string())
    }
}

/// Determine if an error comes from the link to the instrument
///
/// Returns `true` for transport-level faults (could not open, not open,
/// channel broke, timed out) as opposed to logical faults such as a bad
/// reading or a configuration mistake.
pub fn is_connection_error(err: &StandRigError) -> bool {
    matches!(
        err,
        StandRigError::Connection { .. }
            | StandRigError::NotOpen(_)
            | StandRigError::Protocol(_)
            | StandRigError::Timeout(_)
            | StandRigError::Io(_)
    )
}
