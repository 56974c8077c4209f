//! Station configuration loaded once at startup
//!
//! Describes how this particular bench talks to its instruments and how the
//! operator is consulted. Read-only after the runner starts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Instrument transport timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Pause after every write before the next command may be sent
    pub settle_delay_ms: u64,
    /// Bound on waiting for a response line
    pub read_timeout_ms: u64,
    /// Bound on establishing a TCP connection
    pub connect_timeout_ms: u64,
    /// TCP port used when an IP address carries no port
    pub scpi_port: u16,
    /// Log every command and response at debug level
    pub trace_wire: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            read_timeout_ms: 1000,
            connect_timeout_ms: 3000,
            scpi_port: 5025,
            trace_wire: false,
        }
    }
}

impl TransportSettings {
    /// Settle delay as a `Duration`
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Setpoint read-back verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Query `VOLT?`/`CURR?` after writing a setpoint and compare
    pub verify_setpoints: bool,
    /// Largest accepted absolute difference between setpoint and read-back
    pub tolerance: f64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            verify_setpoints: false,
            tolerance: 0.01,
        }
    }
}

impl VerificationSettings {
    /// Tolerance to apply, or `None` when verification is off
    pub fn tolerance(&self) -> Option<f64> {
        self.verify_setpoints.then_some(self.tolerance)
    }
}

/// Operator interaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSettings {
    /// Skip the confirmation prompts between phases
    pub auto_confirm: bool,
}

/// Station configuration for the StandRig runner.
///
/// Located at `~/.config/standrig/station.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Transport timing
    pub transport: TransportSettings,
    /// Setpoint verification
    pub verification: VerificationSettings,
    /// Operator interaction
    pub operator: OperatorSettings,
}

impl StationConfig {
    /// Parse StationConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize StationConfig to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
