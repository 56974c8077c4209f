//! Test-stand wiring: which power supplies exist and how to reach them
//!
//! The environment is expected to be stable across many test runs.

use serde::{Deserialize, Serialize};

use crate::{Interface, Result, TransportKind};

/// Baud rate used when a serial PSU does not specify one
pub const DEFAULT_BAUD_RATE: u32 = 115200;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Static wiring description of one power supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsuConfig {
    /// Command channel (`Serial` or `IP`)
    #[serde(rename = "protocol")]
    pub transport: TransportKind,

    /// Network address, `host` or `host:port`
    #[serde(rename = "IP", default)]
    pub ip: String,

    /// Serial device (e.g. `/dev/ttyACM0`, `COM1`)
    #[serde(rename = "COM", default)]
    pub serial_port: String,

    /// Serial baud rate
    #[serde(rename = "baudrate", default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Software interface (`SCPI`)
    pub interface: Interface,

    /// Output channel selected before every command
    #[serde(default)]
    pub channel: u32,
}

impl PsuConfig {
    /// PSU reached over a serial line
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            transport: TransportKind::Serial,
            ip: String::new(),
            serial_port: port.into(),
            baud_rate,
            interface: Interface::Scpi,
            channel: 0,
        }
    }

    /// PSU reached over a TCP socket
    pub fn ip(address: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Ip,
            ip: address.into(),
            serial_port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            interface: Interface::Scpi,
            channel: 0,
        }
    }

    /// Select the output channel
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    /// Override the software interface
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Human-readable endpoint for logs and errors
    pub fn endpoint(&self) -> String {
        match self.transport {
            TransportKind::Serial => format!("{}@{}", self.serial_port, self.baud_rate),
            TransportKind::Ip => self.ip.clone(),
            TransportKind::Unrecognized(ref tag) => format!("<{}>", tag),
        }
    }
}

/// Wiring of a whole test stand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Ethernet address of the readout board
    #[serde(rename = "addressRB", default)]
    pub readback_address: String,

    /// Power supplies, in the order referenced by settings and criteria
    #[serde(rename = "PSUConfigList", default)]
    pub psus: Vec<PsuConfig>,
}

impl EnvironmentConfig {
    /// Parse an environment from JSON
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Serialize the environment to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
