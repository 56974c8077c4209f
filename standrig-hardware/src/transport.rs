//! Instrument transport abstraction
//!
//! A transport is a line-oriented command channel to one instrument. Both
//! implementations observe the same contract:
//! - opening fails eagerly with `Connection` if the endpoint is unreachable
//! - `write`/`query` on a closed transport fail with `NotOpen`
//! - stale input is discarded before every command
//! - every write is followed by the configured settle delay
//! - `close` is idempotent and never fails

use async_trait::async_trait;
use standrig_core::{PsuConfig, Result, StandRigError, TransportKind, TransportSettings};
use tracing::debug;

use crate::serial_driver::SerialDriver;
use crate::socket_driver::SocketDriver;

/// Trait for instrument transport abstraction
///
/// This trait enables testing of `PsuController` without real hardware
/// by allowing mock implementations.
#[async_trait]
pub trait InstrumentTransport: Send {
    /// Send a command and read back one response line
    async fn query(&mut self, command: &str) -> Result<String>;

    /// Send a command without reading a response
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Release the underlying channel; safe to call repeatedly
    fn close(&mut self);

    /// Check if the transport is open
    fn is_open(&self) -> bool;

    /// Endpoint description for logs
    fn endpoint(&self) -> &str;
}

/// Open the transport described by `config`
pub async fn open_transport(
    config: &PsuConfig,
    settings: &TransportSettings,
) -> Result<Box<dyn InstrumentTransport>> {
    debug!("Opening {} transport to {}", config.transport, config.endpoint());

    match config.transport {
        TransportKind::Serial => {
            let driver = SerialDriver::open(&config.serial_port, config.baud_rate, settings)?;
            Ok(Box::new(driver))
        }
        TransportKind::Ip => {
            let driver = SocketDriver::connect(&config.ip, settings).await?;
            Ok(Box::new(driver))
        }
        TransportKind::Unrecognized(ref tag) => Err(StandRigError::Config(format!(
            "Unknown transport '{}' (expected Serial or IP)",
            tag
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_transport_is_config_error() {
        let mut config = PsuConfig::serial("/dev/null", 9600);
        config.transport = TransportKind::Unrecognized("CAN".to_string());

        // Rejected before any I/O, so no runtime is needed
        let result = tokio_test::block_on(open_transport(&config, &TransportSettings::default()));
        match result {
            Err(StandRigError::Config(msg)) => assert!(msg.contains("CAN")),
            Err(e) => panic!("Expected Config error, got {}", e),
            Ok(_) => panic!("Expected Config error"),
        }
    }

    #[tokio::test]
    async fn test_missing_serial_port_fails_at_open() {
        let config = PsuConfig::serial("/dev/standrig-does-not-exist", 115200);

        let result = open_transport(&config, &TransportSettings::default()).await;
        assert!(matches!(result, Err(StandRigError::Connection { .. })));
    }
}
