//! Serial driver for SCPI instruments
//!
//! Provides async serial I/O with a bench power supply.

use async_trait::async_trait;
use standrig_core::{Result, StandRigError, TransportSettings};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use crate::transport::InstrumentTransport;

/// Serial driver for instrument communication
pub struct SerialDriver {
    port: Option<SerialStream>,
    port_path: String,
    settle_delay: Duration,
    timeout_duration: Duration,
    trace_wire: bool,
}

impl SerialDriver {
    /// Open a serial port to an instrument
    ///
    /// # Arguments
    /// * `port_path` - Path to the serial device (e.g., "/dev/ttyACM0")
    /// * `baud_rate` - Line speed
    /// * `settings` - Settle delay, read timeout and wire tracing
    pub fn open(port_path: &str, baud_rate: u32, settings: &TransportSettings) -> Result<Self> {
        debug!("Opening serial port: {} at {} baud", port_path, baud_rate);

        let port = tokio_serial::new(port_path, baud_rate)
            .timeout(settings.read_timeout())
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_path, e);
                StandRigError::Connection {
                    endpoint: port_path.to_string(),
                    reason: e.to_string(),
                }
            })?;

        // Discard whatever the instrument emitted before we attached
        if let Err(e) = port.clear(tokio_serial::ClearBuffer::All) {
            warn!("Failed to clear buffers on {}: {}", port_path, e);
        }

        info!("Opened serial port {}", port_path);

        Ok(Self {
            port: Some(port),
            port_path: port_path.to_string(),
            settle_delay: settings.settle_delay(),
            timeout_duration: settings.read_timeout(),
            trace_wire: settings.trace_wire,
        })
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream> {
        let port_path = &self.port_path;
        self.port
            .as_mut()
            .ok_or_else(|| StandRigError::NotOpen(format!("Serial port {} is not open", port_path)))
    }

    /// Flush stale bytes, send one command line and wait out the settle delay
    async fn send(&mut self, command: &str) -> Result<()> {
        let line = format!("{}\n", command.trim_end());
        let timeout_duration = self.timeout_duration;
        let settle_delay = self.settle_delay;

        if self.trace_wire {
            debug!("TX {}: {:?}", self.port_path, line);
        }

        let port = self.port_mut()?;

        port.clear(tokio_serial::ClearBuffer::All)
            .map_err(|e| StandRigError::Protocol(format!("Failed to clear buffers: {}", e)))?;

        timeout(timeout_duration, port.write_all(line.as_bytes()))
            .await
            .map_err(|_| StandRigError::Timeout("Write operation timed out".to_string()))?
            .map_err(|e| StandRigError::Protocol(format!("Write failed: {}", e)))?;

        timeout(timeout_duration, port.flush())
            .await
            .map_err(|_| StandRigError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| StandRigError::Protocol(format!("Flush failed: {}", e)))?;

        sleep(settle_delay).await;
        Ok(())
    }

    /// Read one newline-terminated response line
    async fn read_line(&mut self) -> Result<String> {
        let timeout_duration = self.timeout_duration;
        let mut raw = Vec::new();

        let read = {
            let port = self.port_mut()?;
            let mut reader = BufReader::new(port);
            timeout(timeout_duration, reader.read_until(b'\n', &mut raw)).await
        };

        match read {
            Ok(Ok(0)) => {
                warn!("Serial port returned EOF - device may have been disconnected");
                return Err(StandRigError::Protocol(
                    "Serial port returned EOF - device may have been unplugged".to_string(),
                ));
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!("Read error: {}", e);
                return Err(StandRigError::Protocol(format!("Read error: {}", e)));
            }
            Err(_) => {
                error!("Read timeout on {}", self.port_path);
                return Err(StandRigError::Timeout(
                    "Read operation timed out".to_string(),
                ));
            }
        }

        let response = decode_response(&raw);
        if self.trace_wire {
            debug!("RX {}: {:?}", self.port_path, response);
        }
        Ok(response)
    }
}

/// Decode a response line, treating undecodable bytes as an empty response
pub(crate) fn decode_response(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("Unreadable response {:?}: {}", raw, e);
            String::new()
        }
    }
}

#[async_trait]
impl InstrumentTransport for SerialDriver {
    async fn query(&mut self, command: &str) -> Result<String> {
        self.send(command).await?;
        self.read_line().await
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        self.send(command).await
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.port_path);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn endpoint(&self) -> &str {
        &self.port_path
    }
}
