//! TCP socket driver for SCPI instruments
//!
//! Speaks the raw-socket SCPI convention: one command per line, one
//! response line per query, on a persistent connection.
//!
//! Like the serial driver, stale input is discarded before every command.
//! A query that timed out may still be answered later, so after a read
//! timeout the connection is re-established before the next command.

use async_trait::async_trait;
use standrig_core::{Result, StandRigError, TransportSettings};
use std::io::ErrorKind;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::serial_driver::decode_response;
use crate::transport::InstrumentTransport;

/// Resolve a configured address into `host:port`
///
/// Accepts `host`, `host:port`, a bare IPv6 address or `[v6]:port`.
/// `default_port` is used when the address carries none.
pub fn socket_endpoint(address: &str, default_port: u16) -> String {
    let address = address.trim();

    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => return format!("[{}]:{}", v6, default_port),
        Ok(IpAddr::V4(v4)) => return format!("{}:{}", v4, default_port),
        Err(_) => {}
    }

    if address.starts_with('[') && address.contains("]:") {
        return address.to_string();
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            address.to_string()
        }
        Some((host, "")) if !host.is_empty() => format!("{}:{}", host, default_port),
        _ => format!("{}:{}", address, default_port),
    }
}

/// Open a TCP connection to `endpoint` within `connect_timeout`
async fn dial(endpoint: &str, connect_timeout: Duration) -> Result<BufReader<TcpStream>> {
    debug!("Connecting to instrument at {}", endpoint);

    let stream = timeout(connect_timeout, TcpStream::connect(endpoint))
        .await
        .map_err(|_| {
            error!("Connection to {} timed out", endpoint);
            StandRigError::Connection {
                endpoint: endpoint.to_string(),
                reason: format!("timed out after {} ms", connect_timeout.as_millis()),
            }
        })?
        .map_err(|e| {
            error!("Failed to connect to {}: {}", endpoint, e);
            StandRigError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to disable Nagle on {}: {}", endpoint, e);
    }

    Ok(BufReader::new(stream))
}

/// Socket driver for instrument communication
pub struct SocketDriver {
    stream: Option<BufReader<TcpStream>>,
    endpoint: String,
    settle_delay: Duration,
    timeout_duration: Duration,
    connect_timeout: Duration,
    trace_wire: bool,
    /// A query went unanswered; its late reply may still arrive
    desynced: bool,
}

impl SocketDriver {
    /// Connect to an instrument
    ///
    /// The connection is established eagerly: an unreachable instrument
    /// fails here with `Connection`, not on the first command.
    pub async fn connect(address: &str, settings: &TransportSettings) -> Result<Self> {
        if address.trim().is_empty() {
            return Err(StandRigError::Connection {
                endpoint: "<empty>".to_string(),
                reason: "no IP address configured".to_string(),
            });
        }

        let endpoint = socket_endpoint(address, settings.scpi_port);
        let stream = dial(&endpoint, settings.connect_timeout()).await?;

        info!("Opened IP socket {}", endpoint);

        Ok(Self {
            stream: Some(stream),
            endpoint,
            settle_delay: settings.settle_delay(),
            timeout_duration: settings.read_timeout(),
            connect_timeout: settings.connect_timeout(),
            trace_wire: settings.trace_wire,
            desynced: false,
        })
    }

    fn stream_mut(&mut self) -> Result<&mut BufReader<TcpStream>> {
        let endpoint = &self.endpoint;
        self.stream
            .as_mut()
            .ok_or_else(|| StandRigError::NotOpen(format!("IP socket {} is not open", endpoint)))
    }

    /// Drop buffered and already received bytes
    fn discard_stale(&mut self) -> Result<()> {
        let reader = self.stream_mut()?;
        let mut discarded = reader.buffer().len();
        reader.consume(discarded);

        let mut scratch = [0u8; 256];
        loop {
            match reader.get_ref().try_read(&mut scratch) {
                // EOF is reported by the next read
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(StandRigError::Protocol(format!("Read error: {}", e))),
            }
        }

        if discarded > 0 {
            warn!("Discarded {} stale byte(s) from {}", discarded, self.endpoint);
        }
        Ok(())
    }

    /// Replace the connection after an unanswered query
    async fn reconnect(&mut self) -> Result<()> {
        self.stream_mut()?;
        warn!(
            "Reconnecting to {} after an unanswered query",
            self.endpoint
        );

        // Stays closed if the instrument cannot be reached again
        self.stream = None;
        self.stream = Some(dial(&self.endpoint, self.connect_timeout).await?);
        self.desynced = false;
        Ok(())
    }

    /// Discard stale input, send one command line and wait out the settle delay
    async fn send(&mut self, command: &str) -> Result<()> {
        let line = format!("{}\n", command.trim_end());
        let timeout_duration = self.timeout_duration;
        let settle_delay = self.settle_delay;

        if self.desynced {
            self.reconnect().await?;
        } else {
            self.discard_stale()?;
        }

        if self.trace_wire {
            debug!("TX {}: {:?}", self.endpoint, line);
        }

        let socket = self.stream_mut()?.get_mut();

        timeout(timeout_duration, socket.write_all(line.as_bytes()))
            .await
            .map_err(|_| StandRigError::Timeout("Write operation timed out".to_string()))?
            .map_err(|e| StandRigError::Protocol(format!("Write failed: {}", e)))?;

        timeout(timeout_duration, socket.flush())
            .await
            .map_err(|_| StandRigError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| StandRigError::Protocol(format!("Flush failed: {}", e)))?;

        sleep(settle_delay).await;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let timeout_duration = self.timeout_duration;
        let mut raw = Vec::new();

        let read = {
            let reader = self.stream_mut()?;
            timeout(timeout_duration, reader.read_until(b'\n', &mut raw)).await
        };

        match read {
            Ok(Ok(0)) => {
                warn!("Instrument at {} closed the connection", self.endpoint);
                return Err(StandRigError::Protocol(format!(
                    "Connection to {} closed by instrument",
                    self.endpoint
                )));
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!("Read error: {}", e);
                return Err(StandRigError::Protocol(format!("Read error: {}", e)));
            }
            Err(_) => {
                error!("Read timeout on {}", self.endpoint);
                self.desynced = true;
                return Err(StandRigError::Timeout(
                    "Read operation timed out".to_string(),
                ));
            }
        }

        let response = decode_response(&raw);
        if self.trace_wire {
            debug!("RX {}: {:?}", self.endpoint, response);
        }
        Ok(response)
    }
}

#[async_trait]
impl InstrumentTransport for SocketDriver {
    async fn query(&mut self, command: &str) -> Result<String> {
        self.send(command).await?;
        self.read_line().await
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        self.send(command).await
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Closed IP socket {}", self.endpoint);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
