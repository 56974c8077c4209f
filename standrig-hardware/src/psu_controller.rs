//! PSU Controller - High-level interface for one power supply channel
//!
//! Binds a transport to a configured channel and speaks SCPI over it.
//! Every operation selects the channel first, so several controllers may
//! share one multi-channel instrument model without tracking its state.

use standrig_core::{Interface, PsuConfig, Result, StandRigError, TransportSettings};
use tracing::{debug, info, warn};

use crate::scpi::{parse_float, ScpiCommand};
use crate::transport::{open_transport, InstrumentTransport};

/// Power supply controller
///
/// Generic over the transport type, allowing real hardware (boxed
/// `dyn InstrumentTransport`) or mock transports for testing.
pub struct PsuController<T: InstrumentTransport + ?Sized = dyn InstrumentTransport> {
    transport: Option<Box<T>>,
    config: PsuConfig,
    idn: String,
    version: String,
    verify_tolerance: Option<f64>,
}

impl PsuController {
    /// Open the configured transport and perform the identity handshake
    pub async fn connect(config: PsuConfig, settings: &TransportSettings) -> Result<Self> {
        let transport = open_transport(&config, settings).await?;
        Self::handshake(transport, config).await
    }
}

impl<T: InstrumentTransport + ?Sized> PsuController<T> {
    /// Bind an already open transport and perform the identity handshake
    ///
    /// The transport is closed before returning if the handshake fails.
    pub async fn handshake(transport: Box<T>, config: PsuConfig) -> Result<Self> {
        let mut controller = Self {
            transport: Some(transport),
            config,
            idn: String::new(),
            version: String::new(),
            verify_tolerance: None,
        };

        match controller.identify().await {
            Ok(()) => Ok(controller),
            Err(e) => {
                warn!(
                    "Handshake with {} failed: {}",
                    controller.config.endpoint(),
                    e
                );
                controller.close();
                Err(e)
            }
        }
    }

    async fn identify(&mut self) -> Result<()> {
        self.idn = self.query(ScpiCommand::Identify).await?;
        self.version = self.query(ScpiCommand::SystemVersion).await?;
        info!("IDN: {}", self.idn);
        info!("Version: {}", self.version);
        Ok(())
    }

    /// Read back setpoints after writing them
    ///
    /// `Some(tolerance)` makes `set_voltage`/`set_current` query `VOLT?`/
    /// `CURR?` and fail with `Verification` if the instrument holds a value
    /// further than `tolerance` from the request. `None` keeps writes
    /// fire-and-forget.
    pub fn with_verification(mut self, tolerance: Option<f64>) -> Self {
        self.verify_tolerance = tolerance;
        self
    }

    /// Transport, provided it is open and speaks a supported interface
    fn transport_mut(&mut self) -> Result<&mut T> {
        let transport = match self.transport.as_deref_mut() {
            Some(transport) if transport.is_open() => transport,
            _ => {
                return Err(StandRigError::NotOpen(format!(
                    "PSU at {} is not open",
                    self.config.endpoint()
                )))
            }
        };

        match self.config.interface {
            Interface::Scpi => Ok(transport),
            Interface::Unrecognized(ref name) => Err(StandRigError::UnsupportedInterface(
                name.clone(),
            )),
        }
    }

    async fn write(&mut self, command: ScpiCommand) -> Result<()> {
        debug!("Sending command: {}", command);
        self.transport_mut()?.write(&command.to_string()).await
    }

    async fn query(&mut self, command: ScpiCommand) -> Result<String> {
        debug!("Sending query: {}", command);
        self.transport_mut()?.query(&command.to_string()).await
    }

    async fn select_channel(&mut self) -> Result<()> {
        let channel = self.config.channel;
        self.write(ScpiCommand::SelectChannel(channel)).await
    }

    /// Compare a read-back setpoint against the requested value
    async fn verify(&mut self, readback: ScpiCommand, quantity: &str, requested: f64) -> Result<()> {
        let Some(tolerance) = self.verify_tolerance else {
            return Ok(());
        };

        let response = self.query(readback).await?;
        let actual = parse_float(&response)?;
        if (actual - requested).abs() > tolerance {
            return Err(StandRigError::Verification {
                quantity: quantity.to_string(),
                requested,
                readback: actual,
            });
        }

        debug!("Verified {} setpoint {} (read back {})", quantity, requested, actual);
        Ok(())
    }

    /// Program the voltage setpoint
    pub async fn set_voltage(&mut self, volts: f64) -> Result<()> {
        self.select_channel().await?;
        self.write(ScpiCommand::SetVoltage(volts)).await?;
        self.verify(ScpiCommand::VoltageSetpoint, "voltage", volts).await
    }

    /// Program the current setpoint
    pub async fn set_current(&mut self, amps: f64) -> Result<()> {
        self.select_channel().await?;
        self.write(ScpiCommand::SetCurrent(amps)).await?;
        self.verify(ScpiCommand::CurrentSetpoint, "current", amps).await
    }

    /// Measure the output voltage
    pub async fn measure_voltage(&mut self) -> Result<f64> {
        self.select_channel().await?;
        let response = self.query(ScpiCommand::MeasureVoltage).await?;
        parse_float(&response)
    }

    /// Measure the output current
    pub async fn measure_current(&mut self) -> Result<f64> {
        self.select_channel().await?;
        let response = self.query(ScpiCommand::MeasureCurrent).await?;
        parse_float(&response)
    }

    /// Enable the output
    pub async fn turn_on(&mut self) -> Result<()> {
        self.select_channel().await?;
        self.write(ScpiCommand::Output(true)).await
    }

    /// Disable the output
    pub async fn turn_off(&mut self) -> Result<()> {
        self.select_channel().await?;
        self.write(ScpiCommand::Output(false)).await
    }

    /// Close the transport; safe to call repeatedly
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            debug!("Released PSU at {}", self.config.endpoint());
        }
    }

    /// Check if the transport is open
    pub fn is_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// `*IDN?` answer captured at handshake
    pub fn idn(&self) -> &str {
        &self.idn
    }

    /// `SYST:VERS?` answer captured at handshake
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &PsuConfig {
        &self.config
    }
}

impl<T: InstrumentTransport + ?Sized> Drop for PsuController<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockInstrument, MockTransport};

    async fn create_mock_controller(instrument: &MockInstrument) -> PsuController<MockTransport> {
        PsuController::handshake(
            instrument.transport(),
            PsuConfig::serial("/dev/ttyMOCK", 115200).with_channel(2),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_captures_identity() {
        let instrument = MockInstrument::new();
        let controller = create_mock_controller(&instrument).await;

        assert_eq!(controller.idn(), "MOCK,PSU-3000,0001,1.0");
        assert_eq!(controller.version(), "1999.0");
        assert!(controller.is_open());
        assert_eq!(instrument.commands(), vec!["*IDN?", "SYST:VERS?"]);
    }

    #[tokio::test]
    async fn test_failed_handshake_closes_transport() {
        let instrument = MockInstrument::new();
        instrument.fail_on("SYST:VERS?", "no such command");

        let result =
            PsuController::handshake(instrument.transport(), PsuConfig::ip("10.0.0.5")).await;

        assert!(matches!(result, Err(StandRigError::Protocol(_))));
        assert_eq!(instrument.close_count(), 1);
    }

    #[tokio::test]
    async fn test_every_operation_selects_channel() {
        let instrument = MockInstrument::new();
        instrument
            .respond("MEAS:VOLT?", "1.000")
            .respond("MEAS:CURR?", "0.004");
        let mut controller = create_mock_controller(&instrument).await;

        controller.turn_off().await.unwrap();
        controller.set_voltage(1.0).await.unwrap();
        controller.set_current(0.005).await.unwrap();
        controller.turn_on().await.unwrap();
        assert_eq!(controller.measure_voltage().await.unwrap(), 1.0);
        assert_eq!(controller.measure_current().await.unwrap(), 0.004);

        assert_eq!(
            instrument.commands()[2..],
            [
                "INST:SEL 2",
                "OUTP:STAT 0",
                "INST:SEL 2",
                "VOLT 1",
                "INST:SEL 2",
                "CURR 0.005",
                "INST:SEL 2",
                "OUTP:STAT 1",
                "INST:SEL 2",
                "MEAS:VOLT?",
                "INST:SEL 2",
                "MEAS:CURR?",
            ]
        );
        assert_eq!(instrument.output_on(), Some(true));
    }

    #[tokio::test]
    async fn test_measure_voltage_extracts_number() {
        let instrument = MockInstrument::new();
        instrument.respond("MEAS:VOLT?", "VOLT 3.30\n");
        let mut controller = create_mock_controller(&instrument).await;

        assert_eq!(controller.measure_voltage().await.unwrap(), 3.30);
    }

    #[tokio::test]
    async fn test_measure_without_number_is_parse_error() {
        let instrument = MockInstrument::new();
        instrument.respond("MEAS:CURR?", "ERR\n");
        let mut controller = create_mock_controller(&instrument).await;

        assert!(matches!(
            controller.measure_current().await,
            Err(StandRigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_after_close_are_not_open() {
        let instrument = MockInstrument::new();
        let mut controller = create_mock_controller(&instrument).await;

        controller.close();
        assert!(!controller.is_open());
        assert!(matches!(
            controller.turn_on().await,
            Err(StandRigError::NotOpen(_))
        ));
        assert!(matches!(
            controller.measure_voltage().await,
            Err(StandRigError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_close_twice_and_drop() {
        let instrument = MockInstrument::new();
        let mut controller = create_mock_controller(&instrument).await;

        controller.close();
        controller.close();
        drop(controller);

        assert_eq!(instrument.close_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_transport() {
        let instrument = MockInstrument::new();
        {
            let _controller = create_mock_controller(&instrument).await;
        }
        assert_eq!(instrument.close_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_interface() {
        let instrument = MockInstrument::new();
        let config = PsuConfig::serial("/dev/ttyMOCK", 9600)
            .with_interface(Interface::Unrecognized("MODBUS".to_string()));

        let result = PsuController::handshake(instrument.transport(), config).await;

        match result {
            Err(StandRigError::UnsupportedInterface(name)) => assert_eq!(name, "MODBUS"),
            Err(e) => panic!("Expected UnsupportedInterface, got {}", e),
            Ok(_) => panic!("Expected UnsupportedInterface"),
        }
        assert!(instrument.commands().is_empty());
        assert_eq!(instrument.close_count(), 1);
    }

    #[tokio::test]
    async fn test_verification_accepts_matching_readback() {
        let instrument = MockInstrument::new();
        instrument.respond("VOLT?", "1.004");
        let mut controller = create_mock_controller(&instrument)
            .await
            .with_verification(Some(0.01));

        controller.set_voltage(1.0).await.unwrap();
        assert_eq!(instrument.commands().last().unwrap(), "VOLT?");
    }

    #[tokio::test]
    async fn test_verification_rejects_mismatch() {
        let instrument = MockInstrument::new();
        instrument.respond("CURR?", "0.100");
        let mut controller = create_mock_controller(&instrument)
            .await
            .with_verification(Some(0.001));

        match controller.set_current(0.005).await {
            Err(StandRigError::Verification {
                quantity,
                requested,
                readback,
            }) => {
                assert_eq!(quantity, "current");
                assert_eq!(requested, 0.005);
                assert_eq!(readback, 0.1);
            }
            other => panic!("Expected Verification error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_no_verification_by_default() {
        let instrument = MockInstrument::new();
        let mut controller = create_mock_controller(&instrument).await;

        controller.set_voltage(2.5).await.unwrap();
        assert!(!instrument.commands().contains(&"VOLT?".to_string()));
    }
}
