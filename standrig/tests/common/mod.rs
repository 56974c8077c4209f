//! Shared fixtures for runner integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use standrig::{Operator, Phase, PsuConnector, RunEvent};
use standrig_core::{
    Criterion, EnvironmentConfig, PsuConfig, PsuSettings, Result, StandRigError, TestSettings,
};
use standrig_hardware::mock::MockInstrument;
use standrig_hardware::{InstrumentTransport, PsuController};

/// Connector handing out scripted instruments by PSU index
///
/// `None` makes the connection attempt for that index fail.
pub struct MockConnector {
    pub instruments: Vec<Option<MockInstrument>>,
}

impl MockConnector {
    pub fn new(instruments: &[MockInstrument]) -> Self {
        Self {
            instruments: instruments.iter().cloned().map(Some).collect(),
        }
    }
}

#[async_trait]
impl PsuConnector for MockConnector {
    async fn connect(&self, index: usize, config: &PsuConfig) -> Result<PsuController> {
        match self.instruments.get(index).cloned().flatten() {
            Some(instrument) => {
                let transport: Box<dyn InstrumentTransport> = instrument.transport();
                PsuController::handshake(transport, config.clone()).await
            }
            None => Err(StandRigError::Connection {
                endpoint: config.endpoint(),
                reason: "no instrument attached".to_string(),
            }),
        }
    }
}

/// Operator that confirms every gate and keeps every event
#[derive(Default)]
pub struct RecordingOperator {
    pub events: Vec<RunEvent>,
    pub gates: Vec<Phase>,
}

impl RecordingOperator {
    pub fn disabled(&self) -> Vec<(usize, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Disabled(outcome) => Some((outcome.psu_index, outcome.turned_off)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Operator for RecordingOperator {
    fn notify(&mut self, event: &RunEvent) {
        self.events.push(event.clone());
    }

    async fn acknowledge(&mut self, next: Phase) -> Result<()> {
        self.gates.push(next);
        Ok(())
    }
}

/// Environment of `count` serial PSUs on channel 0
pub fn environment(count: usize) -> EnvironmentConfig {
    EnvironmentConfig {
        readback_address: String::new(),
        psus: (0..count)
            .map(|i| PsuConfig::serial(format!("/dev/ttyMOCK{}", i), 115200))
            .collect(),
    }
}

pub fn settings(psu_settings: Vec<PsuSettings>, criteria: Vec<Criterion>) -> TestSettings {
    TestSettings {
        psu_settings,
        criteria,
        ..TestSettings::default()
    }
}

/// Commands received after the identity handshake
pub fn after_handshake(instrument: &MockInstrument) -> Vec<String> {
    instrument.commands().into_iter().skip(2).collect()
}
