//! PSU connection factory used by the orchestrator

use async_trait::async_trait;
use standrig_core::{PsuConfig, Result, TransportSettings, VerificationSettings};
use standrig_hardware::PsuController;
use tracing::info;

/// Builds handshake-verified controllers for configured PSUs
///
/// The orchestrator only ever asks for controllers through this trait, so
/// tests can substitute scripted instruments for real hardware.
#[async_trait]
pub trait PsuConnector: Send + Sync {
    /// Open and handshake the PSU at position `index` of the environment
    async fn connect(&self, index: usize, config: &PsuConfig) -> Result<PsuController>;
}

/// Connector for real instruments
#[derive(Debug, Clone, Default)]
pub struct HardwareConnector {
    transport: TransportSettings,
    verification: VerificationSettings,
}

impl HardwareConnector {
    pub fn new(transport: TransportSettings, verification: VerificationSettings) -> Self {
        Self {
            transport,
            verification,
        }
    }
}

#[async_trait]
impl PsuConnector for HardwareConnector {
    async fn connect(&self, index: usize, config: &PsuConfig) -> Result<PsuController> {
        info!(
            "Connecting to PSU {} ({} at {})...",
            index,
            config.transport,
            config.endpoint()
        );

        let controller = PsuController::connect(config.clone(), &self.transport)
            .await?
            .with_verification(self.verification.tolerance());

        info!("PSU {} connected successfully", index);
        Ok(controller)
    }
}
