//! Runtime configuration loading
//!
//! Environment and settings files are supplied per run; the station file is
//! optional and falls back to defaults.

use standrig_core::{EnvironmentConfig, Result, StandRigError, StationConfig, TestSettings};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Environment variable overriding the settle delay in milliseconds
pub const ENV_SETTLE_DELAY_MS: &str = "STANDRIG_SETTLE_DELAY_MS";
/// Environment variable skipping the operator prompts (`1`/`true`)
pub const ENV_AUTO_CONFIRM: &str = "STANDRIG_AUTO_CONFIRM";

async fn read_file(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).await.map_err(|e| {
        StandRigError::Config(format!(
            "Failed to read {} file '{}': {}",
            what,
            path.display(),
            e
        ))
    })
}

/// Load the test-stand wiring from a JSON file
pub async fn load_environment(path: &Path) -> Result<EnvironmentConfig> {
    debug!("Loading environment from: {}", path.display());
    let content = read_file(path, "environment").await?;

    let environment = EnvironmentConfig::from_json(&content).map_err(|e| {
        StandRigError::Config(format!(
            "Failed to parse environment file '{}': {}",
            path.display(),
            e
        ))
    })?;

    info!(
        "Environment loaded: {} PSU(s) from {}",
        environment.psus.len(),
        path.display()
    );
    Ok(environment)
}

/// Load the conditions of one run from a JSON file
pub async fn load_settings(path: &Path) -> Result<TestSettings> {
    debug!("Loading test settings from: {}", path.display());
    let content = read_file(path, "settings").await?;

    let settings = TestSettings::from_json(&content).map_err(|e| {
        StandRigError::Config(format!(
            "Failed to parse settings file '{}': {}",
            path.display(),
            e
        ))
    })?;

    info!(
        "Settings loaded: {} PSU setting(s), {} criteria",
        settings.psu_settings.len(),
        settings.criteria.len()
    );
    Ok(settings)
}

/// Load the station file, using defaults if it does not exist
pub async fn load_station(path: &Path) -> Result<StationConfig> {
    if !path.exists() {
        info!(
            "Station config not found at {}. Using defaults.",
            path.display()
        );
        return Ok(StationConfig::default());
    }

    let content = read_file(path, "station").await?;
    StationConfig::from_toml(&content).map_err(|e| {
        StandRigError::Config(format!(
            "Failed to parse station file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Builder for the station configuration with priority chain support
///
/// Priority chain (lowest to highest):
/// 1. Defaults
/// 2. Station file
/// 3. Environment variables
/// 4. CLI arguments
///
/// Higher-priority sources are applied to the builder first; lower ones
/// only fill what is still unset.
#[derive(Debug, Default)]
pub struct StationBuilder {
    settle_delay_ms: Option<u64>,
    auto_confirm: Option<bool>,
    verify_setpoints: Option<bool>,
    trace_wire: Option<bool>,
}

impl StationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the settle delay, if given
    pub fn with_settle_delay_ms(mut self, delay_ms: Option<u64>) -> Self {
        if delay_ms.is_some() {
            self.settle_delay_ms = delay_ms;
        }
        self
    }

    /// Skip operator prompts when `yes` is set
    pub fn with_auto_confirm(mut self, yes: bool) -> Self {
        if yes {
            self.auto_confirm = Some(true);
        }
        self
    }

    /// Enable setpoint read-back when `verify` is set
    pub fn with_verify_setpoints(mut self, verify: bool) -> Self {
        if verify {
            self.verify_setpoints = Some(true);
        }
        self
    }

    /// Trace instrument traffic when `trace` is set
    pub fn with_trace_wire(mut self, trace: bool) -> Self {
        if trace {
            self.trace_wire = Some(true);
        }
        self
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.settle_delay_ms.is_none() {
            if let Some(value) = lookup(ENV_SETTLE_DELAY_MS) {
                match value.trim().parse() {
                    Ok(delay_ms) => self.settle_delay_ms = Some(delay_ms),
                    Err(_) => warn!("Ignoring invalid {}='{}'", ENV_SETTLE_DELAY_MS, value),
                }
            }
        }

        if self.auto_confirm.is_none() {
            if let Some(value) = lookup(ENV_AUTO_CONFIRM) {
                self.auto_confirm = Some(value.to_lowercase() == "true" || value == "1");
            }
        }

        self
    }

    /// Apply the collected overrides on top of a loaded station config
    pub fn apply(self, mut station: StationConfig) -> StationConfig {
        if let Some(delay_ms) = self.settle_delay_ms {
            station.transport.settle_delay_ms = delay_ms;
        }
        if let Some(auto_confirm) = self.auto_confirm {
            station.operator.auto_confirm = auto_confirm;
        }
        if let Some(verify) = self.verify_setpoints {
            station.verification.verify_setpoints = verify;
        }
        if let Some(trace) = self.trace_wire {
            station.transport.trace_wire = trace;
        }
        station
    }

    /// Load the station file at `path` and apply the overrides
    pub async fn build(self, path: &Path) -> Result<StationConfig> {
        let station = load_station(path).await?;
        let station = self.apply(station);
        debug!("Station configuration: {:?}", station);
        Ok(station)
    }
}
