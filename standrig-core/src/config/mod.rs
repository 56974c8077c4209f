//! Configuration types for StandRig
//!
//! Configuration is split into:
//! - [`EnvironmentConfig`] - wiring of the test stand (which PSUs, how they are reached)
//! - [`TestSettings`] - operating points and pass/fail criteria for one test
//! - [`StationConfig`] - transport timing and operator options, loaded once at startup
//!
//! Environment and settings files are JSON and stay readable by the older
//! tooling that produced them. The station file is TOML.

mod environment;
mod paths;
mod plan;
mod settings;
mod station;

pub use environment::{EnvironmentConfig, PsuConfig, DEFAULT_BAUD_RATE};
pub use paths::default_station_config_path;
pub use plan::validate_plan;
pub use settings::{Criterion, PsuSettings, TestSettings};
pub use station::{OperatorSettings, StationConfig, TransportSettings, VerificationSettings};
