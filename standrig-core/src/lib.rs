//! StandRig Core Library
//!
//! Shared types, configuration and errors for StandRig PSU test stands.
//! This crate is used by both the instrument drivers and the test runner.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    default_station_config_path, validate_plan, Criterion, EnvironmentConfig, PsuConfig,
    OperatorSettings, PsuSettings, StationConfig, TestSettings, TransportSettings,
    VerificationSettings,
};
pub use error::*;
pub use types::*;
