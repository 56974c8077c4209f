//! Configuration loading for the runner
//!
//! Reads the environment and settings JSON files and assembles the station
//! configuration from its priority chain.

mod runtime_config;

pub use runtime_config::{load_environment, load_settings, load_station, StationBuilder};
