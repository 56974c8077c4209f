//! Default path resolution for configuration files
//!
//! Follows the platform's user configuration directory as reported by `dirs`.

use std::path::PathBuf;

/// Returns the default path for the station configuration file.
///
/// - Linux: `$XDG_CONFIG_HOME/standrig/station.toml` (usually `~/.config`)
/// - macOS: `~/Library/Application Support/standrig/station.toml`
/// - Windows: `%APPDATA%\standrig\station.toml`
/// - Fallback: `/etc/standrig/station.toml`
pub fn default_station_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("standrig")
        .join("station.toml")
}
