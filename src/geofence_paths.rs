//! Home-based storage paths for the geofence server and clients.
//!
//! Everything lives under `~/.geofence/` (or `$GEOFENCE_HOME` when set):
//! - `geofenced.port` - JSON port file written by the `geofenced` binary
//! - `geofenced-debug.log` - debug log appended by `daemon_log`
//! - `geofenced.yaml` - optional server configuration

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the geofence directory under the user's home.
const GEOFENCE_DIR: &str = ".geofence";

/// Environment variable that relocates the geofence home directory.
pub const GEOFENCE_HOME_ENV: &str = "GEOFENCE_HOME";

/// Returns the geofence home directory, creating it if needed.
///
/// # Errors
///
/// Returns an error if:
/// - `GEOFENCE_HOME` is unset and the home directory cannot be determined
/// - Directory creation fails
pub fn geofence_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var(GEOFENCE_HOME_ENV) {
        Ok(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for geofence storage")?
            .join(GEOFENCE_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create geofence directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the port file path: `<home>/geofenced.port`
pub fn port_file_path() -> Result<PathBuf> {
    Ok(geofence_home_dir()?.join("geofenced.port"))
}

/// Returns the debug log path: `<home>/geofenced-debug.log`
pub fn debug_log_path() -> Result<PathBuf> {
    Ok(geofence_home_dir()?.join("geofenced-debug.log"))
}

/// Returns the default server configuration path: `<home>/geofenced.yaml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(geofence_home_dir()?.join("geofenced.yaml"))
}

#[cfg(test)]
#[path = "tests/geofence_paths_tests.rs"]
mod tests;
