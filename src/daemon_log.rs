//! Shared debug logging utility for server and client components.

use std::io::Write;

/// Appends a tagged line to the geofence debug log.
///
/// The `tag` parameter identifies the source module (e.g., "server", "dispatch",
/// "signal", "client") to aid debugging.
///
/// Writes to `<geofence home>/geofenced-debug.log`. Failures are ignored.
pub fn daemon_log(tag: &str, msg: &str) {
    if let Ok(log_path) = crate::geofence_paths::debug_log_path() {
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", now, tag, msg);
        }
    }
    tracing::debug!(target: "geofence", "[{}] {}", tag, msg);
}
