//! Status taxonomy shared by the client proxy and the server.
//!
//! `StatusCode` is the wire-level enumeration and includes `None` (success).
//! `GeofenceError` is what Rust callers see in `Result` returns: every status
//! except `None`.

use serde::{Deserialize, Serialize};

/// Status value carried across the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusCode {
    /// Success.
    #[default]
    None,
    /// Invalid handle or argument, detected locally before any transport activity.
    ParameterError,
    /// Local resource setup failed.
    MemoryError,
    /// The transport connection could not be established.
    ConnectionError,
    /// The remote endpoint could not be obtained, so the call was never dispatched.
    AccessDenied,
    /// The call was dispatched but the transport reported failure.
    DbusCallError,
    /// A query executed but produced no usable result payload.
    NoResult,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        self == StatusCode::None
    }

    /// Converts the status into a `Result`, mapping `None` to `Ok(())`.
    pub fn into_result(self) -> Result<(), GeofenceError> {
        match GeofenceError::from_status(self) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::None => write!(f, "None"),
            StatusCode::ParameterError => write!(f, "ParameterError"),
            StatusCode::MemoryError => write!(f, "MemoryError"),
            StatusCode::ConnectionError => write!(f, "ConnectionError"),
            StatusCode::AccessDenied => write!(f, "AccessDenied"),
            StatusCode::DbusCallError => write!(f, "DbusCallError"),
            StatusCode::NoResult => write!(f, "NoResult"),
        }
    }
}

/// Error half of the status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeofenceError {
    /// Invalid or already-released handle, or an invalid argument.
    Parameter,
    /// Session setup failed, e.g. the connection has no signal channel.
    Memory,
    /// Transport connection could not be established or was lost during setup.
    Connection,
    /// The service endpoint could not be obtained.
    AccessDenied,
    /// Dispatched call failed in transport, or subscriptions could not be installed.
    DbusCall,
    /// Query produced no usable result.
    NoResult,
}

impl GeofenceError {
    pub fn status(self) -> StatusCode {
        match self {
            GeofenceError::Parameter => StatusCode::ParameterError,
            GeofenceError::Memory => StatusCode::MemoryError,
            GeofenceError::Connection => StatusCode::ConnectionError,
            GeofenceError::AccessDenied => StatusCode::AccessDenied,
            GeofenceError::DbusCall => StatusCode::DbusCallError,
            GeofenceError::NoResult => StatusCode::NoResult,
        }
    }

    /// Returns the error for a non-success status, or `None` for success.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::None => None,
            StatusCode::ParameterError => Some(GeofenceError::Parameter),
            StatusCode::MemoryError => Some(GeofenceError::Memory),
            StatusCode::ConnectionError => Some(GeofenceError::Connection),
            StatusCode::AccessDenied => Some(GeofenceError::AccessDenied),
            StatusCode::DbusCallError => Some(GeofenceError::DbusCall),
            StatusCode::NoResult => Some(GeofenceError::NoResult),
        }
    }
}

impl From<GeofenceError> for StatusCode {
    fn from(err: GeofenceError) -> Self {
        err.status()
    }
}

impl std::fmt::Display for GeofenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeofenceError::Parameter => write!(f, "Invalid parameter or handle"),
            GeofenceError::Memory => write!(f, "Session setup failed"),
            GeofenceError::Connection => write!(f, "Connection to the bus failed"),
            GeofenceError::AccessDenied => write!(f, "Access denied: service endpoint unavailable"),
            GeofenceError::DbusCall => write!(f, "Remote call failed"),
            GeofenceError::NoResult => write!(f, "No result"),
        }
    }
}

impl std::error::Error for GeofenceError {}

/// Result type for geofence operations.
pub type GeofenceResult<T> = Result<T, GeofenceError>;

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
