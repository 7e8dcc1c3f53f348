//! RPC definitions for the geofence bus.
//!
//! This module defines:
//! - `protocol`: method calls, replies, signal payloads and match rules
//! - `bus_service`: the tarpc services (client -> server calls, server -> client signals)
//! - `BusError`: transport-level failures reported by the server

pub mod bus_service;
pub mod protocol;

use serde::{Deserialize, Serialize};

pub use protocol::*;

/// Errors returned by bus-level RPC methods.
///
/// These describe why a call could not be routed or a subscription could not
/// be changed. Engine outcomes travel inside `MethodReply` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusError {
    /// No connection owns the requested service name
    ServiceUnknown { name: String },
    /// The service does not export the requested object path
    UnknownObject { path: String },
    /// The object does not implement the requested interface
    UnknownInterface { interface: String },
    /// A signal subscription was requested before the signal channel attached
    NoSignalSink,
    /// Subscription id is unknown or owned by another connection
    UnknownSubscription { id: SubscriptionId },
    /// Server is shutting down
    ShuttingDown,
}

impl BusError {
    /// True when the call never reached a method dispatcher.
    pub fn is_routing_failure(&self) -> bool {
        matches!(
            self,
            BusError::ServiceUnknown { .. }
                | BusError::UnknownObject { .. }
                | BusError::UnknownInterface { .. }
        )
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::ServiceUnknown { name } => {
                write!(f, "The name {} was not provided by any service", name)
            }
            BusError::UnknownObject { path } => write!(f, "No such object path: {}", path),
            BusError::UnknownInterface { interface } => {
                write!(f, "No such interface: {}", interface)
            }
            BusError::NoSignalSink => write!(f, "Signal channel is not attached"),
            BusError::UnknownSubscription { id } => write!(f, "Unknown subscription: {}", id),
            BusError::ShuttingDown => write!(f, "Server is shutting down"),
        }
    }
}

impl std::error::Error for BusError {}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
