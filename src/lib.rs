//! Geofence IPC: the client/server protocol between geofence applications
//! and the privileged geofence server.
//!
//! Clients add, remove, enable and query geofences and places through remote
//! calls (`client::GeofenceClient`); the server (`server::GeofenceServer`)
//! routes those calls to engine callbacks and pushes in/out and event signals
//! back to subscribed clients. Sessions of clients that vanish are expired
//! and abandoned signal categories are reported to the engine.

pub mod client;
pub mod config;
pub mod daemon_log;
pub mod engine;
pub mod geofence_paths;
pub mod identity;
pub mod rpc;
pub mod server;
pub mod status;

pub use client::GeofenceClient;
pub use server::{Capabilities, GeofenceServer};
pub use status::{GeofenceError, GeofenceResult, StatusCode};
