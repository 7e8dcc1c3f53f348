//! Geofence client.
//!
//! - **Proxy (`proxy.rs`)**: `GeofenceClient`, the application-facing API.
//! - **Connection (`connection.rs`)**: method and signal channels to one server.
//! - **Query (`query.rs`)**: single-pass record sequences returned by queries.

pub mod connection;
pub mod proxy;
pub mod query;

pub use connection::{Connection, SignalHandler};
pub use proxy::GeofenceClient;
pub use query::{PlaceName, QueryResult, Records};
