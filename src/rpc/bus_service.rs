//! tarpc service definitions for the geofence bus.

use crate::rpc::{
    BusResult, Destination, GeofenceNotification, MatchRule, MethodCall, MethodReply, SignalKind,
    SubscriptionId,
};

/// Service exposed by the server on its method listener.
#[tarpc::service]
pub trait BusService {
    /// Announce the caller's process id.
    /// Must be called first; returns the unique name assigned to this connection.
    async fn hello(pid: u32) -> String;

    /// Whether some connection currently owns `name`.
    async fn name_has_owner(name: String) -> bool;

    /// Invoke a geofence method on `destination` and wait for its reply.
    async fn call_method(destination: Destination, call: MethodCall) -> BusResult<MethodReply>;

    /// Install a signal subscription for this connection.
    /// Requires the connection's signal channel to be attached.
    async fn add_match(rule: MatchRule) -> BusResult<SubscriptionId>;

    /// Remove a subscription previously installed by this connection.
    async fn remove_match(subscription: SubscriptionId) -> BusResult<()>;
}

/// Callback service for signal delivery (server -> client).
/// Clients implement this service on the signal channel; the server calls into it.
#[tarpc::service]
pub trait SignalSink {
    /// Unique name of the main connection this sink belongs to.
    async fn identify() -> String;

    /// Called once the server has registered this sink.
    async fn attached();

    /// Deliver one signal matched by `subscription`.
    async fn deliver(
        subscription: SubscriptionId,
        kind: SignalKind,
        notification: GeofenceNotification,
    );
}
