//! Client half of the bus: method channel, signal channel and signal routing.
//!
//! Architecture:
//! 1. Connect the method channel and say `hello`, which yields this
//!    connection's unique name
//! 2. Connect the signal channel and run a `SignalSink` server on it
//! 3. The server asks the sink to identify itself, registers it, and
//!    confirms with `attached`
//! 4. Delivered signals are routed to handlers by subscription id

use crate::config::ClientConfig;
use crate::daemon_log::daemon_log;
use crate::rpc::bus_service::{BusServiceClient, SignalSink};
use crate::rpc::{
    BusError, Destination, GeofenceNotification, MatchRule, MethodCall, MethodReply, SignalKind,
    SubscriptionId,
};
use crate::status::{GeofenceError, GeofenceResult};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tarpc::server::{self, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::sync::oneshot;

/// Receives signals for one subscription.
pub type SignalHandler = Arc<dyn Fn(SignalKind, &GeofenceNotification) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Subscription id -> handler table shared with the sink server.
#[derive(Clone, Default)]
pub(crate) struct SignalRouter {
    routes: Arc<Mutex<HashMap<SubscriptionId, SignalHandler>>>,
    /// Held while a handler runs so invocations never overlap.
    dispatching: Arc<Mutex<()>>,
}

impl SignalRouter {
    pub(crate) fn insert(&self, id: SubscriptionId, handler: SignalHandler) {
        lock(&self.routes).insert(id, handler);
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        lock(&self.routes).remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.routes).len()
    }

    /// Run the handler of `id`. Returns false when no handler is installed.
    pub(crate) fn route(
        &self,
        id: SubscriptionId,
        kind: SignalKind,
        notification: &GeofenceNotification,
    ) -> bool {
        let handler = lock(&self.routes).get(&id).cloned();
        match handler {
            Some(handler) => {
                let _serialized = lock(&self.dispatching);
                handler(kind, notification);
                true
            }
            None => false,
        }
    }
}

/// Handler that implements SignalSink and routes deliveries.
#[derive(Clone)]
struct SinkHandler {
    identity: String,
    router: SignalRouter,
    attached: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl SignalSink for SinkHandler {
    async fn identify(self, _: tarpc::context::Context) -> String {
        self.identity
    }

    async fn attached(self, _: tarpc::context::Context) {
        if let Some(tx) = lock(&self.attached).take() {
            let _ = tx.send(());
        }
    }

    async fn deliver(
        self,
        _: tarpc::context::Context,
        subscription: SubscriptionId,
        kind: SignalKind,
        notification: GeofenceNotification,
    ) {
        if !self.router.route(subscription, kind, &notification) {
            daemon_log(
                "connection",
                &format!("Dropped {} for unknown subscription {}", kind, subscription),
            );
        }
    }
}

fn call_failed(context: &str, e: impl std::fmt::Display) -> GeofenceError {
    daemon_log("connection", &format!("{} failed: {}", context, e));
    GeofenceError::DbusCall
}

/// A missing signal sink means this connection's session was never set up.
fn subscribe_failed(signal: SignalKind, e: BusError) -> GeofenceError {
    match e {
        BusError::NoSignalSink => {
            daemon_log(
                "connection",
                &format!("{} subscription has no session: {}", signal, e),
            );
            GeofenceError::Memory
        }
        e => call_failed(signal.member(), e),
    }
}

/// An open connection to a geofence server.
///
/// Dropping it closes both channels; the server treats that as peer loss.
pub struct Connection {
    client: BusServiceClient,
    unique_name: String,
    router: SignalRouter,
    call_timeout: Duration,
    sink_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn connect(config: &ClientConfig) -> GeofenceResult<Self> {
        use tarpc::client;
        use tarpc::serde_transport::tcp;

        let (method_addr, signal_addr) = config.endpoints().map_err(|e| {
            daemon_log("connection", &format!("No server address: {:#}", e));
            GeofenceError::Connection
        })?;
        let call_timeout = config.call_timeout();

        let transport = tcp::connect(&method_addr, Bincode::default)
            .await
            .map_err(|e| {
                daemon_log(
                    "connection",
                    &format!("Failed to connect to {}: {}", method_addr, e),
                );
                GeofenceError::Connection
            })?;
        let client = BusServiceClient::new(client::Config::default(), transport).spawn();

        let unique_name = client
            .hello(deadline_context(call_timeout), std::process::id())
            .await
            .map_err(|e| {
                daemon_log("connection", &format!("Hello failed: {}", e));
                GeofenceError::Connection
            })?;

        let sink_transport = tcp::connect(&signal_addr, Bincode::default)
            .await
            .map_err(|e| {
                daemon_log(
                    "connection",
                    &format!("Failed to connect signal channel {}: {}", signal_addr, e),
                );
                GeofenceError::Connection
            })?;

        let router = SignalRouter::default();
        let (attached_tx, attached_rx) = oneshot::channel();
        let handler = SinkHandler {
            identity: unique_name.clone(),
            router: router.clone(),
            attached: Arc::new(Mutex::new(Some(attached_tx))),
        };

        // The server calls into this sink to push signals.
        let sink_task = tokio::spawn(async move {
            let channel = server::BaseChannel::with_defaults(sink_transport);
            channel
                .execute(handler.serve())
                .for_each(|response| async {
                    tokio::spawn(response);
                })
                .await;
        });

        match tokio::time::timeout(call_timeout, attached_rx).await {
            Ok(Ok(())) => {}
            _ => {
                sink_task.abort();
                daemon_log("connection", "Signal channel was never attached");
                return Err(GeofenceError::Connection);
            }
        }

        daemon_log(
            "connection",
            &format!("Connected as {} to {}", unique_name, method_addr),
        );

        Ok(Self {
            client,
            unique_name,
            router,
            call_timeout,
            sink_task,
        })
    }

    /// The unique bus name the server assigned to this connection.
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn context(&self) -> tarpc::context::Context {
        deadline_context(self.call_timeout)
    }

    pub async fn name_has_owner(&self, name: &str) -> GeofenceResult<bool> {
        self.client
            .name_has_owner(self.context(), name.to_string())
            .await
            .map_err(|e| call_failed("NameHasOwner", e))
    }

    /// Invoke a method and wait for its reply.
    ///
    /// Routing failures map to `AccessDenied`; anything else that goes wrong
    /// after dispatch maps to `DbusCall`.
    pub async fn call(
        &self,
        destination: &Destination,
        call: MethodCall,
    ) -> GeofenceResult<MethodReply> {
        let method = call.method();
        match self
            .client
            .call_method(self.context(), destination.clone(), call)
            .await
        {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) if e.is_routing_failure() => {
                daemon_log("connection", &format!("{} not dispatched: {}", method, e));
                Err(GeofenceError::AccessDenied)
            }
            Ok(Err(e)) => Err(call_failed(method.member(), e)),
            Err(e) => Err(call_failed(method.member(), e)),
        }
    }

    /// Install a subscription whose signals go to `handler`.
    pub async fn subscribe(
        &self,
        rule: MatchRule,
        handler: SignalHandler,
    ) -> GeofenceResult<SubscriptionId> {
        let signal = rule.signal;
        let id = match self.client.add_match(self.context(), rule).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(subscribe_failed(signal, e)),
            Err(e) => return Err(call_failed(signal.member(), e)),
        };
        self.router.insert(id, handler);
        Ok(id)
    }

    /// Remove a subscription. The local handler is dropped even if the server
    /// call fails.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> GeofenceResult<()> {
        self.router.remove(id);
        match self.client.remove_match(self.context(), id).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(BusError::UnknownSubscription { .. })) => Ok(()),
            Ok(Err(e)) => Err(call_failed("RemoveMatch", e)),
            Err(e) => Err(call_failed("RemoveMatch", e)),
        }
    }

    /// Number of subscriptions with a local handler.
    pub fn subscription_count(&self) -> usize {
        self.router.len()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.sink_task.abort();
    }
}

/// Furthest deadline a call may carry.
const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

fn deadline_context(timeout: Duration) -> tarpc::context::Context {
    let mut ctx = tarpc::context::current();
    let now = Instant::now();
    ctx.deadline = now
        .checked_add(timeout.min(MAX_DEADLINE))
        .unwrap_or(now);
    ctx
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
