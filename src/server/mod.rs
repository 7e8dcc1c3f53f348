//! Geofence server: method dispatch, session tracking and signal emission.
//!
//! ## Architecture
//!
//! - **Bus (`bus.rs`)**: unique connection names, well-known name ownership
//!   and `NameOwnerChanged` notifications.
//! - **Listeners (`rpc_server.rs`)**: tarpc method listener plus the signal
//!   listener clients attach their callback channel to.
//! - **Dispatch loop (`dispatch_loop.rs`)**: the one task that runs engine
//!   callbacks and owns the registry and emitter.
//! - **Dispatcher (`dispatcher.rs`)**: capability map of engine callbacks.
//! - **Registry (`session_registry.rs`)**: per-connection subscription counters.
//! - **Emitter (`signal_emitter.rs`)**: match rules and per-subscriber queues.

pub mod bus;
pub mod dispatch_loop;
pub mod dispatcher;
pub mod rpc_server;
pub mod session_registry;
pub mod signal_emitter;

#[cfg(test)]
pub(crate) mod rpc_tests;

pub use dispatch_loop::ServerStats;
pub use dispatcher::{Capabilities, Dispatcher};

use crate::config::ServerConfig;
use crate::daemon_log::daemon_log;
use crate::identity::{IdentityResolver, ProcessNameResolver};
use crate::rpc::{Category, FenceState, GeofenceNotification, SignalKind};
use crate::status::{GeofenceError, GeofenceResult};
use bus::{Bus, OwnerId};
use dispatch_loop::{DispatchLoop, LoopCommand};
use signal_emitter::SignalEmitter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Handle to a running geofence server.
///
/// Dropping the handle stops the listeners; `destroy` also releases the
/// service name and waits for the background tasks.
pub struct GeofenceServer {
    bus: Arc<Bus>,
    owner_id: OwnerId,
    commands: mpsc::UnboundedSender<LoopCommand>,
    shutdown_tx: broadcast::Sender<()>,
    local_addr: SocketAddr,
    signal_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl GeofenceServer {
    /// Start a server that resolves caller identities from process names.
    pub async fn create(config: &ServerConfig, capabilities: Capabilities) -> GeofenceResult<Self> {
        Self::create_with_resolver(config, capabilities, Box::new(ProcessNameResolver)).await
    }

    pub async fn create_with_resolver(
        config: &ServerConfig,
        capabilities: Capabilities,
        resolver: Box<dyn IdentityResolver>,
    ) -> GeofenceResult<Self> {
        let bus = Arc::new(Bus::new());
        let owner_changes = bus.watch_name_owner_changes();
        let exported = config.destination();

        let owner_id = bus
            .own_name(
                &config.service_name,
                |name| daemon_log("server", &format!("Acquired bus name {}", name)),
                |name| daemon_log("server", &format!("Lost bus name {}", name)),
            )
            .map_err(|e| {
                daemon_log("server", &e.to_string());
                GeofenceError::Connection
            })?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let dispatch_loop = DispatchLoop::new(
            Dispatcher::new(capabilities, resolver),
            SignalEmitter::new(exported.clone()),
        );
        let loop_task = tokio::spawn(dispatch_loop.run(
            commands_rx,
            owner_changes,
            shutdown_tx.subscribe(),
        ));

        let method = rpc_server::spawn_method_listener(
            &config.method_addr(),
            bus.clone(),
            commands_tx.clone(),
            exported,
            &shutdown_tx,
        )
        .await;
        let signal = match &method {
            Ok(_) => {
                rpc_server::spawn_signal_listener(
                    &config.signal_addr(),
                    commands_tx.clone(),
                    &shutdown_tx,
                )
                .await
            }
            Err(_) => Err(anyhow::anyhow!("method listener not bound")),
        };

        let ((local_addr, method_task), (signal_addr, signal_task)) = match (method, signal) {
            (Ok(method), Ok(signal)) => (method, signal),
            (method, signal) => {
                for e in [method.err(), signal.err()].into_iter().flatten() {
                    daemon_log("server", &format!("Listener bind failed: {:#}", e));
                }
                let _ = shutdown_tx.send(());
                bus.unown_name(owner_id);
                return Err(GeofenceError::Connection);
            }
        };

        daemon_log(
            "server",
            &format!(
                "Server {} ({}) ready: methods on {}, signals on {}",
                config.name.as_deref().unwrap_or("geofence"),
                config.description.as_deref().unwrap_or("no description"),
                local_addr,
                signal_addr
            ),
        );

        Ok(Self {
            bus,
            owner_id,
            commands: commands_tx,
            shutdown_tx,
            local_addr,
            signal_addr,
            tasks: vec![loop_task, method_task, signal_task],
        })
    }

    /// Broadcast an in/out transition to every `Inout` subscriber.
    pub fn send_geofence_inout_changed(
        &self,
        app_id: &str,
        fence_id: i32,
        access_type: i32,
        state: FenceState,
    ) -> GeofenceResult<()> {
        self.emit(
            SignalKind::Inout,
            GeofenceNotification::inout(app_id, fence_id, access_type, state),
        )
    }

    /// Broadcast a fence event to every `Event` subscriber.
    pub fn send_geofence_event_changed(
        &self,
        place_id: i32,
        fence_id: i32,
        access_type: i32,
        app_id: &str,
        error: i32,
        state: FenceState,
    ) -> GeofenceResult<()> {
        self.emit(
            SignalKind::Event,
            GeofenceNotification::event(place_id, fence_id, access_type, app_id, error, state),
        )
    }

    fn emit(&self, kind: SignalKind, notification: GeofenceNotification) -> GeofenceResult<()> {
        self.commands
            .send(LoopCommand::Emit { kind, notification })
            .map_err(|_| GeofenceError::Parameter)
    }

    pub async fn stats(&self) -> GeofenceResult<ServerStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(LoopCommand::Stats { reply: reply_tx })
            .map_err(|_| GeofenceError::Parameter)?;
        reply_rx.await.map_err(|_| GeofenceError::Parameter)
    }

    pub async fn session_count(&self) -> GeofenceResult<usize> {
        Ok(self.stats().await?.sessions)
    }

    pub async fn subscription_count(&self) -> GeofenceResult<usize> {
        Ok(self.stats().await?.subscriptions)
    }

    pub async fn is_idle(&self, category: Category) -> GeofenceResult<bool> {
        Ok(self.stats().await?.idle_categories.contains(&category))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn signal_addr(&self) -> SocketAddr {
        self.signal_addr
    }

    /// Release the service name and stop every background task.
    pub async fn destroy(mut self) -> GeofenceResult<()> {
        self.bus.unown_name(self.owner_id);
        let _ = self.shutdown_tx.send(());
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                daemon_log("server", &format!("Server task ended abnormally: {}", e));
            }
        }
        daemon_log("server", "Server destroyed");
        Ok(())
    }
}

impl Drop for GeofenceServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
