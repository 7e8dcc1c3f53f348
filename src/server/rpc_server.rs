//! tarpc listeners for the geofence bus.
//!
//! Two listeners run side by side: the method listener serves `BusService`
//! for every client connection, and the signal listener accepts the clients'
//! `SignalSink` callback channels.

use crate::daemon_log::daemon_log;
use crate::rpc::bus_service::{BusService, SignalSinkClient};
use crate::rpc::{
    BusError, BusResult, Destination, MatchRule, MethodCall, MethodReply, SubscriptionId,
};
use crate::server::bus::Bus;
use crate::server::dispatch_loop::LoopCommand;
use crate::server::signal_emitter::Delivery;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tarpc::server::{self, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Per-connection server implementation for BusService.
#[derive(Clone)]
pub struct BusServer {
    /// Unique name of the connection this instance serves.
    identity: String,
    bus: Arc<Bus>,
    commands: mpsc::UnboundedSender<LoopCommand>,
    exported: Destination,
}

impl BusServer {
    pub(crate) fn new(
        identity: String,
        bus: Arc<Bus>,
        commands: mpsc::UnboundedSender<LoopCommand>,
        exported: Destination,
    ) -> Self {
        Self {
            identity,
            bus,
            commands,
            exported,
        }
    }

    fn route(&self, destination: &Destination) -> BusResult<()> {
        if !self.bus.name_has_owner(&destination.service)
            || destination.service != self.exported.service
        {
            return Err(BusError::ServiceUnknown {
                name: destination.service.clone(),
            });
        }
        if destination.object_path != self.exported.object_path {
            return Err(BusError::UnknownObject {
                path: destination.object_path.clone(),
            });
        }
        if destination.interface != self.exported.interface {
            return Err(BusError::UnknownInterface {
                interface: destination.interface.clone(),
            });
        }
        Ok(())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> LoopCommand,
    ) -> BusResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| BusError::ShuttingDown)?;
        reply_rx.await.map_err(|_| BusError::ShuttingDown)
    }
}

impl BusService for BusServer {
    async fn hello(self, _: tarpc::context::Context, pid: u32) -> String {
        let _ = self.commands.send(LoopCommand::Hello {
            identity: self.identity.clone(),
            pid,
        });
        daemon_log(
            "rpc_server",
            &format!("Connection {} says hello (pid {})", self.identity, pid),
        );
        self.identity
    }

    async fn name_has_owner(self, _: tarpc::context::Context, name: String) -> bool {
        self.bus.name_has_owner(&name)
    }

    async fn call_method(
        self,
        _: tarpc::context::Context,
        destination: Destination,
        call: MethodCall,
    ) -> BusResult<MethodReply> {
        self.route(&destination)?;
        let identity = self.identity.clone();
        self.request(|reply| LoopCommand::Invoke {
            identity,
            call,
            reply,
        })
        .await
    }

    async fn add_match(
        self,
        _: tarpc::context::Context,
        rule: MatchRule,
    ) -> BusResult<SubscriptionId> {
        let identity = self.identity.clone();
        self.request(|reply| LoopCommand::AddMatch {
            identity,
            rule,
            reply,
        })
        .await?
    }

    async fn remove_match(
        self,
        _: tarpc::context::Context,
        subscription: SubscriptionId,
    ) -> BusResult<()> {
        let identity = self.identity.clone();
        self.request(|reply| LoopCommand::RemoveMatch {
            identity,
            subscription,
            reply,
        })
        .await?
    }
}

/// Bind the method listener and spawn its accept loop.
///
/// Each accepted connection gets a unique name from `bus`; when its channel
/// ends the name is released, which the dispatch loop sees as peer loss.
pub(crate) async fn spawn_method_listener(
    addr: &str,
    bus: Arc<Bus>,
    commands: mpsc::UnboundedSender<LoopCommand>,
    exported: Destination,
    shutdown_tx: &broadcast::Sender<()>,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    use tarpc::serde_transport::tcp;

    let mut listener = tcp::listen(addr, Bincode::default).await?;
    let local_addr = listener.local_addr();
    daemon_log(
        "rpc_server",
        &format!("Method listener on {}", local_addr),
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(result) = listener.next() => {
                    match result {
                        Ok(transport) => {
                            let identity = bus.open_connection();
                            let server = BusServer::new(
                                identity.clone(),
                                bus.clone(),
                                commands.clone(),
                                exported.clone(),
                            );
                            let channel = server::BaseChannel::with_defaults(transport);
                            let bus = bus.clone();

                            tokio::spawn(async move {
                                channel.execute(server.serve()).for_each(|response| async {
                                    tokio::spawn(response);
                                }).await;
                                daemon_log("rpc_server", &format!("Connection {} closed", identity));
                                bus.close_connection(&identity);
                            });
                        }
                        Err(e) => {
                            daemon_log("rpc_server", &format!("Accept error: {}", e));
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    });

    Ok((local_addr, handle))
}

/// Bind the signal listener and spawn its accept loop.
///
/// A connecting sink first reports which main connection it belongs to, is
/// registered with the dispatch loop, and is then told it is attached. From
/// then on one forwarding task drains its delivery queue in order.
pub(crate) async fn spawn_signal_listener(
    addr: &str,
    commands: mpsc::UnboundedSender<LoopCommand>,
    shutdown_tx: &broadcast::Sender<()>,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    use tarpc::client;
    use tarpc::serde_transport::tcp;

    let mut listener = tcp::listen(addr, Bincode::default).await?;
    let local_addr = listener.local_addr();
    daemon_log(
        "rpc_server",
        &format!("Signal listener on {}", local_addr),
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(result) = listener.next() => {
                    match result {
                        Ok(transport) => {
                            let sink = SignalSinkClient::new(client::Config::default(), transport).spawn();
                            tokio::spawn(attach_and_forward(sink, commands.clone()));
                        }
                        Err(e) => {
                            daemon_log("rpc_server", &format!("Signal accept error: {}", e));
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    });

    Ok((local_addr, handle))
}

async fn attach_and_forward(sink: SignalSinkClient, commands: mpsc::UnboundedSender<LoopCommand>) {
    let identity = match sink.identify(tarpc::context::current()).await {
        Ok(identity) => identity,
        Err(e) => {
            daemon_log("rpc_server", &format!("Signal sink did not identify: {}", e));
            return;
        }
    };

    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Delivery>();
    if commands
        .send(LoopCommand::AttachSink {
            identity: identity.clone(),
            queue: queue_tx,
        })
        .is_err()
    {
        return;
    }
    if let Err(e) = sink.attached(tarpc::context::current()).await {
        daemon_log(
            "rpc_server",
            &format!("Signal sink {} lost during attach: {}", identity, e),
        );
        return;
    }
    daemon_log("rpc_server", &format!("Signal sink attached for {}", identity));

    while let Some(delivery) = queue_rx.recv().await {
        if let Err(e) = sink
            .deliver(
                tarpc::context::current(),
                delivery.subscription,
                delivery.kind,
                delivery.notification,
            )
            .await
        {
            daemon_log(
                "rpc_server",
                &format!("Signal delivery to {} failed: {}", identity, e),
            );
            break;
        }
    }
}
