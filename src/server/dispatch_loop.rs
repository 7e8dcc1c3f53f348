//! The server's single dispatch loop.
//!
//! Every engine callback, registry mutation and emission happens on this one
//! task, in the order commands arrive. Request handlers talk to it through
//! `LoopCommand`s and wait on a oneshot reply.

use crate::daemon_log::daemon_log;
use crate::rpc::{
    BusResult, Category, GeofenceNotification, MatchRule, MethodCall, MethodReply, SignalKind,
    SubscriptionId,
};
use crate::server::bus::NameOwnerChanged;
use crate::server::dispatcher::Dispatcher;
use crate::server::session_registry::SessionRegistry;
use crate::server::signal_emitter::{Delivery, SignalEmitter};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Snapshot of the loop's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub sessions: usize,
    pub subscriptions: usize,
    pub idle_categories: Vec<Category>,
}

pub(crate) enum LoopCommand {
    Hello {
        identity: String,
        pid: u32,
    },
    Invoke {
        identity: String,
        call: MethodCall,
        reply: oneshot::Sender<MethodReply>,
    },
    AttachSink {
        identity: String,
        queue: mpsc::UnboundedSender<Delivery>,
    },
    AddMatch {
        identity: String,
        rule: MatchRule,
        reply: oneshot::Sender<BusResult<SubscriptionId>>,
    },
    RemoveMatch {
        identity: String,
        subscription: SubscriptionId,
        reply: oneshot::Sender<BusResult<()>>,
    },
    Emit {
        kind: SignalKind,
        notification: GeofenceNotification,
    },
    Stats {
        reply: oneshot::Sender<ServerStats>,
    },
}

pub(crate) struct DispatchLoop {
    dispatcher: Dispatcher,
    registry: SessionRegistry,
    emitter: SignalEmitter,
    pids: HashMap<String, u32>,
}

impl DispatchLoop {
    pub(crate) fn new(dispatcher: Dispatcher, emitter: SignalEmitter) -> Self {
        Self {
            dispatcher,
            registry: SessionRegistry::new(),
            emitter,
            pids: HashMap::new(),
        }
    }

    /// Process commands and ownership changes until shutdown or until every
    /// command sender is gone.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<LoopCommand>,
        mut owner_changes: mpsc::UnboundedReceiver<NameOwnerChanged>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(change) = owner_changes.recv() => self.on_name_owner_changed(change),
                _ = shutdown_rx.recv() => break,
            }
        }
        daemon_log("dispatch", "Dispatch loop stopped");
    }

    fn handle(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::Hello { identity, pid } => {
                self.pids.insert(identity, pid);
            }
            LoopCommand::Invoke {
                identity,
                call,
                reply,
            } => {
                let pid = self.pids.get(&identity).copied();
                let result = self.dispatcher.dispatch(pid, call);
                if reply.send(result).is_err() {
                    daemon_log(
                        "dispatch",
                        &format!("Caller {} went away before its reply", identity),
                    );
                }
            }
            LoopCommand::AttachSink { identity, queue } => {
                self.emitter.attach_sink(&identity, queue);
            }
            LoopCommand::AddMatch {
                identity,
                rule,
                reply,
            } => {
                let category = rule.signal;
                let result = self.emitter.add_match(&identity, rule);
                let installed = result.as_ref().ok().copied();
                if installed.is_some() {
                    self.registry.register(&identity, category);
                }
                if reply.send(result).is_err() {
                    if let Some(subscription) = installed {
                        self.abandon_match(&identity, subscription);
                    }
                }
            }
            LoopCommand::RemoveMatch {
                identity,
                subscription,
                reply,
            } => {
                let result = self
                    .emitter
                    .remove_match(&identity, subscription)
                    .map(|removed| {
                        let idle = self.registry.unregister(&identity, removed.rule.signal);
                        self.dispatcher.notify_idle(&idle);
                    });
                // The removal stands even if the caller gave up; a retry sees
                // an unknown subscription, which clients treat as removed.
                if reply.send(result).is_err() {
                    daemon_log(
                        "dispatch",
                        &format!(
                            "Caller {} went away before RemoveMatch {} was confirmed",
                            identity, subscription
                        ),
                    );
                }
            }
            LoopCommand::Emit { kind, notification } => {
                let queued = self.emitter.emit(kind, &notification);
                tracing::debug!("{} queued for {} subscriptions", kind, queued);
            }
            LoopCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Undo a subscription whose caller stopped waiting for the reply.
    fn abandon_match(&mut self, identity: &str, subscription: SubscriptionId) {
        daemon_log(
            "dispatch",
            &format!(
                "Caller {} went away before AddMatch {}; rolling back",
                identity, subscription
            ),
        );
        if let Ok(removed) = self.emitter.remove_match(identity, subscription) {
            let idle = self.registry.unregister(identity, removed.rule.signal);
            self.dispatcher.notify_idle(&idle);
        }
    }

    fn on_name_owner_changed(&mut self, change: NameOwnerChanged) {
        let Some(identity) = change.lost_peer() else {
            return;
        };
        self.pids.remove(identity);
        let dropped = self.emitter.remove_owner(identity);
        let idle = self.registry.on_name_owner_changed(&change);
        if !dropped.is_empty() || !idle.is_empty() {
            daemon_log(
                "dispatch",
                &format!(
                    "Peer {} lost: {} subscriptions dropped, idle {:?}",
                    identity,
                    dropped.len(),
                    idle
                ),
            );
        }
        self.dispatcher.notify_idle(&idle);
    }

    fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.registry.len(),
            subscriptions: self.emitter.subscription_count(),
            idle_categories: SignalKind::ALL
                .into_iter()
                .filter(|category| self.registry.is_idle(*category))
                .collect(),
        }
    }
}
