//! Signal subscriptions and fire-and-forget broadcast.
//!
//! Each subscriber connection has exactly one delivery queue; a forwarding
//! task drains it in order, so emission order is preserved per subscriber.

use crate::daemon_log::daemon_log;
use crate::rpc::{
    BusError, BusResult, Destination, GeofenceNotification, MatchRule, SignalKind, SubscriptionId,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

/// One signal queued for a subscriber connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subscription: SubscriptionId,
    pub kind: SignalKind,
    pub notification: GeofenceNotification,
}

/// An installed match rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner: String,
    pub rule: MatchRule,
}

pub struct SignalEmitter {
    origin: Destination,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    sinks: HashMap<String, mpsc::UnboundedSender<Delivery>>,
    next_id: SubscriptionId,
}

impl SignalEmitter {
    /// Creates an emitter for signals originating from `origin`.
    pub fn new(origin: Destination) -> Self {
        Self {
            origin,
            subscriptions: BTreeMap::new(),
            sinks: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register the delivery queue of a connection's signal channel.
    /// A second attach for the same identity replaces the first queue.
    pub fn attach_sink(&mut self, identity: &str, queue: mpsc::UnboundedSender<Delivery>) {
        if self.sinks.insert(identity.to_string(), queue).is_some() {
            daemon_log("signal", &format!("Replaced signal sink of {}", identity));
        }
    }

    pub fn has_sink(&self, identity: &str) -> bool {
        self.sinks.contains_key(identity)
    }

    pub fn add_match(&mut self, owner: &str, rule: MatchRule) -> BusResult<SubscriptionId> {
        if !self.sinks.contains_key(owner) {
            return Err(BusError::NoSignalSink);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                owner: owner.to_string(),
                rule,
            },
        );
        Ok(id)
    }

    /// Remove a subscription; only its owner may remove it.
    pub fn remove_match(&mut self, owner: &str, id: SubscriptionId) -> BusResult<Subscription> {
        match self.subscriptions.get(&id) {
            Some(subscription) if subscription.owner == owner => {}
            _ => return Err(BusError::UnknownSubscription { id }),
        }
        self.subscriptions
            .remove(&id)
            .ok_or(BusError::UnknownSubscription { id })
    }

    /// Drop the sink and every subscription of a connection that went away.
    pub fn remove_owner(&mut self, owner: &str) -> Vec<Subscription> {
        self.sinks.remove(owner);
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .values()
            .filter(|subscription| subscription.owner == owner)
            .map(|subscription| subscription.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.subscriptions.remove(&id))
            .collect()
    }

    /// Queue `notification` for every matching subscription.
    ///
    /// Returns the number of deliveries queued. Zero subscribers is not an error,
    /// and a closed queue only affects its own subscriber.
    pub fn emit(&self, kind: SignalKind, notification: &GeofenceNotification) -> usize {
        let mut queued = 0;
        for subscription in self.subscriptions.values() {
            if !subscription.rule.matches(&self.origin, kind) {
                continue;
            }
            let Some(sink) = self.sinks.get(&subscription.owner) else {
                continue;
            };
            let delivery = Delivery {
                subscription: subscription.id,
                kind,
                notification: notification.clone(),
            };
            if sink.send(delivery).is_ok() {
                queued += 1;
            } else {
                daemon_log(
                    "signal",
                    &format!("Dropped {} for closed sink {}", kind, subscription.owner),
                );
            }
        }
        queued
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn origin(&self) -> &Destination {
        &self.origin
    }
}

#[cfg(test)]
#[path = "tests/signal_emitter_tests.rs"]
mod tests;
