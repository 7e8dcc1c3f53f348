//! Liveness-tracked subscription registry.
//!
//! Sessions are keyed by connection identity and hold one counter per
//! subscription category. The registry reports categories that become
//! "newly idle": in use before a change, held by nobody after it.

use crate::rpc::Category;
use crate::server::bus::NameOwnerChanged;
use std::collections::{BTreeSet, HashMap};

/// Subscription bookkeeping for one connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    connection_identity: String,
    subscribed_methods: HashMap<Category, u32>,
}

impl Session {
    fn new(connection_identity: &str) -> Self {
        Self {
            connection_identity: connection_identity.to_string(),
            subscribed_methods: HashMap::new(),
        }
    }

    pub fn connection_identity(&self) -> &str {
        &self.connection_identity
    }

    pub fn count(&self, category: Category) -> u32 {
        self.subscribed_methods.get(&category).copied().unwrap_or(0)
    }

    /// Categories this session currently holds at least one subscription for.
    pub fn active_categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.subscribed_methods
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(category, _)| *category)
    }

    fn is_empty(&self) -> bool {
        self.subscribed_methods.values().all(|count| *count == 0)
    }
}

/// Registry of sessions with active signal subscriptions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    /// Categories some session held at the last recomputation.
    in_use: BTreeSet<Category>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more subscription of `category` for `identity`.
    /// The session is created on its first subscription.
    pub fn register(&mut self, identity: &str, category: Category) {
        let session = self
            .sessions
            .entry(identity.to_string())
            .or_insert_with(|| Session::new(identity));
        *session.subscribed_methods.entry(category).or_insert(0) += 1;
        self.in_use.insert(category);
    }

    /// Drop one subscription of `category` for `identity`.
    ///
    /// The session is destroyed when its last subscription goes. Returns the
    /// categories that became idle.
    pub fn unregister(&mut self, identity: &str, category: Category) -> Vec<Category> {
        let Some(session) = self.sessions.get_mut(identity) else {
            tracing::warn!("unregister for unknown session {}", identity);
            return Vec::new();
        };

        match session.subscribed_methods.get_mut(&category) {
            Some(count) if *count > 0 => *count -= 1,
            _ => {
                tracing::warn!("{} holds no {} subscription", identity, category);
                return Vec::new();
            }
        }

        if session.is_empty() {
            self.sessions.remove(identity);
        }
        self.take_newly_idle()
    }

    /// Force-expire every subscription of a vanished peer.
    ///
    /// Unknown identities leave the registry untouched and report nothing.
    pub fn on_peer_lost(&mut self, identity: &str) -> Vec<Category> {
        if self.sessions.remove(identity).is_none() {
            return Vec::new();
        }
        tracing::debug!("session {} removed after peer loss", identity);
        self.take_newly_idle()
    }

    /// Handle a bus ownership transition; only peer-loss transitions matter.
    pub fn on_name_owner_changed(&mut self, change: &NameOwnerChanged) -> Vec<Category> {
        match change.lost_peer() {
            Some(identity) => self.on_peer_lost(identity),
            None => Vec::new(),
        }
    }

    /// True when no session holds a subscription of `category`.
    pub fn is_idle(&self, category: Category) -> bool {
        self.subscriber_count(category) == 0
    }

    /// Number of sessions holding at least one subscription of `category`.
    pub fn subscriber_count(&self, category: Category) -> usize {
        self.sessions
            .values()
            .filter(|session| session.count(category) > 0)
            .count()
    }

    pub fn session(&self, identity: &str) -> Option<&Session> {
        self.sessions.get(identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn take_newly_idle(&mut self) -> Vec<Category> {
        let idle: Vec<Category> = self
            .in_use
            .iter()
            .copied()
            .filter(|category| self.subscriber_count(*category) == 0)
            .collect();
        for category in &idle {
            self.in_use.remove(category);
        }
        idle
    }
}

#[cfg(test)]
#[path = "tests/session_registry_tests.rs"]
mod tests;
