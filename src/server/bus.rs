//! Bus-level bookkeeping: connection names, well-known name ownership and
//! `NameOwnerChanged` notifications.

use crate::daemon_log::daemon_log;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Handle returned by `Bus::own_name`, used to release the name again.
pub type OwnerId = u32;

/// Unique name the server itself holds on its bus.
pub const SERVER_UNIQUE_NAME: &str = ":1.0";

/// Ownership transition of a bus name.
///
/// Empty `old_owner` means the name appeared; empty `new_owner` means it vanished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameOwnerChanged {
    pub name: String,
    pub old_owner: String,
    pub new_owner: String,
}

impl NameOwnerChanged {
    /// The peer that went away, if this transition is a peer loss.
    pub fn lost_peer(&self) -> Option<&str> {
        if self.new_owner.is_empty() && !self.old_owner.is_empty() {
            Some(&self.old_owner)
        } else {
            None
        }
    }
}

/// Error returned when a well-known name is already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTaken {
    pub name: String,
}

impl std::fmt::Display for NameTaken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bus name {} is already owned", self.name)
    }
}

impl std::error::Error for NameTaken {}

type NameLostCallback = Box<dyn FnOnce(&str) + Send>;

struct OwnedName {
    name: String,
    on_lost: Option<NameLostCallback>,
}

struct BusInner {
    next_connection: u64,
    next_owner: OwnerId,
    connections: HashSet<String>,
    owned: HashMap<OwnerId, OwnedName>,
    watchers: Vec<mpsc::UnboundedSender<NameOwnerChanged>>,
}

impl BusInner {
    fn broadcast(&mut self, change: NameOwnerChanged) {
        self.watchers
            .retain(|watcher| watcher.send(change.clone()).is_ok());
    }
}

/// Name registry shared by every connection of one server.
pub struct Bus {
    inner: Mutex<BusInner>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                next_connection: 1,
                next_owner: 1,
                connections: HashSet::new(),
                owned: HashMap::new(),
                watchers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to every future `NameOwnerChanged` transition, in order.
    pub fn watch_name_owner_changes(&self) -> mpsc::UnboundedReceiver<NameOwnerChanged> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().watchers.push(tx);
        rx
    }

    /// Register a new peer connection and return its unique name.
    pub fn open_connection(&self) -> String {
        let mut inner = self.lock();
        let unique = format!(":1.{}", inner.next_connection);
        inner.next_connection += 1;
        inner.connections.insert(unique.clone());
        inner.broadcast(NameOwnerChanged {
            name: unique.clone(),
            old_owner: String::new(),
            new_owner: unique.clone(),
        });
        unique
    }

    /// Drop a peer connection. Emits the peer-loss transition for its unique name.
    pub fn close_connection(&self, unique: &str) {
        let mut inner = self.lock();
        if !inner.connections.remove(unique) {
            return;
        }
        inner.broadcast(NameOwnerChanged {
            name: unique.to_string(),
            old_owner: unique.to_string(),
            new_owner: String::new(),
        });
    }

    /// Claim a well-known name for the server.
    ///
    /// `on_acquired` runs before this returns; `on_lost` runs when the name is
    /// released through `unown_name`.
    pub fn own_name<A, L>(&self, name: &str, on_acquired: A, on_lost: L) -> Result<OwnerId, NameTaken>
    where
        A: FnOnce(&str),
        L: FnOnce(&str) + Send + 'static,
    {
        let owner_id = {
            let mut inner = self.lock();
            if inner.owned.values().any(|owned| owned.name == name) {
                return Err(NameTaken {
                    name: name.to_string(),
                });
            }
            let owner_id = inner.next_owner;
            inner.next_owner += 1;
            inner.owned.insert(
                owner_id,
                OwnedName {
                    name: name.to_string(),
                    on_lost: Some(Box::new(on_lost)),
                },
            );
            inner.broadcast(NameOwnerChanged {
                name: name.to_string(),
                old_owner: String::new(),
                new_owner: SERVER_UNIQUE_NAME.to_string(),
            });
            owner_id
        };
        on_acquired(name);
        Ok(owner_id)
    }

    /// Release a name claimed with `own_name`. Unknown ids are ignored.
    pub fn unown_name(&self, owner_id: OwnerId) {
        let released = {
            let mut inner = self.lock();
            let released = inner.owned.remove(&owner_id);
            if let Some(owned) = &released {
                let change = NameOwnerChanged {
                    name: owned.name.clone(),
                    old_owner: SERVER_UNIQUE_NAME.to_string(),
                    new_owner: String::new(),
                };
                inner.broadcast(change);
            }
            released
        };

        match released {
            Some(mut owned) => {
                if let Some(on_lost) = owned.on_lost.take() {
                    on_lost(&owned.name);
                }
            }
            None => daemon_log("bus", &format!("unown_name: unknown owner id {}", owner_id)),
        }
    }

    /// Whether `name` (well-known or unique) currently has an owner.
    pub fn name_has_owner(&self, name: &str) -> bool {
        let inner = self.lock();
        name == SERVER_UNIQUE_NAME
            || inner.connections.contains(name)
            || inner.owned.values().any(|owned| owned.name == name)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/bus_tests.rs"]
mod tests;
