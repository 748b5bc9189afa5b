//! # Subscription Registry
//!
//! The server-wide table of live subscriptions, keyed by event name.
//!
//! Uses DashMap for concurrent access without global locking: subscribes, unsubscribes,
//! matches and connection drops from many sessions proceed in parallel, serialized only
//! per shard.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::transport::Connection;

/// One client's interest in one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub connection: Connection,
    pub event: String,
    /// Chosen by the client; unique per (event, connection).
    pub listener_id: String,
    /// The subscription arguments as sent by the client.
    pub payload: Vec<u8>,
    pub target: Option<String>,
}

impl Subscription {
    fn same_key(&self, other: &Subscription) -> bool {
        self.connection == other.connection && self.listener_id == other.listener_id
    }
}

/// The subscription registry collaborator.
///
/// Implementations must make every mutation visible to any `matching` call that starts
/// after it returns.
#[async_trait]
pub trait EventManager: Send + Sync + 'static {
    /// Inserts, replacing an existing subscription with the same connection and listener id.
    async fn subscribe(&self, subscription: Subscription);

    /// Removes `(event, listener_id)` from whichever connection holds it.
    ///
    /// Returns whether anything was removed.
    async fn unsubscribe(&self, event: &str, listener_id: &str) -> bool;

    /// All subscriptions to `event` when `target` is `None`, otherwise only those stored
    /// with exactly that target.
    async fn matching(&self, event: &str, target: Option<&str>) -> Vec<Subscription>;

    /// Removes every subscription belonging to the connection.
    async fn drop_client(&self, connection: &Connection);
}

/// In-process registry.
#[derive(Debug, Default)]
pub struct MemoryEventManager {
    events: DashMap<String, Vec<Subscription>>,
}

impl MemoryEventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live subscriptions.
    pub fn len(&self) -> usize {
        self.events.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventManager for MemoryEventManager {
    async fn subscribe(&self, subscription: Subscription) {
        let mut subscriptions = self.events.entry(subscription.event.clone()).or_default();
        subscriptions.retain(|existing| !existing.same_key(&subscription));
        subscriptions.push(subscription);
    }

    async fn unsubscribe(&self, event: &str, listener_id: &str) -> bool {
        let removed = match self.events.get_mut(event) {
            Some(mut subscriptions) => {
                let before = subscriptions.len();
                subscriptions.retain(|s| s.listener_id != listener_id);
                subscriptions.len() != before
            }
            None => false,
        };
        self.events.remove_if(event, |_, subscriptions| subscriptions.is_empty());
        removed
    }

    async fn matching(&self, event: &str, target: Option<&str>) -> Vec<Subscription> {
        let Some(subscriptions) = self.events.get(event) else {
            return Vec::new();
        };
        subscriptions
            .iter()
            .filter(|s| target.is_none() || s.target.as_deref() == target)
            .cloned()
            .collect()
    }

    async fn drop_client(&self, connection: &Connection) {
        self.events.retain(|_, subscriptions| {
            subscriptions.retain(|s| s.connection != *connection);
            !subscriptions.is_empty()
        });
    }
}
