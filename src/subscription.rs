//! Registry of flow subscriptions.
//!
//! `SubscriptionRegistry` maps a flow name to the single UDP address that
//! currently receives it. The control channel mutates the registry while
//! senders read it concurrently, so entries live in a [`DashMap`].

use std::net::SocketAddr;

use dashmap::DashMap;

/// Concurrent `flow -> address` map.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry(DashMap<String, SocketAddr>);

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Route `flow` to `address`, returning the address it replaced.
    pub fn subscribe(&self, flow: impl Into<String>, address: SocketAddr) -> Option<SocketAddr> {
        self.0.insert(flow.into(), address)
    }

    /// Stop routing `flow`, returning the address it was sent to.
    pub fn unsubscribe(&self, flow: &str) -> Option<SocketAddr> {
        self.0.remove(flow).map(|(_, address)| address)
    }

    /// Address currently subscribed to `flow`.
    #[must_use]
    pub fn lookup(&self, flow: &str) -> Option<SocketAddr> { self.0.get(flow).map(|entry| *entry) }

    /// Snapshot of all subscriptions, sorted by flow name.
    #[must_use]
    pub fn list(&self) -> Vec<(String, SocketAddr)> {
        let mut entries: Vec<_> = self
            .0
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of subscribed flows.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no flow is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
