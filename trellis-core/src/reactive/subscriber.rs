//! Subscriber types for the reactive system.
//!
//! A subscriber is an external listener attached to a node: either a typed
//! subscription callback or an autosubscribe binding. Subscribers keep the
//! nodes they listen to hot, so those nodes are recomputed eagerly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::graph::{try_with_graph, NodeId};

/// Unique identifier for a subscriber.
///
/// Each subscription or autosubscribe binding gets a unique ID when created.
/// The ID keys its callback on every node it listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Handle returned by [`Reactive::subscribe`](super::Reactive::subscribe).
///
/// Dropping the handle unsubscribes the callback. Once a node has no
/// callbacks and no hot listeners left, it and its upstream chain go back to
/// being recomputed lazily.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: SubscriberId,
    node: NodeId,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, node: NodeId) -> Self {
        Self { id, node }
    }

    /// The subscriber ID of this subscription.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The node this subscription listens to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Remove the callback now.
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("node", &self.node)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = try_with_graph(|graph| graph.detach_callback(self.node, self.id)).flatten();
        if removed.is_some() {
            debug!(subscriber = %self.id, "unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_id_display() {
        let id = SubscriberId::new();
        assert!(id.to_string().starts_with("sub#"));
    }
}
