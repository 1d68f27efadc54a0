//! Graph Nodes
//!
//! This module defines the bookkeeping record kept for every node in the
//! graph arena. The cached value itself lives in the typed [`NodeSlot`] owned
//! by the reactive wrapper; the record only knows how to ask it to evaluate.

use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::error::Result;
use crate::reactive::SubscriberId;

new_key_type! {
    /// Handle to a node in the graph arena.
    pub struct NodeId;
}

/// Freshness of a node's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// The cached value is up-to-date.
    Clean,

    /// Something upstream was invalidated. Dependencies must be brought up
    /// to date before we know whether this node has to recompute.
    Check,

    /// The node definitely needs to recompute.
    Dirty,

    /// The node's computation is running on the current call stack.
    Computing,
}

impl NodeStatus {
    /// Check if the node can be read without doing any work.
    pub fn is_clean(self) -> bool {
        self == NodeStatus::Clean
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Clean => "clean",
            NodeStatus::Check => "check",
            NodeStatus::Dirty => "dirty",
            NodeStatus::Computing => "computing",
        };
        f.write_str(name)
    }
}

/// Typed storage behind a node.
///
/// Implemented by the reactive wrapper for each (computation, key) pair.
pub(crate) trait NodeSlot {
    /// Run the computation with the node's bound arguments.
    ///
    /// On success the new value is stored and the return value says whether
    /// it differs from the previous one. On failure nothing is stored.
    fn evaluate(&self) -> Result<bool>;
}

/// External listener attached to a node.
pub(crate) type Callback = Rc<dyn Fn()>;

/// A node in the dependency graph.
pub(crate) struct NodeRecord {
    label: Rc<str>,
    status: NodeStatus,

    /// Nodes read during the most recent successful computation, in read order.
    dependencies: IndexSet<NodeId>,

    /// Nodes whose most recent computation read this node.
    listeners: IndexSet<NodeId>,

    /// Subscription callbacks and autosubscribe bindings.
    callbacks: IndexMap<SubscriberId, Callback>,

    /// Set while a callback or a hot listener needs this node eagerly.
    hot: bool,

    slot: Rc<dyn NodeSlot>,
}

impl NodeRecord {
    /// Create a dirty, never-computed node.
    pub fn new(label: impl Into<Rc<str>>, slot: Rc<dyn NodeSlot>) -> Self {
        Self {
            label: label.into(),
            status: NodeStatus::Dirty,
            dependencies: IndexSet::new(),
            listeners: IndexSet::new(),
            callbacks: IndexMap::new(),
            hot: false,
            slot,
        }
    }

    pub fn label(&self) -> &Rc<str> {
        &self.label
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub fn slot(&self) -> Rc<dyn NodeSlot> {
        Rc::clone(&self.slot)
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn listeners(&self) -> &IndexSet<NodeId> {
        &self.listeners
    }

    pub fn callbacks(&self) -> &IndexMap<SubscriberId, Callback> {
        &self.callbacks
    }

    /// Replace the dependency set, returning the previous one.
    pub fn replace_dependencies(&mut self, dependencies: IndexSet<NodeId>) -> IndexSet<NodeId> {
        std::mem::replace(&mut self.dependencies, dependencies)
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    pub fn add_listener(&mut self, node_id: NodeId) {
        self.listeners.insert(node_id);
    }

    pub fn remove_listener(&mut self, node_id: NodeId) {
        self.listeners.shift_remove(&node_id);
    }

    pub fn insert_callback(&mut self, id: SubscriberId, callback: Callback) -> Option<Callback> {
        self.callbacks.insert(id, callback)
    }

    pub fn remove_callback(&mut self, id: SubscriberId) -> Option<Callback> {
        self.callbacks.shift_remove(&id)
    }

    pub fn is_hot(&self) -> bool {
        self.hot
    }

    pub fn set_hot(&mut self, hot: bool) {
        self.hot = hot;
    }
}

impl fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRecord")
            .field("label", &self.label)
            .field("status", &self.status)
            .field("dependencies", &self.dependencies.len())
            .field("listeners", &self.listeners.len())
            .field("callbacks", &self.callbacks.len())
            .field("hot", &self.hot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    struct Constant;

    impl NodeSlot for Constant {
        fn evaluate(&self) -> Result<bool> {
            Ok(false)
        }
    }

    fn record(label: &str) -> NodeRecord {
        NodeRecord::new(label, Rc::new(Constant))
    }

    #[test]
    fn new_nodes_start_dirty_and_cold() {
        let node = record("a");
        assert_eq!(node.status(), NodeStatus::Dirty);
        assert!(!node.status().is_clean());
        assert!(!node.is_hot());
        assert!(node.dependencies().is_empty());
        assert!(node.listeners().is_empty());
        assert_eq!(&**node.label(), "a");
    }

    #[test]
    fn replacing_dependencies_returns_the_old_set() {
        let mut arena: SlotMap<NodeId, ()> = SlotMap::with_key();
        let (x, y, z) = (arena.insert(()), arena.insert(()), arena.insert(()));

        let mut node = record("b");
        node.replace_dependencies([x, y].into_iter().collect());
        let old = node.replace_dependencies([y, z].into_iter().collect());

        assert_eq!(old.into_iter().collect::<Vec<_>>(), vec![x, y]);
        assert_eq!(node.dependencies().iter().copied().collect::<Vec<_>>(), vec![y, z]);
    }

    #[test]
    fn listeners_keep_insertion_order() {
        let mut arena: SlotMap<NodeId, ()> = SlotMap::with_key();
        let (x, y, z) = (arena.insert(()), arena.insert(()), arena.insert(()));

        let mut node = record("a");
        node.add_listener(z);
        node.add_listener(x);
        node.add_listener(y);
        node.add_listener(x);
        node.remove_listener(z);

        assert_eq!(node.listeners().iter().copied().collect::<Vec<_>>(), vec![x, y]);
    }

    #[test]
    fn callbacks_are_keyed_by_subscriber() {
        let mut node = record("a");
        let id = SubscriberId::new();
        assert!(node.insert_callback(id, Rc::new(|| {})).is_none());
        assert!(node.insert_callback(id, Rc::new(|| {})).is_some());
        assert_eq!(node.callbacks().len(), 1);
        assert!(node.remove_callback(id).is_some());
        assert!(node.remove_callback(id).is_none());
    }

    #[test]
    fn status_display() {
        assert_eq!(NodeStatus::Check.to_string(), "check");
        assert_eq!(NodeStatus::Computing.to_string(), "computing");
    }
}
