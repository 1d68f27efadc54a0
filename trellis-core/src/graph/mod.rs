//! Dependency Graph
//!
//! This module owns the arena of nodes and the edges between them.
//!
//! # Overview
//!
//! Every (computation, key) pair gets one [`NodeId`] in a thread-local
//! arena. Edges are stored in both directions:
//!
//! - `dependencies`: the nodes a node read during its last computation
//! - `listeners`: the nodes that read it
//!
//! Edges are plain ids, never owning pointers, so the symmetric graph has no
//! reference cycles. A node lives until the wrapper that created it is
//! dropped; removal detaches every edge it has. Ids held outside the arena
//! (subscriptions, autosubscribe bindings, in-flight propagation) may outlive
//! their node, so every entry point taking such an id tolerates a removed one.
//!
//! # Heat
//!
//! A node is *hot* when it has an external callback attached or when one of
//! its listeners is hot. Hot nodes are recomputed eagerly when invalidated;
//! everything else waits until it is read. Heat is maintained incrementally
//! whenever callbacks or edges change.
//!
//! The algorithms that walk the graph and call back into user code live in
//! [`propagate`]. Nothing in this module calls user code, and no borrow of the
//! arena is ever held across such a call.

mod node;
pub(crate) mod propagate;
mod snapshot;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;
use slotmap::SlotMap;
use smallvec::SmallVec;

pub use node::{NodeId, NodeStatus};
pub(crate) use node::{Callback, NodeRecord, NodeSlot};
pub use snapshot::{GraphSnapshot, NodeSnapshot};

use crate::reactive::SubscriberId;

thread_local! {
    static GRAPH: RefCell<GraphState> = RefCell::new(GraphState::default());
}

/// Run `f` with exclusive access to this thread's graph.
pub(crate) fn with_graph<R>(f: impl FnOnce(&mut GraphState) -> R) -> R {
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Like [`with_graph`], but gives up instead of panicking when the graph is
/// being torn down or is already borrowed. Used from `Drop` impls.
pub(crate) fn try_with_graph<R>(f: impl FnOnce(&mut GraphState) -> R) -> Option<R> {
    GRAPH
        .try_with(|graph| graph.try_borrow_mut().ok().map(|mut graph| f(&mut graph)))
        .ok()
        .flatten()
}

/// The node arena.
#[derive(Default)]
pub(crate) struct GraphState {
    nodes: SlotMap<NodeId, NodeRecord>,
}

impl GraphState {
    /// Add a new dirty node.
    pub fn insert(&mut self, label: impl Into<Rc<str>>, slot: Rc<dyn NodeSlot>) -> NodeId {
        self.nodes.insert(NodeRecord::new(label, slot))
    }

    /// Remove a node and every edge touching it.
    ///
    /// Listeners lose the edge and are marked dirty; dependencies cool down if
    /// the node was keeping them hot. Returns the record, which the caller
    /// must drop after releasing the graph: it owns the node's computation
    /// and callbacks.
    #[must_use]
    pub fn remove(&mut self, id: NodeId) -> Option<NodeRecord> {
        let record = self.nodes.remove(id)?;

        for dep in record.dependencies().iter().copied() {
            self.nodes[dep].remove_listener(id);
            if record.is_hot() {
                self.refresh_heat(dep);
            }
        }
        for listener in record.listeners().iter().copied() {
            self.nodes[listener].remove_dependency(id);
            self.invalidate(listener);
        }

        Some(record)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: NodeId) -> &NodeRecord {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeRecord {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> {
        self.nodes.iter()
    }

    /// Replace a node's dependency set with the reads of its latest
    /// computation, keeping listener edges symmetric.
    ///
    /// Reads of nodes removed in the meantime are dropped.
    pub fn commit_dependencies(&mut self, id: NodeId, mut reads: IndexSet<NodeId>) {
        reads.retain(|dep| self.nodes.contains_key(*dep));
        let old = self.nodes[id].replace_dependencies(reads);
        let mut touched: SmallVec<[NodeId; 8]> = SmallVec::new();

        for dep in old.iter().copied() {
            if !self.nodes[id].dependencies().contains(&dep) {
                self.nodes[dep].remove_listener(id);
                touched.push(dep);
            }
        }

        let added: SmallVec<[NodeId; 8]> = self.nodes[id]
            .dependencies()
            .iter()
            .copied()
            .filter(|dep| !old.contains(dep))
            .collect();
        for dep in added {
            self.nodes[dep].add_listener(id);
            touched.push(dep);
        }

        // Only a hot listener contributes heat upstream.
        if self.nodes[id].is_hot() {
            for dep in touched {
                self.refresh_heat(dep);
            }
        }
    }

    /// Mark a listener of a changed node as dirty and everything clean below
    /// it as needing a check. Nodes on the current call stack are skipped;
    /// they are about to finish with whatever they read.
    pub fn invalidate(&mut self, id: NodeId) {
        if self.nodes[id].status() == NodeStatus::Computing {
            return;
        }
        self.nodes[id].set_status(NodeStatus::Dirty);
        self.mark_listeners_for_check(id);
    }

    /// Mark every transitive clean listener of `id` as `Check`.
    ///
    /// Stops at nodes that are already stale: everything below a stale node
    /// is stale too.
    pub fn mark_listeners_for_check(&mut self, id: NodeId) {
        let mut stack: SmallVec<[NodeId; 16]> = self.nodes[id].listeners().iter().copied().collect();
        while let Some(listener) = stack.pop() {
            let node = &mut self.nodes[listener];
            if node.status() == NodeStatus::Clean {
                node.set_status(NodeStatus::Check);
                stack.extend(node.listeners().iter().copied());
            }
        }
    }

    /// Attach an external callback, making the node and its upstream hot.
    ///
    /// Returns the callback previously registered under `subscriber`, or
    /// `callback` itself if the node is gone. The caller must drop it after
    /// releasing the graph.
    #[must_use]
    pub fn attach_callback(
        &mut self,
        id: NodeId,
        subscriber: SubscriberId,
        callback: Callback,
    ) -> Option<Callback> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Some(callback);
        };
        let previous = node.insert_callback(subscriber, callback);
        self.refresh_heat(id);
        previous
    }

    /// Detach an external callback, cooling the upstream chain if nothing
    /// else keeps it hot.
    ///
    /// Returns the removed callback, which the caller must drop after
    /// releasing the graph.
    #[must_use]
    pub fn detach_callback(&mut self, id: NodeId, subscriber: SubscriberId) -> Option<Callback> {
        let removed = self.nodes.get_mut(id)?.remove_callback(subscriber);
        if removed.is_some() {
            self.refresh_heat(id);
        }
        removed
    }

    /// Whether `subscriber` still has a callback on `id`.
    pub fn has_callback(&self, id: NodeId, subscriber: SubscriberId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| node.callbacks().contains_key(&subscriber))
    }

    /// Recompute the heat of `id` and, when it flips, of everything it
    /// depends on.
    pub fn refresh_heat(&mut self, id: NodeId) {
        let mut stack: SmallVec<[NodeId; 16]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            let hot = !node.callbacks().is_empty()
                || node.listeners().iter().any(|listener| self.nodes[*listener].is_hot());
            if hot != node.is_hot() {
                let node = &mut self.nodes[current];
                node.set_hot(hot);
                stack.extend(node.dependencies().iter().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct Constant;

    impl NodeSlot for Constant {
        fn evaluate(&self) -> Result<bool> {
            Ok(false)
        }
    }

    fn graph_with(labels: &[&str]) -> (GraphState, Vec<NodeId>) {
        let mut graph = GraphState::default();
        let ids = labels
            .iter()
            .map(|label| graph.insert(*label, Rc::new(Constant)))
            .collect();
        (graph, ids)
    }

    fn deps(ids: &[NodeId]) -> IndexSet<NodeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn commit_keeps_edges_symmetric() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        graph.commit_dependencies(c, deps(&[a, b]));
        assert!(graph.node(a).listeners().contains(&c));
        assert!(graph.node(b).listeners().contains(&c));

        graph.commit_dependencies(c, deps(&[b]));
        assert!(graph.node(a).listeners().is_empty());
        assert!(graph.node(b).listeners().contains(&c));
        assert_eq!(graph.node(c).dependencies(), &deps(&[b]));
    }

    #[test]
    fn callbacks_heat_the_upstream_chain() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        graph.commit_dependencies(b, deps(&[a]));
        graph.commit_dependencies(c, deps(&[b]));

        let subscriber = SubscriberId::new();
        let previous = graph.attach_callback(c, subscriber, Rc::new(|| {}));
        assert!(previous.is_none());
        assert!(graph.node(a).is_hot());
        assert!(graph.node(b).is_hot());
        assert!(graph.node(c).is_hot());

        let removed = graph.detach_callback(c, subscriber);
        assert!(removed.is_some());
        assert!(!graph.node(a).is_hot());
        assert!(!graph.node(b).is_hot());
        assert!(!graph.node(c).is_hot());
    }

    #[test]
    fn new_edges_of_a_hot_node_are_eager() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        graph.commit_dependencies(c, deps(&[a]));
        let _ = graph.attach_callback(c, SubscriberId::new(), Rc::new(|| {}));
        assert!(graph.node(a).is_hot());

        graph.commit_dependencies(c, deps(&[b]));
        assert!(!graph.node(a).is_hot());
        assert!(graph.node(b).is_hot());
    }

    #[test]
    fn invalidation_marks_downstream_for_check() {
        let (mut graph, ids) = graph_with(&["a", "b", "c", "d"]);
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);
        graph.commit_dependencies(b, deps(&[a]));
        graph.commit_dependencies(c, deps(&[b]));
        graph.commit_dependencies(d, deps(&[c]));
        for id in [a, b, c, d] {
            graph.node_mut(id).set_status(NodeStatus::Clean);
        }

        graph.invalidate(b);
        assert_eq!(graph.node(a).status(), NodeStatus::Clean);
        assert_eq!(graph.node(b).status(), NodeStatus::Dirty);
        assert_eq!(graph.node(c).status(), NodeStatus::Check);
        assert_eq!(graph.node(d).status(), NodeStatus::Check);
    }

    #[test]
    fn removal_detaches_edges_and_cools_dependencies() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        graph.commit_dependencies(b, deps(&[a]));
        graph.commit_dependencies(c, deps(&[b]));
        graph.node_mut(c).set_status(NodeStatus::Clean);
        let subscriber = SubscriberId::new();
        let _ = graph.attach_callback(b, subscriber, Rc::new(|| {}));
        assert!(graph.node(a).is_hot());

        let removed = graph.remove(b).unwrap();
        assert_eq!(removed.callbacks().len(), 1);
        assert!(!graph.contains(b));
        assert!(graph.node(a).listeners().is_empty());
        assert!(!graph.node(a).is_hot());
        assert!(graph.node(c).dependencies().is_empty());
        assert_eq!(graph.node(c).status(), NodeStatus::Dirty);

        // Stale ids are ignored.
        assert!(graph.remove(b).is_none());
        assert!(graph.detach_callback(b, subscriber).is_none());
        assert!(!graph.has_callback(b, subscriber));
        assert!(graph.attach_callback(b, subscriber, Rc::new(|| {})).is_some());
        graph.commit_dependencies(c, deps(&[a, b]));
        assert_eq!(graph.node(c).dependencies(), &deps(&[a]));
    }

    #[test]
    fn invalidation_skips_computing_nodes() {
        let (mut graph, ids) = graph_with(&["a"]);
        graph.node_mut(ids[0]).set_status(NodeStatus::Computing);
        graph.invalidate(ids[0]);
        assert_eq!(graph.node(ids[0]).status(), NodeStatus::Computing);
    }
}
