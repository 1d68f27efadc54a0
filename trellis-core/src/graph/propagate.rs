//! Propagation
//!
//! Pull and push halves of the invalidation protocol.
//!
//! # Algorithm
//!
//! 1. An explicit update marks a node `Dirty` and every clean node below it
//!    `Check`. Cold nodes stop there; hot nodes recompute right away.
//! 2. Reading a node brings it up to date:
//!    - `Dirty` nodes recompute.
//!    - `Check` nodes first bring their dependencies up to date, in read
//!      order. A dependency whose value changed marks its listeners `Dirty`,
//!      which forces the recompute. If none changed, the node is clean again
//!      without running its computation.
//! 3. After a recompute, an equal value stops everything. A changed value
//!    marks listeners `Dirty`, fires the node's callbacks and brings hot
//!    listeners up to date, depth first.
//!
//! A dependency that fails while a `Check` node verifies it forces that node
//! to recompute: the node's own computation decides how to handle the error.
//!
//! Step 3 is what keeps propagation glitch-free: a derived value that comes
//! out unchanged never causes anything below it to run.

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::{try_with_graph, with_graph, Callback, NodeId, NodeStatus};
use crate::error::{Error, Result};
use crate::reactive::context::{FrameOwner, TrackingFrame};
use crate::reactive::SubscriberId;

/// Record the read in the innermost tracking frame and bring `id` up to date.
///
/// The read is recorded even when bringing the node up to date fails, so a
/// caller that recovers from the error still listens for the node to change.
/// Only a read that would close a cycle is not recorded.
pub(crate) fn read(id: NodeId) -> Result<()> {
    ensure_not_computing(id)?;
    TrackingFrame::track(id);
    refresh(id)
}

/// Bring `id` up to date without recording a read.
pub(crate) fn refresh(id: NodeId) -> Result<()> {
    match status(id) {
        NodeStatus::Clean => Ok(()),
        NodeStatus::Dirty => recompute(id),
        NodeStatus::Check => check(id),
        NodeStatus::Computing => Err(cycle(id)),
    }
}

/// Fail with a cycle error if `id` is on the current call stack.
pub(crate) fn ensure_not_computing(id: NodeId) -> Result<()> {
    match status(id) {
        NodeStatus::Computing => Err(cycle(id)),
        _ => Ok(()),
    }
}

/// Invalidate `id` from outside the graph.
///
/// A hot node recomputes and propagates immediately. A cold node only gets
/// marked; its computation runs the next time it is read.
pub(crate) fn update(id: NodeId) -> Result<()> {
    ensure_not_computing(id)?;

    let (label, hot) = with_graph(|graph| {
        let node = graph.node_mut(id);
        node.set_status(NodeStatus::Dirty);
        let label = node.label().clone();
        let hot = node.is_hot();
        graph.mark_listeners_for_check(id);
        (label, hot)
    });

    debug!(node = %label, hot, "update");
    if hot {
        recompute(id)
    } else {
        Ok(())
    }
}

/// A removed node has nothing left to do and reports `Clean`.
fn status(id: NodeId) -> NodeStatus {
    with_graph(|graph| graph.get(id).map_or(NodeStatus::Clean, |node| node.status()))
}

fn cycle(id: NodeId) -> Error {
    let node = with_graph(|graph| graph.node(id).label().to_string());
    warn!(node = %node, "cyclic dependency");
    Error::CyclicDependency { node }
}

/// Resolve a `Check` node by refreshing its dependencies.
fn check(id: NodeId) -> Result<()> {
    let dependencies: SmallVec<[NodeId; 8]> =
        with_graph(|graph| graph.node(id).dependencies().iter().copied().collect());

    for dependency in dependencies {
        if let Err(err) = refresh(dependency) {
            trace!(error = %err, "dependency failed, recomputing");
            with_graph(|graph| {
                if graph.get(id).is_some_and(|node| node.status() == NodeStatus::Check) {
                    graph.node_mut(id).set_status(NodeStatus::Dirty);
                }
            });
            break;
        }
        if status(id) != NodeStatus::Check {
            break;
        }
    }

    match status(id) {
        NodeStatus::Check => {
            with_graph(|graph| {
                let node = graph.node_mut(id);
                node.set_status(NodeStatus::Clean);
                trace!(node = %node.label(), "dependencies unchanged");
            });
            Ok(())
        }
        NodeStatus::Dirty => recompute(id),
        // A hot node may already have been recomputed by its dependency.
        NodeStatus::Clean => Ok(()),
        NodeStatus::Computing => Err(cycle(id)),
    }
}

/// Resets a node to `Dirty` if its computation unwinds.
struct ComputingGuard {
    id: NodeId,
    armed: bool,
}

impl Drop for ComputingGuard {
    fn drop(&mut self) {
        if self.armed {
            try_with_graph(|graph| {
                if graph.contains(self.id) {
                    graph.node_mut(self.id).set_status(NodeStatus::Dirty);
                }
            });
        }
    }
}

/// Run the node's computation and commit the result.
fn recompute(id: NodeId) -> Result<()> {
    let (slot, label) = with_graph(|graph| {
        let node = graph.node_mut(id);
        node.set_status(NodeStatus::Computing);
        (node.slot(), node.label().clone())
    });
    trace!(node = %label, "recomputing");

    let mut guard = ComputingGuard { id, armed: true };
    let frame = TrackingFrame::enter(FrameOwner::Node(id));
    let outcome = slot.evaluate();
    let reads = frame.finish();
    guard.armed = false;

    let changed = match outcome {
        Ok(changed) => changed,
        Err(err) => {
            with_graph(|graph| {
                if graph.contains(id) {
                    graph.node_mut(id).set_status(NodeStatus::Dirty);
                }
            });
            debug!(node = %label, error = %err, "computation failed");
            return Err(err);
        }
    };

    // The wrapper may have been dropped while its computation ran.
    let live = with_graph(|graph| {
        if !graph.contains(id) {
            return false;
        }
        graph.commit_dependencies(id, reads);
        graph.node_mut(id).set_status(NodeStatus::Clean);
        true
    });

    if !live {
        Ok(())
    } else if changed {
        trace!(node = %label, "value changed");
        propagate_change(id)
    } else {
        trace!(node = %label, "value unchanged");
        Ok(())
    }
}

/// Push a value change to listeners and callbacks of `id`.
fn propagate_change(id: NodeId) -> Result<()> {
    let (listeners, callbacks) = with_graph(|graph| {
        let listeners: SmallVec<[NodeId; 8]> = graph.node(id).listeners().iter().copied().collect();
        for listener in listeners.iter().copied() {
            graph.invalidate(listener);
        }
        let callbacks: SmallVec<[(SubscriberId, Callback); 4]> = graph
            .node(id)
            .callbacks()
            .iter()
            .map(|(subscriber, callback)| (*subscriber, callback.clone()))
            .collect();
        (listeners, callbacks)
    });

    for (subscriber, callback) in callbacks {
        // An earlier callback may have unsubscribed this one.
        let attached = with_graph(|graph| graph.has_callback(id, subscriber));
        if attached {
            let _untracked = TrackingFrame::enter(FrameOwner::Untracked);
            callback();
        }
    }

    for listener in listeners {
        let pending = with_graph(|graph| {
            graph.get(listener).is_some_and(|node| {
                node.is_hot() && matches!(node.status(), NodeStatus::Dirty | NodeStatus::Check)
            })
        });
        if pending {
            refresh(listener)?;
        }
    }

    Ok(())
}
