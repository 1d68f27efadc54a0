//! Reactive Runtime
//!
//! The runtime is the thread's view of the graph as a whole. Reactive
//! wrappers and autosubscribe bindings talk to the graph directly; this
//! facade covers what does not belong to any single wrapper.
//!
//! # Thread Model
//!
//! The graph and the tracking stack are thread-local. Each thread has an
//! independent graph, and reactive handles cannot cross threads. An embedding
//! that needs several threads must route every graph operation through one
//! of them.

use super::context::{FrameOwner, TrackingFrame};
use crate::graph::{with_graph, GraphSnapshot};

/// Entry point for graph-wide operations on the current thread.
pub struct Runtime;

impl Runtime {
    /// Check if reads are currently being recorded as dependencies.
    pub fn is_tracking() -> bool {
        TrackingFrame::is_active()
    }

    /// Run `f` without recording any of its reads as dependencies of the
    /// surrounding computation or autosubscribe binding.
    pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
        let frame = TrackingFrame::enter(FrameOwner::Untracked);
        let output = f();
        frame.finish();
        output
    }

    /// Number of nodes in this thread's graph.
    pub fn node_count() -> usize {
        with_graph(|graph| graph.len())
    }

    /// Capture every node, its status, heat and edges.
    pub fn snapshot() -> GraphSnapshot {
        with_graph(|graph| GraphSnapshot::capture(graph))
    }
}
