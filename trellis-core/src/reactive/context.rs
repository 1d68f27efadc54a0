//! Tracking Context
//!
//! The tracking context records which nodes a running computation reads, so
//! dependencies are discovered rather than declared.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Recomputing a node or running an
//! autosubscribe binding pushes a frame; every successful read is recorded in
//! the innermost frame only. When the computation completes, the frame is
//! popped and its reads become the new dependency set.
//!
//! This supports nesting: a node recomputed while another node is computing
//! attributes its reads to its own frame, not the outer one.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::SubscriberId;
use crate::graph::NodeId;

thread_local! {
    static FRAME_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// Who a tracking frame records reads for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOwner {
    /// A node being recomputed.
    Node(NodeId),
    /// An autosubscribe binding.
    Subscriber(SubscriberId),
    /// Reads are deliberately not attributed to anyone.
    Untracked,
}

#[derive(Debug)]
struct Frame {
    owner: FrameOwner,
    reads: IndexSet<NodeId>,
}

/// Guard for one tracking frame.
///
/// Call [`TrackingFrame::finish`] to pop the frame and collect its reads. If
/// the guard is dropped instead (for example while unwinding), the frame is
/// popped and its reads are discarded.
pub(crate) struct TrackingFrame {
    owner: FrameOwner,
    finished: bool,
}

impl TrackingFrame {
    /// Push a new frame for `owner`.
    pub fn enter(owner: FrameOwner) -> Self {
        FRAME_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                owner,
                reads: IndexSet::new(),
            });
        });

        Self {
            owner,
            finished: false,
        }
    }

    /// Pop the frame and return the nodes read while it was active, in the
    /// order they were first read.
    pub fn finish(mut self) -> IndexSet<NodeId> {
        self.finished = true;
        self.pop().map(|frame| frame.reads).unwrap_or_default()
    }

    /// Check if reads on this thread are currently being recorded.
    pub fn is_active() -> bool {
        Self::current_owner().is_some_and(|owner| owner != FrameOwner::Untracked)
    }

    /// Owner of the innermost frame, if any.
    pub fn current_owner() -> Option<FrameOwner> {
        FRAME_STACK.with(|stack| stack.borrow().last().map(|frame| frame.owner))
    }

    /// Record a read of `node` in the innermost frame.
    pub fn track(node: NodeId) {
        FRAME_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                if frame.owner != FrameOwner::Untracked {
                    frame.reads.insert(node);
                }
            }
        });
    }

    fn pop(&self) -> Option<Frame> {
        FRAME_STACK
            .try_with(|stack| {
                let popped = stack.borrow_mut().pop();

                // Frames are strictly nested; a mismatch means a guard escaped.
                if let Some(frame) = &popped {
                    debug_assert_eq!(
                        frame.owner, self.owner,
                        "TrackingFrame mismatch: expected {:?}, got {:?}",
                        self.owner, frame.owner
                    );
                }
                popped
            })
            .ok()
            .flatten()
    }
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}
