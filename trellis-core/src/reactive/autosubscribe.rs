//! Autosubscribe
//!
//! Runs a plain closure with dependency tracking and listens to whatever it
//! read, without wrapping the closure as a node.
//!
//! # How Autosubscribe Works
//!
//! 1. [`autosubscribe`] pushes a tracking frame for the binding and runs the
//!    closure. Every reactive value read inside is recorded.
//!
//! 2. The binding's listener edges are swapped to exactly that set: values
//!    no longer read are released, new ones are attached. This happens
//!    whether the closure succeeded or not.
//!
//! 3. The first time any tracked value changes, every edge of the binding
//!    is torn down and `on_invalidate` runs once.
//!
//! 4. To keep listening, `on_invalidate` calls [`autosubscribe`] again with
//!    the binding it receives, which tracks the new dependency set.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use trellis_core::reactive::{autosubscribe, AutoSubscriber, Reactive};
//!
//! let input = Rc::new(Cell::new(1));
//! let source = input.clone();
//! let count = Reactive::new(move |_: &()| Ok(source.get()));
//!
//! let seen = Rc::new(Cell::new(0));
//! let seen_in_view = seen.clone();
//! let count_in_view = count.clone();
//! let render = move |binding: &AutoSubscriber| {
//!     autosubscribe(binding, || seen_in_view.set(count_in_view.get().unwrap()));
//! };
//!
//! let view = AutoSubscriber::new(render.clone());
//! render(&view);
//! assert_eq!(seen.get(), 1);
//!
//! input.set(2);
//! count.update(&()).unwrap();
//! assert_eq!(seen.get(), 2);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::debug;

use super::context::{FrameOwner, TrackingFrame};
use super::SubscriberId;
use crate::graph::{try_with_graph, with_graph, Callback, NodeId};

struct Binding {
    id: SubscriberId,
    on_invalidate: Box<dyn Fn(&AutoSubscriber)>,
    /// Nodes this binding currently listens to.
    tracked: RefCell<IndexSet<NodeId>>,
    /// Bumped on every rebind and teardown; callbacks attached by an older
    /// run are ignored.
    generation: Cell<u64>,
}

impl Binding {
    /// Detach from every tracked node.
    ///
    /// Returns the removed callbacks, to be dropped by the caller once the
    /// graph is released.
    fn release(&self, graph: &mut crate::graph::GraphState) -> SmallVec<[Callback; 4]> {
        self.tracked
            .take()
            .into_iter()
            .filter_map(|node| graph.detach_callback(node, self.id))
            .collect()
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        let removed = try_with_graph(|graph| self.release(graph));
        drop(removed);
    }
}

/// A one-shot invalidation listener over a dynamic set of reactive values.
///
/// Clones share the same binding. The edges are torn down when the binding
/// fires, when [`AutoSubscriber::unsubscribe`] is called, or when the last
/// clone is dropped.
#[derive(Clone)]
pub struct AutoSubscriber {
    inner: Rc<Binding>,
}

impl AutoSubscriber {
    /// Create a binding that calls `on_invalidate` once per change of the
    /// values read by its latest [`autosubscribe`] run.
    pub fn new<F>(on_invalidate: F) -> Self
    where
        F: Fn(&AutoSubscriber) + 'static,
    {
        Self {
            inner: Rc::new(Binding {
                id: SubscriberId::new(),
                on_invalidate: Box::new(on_invalidate),
                tracked: RefCell::new(IndexSet::new()),
                generation: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Number of nodes currently listened to.
    pub fn tracked_count(&self) -> usize {
        self.inner.tracked.borrow().len()
    }

    /// Whether the binding is waiting for a change.
    pub fn is_subscribed(&self) -> bool {
        self.tracked_count() > 0
    }

    /// Same as [`autosubscribe`]`(self, computation)`.
    pub fn run<R>(&self, computation: impl FnOnce() -> R) -> R {
        autosubscribe(self, computation)
    }

    /// Stop listening without firing.
    pub fn unsubscribe(&self) {
        self.bump();
        let removed = with_graph(|graph| self.inner.release(graph));
        drop(removed);
        debug!(subscriber = %self.inner.id, "autosubscribe released");
    }

    fn bump(&self) -> u64 {
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);
        generation
    }

    /// Swap the tracked set for `reads`.
    fn rebind(&self, mut reads: IndexSet<NodeId>) {
        let generation = self.bump();
        let id = self.inner.id;

        let (old, removed) = with_graph(|graph| {
            // Wrappers dropped during the run leave nothing to listen to.
            reads.retain(|node| graph.contains(*node));
            let old = self.inner.tracked.replace(reads.clone());

            let mut removed: SmallVec<[Callback; 4]> = SmallVec::new();
            for node in old.iter().copied().filter(|node| !reads.contains(node)) {
                removed.extend(graph.detach_callback(node, id));
            }
            for node in reads.iter().copied() {
                let callback = self.callback(generation);
                removed.extend(graph.attach_callback(node, id, callback));
            }
            (old, removed)
        });
        drop(removed);

        debug!(
            subscriber = %id,
            tracked = reads.len(),
            released = old.iter().filter(|node| !reads.contains(*node)).count(),
            "autosubscribe rebound"
        );
    }

    fn callback(&self, generation: u64) -> Callback {
        let binding: Weak<Binding> = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = binding.upgrade() {
                AutoSubscriber { inner }.fire(generation);
            }
        })
    }

    /// One-shot notification: tear everything down, then call the handler.
    fn fire(&self, generation: u64) {
        if self.inner.generation.get() != generation {
            return;
        }
        self.bump();
        let removed = with_graph(|graph| self.inner.release(graph));
        drop(removed);

        debug!(subscriber = %self.inner.id, "autosubscribe invalidated");
        (self.inner.on_invalidate)(self);
    }
}

impl fmt::Debug for AutoSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoSubscriber")
            .field("id", &self.inner.id)
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

/// Run `computation`, then listen to every reactive value it read.
///
/// Values tracked by an earlier run of the same `subscriber` that were not
/// read this time are released. The output of `computation` (including an
/// error) is returned unchanged; tracking is updated either way.
pub fn autosubscribe<R>(subscriber: &AutoSubscriber, computation: impl FnOnce() -> R) -> R {
    let frame = TrackingFrame::enter(FrameOwner::Subscriber(subscriber.id()));
    let output = computation();
    let reads = frame.finish();
    subscriber.rebind(reads);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Reactive;

    fn source(start: i32) -> (Rc<Cell<i32>>, Reactive<(), i32>) {
        let input = Rc::new(Cell::new(start));
        let value = input.clone();
        (input, Reactive::new(move |_: &()| Ok(value.get())))
    }

    #[test]
    fn tracks_reads_and_fires_once() {
        let (input, a) = source(1);
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let binding = AutoSubscriber::new(move |_| fired_clone.set(fired_clone.get() + 1));

        let value = autosubscribe(&binding, || a.get().unwrap());
        assert_eq!(value, 1);
        assert_eq!(binding.tracked_count(), 1);
        assert!(a.is_hot(&()));

        input.set(2);
        a.update(&()).unwrap();
        assert_eq!(fired.get(), 1);
        assert!(!binding.is_subscribed());
        assert!(!a.is_hot(&()));

        // One-shot: nothing listens any more.
        input.set(3);
        a.update(&()).unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn unchanged_values_do_not_fire() {
        let (_input, a) = source(1);
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let binding = AutoSubscriber::new(move |_| fired_clone.set(fired_clone.get() + 1));

        binding.run(|| a.get().unwrap());
        a.update(&()).unwrap();
        assert_eq!(fired.get(), 0);
        assert!(binding.is_subscribed());
    }

    #[test]
    fn rerun_releases_values_no_longer_read() {
        let (_a_input, a) = source(1);
        let (_b_input, b) = source(2);
        let binding = AutoSubscriber::new(|_| {});

        binding.run(|| a.get().unwrap() + b.get().unwrap());
        assert!(a.has_listeners(&()));
        assert!(b.has_listeners(&()));

        binding.run(|| b.get().unwrap());
        assert!(!a.has_listeners(&()));
        assert!(b.has_listeners(&()));
        assert_eq!(binding.tracked_count(), 1);
    }

    #[test]
    fn failed_runs_still_track_what_was_read() {
        let (input, a) = source(1);
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let binding = AutoSubscriber::new(move |_| fired_clone.set(fired_clone.get() + 1));

        let output: crate::Result<i32> = binding.run(|| {
            a.get()?;
            Err(crate::Error::msg("render failed"))
        });
        assert!(output.is_err());
        assert_eq!(binding.tracked_count(), 1);

        input.set(5);
        a.update(&()).unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn failed_reads_are_tracked_until_recovery() {
        let fail = Rc::new(Cell::new(true));
        let fail_clone = fail.clone();
        let src = Reactive::new(move |_: &()| {
            if fail_clone.get() {
                Err(crate::Error::msg("offline"))
            } else {
                Ok(7)
            }
        });
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let binding = AutoSubscriber::new(move |_| fired_clone.set(fired_clone.get() + 1));

        let output = binding.run(|| src.get());
        assert!(output.is_err());
        assert_eq!(binding.tracked_count(), 1);

        fail.set(false);
        src.update(&()).unwrap();
        assert_eq!(fired.get(), 1);
        assert_eq!(src.get().unwrap(), 7);
    }

    #[test]
    fn dropping_the_binding_detaches_it() {
        let (_input, a) = source(1);
        let binding = AutoSubscriber::new(|_| {});
        binding.run(|| a.get().unwrap());
        assert!(a.has_listeners(&()));

        drop(binding);
        assert!(!a.has_listeners(&()));
        assert!(!a.is_hot(&()));
    }

    #[test]
    fn explicit_unsubscribe_never_fires() {
        let (input, a) = source(1);
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let binding = AutoSubscriber::new(move |_| fired_clone.set(true));
        binding.run(|| a.get().unwrap());

        binding.unsubscribe();
        input.set(9);
        a.update(&()).unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn reads_inside_nodes_attribute_to_the_node() {
        let (_input, a) = source(1);
        let a2 = a.clone();
        let b = Reactive::new(move |_: &()| Ok(a2.get()? + 1));
        let binding = AutoSubscriber::new(|_| {});

        binding.run(|| b.get().unwrap());
        assert_eq!(binding.tracked_count(), 1);
        assert_eq!(a.listener_count(&()), 1);
        assert_eq!(b.listener_count(&()), 1);
        // The binding heats the whole chain.
        assert!(a.is_hot(&()));
    }
}
