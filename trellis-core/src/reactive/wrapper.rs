//! Reactive Wrapper
//!
//! A [`Reactive`] wraps a computation and memoizes its result per key.
//!
//! # How It Works
//!
//! 1. A call resolves a [`Key`] from the arguments and looks up (or creates)
//!    the node for that key.
//!
//! 2. If the node is clean, its cached value is returned. Otherwise the
//!    computation runs inside a tracking frame and every reactive value it
//!    reads becomes a dependency.
//!
//! 3. If the call happens inside another computation, the caller is recorded
//!    as a listener of this node.
//!
//! 4. [`Reactive::update`] re-injects change from outside: it invalidates the
//!    node and, if the node is subscribed, recomputes and propagates at once.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use trellis_core::reactive::Reactive;
//!
//! let input = Rc::new(Cell::new(2));
//! let source = input.clone();
//! let a = Reactive::new(move |_: &()| Ok(source.get()));
//! let a2 = a.clone();
//! let doubled = Reactive::new(move |_: &()| Ok(a2.get()? * 2));
//!
//! assert_eq!(doubled.get().unwrap(), 4);
//!
//! input.set(5);
//! a.update(&()).unwrap();
//! assert_eq!(doubled.get().unwrap(), 10);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::debug;

use super::subscriber::{SubscriberId, Subscription};
use crate::compare::{self, Equality};
use crate::error::{Error, Result};
use crate::graph::{propagate, try_with_graph, with_graph, NodeId, NodeSlot, NodeStatus};
use crate::key::{self, Key, KeyFn};

/// Counter for default reactive names.
static REACTIVE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_reactive_name() -> String {
    format!("reactive#{}", REACTIVE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A wrapped computation.
pub type Computation<A, T> = Rc<dyn Fn(&A) -> Result<T>>;

/// Typed storage for one (computation, key) pair.
struct NodeCell<A, T> {
    /// Arguments the computation is invoked with.
    args: RefCell<A>,
    value: RefCell<Option<T>>,
    compute: Computation<A, T>,
    equals: Equality<T>,
}

impl<A: Clone, T> NodeCell<A, T> {
    fn cached(&self) -> Option<T>
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    fn rebind(&self, args: A) {
        *self.args.borrow_mut() = args;
    }
}

impl<A: Clone, T> NodeSlot for NodeCell<A, T> {
    fn evaluate(&self) -> Result<bool> {
        // Cloned so the computation may rebind arguments re-entrantly.
        let args = self.args.borrow().clone();
        let new_value = (self.compute)(&args)?;

        let mut value = self.value.borrow_mut();
        let changed = match value.as_ref() {
            Some(old) => !(self.equals)(old, &new_value),
            None => true,
        };
        if changed {
            *value = Some(new_value);
        }
        Ok(changed)
    }
}

struct Entry<A, T> {
    id: NodeId,
    cell: Rc<NodeCell<A, T>>,
}

impl<A, T> Clone for Entry<A, T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
        }
    }
}

struct Inner<A, T> {
    name: Rc<str>,
    compute: Computation<A, T>,
    key_fn: Option<KeyFn<A>>,
    equals: Equality<T>,
    nodes: RefCell<IndexMap<Key, Entry<A, T>>>,
}

impl<A, T> Drop for Inner<A, T> {
    fn drop(&mut self) {
        let ids: SmallVec<[NodeId; 4]> = self.nodes.get_mut().values().map(|entry| entry.id).collect();
        if ids.is_empty() {
            return;
        }

        // Records own computations that may hold other wrappers; they are
        // dropped once the graph is released.
        let removed = try_with_graph(|graph| {
            ids.iter()
                .filter_map(|id| graph.remove(*id))
                .collect::<Vec<_>>()
        });
        if let Some(removed) = removed {
            debug!(reactive = %self.name, nodes = removed.len(), "nodes removed");
            drop(removed);
        }
    }
}

/// Memoized, dependency-tracked computation.
///
/// # Type Parameters
///
/// - `A`: the argument type. Use `()` for an unparameterized computation.
/// - `T`: the computed value. Reads hand out clones, so cheap-to-clone values
///   (or `Rc`) work best.
///
/// Clones share state: every clone resolves to the same nodes. Once the last
/// clone is dropped, the nodes are removed from the graph and their listeners
/// are marked dirty.
pub struct Reactive<A, T> {
    inner: Rc<Inner<A, T>>,
}

impl<A, T> Clone for Reactive<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A, T> Reactive<A, T>
where
    A: Clone + 'static,
    T: Clone + 'static,
{
    /// Wrap `compute` as a single, unkeyed node using `PartialEq` to detect
    /// changes.
    ///
    /// Nothing runs until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&A) -> Result<T> + 'static,
        T: PartialEq,
    {
        Self::builder(compute).build()
    }

    /// Start configuring a wrapper for `compute`.
    pub fn builder<F>(compute: F) -> ReactiveBuilder<A, T>
    where
        F: Fn(&A) -> Result<T> + 'static,
    {
        ReactiveBuilder::new(compute)
    }

    /// Name used in node labels.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Read the value for `args`, recomputing if it is stale.
    ///
    /// When called from inside another computation or an autosubscribe
    /// binding, the read is recorded as a dependency of that caller.
    pub fn call(&self, args: &A) -> Result<T> {
        let entry = self.resolve(args);
        propagate::read(entry.id)?;
        entry
            .cell
            .cached()
            .ok_or_else(|| Error::msg(format!("no cached value for {}", self.label(args))))
    }

    /// Invalidate the node for `args`, rebinding it to these arguments.
    ///
    /// If the node is subscribed (directly or through a listener), it is
    /// recomputed now and changes propagate synchronously; errors from that
    /// pass are returned here. Otherwise the recomputation waits until the
    /// next read.
    pub fn update(&self, args: &A) -> Result<()> {
        let entry = self.resolve(args);
        propagate::ensure_not_computing(entry.id)?;
        entry.cell.rebind(args.clone());
        propagate::update(entry.id)
    }

    /// Call `callback` with the new value every time the value for `args`
    /// changes.
    ///
    /// The node is brought up to date first so its dependencies are known;
    /// from then on it and everything it depends on recompute eagerly. The
    /// callback is not invoked for recomputations that produce an equal
    /// value. Drop the returned [`Subscription`] to unsubscribe.
    pub fn subscribe<F>(&self, args: &A, callback: F) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        let entry = self.resolve(args);
        propagate::refresh(entry.id)?;

        let id = SubscriberId::new();
        let cell = Rc::clone(&entry.cell);
        let notify = Rc::new(move || {
            // Cloned so the callback may read or update this node.
            if let Some(value) = cell.cached() {
                callback(&value);
            }
        });

        let previous = with_graph(|graph| graph.attach_callback(entry.id, id, notify));
        drop(previous);
        debug!(node = %self.label(args), subscriber = %id, "subscribed");

        Ok(Subscription::new(id, entry.id))
    }

    /// Whether the node for `args` read anything during its last computation.
    ///
    /// Never triggers a computation; `false` if the node does not exist.
    pub fn has_dependencies(&self, args: &A) -> bool {
        self.dependency_count(args) > 0
    }

    /// Whether anything listens to the node for `args`: nodes that read it
    /// or attached callbacks.
    ///
    /// Never triggers a computation; `false` if the node does not exist.
    pub fn has_listeners(&self, args: &A) -> bool {
        self.listener_count(args) > 0
    }

    /// Number of nodes read during the last computation.
    pub fn dependency_count(&self, args: &A) -> usize {
        self.inspect(args, |graph, id| graph.node(id).dependencies().len())
            .unwrap_or(0)
    }

    /// Number of listening nodes plus attached callbacks.
    pub fn listener_count(&self, args: &A) -> usize {
        self.inspect(args, |graph, id| {
            let node = graph.node(id);
            node.listeners().len() + node.callbacks().len()
        })
        .unwrap_or(0)
    }

    /// Whether the node for `args` is recomputed eagerly.
    pub fn is_hot(&self, args: &A) -> bool {
        self.inspect(args, |graph, id| graph.node(id).is_hot())
            .unwrap_or(false)
    }

    /// Status of the node for `args`, if it exists.
    pub fn status(&self, args: &A) -> Option<NodeStatus> {
        self.inspect(args, |graph, id| graph.node(id).status())
    }

    /// Graph handle of the node for `args`, if it exists.
    pub fn node_id(&self, args: &A) -> Option<NodeId> {
        self.lookup(args).map(|entry| entry.id)
    }

    /// Keys that currently have a node, in creation order.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.nodes.borrow().keys().cloned().collect()
    }

    fn key(&self, args: &A) -> Key {
        key::resolve(self.inner.key_fn.as_ref(), args)
    }

    fn label(&self, args: &A) -> String {
        key::label(&self.inner.name, &self.key(args))
    }

    fn lookup(&self, args: &A) -> Option<Entry<A, T>> {
        self.inner.nodes.borrow().get(&self.key(args)).cloned()
    }

    fn inspect<R>(
        &self,
        args: &A,
        f: impl FnOnce(&crate::graph::GraphState, NodeId) -> R,
    ) -> Option<R> {
        let entry = self.lookup(args)?;
        Some(with_graph(|graph| f(graph, entry.id)))
    }

    /// Get or create the node for `args`.
    fn resolve(&self, args: &A) -> Entry<A, T> {
        let key = self.key(args);
        if let Some(entry) = self.inner.nodes.borrow().get(&key) {
            return entry.clone();
        }

        let cell = Rc::new(NodeCell {
            args: RefCell::new(args.clone()),
            value: RefCell::new(None),
            compute: Rc::clone(&self.inner.compute),
            equals: Rc::clone(&self.inner.equals),
        });
        let label = key::label(&self.inner.name, &key);
        let slot: Rc<dyn NodeSlot> = cell.clone();
        let id = with_graph(|graph| graph.insert(label, slot));

        let entry = Entry { id, cell };
        self.inner.nodes.borrow_mut().insert(key, entry.clone());
        entry
    }
}

impl<T> Reactive<(), T>
where
    T: Clone + 'static,
{
    /// Read an unparameterized computation.
    pub fn get(&self) -> Result<T> {
        self.call(&())
    }
}

impl<A, T> fmt::Debug for Reactive<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("name", &self.inner.name)
            .field("keyed", &self.inner.key_fn.is_some())
            .field("nodes", &self.inner.nodes.borrow().len())
            .finish()
    }
}

/// Configuration for a [`Reactive`].
///
/// | Option | Default |
/// |---|---|
/// | [`name`](Self::name) | `reactive#<n>` |
/// | [`key`](Self::key) / [`hashed_key`](Self::hashed_key) | one node for all arguments |
/// | [`equals`](Self::equals) | `PartialEq` |
pub struct ReactiveBuilder<A, T> {
    name: Option<String>,
    compute: Computation<A, T>,
    key_fn: Option<KeyFn<A>>,
    equals: Option<Equality<T>>,
}

impl<A, T> ReactiveBuilder<A, T>
where
    A: Clone + 'static,
    T: Clone + 'static,
{
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&A) -> Result<T> + 'static,
    {
        Self {
            name: None,
            compute: Rc::new(compute),
            key_fn: None,
            equals: None,
        }
    }

    /// Name used in node labels, logs and errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Derive one node per distinct key.
    pub fn key<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&A) -> Key + 'static,
    {
        self.key_fn = Some(Rc::new(key_fn));
        self
    }

    /// Derive one node per distinct argument hash.
    pub fn hashed_key(self) -> Self
    where
        A: Hash,
    {
        self.key(|args| Key::hashed(args))
    }

    /// Comparator deciding whether a recomputed value changed.
    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.equals = Some(Rc::new(equals));
        self
    }

    /// Finish, falling back to `PartialEq` when no comparator was set.
    pub fn build(self) -> Reactive<A, T>
    where
        T: PartialEq,
    {
        let equals: Equality<T> = match &self.equals {
            Some(equals) => Rc::clone(equals),
            None => Rc::new(compare::partial_eq::<T>),
        };
        self.finish(equals)
    }

    /// Finish with an explicit comparator, for values without `PartialEq`.
    pub fn build_with<F>(self, equals: F) -> Reactive<A, T>
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.finish(Rc::new(equals))
    }

    fn finish(self, equals: Equality<T>) -> Reactive<A, T> {
        Reactive {
            inner: Rc::new(Inner {
                name: self.name.unwrap_or_else(next_reactive_name).into(),
                compute: self.compute,
                key_fn: self.key_fn,
                equals,
                nodes: RefCell::new(IndexMap::new()),
            }),
        }
    }
}
