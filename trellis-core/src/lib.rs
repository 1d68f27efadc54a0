//! Trellis Core
//!
//! This crate provides the dependency-tracking graph behind the Trellis
//! incremental computation engine. It implements:
//!
//! - Memoized computations with automatic dependency discovery
//! - Keyed (parameterized) memoization
//! - Lazy invalidation with glitch-free, on-demand recomputation
//! - Eager recomputation for subscribed values
//! - One-shot autosubscribe bindings over dynamic dependency sets
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: wrappers, subscriptions, autosubscribe and tracking
//! - `graph`: the node arena and the propagation algorithm
//! - `key`: key resolution for parameterized computations
//! - `compare`: equality policies for change detection
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use trellis_core::reactive::Reactive;
//!
//! let x = Rc::new(Cell::new(2));
//! let source = x.clone();
//! let a = Reactive::builder(move |_: &()| Ok(source.get())).name("a").build();
//!
//! let a2 = a.clone();
//! let b = Reactive::builder(move |_: &()| Ok(a2.get()? * 2)).name("b").build();
//! let b2 = b.clone();
//! let c = Reactive::builder(move |_: &()| Ok(b2.get()? > 10)).name("c").build();
//! let c2 = c.clone();
//! let d = Reactive::builder(move |_: &()| Ok(if c2.get()? { 40 } else { 20 }))
//!     .name("d")
//!     .build();
//!
//! assert_eq!(d.get().unwrap(), 20);
//!
//! // Nothing recomputes until `d` is read again.
//! x.set(6);
//! a.update(&()).unwrap();
//! assert_eq!(d.get().unwrap(), 40);
//! ```
//!
//! The graph is single-threaded: each thread owns an independent graph, and
//! handles cannot be sent across threads.

pub mod compare;
pub mod error;
pub mod graph;
pub mod key;
pub mod reactive;

pub use error::{Error, Result};
pub use graph::{GraphSnapshot, NodeId, NodeSnapshot, NodeStatus};
pub use key::Key;
pub use reactive::{autosubscribe, AutoSubscriber, Reactive, ReactiveBuilder, Runtime, Subscription};
