//! Reactive Primitives
//!
//! This module implements the public face of the engine: reactive wrappers,
//! subscriptions and autosubscribe bindings.
//!
//! # Concepts
//!
//! ## Reactive
//!
//! A [`Reactive`] wraps a computation and memoizes its result, one node per
//! key. Reading it inside another computation registers that computation as
//! a listener, so dependencies are discovered automatically.
//!
//! ## Subscriptions
//!
//! [`Reactive::subscribe`] attaches a callback that fires when the value
//! changes. A subscribed node, and everything it depends on, is recomputed
//! eagerly instead of waiting for the next read.
//!
//! ## Autosubscribe
//!
//! [`autosubscribe`] runs a plain closure with tracking and fires a one-shot
//! callback when anything it read changes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking stack to detect
//! dependencies. When a node is read, we check whether a tracking frame is
//! active and, if so, record the read in the innermost one.

mod autosubscribe;
pub(crate) mod context;
mod runtime;
mod subscriber;
mod wrapper;

pub use autosubscribe::{autosubscribe, AutoSubscriber};
pub use runtime::Runtime;
pub use subscriber::{SubscriberId, Subscription};
pub use wrapper::{Computation, Reactive, ReactiveBuilder};
