//! Error types for graph evaluation.
//!
//! Computations return [`Result<T>`]. Errors raised by reads of other nodes
//! pass through a computation untouched when propagated with `?`, so the
//! caller at the top of the stack sees the error that actually happened.

use std::sync::Arc;

/// Convenience alias used by computations and graph operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by reads, updates and subscriptions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A node that is still computing was read or updated again.
    ///
    /// Nothing is committed: the node keeps its previous value and edges and
    /// returns to `Dirty` once the failing computation unwinds.
    #[error("cyclic dependency detected at {node}")]
    CyclicDependency {
        /// Label of the node observed in the `Computing` state.
        node: String,
    },

    /// The wrapped computation reported a failure.
    ///
    /// The node stays `Dirty`, keeps its previous value and edges, and no
    /// listener is notified.
    #[error("computation failed: {0}")]
    ComputationFailed(Arc<anyhow::Error>),
}

impl Error {
    /// Wrap an arbitrary error as a computation failure.
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        Error::ComputationFailed(Arc::new(err.into()))
    }

    /// Build a computation failure from a message.
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Error::ComputationFailed(Arc::new(anyhow::Error::msg(message)))
    }

    /// Returns `true` for [`Error::CyclicDependency`].
    pub fn is_cycle(&self) -> bool {
        matches!(self, Error::CyclicDependency { .. })
    }

    /// Attempts to downcast a computation failure to a concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Error::ComputationFailed(err) => err.downcast_ref::<E>(),
            Error::CyclicDependency { .. } => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::ComputationFailed(Arc::new(err))
    }
}
