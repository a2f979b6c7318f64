//! Routing error types

use std::time::Duration;

use thiserror::Error;

use relaymesh_core::NodeName;

/// Errors from the mutex-guarded dedup/load state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharedStateError {
    /// The lock could not be acquired in time; another worker is wedged
    #[error("Shared state lock not acquired within {0:?}")]
    LockTimeout(Duration),

    /// A load update named a node that is not a configured neighbor
    #[error("Not a configured neighbor: {0}")]
    UnknownNeighbor(NodeName),
}

/// Errors from the local payload journal
#[derive(Debug, Clone, Error)]
pub enum JournalError {
    /// Raised by [`PayloadJournal`](crate::PayloadJournal) sinks that can fail;
    /// [`MemoryJournal`](crate::MemoryJournal) never does
    #[error("Journal append failed: {0}")]
    AppendFailed(String),
}

/// Errors surfaced by the forwarding engine
///
/// Transport failures are not errors at this level: they are an ordinary
/// [`ForwardOutcome`](crate::ForwardOutcome).
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Shared state unavailable; fatal for the node
    #[error("Shared state error: {0}")]
    SharedState(#[from] SharedStateError),

    /// Local persistence failed
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
}

impl RoutingError {
    /// Whether the node must stop serving after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoutingError::SharedState(SharedStateError::LockTimeout(_)))
    }
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
