//! Error types for the node runtime

use std::path::PathBuf;

use thiserror::Error;

use relaymesh_core::{IdentityError, TopologyError};
use relaymesh_routing::{RoutingError, SharedStateError, UnknownStrategy};
use relaymesh_transport::ServerError;

/// Errors loading the mesh configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Routing file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Routing file is not valid JSON for the expected shape
    #[error("Malformed routing config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A node name in the file is invalid
    #[error("Invalid node name: {0}")]
    Identity(#[from] IdentityError),

    /// The topology for the requested node is inconsistent
    #[error("Invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("{0}")]
    Strategy(#[from] UnknownStrategy),

    #[error("Unknown overflow policy '{0}' (expected block or reject)")]
    OverflowPolicy(String),
}

/// Errors that can occur in the node runtime
#[derive(Debug, Error)]
pub enum NodeError {
    /// Node not started
    #[error("Node not started")]
    NotStarted,

    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,

    /// Shutdown in progress; no new payloads accepted
    #[error("Node is shutting down")]
    ShuttingDown,

    /// Worker queue full under the reject overflow policy
    #[error("Worker {worker} queue is full")]
    QueueFull { worker: usize },

    /// Worker exited (after a fatal error)
    #[error("Worker {worker} has stopped")]
    WorkerStopped { worker: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Shared-state access failed
    #[error("Shared state error: {0}")]
    SharedState(#[from] SharedStateError),

    /// Forwarding engine error
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Listener error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

impl NodeError {
    /// Whether the caller may retry the same payload later
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::QueueFull { .. })
    }
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;
