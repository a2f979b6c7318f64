//! Error types for relaymesh

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for relaymesh
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors related to node identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Node name must not be empty")]
    Empty,

    #[error("Node name too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Invalid character in node name: {0:?}")]
    InvalidCharacter(char),
}

/// Errors raised while validating the routing configuration
///
/// All of these are startup-time conditions. A node whose topology fails
/// validation must not begin serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Node not found in configuration: {0}")]
    UnknownNode(String),

    #[error("No address configured for neighbor {neighbor} of node {node}")]
    MissingAddress { node: String, neighbor: String },

    #[error("Neighbor {neighbor} listed more than once for node {node}")]
    DuplicateNeighbor { node: String, neighbor: String },

    #[error("Invalid listen address for node {node}: {reason}")]
    InvalidListenAddress { node: String, reason: String },
}

/// Errors related to transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote rejected payload ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Address resolution failed: {0}")]
    AddressResolutionFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for relaymesh operations
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_display() {
        assert!(format!("{}", IdentityError::Empty).contains("empty"));

        let err = IdentityError::TooLong { len: 80, max: 64 };
        let msg = format!("{}", err);
        assert!(msg.contains("80"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn test_topology_error_display() {
        let err = TopologyError::MissingAddress {
            node: "B".to_string(),
            neighbor: "C".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("neighbor C"));
        assert!(msg.contains("node B"));

        let err = TopologyError::UnknownNode("Z".to_string());
        assert!(format!("{}", err).contains("Z"));
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Rejected {
            code: 2,
            message: "queue full".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("2"));
        assert!(msg.contains("queue full"));

        let err = TransportError::Timeout(Duration::from_secs(2));
        assert!(format!("{}", err).contains("timed out"));
    }

    #[test]
    fn test_error_conversions() {
        let err: MeshError = IdentityError::Empty.into();
        assert!(matches!(err, MeshError::Identity(_)));

        let err: MeshError = TopologyError::UnknownNode("A".into()).into();
        assert!(matches!(err, MeshError::Topology(_)));

        let err: MeshError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, MeshError::Transport(_)));
        assert!(format!("{}", err).contains("Transport error"));
    }
}
