//! Configuration for a relaymesh node
//!
//! Two layers:
//!
//! - [`MeshConfig`]: the mesh-wide routing document, shared by every node
//!   and loaded from JSON.
//! - [`NodeConfig`]: this process's runtime knobs (worker count, queue
//!   bounds, strategy, timeouts), normally filled from the command line.
//!
//! ```json
//! {
//!   "nodes":         { "A": { "listen_port": 50051 }, "B": { "listen_port": 50052 } },
//!   "routing_table": { "A": ["B"] },
//!   "address_map":   { "A": "localhost:50051", "B": "localhost:50052" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use relaymesh_core::{AddressBook, NodeIdentity, NodeName, RoutingTable, Topology, TopologyError};
use relaymesh_routing::{
    DEFAULT_DEDUP_CAPACITY, DEFAULT_JOURNAL_RETENTION, DEFAULT_LOCK_TIMEOUT, DEFAULT_SEND_TIMEOUT,
    StrategyKind,
};
use relaymesh_transport::DEFAULT_CONNECT_TIMEOUT;

use crate::error::ConfigError;

/// Default number of workers per node
pub const DEFAULT_WORKERS: usize = 3;

/// Default per-worker queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default time allowed for workers to drain at shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Per-node entry in the routing document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub listen_port: u16,
}

/// Mesh-wide routing document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Known nodes and their listen ports
    pub nodes: BTreeMap<NodeName, NodeEntry>,
    /// Node → ordered downstream neighbors
    #[serde(default)]
    pub routing_table: RoutingTable,
    /// Node → `host:port`
    #[serde(default)]
    pub address_map: AddressBook,
}

impl MeshConfig {
    /// Parse a routing document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a routing document
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Listen address for `node`: all interfaces, configured port
    pub fn listen_addr(&self, node: &NodeName) -> Result<SocketAddr, ConfigError> {
        let entry = self
            .nodes
            .get(node)
            .ok_or_else(|| TopologyError::UnknownNode(node.to_string()))?;
        Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, entry.listen_port)))
    }

    /// Validated topology for `node`
    ///
    /// # Errors
    ///
    /// Unknown node, a neighbor without an address, or a neighbor listed
    /// twice.
    pub fn topology_for(&self, node: &NodeName) -> Result<Topology, ConfigError> {
        let identity = NodeIdentity::new(node.clone(), self.listen_addr(node)?);
        Ok(Topology::new(
            identity,
            self.routing_table.clone(),
            self.address_map.clone(),
        )?)
    }
}

/// What a producer does when the chosen worker's queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for room
    #[default]
    Block,
    /// Refuse the payload with a queue-full error
    Reject,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => f.write_str("block"),
            OverflowPolicy::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "reject" => Ok(OverflowPolicy::Reject),
            _ => Err(ConfigError::OverflowPolicy(s.to_string())),
        }
    }
}

/// Runtime configuration for one node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Number of workers
    pub workers: usize,
    /// Per-worker queue capacity
    pub queue_capacity: usize,
    /// Behavior when a worker queue is full
    pub overflow: OverflowPolicy,
    /// Neighbor selection strategy
    pub strategy: StrategyKind,
    /// Bound on one outbound send
    pub send_timeout: Duration,
    /// Bound on establishing an outbound connection
    pub connect_timeout: Duration,
    /// Fingerprints retained for deduplication
    pub dedup_capacity: usize,
    /// Bound on shared-state lock acquisition
    pub lock_timeout: Duration,
    /// Time allowed for workers to drain at shutdown
    pub shutdown_grace: Duration,
    /// Recent payloads kept in the journal
    pub journal_retention: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
            strategy: StrategyKind::RoundRobin,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            journal_retention: DEFAULT_JOURNAL_RETENTION,
        }
    }
}

impl NodeConfig {
    /// Set the worker count (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the per-worker queue capacity (at least one)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_journal_retention(mut self, retention: usize) -> Self {
        self.journal_retention = retention;
        self
    }
}
