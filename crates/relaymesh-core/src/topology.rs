//! Static routing topology
//!
//! The mesh is described by two tables that are loaded once at startup:
//!
//! - [`RoutingTable`]: node → ordered list of downstream neighbors. This is a
//!   directed graph and cycles are allowed; deduplication at each hop is what
//!   stops a payload from circulating forever.
//! - [`AddressBook`]: node → transport address.
//!
//! [`Topology`] is the per-node, validated view the forwarding engine works
//! against. It is immutable after construction and shared read-only by every
//! worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::identity::{NodeIdentity, NodeName};

/// Mesh-wide routing table: node → ordered downstream neighbors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: BTreeMap<NodeName, Vec<NodeName>>,
}

impl RoutingTable {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the downstream neighbors for a node, replacing any previous entry
    pub fn insert(&mut self, node: NodeName, neighbors: Vec<NodeName>) {
        self.routes.insert(node, neighbors);
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with_route(mut self, node: NodeName, neighbors: Vec<NodeName>) -> Self {
        self.insert(node, neighbors);
        self
    }

    /// Ordered neighbors of a node (empty if the node has no row)
    pub fn neighbors_of(&self, node: &NodeName) -> &[NodeName] {
        self.routes.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All nodes that have a routing row
    pub fn nodes(&self) -> impl Iterator<Item = &NodeName> {
        self.routes.keys()
    }

    /// Number of routing rows
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<(NodeName, Vec<NodeName>)> for RoutingTable {
    fn from_iter<T: IntoIterator<Item = (NodeName, Vec<NodeName>)>>(iter: T) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// Mesh-wide address book: node → transport address (`host:port`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressBook {
    addresses: BTreeMap<NodeName, String>,
}

impl AddressBook {
    /// Create an empty address book
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address for a node
    pub fn insert(&mut self, node: NodeName, address: impl Into<String>) {
        self.addresses.insert(node, address.into());
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with_address(mut self, node: NodeName, address: impl Into<String>) -> Self {
        self.insert(node, address);
        self
    }

    /// Look up the address of a node
    pub fn get(&self, node: &NodeName) -> Option<&str> {
        self.addresses.get(node).map(String::as_str)
    }

    /// Check whether a node has an address
    pub fn contains(&self, node: &NodeName) -> bool {
        self.addresses.contains_key(node)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Check if the book is empty
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl FromIterator<(NodeName, String)> for AddressBook {
    fn from_iter<T: IntoIterator<Item = (NodeName, String)>>(iter: T) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}

/// Validated, read-only view of the mesh from one node's perspective
#[derive(Debug, Clone)]
pub struct Topology {
    identity: NodeIdentity,
    neighbors: Vec<NodeName>,
    routing: RoutingTable,
    addresses: AddressBook,
}

impl Topology {
    /// Build the topology for `identity`
    ///
    /// # Errors
    ///
    /// - [`TopologyError::DuplicateNeighbor`] if a neighbor is listed twice
    /// - [`TopologyError::MissingAddress`] if a neighbor has no address
    pub fn new(
        identity: NodeIdentity,
        routing: RoutingTable,
        addresses: AddressBook,
    ) -> Result<Self, TopologyError> {
        let neighbors = routing.neighbors_of(&identity.name).to_vec();

        for (i, neighbor) in neighbors.iter().enumerate() {
            if neighbors[..i].contains(neighbor) {
                return Err(TopologyError::DuplicateNeighbor {
                    node: identity.name.to_string(),
                    neighbor: neighbor.to_string(),
                });
            }
            if !addresses.contains(neighbor) {
                return Err(TopologyError::MissingAddress {
                    node: identity.name.to_string(),
                    neighbor: neighbor.to_string(),
                });
            }
        }

        Ok(Self {
            identity,
            neighbors,
            routing,
            addresses,
        })
    }

    /// This node's identity
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// This node's name
    pub fn name(&self) -> &NodeName {
        &self.identity.name
    }

    /// Downstream neighbors of this node, in configured order
    pub fn neighbors(&self) -> &[NodeName] {
        &self.neighbors
    }

    /// A node with no neighbors is a sink: it accepts and records but never forwards
    pub fn is_terminal(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Transport address of a node
    pub fn address_of(&self, node: &NodeName) -> Option<&str> {
        self.addresses.get(node)
    }

    /// The full mesh routing table
    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing
    }

    /// The full mesh address book
    pub fn address_book(&self) -> &AddressBook {
        &self.addresses
    }
}
