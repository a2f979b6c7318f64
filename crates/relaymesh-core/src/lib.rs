//! # Relaymesh Core
//!
//! Core types, traits, and errors shared by every relaymesh crate.
//!
//! The forwarding engine never talks to the network directly. It sees a
//! per-node [`Topology`] (who am I, who are my downstream neighbors, where do
//! they live) and a [`Transport`] that can push a [`Payload`] to one of those
//! neighbors. Keeping both behind this crate lets the same engine run against
//! the TCP transport in production and the [`MockTransport`] in tests.
//!
//! ## Key Types
//!
//! - [`NodeName`] / [`NodeIdentity`]: validated node identifier plus listen address
//! - [`RoutingTable`] / [`AddressBook`]: the mesh-wide routing configuration
//! - [`Topology`]: the immutable, validated per-node view of that configuration
//! - [`Payload`] / [`Fingerprint`]: opaque relay data and its dedup key
//!
//! ## Key Traits
//!
//! - [`Transport`]: synchronous request/response delivery to a neighbor

pub mod error;
pub mod identity;
pub mod mock_transport;
pub mod payload;
pub mod topology;
pub mod transport;

// Re-export main types
pub use error::*;
pub use identity::*;
pub use mock_transport::*;
pub use payload::*;
pub use topology::*;
pub use transport::*;
