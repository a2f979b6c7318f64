//! # Relaymesh Routing
//!
//! The forwarding decision engine for a relaymesh node.
//!
//! Every inbound payload goes through the same short pipeline, and each node
//! runs it independently, without a central coordinator:
//!
//! 1. **DEDUP**: fingerprint the payload and check-and-mark it in the
//!    [`DedupStore`]. A repeat stops here.
//! 2. **RECORD**: append the payload to the node's [`PayloadJournal`].
//! 3. **SELECT**: pick exactly one downstream neighbor with the configured
//!    [`NeighborSelector`] (round-robin or least-loaded).
//! 4. **SEND**: hand the payload to the transport under a bounded timeout.
//! 5. **ACCOUNT**: on success bump the neighbor's counter in the [`LoadTable`].
//!
//! ## Shared State
//!
//! The dedup store and the load table are the only mutable state shared
//! between workers. Both live inside [`SharedState`] behind a single mutex
//! whose acquisition is timeout-bounded. The outbound send always happens
//! with the lock released.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relaymesh_routing::{ForwardingEngine, ForwardOutcome, SharedState, StrategyKind};
//!
//! let shared = Arc::new(SharedState::new(topology.neighbors(), 2048));
//! let engine = ForwardingEngine::new(topology, shared, StrategyKind::LeastLoaded, transport);
//!
//! match engine.process(payload).await? {
//!     ForwardOutcome::Forwarded { target, .. } => { /* relayed */ }
//!     ForwardOutcome::Duplicate => { /* seen before */ }
//!     ForwardOutcome::Terminal => { /* sink node */ }
//!     ForwardOutcome::ForwardFailed { .. } => { /* hop abandoned */ }
//! }
//! ```

pub mod dedup;
pub mod engine;
pub mod error;
pub mod journal;
pub mod load;
pub mod shared;
pub mod stats;
pub mod strategy;

// Re-export main types
pub use dedup::{DEFAULT_DEDUP_CAPACITY, DedupStore, MarkOutcome};
pub use engine::{DEFAULT_SEND_TIMEOUT, ForwardOutcome, ForwardingEngine};
pub use error::{JournalError, RoutingError, RoutingResult, SharedStateError};
pub use journal::{DEFAULT_JOURNAL_RETENTION, MemoryJournal, PayloadJournal};
pub use load::{LoadEntry, LoadSnapshot, LoadTable};
pub use shared::{DEFAULT_LOCK_TIMEOUT, SharedState, SharedStateGuard};
pub use stats::{BenchmarkCounters, BenchmarkSummary};
pub use strategy::{LeastLoaded, NeighborSelector, RoundRobin, StrategyKind, UnknownStrategy};
