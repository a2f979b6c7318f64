//! Neighbor selection strategies
//!
//! A strategy picks exactly one downstream neighbor for a payload. It is
//! chosen once at startup and shared by all workers.
//!
//! - [`RoundRobin`]: rotate through the neighbors in configured order
//! - [`LeastLoaded`]: pick the neighbor with the smallest cumulative load,
//!   earliest in configured order on ties
//!
//! Strategies are pure: no I/O, no locking. [`LeastLoaded`] works on a
//! [`LoadSnapshot`] the caller takes under the shared-state lock.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relaymesh_core::NodeName;

use crate::load::LoadSnapshot;

/// Selection policy, as named in configuration and on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    LeastLoaded,
}

impl StrategyKind {
    /// Build the selector for this policy
    pub fn selector(self) -> Arc<dyn NeighborSelector> {
        match self {
            StrategyKind::RoundRobin => Arc::new(RoundRobin::new()),
            StrategyKind::LeastLoaded => Arc::new(LeastLoaded),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round-robin",
            StrategyKind::LeastLoaded => "least-loaded",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized strategy name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown strategy '{0}' (expected round-robin or least-loaded)")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "roundrobin" | "rr" => Ok(StrategyKind::RoundRobin),
            "least-loaded" | "leastloaded" | "ll" => Ok(StrategyKind::LeastLoaded),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Picks one neighbor out of an ordered list
pub trait NeighborSelector: Send + Sync + fmt::Debug {
    /// Choose a target; `None` only when `neighbors` is empty
    fn select(&self, neighbors: &[NodeName], loads: &LoadSnapshot) -> Option<NodeName>;

    /// Which policy this is
    fn kind(&self) -> StrategyKind;

    /// Whether [`select`](Self::select) reads `loads`
    ///
    /// Callers may skip the snapshot (and the lock) when this is `false`.
    fn needs_snapshot(&self) -> bool {
        false
    }
}

/// Rotating cursor over the neighbor list
///
/// The cursor is shared by every worker holding this selector and advances
/// on every call, whether or not the subsequent send succeeds.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next call will start from (before the modulo)
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl NeighborSelector for RoundRobin {
    fn select(&self, neighbors: &[NodeName], _loads: &LoadSnapshot) -> Option<NodeName> {
        if neighbors.is_empty() {
            return None;
        }
        let len = neighbors.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        neighbors.get(previous % len).cloned()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }
}

/// Minimum cumulative load, ties to the earliest neighbor
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl NeighborSelector for LeastLoaded {
    fn select(&self, neighbors: &[NodeName], loads: &LoadSnapshot) -> Option<NodeName> {
        // min_by_key keeps the first of equal minima
        neighbors
            .iter()
            .min_by_key(|neighbor| loads.get(neighbor).unwrap_or(0))
            .cloned()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LeastLoaded
    }

    fn needs_snapshot(&self) -> bool {
        true
    }
}
