//! Bounded deduplication store
//!
//! A [`DedupStore`] remembers the fingerprints of payloads this node has
//! already accepted. It is bounded: once full, recording a new fingerprint
//! evicts the oldest one (FIFO), so recording never fails and memory stays
//! constant for the life of the process.
//!
//! The store itself is not synchronized. The check-then-record sequence is
//! made atomic by [`SharedState`](crate::SharedState), which owns the store
//! behind its mutex.

use std::collections::{HashSet, VecDeque};

use relaymesh_core::Fingerprint;

/// Default number of fingerprints retained per node
pub const DEFAULT_DEDUP_CAPACITY: usize = 2048;

/// Result of recording a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Recorded, store had room
    Inserted,
    /// Recorded after evicting the oldest fingerprint
    InsertedWithEviction(Fingerprint),
    /// Already present; nothing changed
    AlreadyPresent,
}

/// FIFO-bounded set of seen fingerprints
#[derive(Debug, Clone)]
pub struct DedupStore {
    /// Insertion order, oldest at the front
    order: VecDeque<Fingerprint>,
    /// Membership index
    index: HashSet<Fingerprint>,
    /// Maximum retained entries (at least 1)
    capacity: usize,
    /// Total evictions since creation
    evictions: u64,
}

impl DedupStore {
    /// Create an empty store; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
            capacity,
            evictions: 0,
        }
    }

    /// Has this fingerprint been recorded (and not yet evicted)?
    pub fn is_seen(&self, fingerprint: &Fingerprint) -> bool {
        self.index.contains(fingerprint)
    }

    /// Record a fingerprint, evicting the oldest entry if at capacity
    pub fn mark_seen(&mut self, fingerprint: Fingerprint) -> MarkOutcome {
        if self.index.contains(&fingerprint) {
            return MarkOutcome::AlreadyPresent;
        }

        let mut evicted = None;
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
                self.evictions += 1;
                evicted = Some(oldest);
            }
        }

        self.order.push_back(fingerprint);
        self.index.insert(fingerprint);

        match evicted {
            Some(oldest) => MarkOutcome::InsertedWithEviction(oldest),
            None => MarkOutcome::Inserted,
        }
    }

    /// Number of fingerprints currently retained
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total evictions since creation
    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
