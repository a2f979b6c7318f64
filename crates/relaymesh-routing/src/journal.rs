//! Local record of accepted payloads
//!
//! Every payload that passes deduplication is appended to the node's journal
//! before any forwarding decision is made, so a payload is recorded at the
//! node even if the onward hop fails.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use relaymesh_core::Payload;

use crate::error::JournalError;

/// Default number of recent payloads a [`MemoryJournal`] retains
pub const DEFAULT_JOURNAL_RETENTION: usize = 256;

/// Append-only sink for accepted payloads
pub trait PayloadJournal: Send + Sync {
    /// Record one accepted payload
    fn append(&self, payload: &Payload) -> Result<(), JournalError>;

    /// Payloads recorded since creation
    fn total(&self) -> u64;
}

/// In-memory journal keeping a total count and a bounded recent window
#[derive(Debug)]
pub struct MemoryJournal {
    recent: Mutex<VecDeque<Payload>>,
    retention: usize,
    total: AtomicU64,
}

impl MemoryJournal {
    pub fn new(retention: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(retention.min(1024))),
            retention,
            total: AtomicU64::new(0),
        }
    }

    /// Most recent payloads, oldest first
    pub fn recent(&self) -> Vec<Payload> {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_RETENTION)
    }
}

impl PayloadJournal for MemoryJournal {
    fn append(&self, payload: &Payload) -> Result<(), JournalError> {
        if self.retention > 0 {
            let mut recent = self.recent.lock();
            if recent.len() >= self.retention {
                recent.pop_front();
            }
            recent.push_back(payload.clone());
        }
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}
