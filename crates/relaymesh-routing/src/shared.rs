//! Mutex-guarded state shared by every worker of a node
//!
//! [`SharedState`] owns the [`DedupStore`] and the [`LoadTable`] behind one
//! `parking_lot` mutex. Every acquisition is bounded by a timeout; a worker
//! that cannot get the lock in time gets [`SharedStateError::LockTimeout`]
//! instead of hanging forever behind a wedged peer.
//!
//! Critical sections are kept to the three operations below. Nothing in here
//! awaits, so the guard is never held across a suspension point.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use relaymesh_core::{Fingerprint, NodeName};

use crate::dedup::{DedupStore, MarkOutcome};
use crate::error::SharedStateError;
use crate::load::{LoadSnapshot, LoadTable};

/// Default bound on lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct SharedInner {
    dedup: DedupStore,
    loads: LoadTable,
}

/// Dedup store and load table under a single timeout-bounded lock
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<SharedInner>,
    lock_timeout: Duration,
}

impl SharedState {
    /// Create state for a node with the given ordered neighbors
    pub fn new(neighbors: &[NodeName], dedup_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SharedInner {
                dedup: DedupStore::new(dedup_capacity),
                loads: LoadTable::for_neighbors(neighbors),
            }),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the lock acquisition bound
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Configured lock acquisition bound
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn lock(&self) -> Result<MutexGuard<'_, SharedInner>, SharedStateError> {
        self.inner
            .try_lock_for(self.lock_timeout)
            .ok_or(SharedStateError::LockTimeout(self.lock_timeout))
    }

    /// Atomically check a fingerprint and record it if new
    ///
    /// Returns `true` if the fingerprint was already present (a duplicate).
    /// Two workers racing on the same payload see exactly one `false`.
    pub fn check_and_mark(&self, fingerprint: Fingerprint) -> Result<bool, SharedStateError> {
        let mut inner = self.lock()?;
        match inner.dedup.mark_seen(fingerprint) {
            MarkOutcome::AlreadyPresent => Ok(true),
            MarkOutcome::Inserted => Ok(false),
            MarkOutcome::InsertedWithEviction(evicted) => {
                trace!(evicted = %evicted.short_hex(), "dedup store full, evicted oldest");
                Ok(false)
            }
        }
    }

    /// Lookup without recording
    pub fn is_seen(&self, fingerprint: &Fingerprint) -> Result<bool, SharedStateError> {
        Ok(self.lock()?.dedup.is_seen(fingerprint))
    }

    /// Count one successful forward to `neighbor`, returning its new load
    pub fn record_forward(&self, neighbor: &NodeName) -> Result<u64, SharedStateError> {
        self.lock()?
            .loads
            .increment(neighbor)
            .ok_or_else(|| SharedStateError::UnknownNeighbor(neighbor.clone()))
    }

    /// Consistent copy of the load table
    pub fn load_snapshot(&self) -> Result<LoadSnapshot, SharedStateError> {
        Ok(self.lock()?.loads.snapshot())
    }

    /// Number of fingerprints currently retained
    pub fn dedup_len(&self) -> Result<usize, SharedStateError> {
        Ok(self.lock()?.dedup.len())
    }

    /// Take the lock and keep it until the guard drops
    ///
    /// Every other access times out meanwhile. Used to exercise the
    /// wedged-worker path.
    #[doc(hidden)]
    pub fn hold(&self) -> SharedStateGuard<'_> {
        SharedStateGuard {
            _guard: self.inner.lock(),
        }
    }

    /// Number of fingerprints evicted so far
    pub fn dedup_evictions(&self) -> Result<u64, SharedStateError> {
        Ok(self.lock()?.dedup.evictions())
    }
}

/// Exclusive hold on a [`SharedState`], see [`SharedState::hold`]
#[doc(hidden)]
pub struct SharedStateGuard<'a> {
    _guard: MutexGuard<'a, SharedInner>,
}
