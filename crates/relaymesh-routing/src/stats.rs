//! Benchmark counters
//!
//! Every worker bumps the same [`BenchmarkCounters`]. A live
//! [`snapshot`](BenchmarkCounters::snapshot) can be taken at any time; at
//! shutdown the counters are read-and-reset exactly once via
//! [`flush`](BenchmarkCounters::flush).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lock-free per-node counters
#[derive(Debug)]
pub struct BenchmarkCounters {
    processed: AtomicU64,
    duplicates: AtomicU64,
    forwarded: AtomicU64,
    failed: AtomicU64,
    terminal: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
    flushed: AtomicBool,
}

impl Default for BenchmarkCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchmarkCounters {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            terminal: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminal(&self) {
        self.terminal.fetch_add(1, Ordering::Relaxed);
    }

    /// Live view of the counters
    pub fn snapshot(&self) -> BenchmarkSummary {
        BenchmarkSummary::new(
            self.processed.load(Ordering::Relaxed),
            self.duplicates.load(Ordering::Relaxed),
            self.forwarded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.terminal.load(Ordering::Relaxed),
            self.started_at,
            self.started.elapsed(),
        )
    }

    /// Read and reset every counter
    ///
    /// Only the first call returns a summary; later calls return `None`.
    pub fn flush(&self) -> Option<BenchmarkSummary> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(BenchmarkSummary::new(
            self.processed.swap(0, Ordering::SeqCst),
            self.duplicates.swap(0, Ordering::SeqCst),
            self.forwarded.swap(0, Ordering::SeqCst),
            self.failed.swap(0, Ordering::SeqCst),
            self.terminal.swap(0, Ordering::SeqCst),
            self.started_at,
            self.started.elapsed(),
        ))
    }

    /// Whether [`flush`](Self::flush) has already run
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }
}

/// Counter values at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    /// Payloads accepted and journaled (duplicates excluded)
    pub processed: u64,
    /// Payloads dropped as already seen
    pub duplicates: u64,
    /// Successful forwards
    pub forwarded: u64,
    /// Failed or timed-out forwards
    pub failed: u64,
    /// Payloads that stopped here (no neighbors)
    pub terminal: u64,
    /// When counting started
    pub started_at: DateTime<Utc>,
    /// Time since counting started
    pub elapsed: Duration,
    /// processed / elapsed seconds
    pub throughput: f64,
}

impl BenchmarkSummary {
    fn new(
        processed: u64,
        duplicates: u64,
        forwarded: u64,
        failed: u64,
        terminal: u64,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        };
        Self {
            processed,
            duplicates,
            forwarded,
            failed,
            terminal,
            started_at,
            elapsed,
            throughput,
        }
    }
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark summary (since {})", self.started_at.to_rfc3339())?;
        writeln!(f, "  processed:  {}", self.processed)?;
        writeln!(f, "  duplicates: {}", self.duplicates)?;
        writeln!(f, "  forwarded:  {}", self.forwarded)?;
        writeln!(f, "  failed:     {}", self.failed)?;
        writeln!(f, "  terminal:   {}", self.terminal)?;
        writeln!(f, "  elapsed:    {:.3}s", self.elapsed.as_secs_f64())?;
        write!(f, "  throughput: {:.2} msg/s", self.throughput)
    }
}
