//! Forwarding engine
//!
//! The [`ForwardingEngine`] runs one hop for one payload: deduplicate,
//! journal, select a neighbor, send, account. It is cheap to clone (every
//! field is an `Arc`), so each worker holds its own handle onto the same
//! shared state.
//!
//! Forwarding is best effort. A failed or timed-out send is logged and
//! counted but never retried or re-queued; the payload stays recorded in the
//! local journal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use relaymesh_core::{NodeName, Payload, Topology, Transport, TransportError};

use crate::error::RoutingResult;
use crate::journal::{MemoryJournal, PayloadJournal};
use crate::load::LoadSnapshot;
use crate::shared::SharedState;
use crate::stats::BenchmarkCounters;
use crate::strategy::{NeighborSelector, StrategyKind};

/// Default bound on a single outbound send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// What happened to one payload at this hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Already seen; nothing recorded, nothing sent
    Duplicate,
    /// Recorded here; this node has no neighbors
    Terminal,
    /// Recorded and delivered to `target`, whose load is now `load`
    Forwarded { target: NodeName, load: u64 },
    /// Recorded, but the single send attempt to `target` failed
    ForwardFailed { target: NodeName, reason: String },
}

impl ForwardOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, ForwardOutcome::Forwarded { .. })
    }

    /// The neighbor a send was attempted to, if any
    pub fn target(&self) -> Option<&NodeName> {
        match self {
            ForwardOutcome::Forwarded { target, .. }
            | ForwardOutcome::ForwardFailed { target, .. } => Some(target),
            ForwardOutcome::Duplicate | ForwardOutcome::Terminal => None,
        }
    }
}

/// Per-node forwarding decision engine
pub struct ForwardingEngine<T: Transport> {
    topology: Arc<Topology>,
    shared: Arc<SharedState>,
    selector: Arc<dyn NeighborSelector>,
    transport: Arc<T>,
    journal: Arc<dyn PayloadJournal>,
    stats: Arc<BenchmarkCounters>,
    send_timeout: Duration,
}

impl<T: Transport> Clone for ForwardingEngine<T> {
    fn clone(&self) -> Self {
        Self {
            topology: Arc::clone(&self.topology),
            shared: Arc::clone(&self.shared),
            selector: Arc::clone(&self.selector),
            transport: Arc::clone(&self.transport),
            journal: Arc::clone(&self.journal),
            stats: Arc::clone(&self.stats),
            send_timeout: self.send_timeout,
        }
    }
}

impl<T: Transport> std::fmt::Debug for ForwardingEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingEngine")
            .field("node", self.topology.name())
            .field("strategy", &self.selector.kind())
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ForwardingEngine<T> {
    /// Create an engine with an in-memory journal and fresh counters
    pub fn new(
        topology: Arc<Topology>,
        shared: Arc<SharedState>,
        strategy: StrategyKind,
        transport: Arc<T>,
    ) -> Self {
        Self {
            topology,
            shared,
            selector: strategy.selector(),
            transport,
            journal: Arc::new(MemoryJournal::default()),
            stats: Arc::new(BenchmarkCounters::new()),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Replace the journal
    pub fn with_journal(mut self, journal: Arc<dyn PayloadJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// Replace the counters (e.g. to share them with the node)
    pub fn with_stats(mut self, stats: Arc<BenchmarkCounters>) -> Self {
        self.stats = stats;
        self
    }

    /// Replace the selector instance
    pub fn with_selector(mut self, selector: Arc<dyn NeighborSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn journal(&self) -> &Arc<dyn PayloadJournal> {
        &self.journal
    }

    pub fn stats(&self) -> &Arc<BenchmarkCounters> {
        &self.stats
    }

    pub fn strategy(&self) -> StrategyKind {
        self.selector.kind()
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Run one hop for `payload`
    ///
    /// Transport failures are reported as [`ForwardOutcome::ForwardFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the shared-state lock cannot be acquired in time
    /// (fatal for the node) or the journal refuses the payload.
    #[instrument(skip_all, fields(node = %self.topology.name(), fingerprint))]
    pub async fn process(&self, payload: Payload) -> RoutingResult<ForwardOutcome> {
        let fingerprint = payload.fingerprint();
        tracing::Span::current().record("fingerprint", fingerprint.short_hex().as_str());

        if self.shared.check_and_mark(fingerprint)? {
            self.stats.record_duplicate();
            debug!("duplicate payload dropped");
            return Ok(ForwardOutcome::Duplicate);
        }

        self.journal.append(&payload)?;
        self.stats.record_processed();
        trace!(len = payload.len(), preview = %payload.preview(32), "payload recorded");

        let neighbors = self.topology.neighbors();
        if neighbors.is_empty() {
            self.stats.record_terminal();
            debug!("terminal node, payload stops here");
            return Ok(ForwardOutcome::Terminal);
        }

        let loads = if self.selector.needs_snapshot() {
            self.shared.load_snapshot()?
        } else {
            LoadSnapshot::empty()
        };
        let Some(target) = self.selector.select(neighbors, &loads) else {
            // Unreachable with a non-empty neighbor list
            self.stats.record_terminal();
            return Ok(ForwardOutcome::Terminal);
        };

        let result = match tokio::time::timeout(
            self.send_timeout,
            self.transport.send(&target, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(()) => {
                let load = self.shared.record_forward(&target)?;
                self.stats.record_forwarded();
                debug!(target = %target, load, "payload forwarded");
                Ok(ForwardOutcome::Forwarded { target, load })
            }
            Err(e) => {
                self.stats.record_failed();
                warn!(target = %target, error = %e, "forward failed, hop abandoned");
                Ok(ForwardOutcome::ForwardFailed {
                    target,
                    reason: e.to_string(),
                })
            }
        }
    }
}
