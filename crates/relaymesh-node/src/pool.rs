//! Fixed worker pool
//!
//! Each worker is a tokio task that owns one bounded queue and runs the
//! forwarding engine to completion for one payload before taking the next.
//! Payloads are dealt to workers in a fixed round-robin over worker slots,
//! independent of which neighbor the engine later picks.
//!
//! A worker that hits a fatal shared-state error publishes it on the fatal
//! channel and exits; its queue then refuses further payloads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info_span, trace, warn};

use relaymesh_core::{Payload, Transport};
use relaymesh_routing::{ForwardingEngine, RoutingError, SharedStateError};

use crate::config::OverflowPolicy;
use crate::error::{NodeError, NodeResult};

/// A fatal error reported by a worker before it stopped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Worker {worker} stopped: {error}")]
pub struct FatalError {
    pub worker: usize,
    pub error: SharedStateError,
}

/// Bounded per-worker queues feeding a fixed set of tasks
#[derive(Debug)]
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<Payload>>,
    handles: Vec<JoinHandle<()>>,
    next: AtomicUsize,
    overflow: OverflowPolicy,
}

impl WorkerPool {
    /// Spawn `workers` tasks, each with a queue of `capacity`
    pub fn spawn<T: Transport + 'static>(
        engine: &ForwardingEngine<T>,
        workers: usize,
        capacity: usize,
        overflow: OverflowPolicy,
        fatal_tx: watch::Sender<Option<FatalError>>,
    ) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            let span = info_span!("worker", node = %engine.topology().name(), worker);
            let task = run_worker(worker, engine.clone(), rx, fatal_tx.clone());
            senders.push(tx);
            handles.push(tokio::spawn(task.instrument(span)));
        }

        debug!(workers, capacity, %overflow, "Worker pool started");

        Self {
            senders,
            handles,
            next: AtomicUsize::new(0),
            overflow,
        }
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Payloads waiting across all queues
    pub fn queued(&self) -> usize {
        self.senders
            .iter()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .sum()
    }

    /// Claim the next worker slot without queueing anything yet
    ///
    /// The slot holds its own sender, so the caller can wait for room
    /// without keeping the pool borrowed.
    pub fn next_slot(&self) -> Slot {
        let worker = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        Slot {
            worker,
            tx: self.senders[worker].clone(),
            overflow: self.overflow,
        }
    }

    /// Hand `payload` to the next worker slot, returning the slot index
    ///
    /// # Errors
    ///
    /// - [`NodeError::QueueFull`] under [`OverflowPolicy::Reject`]
    /// - [`NodeError::WorkerStopped`] if that worker has exited
    pub async fn dispatch(&self, payload: Payload) -> NodeResult<usize> {
        self.next_slot().send(payload).await
    }

    /// Close every queue, let workers drain for up to `grace`, abort the rest
    ///
    /// Returns the number of workers that had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        self.shutdown_by(Instant::now() + grace).await
    }

    /// Like [`shutdown`](Self::shutdown), against an absolute deadline
    pub async fn shutdown_by(self, deadline: Instant) -> usize {
        let WorkerPool {
            senders, handles, ..
        } = self;
        drop(senders);

        let mut aborted = 0;
        for (worker, mut handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker, error = %e, "Worker task failed"),
                Err(_) => {
                    warn!(worker, "Worker did not drain in time, aborting");
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }
}

/// One worker's queue, claimed by [`WorkerPool::next_slot`]
#[derive(Debug)]
pub struct Slot {
    worker: usize,
    tx: mpsc::Sender<Payload>,
    overflow: OverflowPolicy,
}

impl Slot {
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Queue `payload`, waiting for room under [`OverflowPolicy::Block`]
    pub async fn send(self, payload: Payload) -> NodeResult<usize> {
        let worker = self.worker;
        match self.overflow {
            OverflowPolicy::Block => self
                .tx
                .send(payload)
                .await
                .map_err(|_| NodeError::WorkerStopped { worker })?,
            OverflowPolicy::Reject => self.tx.try_send(payload).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NodeError::QueueFull { worker },
                mpsc::error::TrySendError::Closed(_) => NodeError::WorkerStopped { worker },
            })?,
        }

        trace!(worker, "Payload queued");
        Ok(worker)
    }
}

async fn run_worker<T: Transport + 'static>(
    worker: usize,
    engine: ForwardingEngine<T>,
    mut rx: mpsc::Receiver<Payload>,
    fatal_tx: watch::Sender<Option<FatalError>>,
) {
    loop {
        let Some(payload) = rx.recv().await else {
            break;
        };
        match engine.process(payload).await {
            Ok(outcome) => trace!(?outcome, "Payload handled"),
            Err(RoutingError::SharedState(e @ SharedStateError::LockTimeout(_))) => {
                error!(error = %e, "Shared state unavailable, worker stopping");
                // Queue refuses payloads before the failure is observable
                drop(rx);
                fatal_tx.send_replace(Some(FatalError { worker, error: e }));
                return;
            }
            Err(e) => warn!(error = %e, "Payload processing failed"),
        }
    }
    debug!("Worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use relaymesh_core::{
        AddressBook, MockTransport, NodeIdentity, NodeName, RoutingTable, Topology,
    };
    use relaymesh_routing::{SharedState, StrategyKind};

    fn name(s: &str) -> NodeName {
        NodeName::new(s).unwrap()
    }

    fn engine(transport: Arc<MockTransport>) -> ForwardingEngine<MockTransport> {
        let routing = RoutingTable::new().with_route(name("B"), vec![name("C"), name("D")]);
        let addresses = AddressBook::new()
            .with_address(name("C"), "127.0.0.1:1")
            .with_address(name("D"), "127.0.0.1:2");
        let identity = NodeIdentity::new(name("B"), "127.0.0.1:0".parse().unwrap());
        let topology = Arc::new(Topology::new(identity, routing, addresses).unwrap());
        let shared = Arc::new(
            SharedState::new(topology.neighbors(), 128).with_lock_timeout(Duration::from_millis(50)),
        );
        ForwardingEngine::new(topology, shared, StrategyKind::RoundRobin, transport)
    }

    #[tokio::test]
    async fn test_dispatch_round_robin_over_slots() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport);
        let (fatal_tx, _fatal_rx) = watch::channel(None);
        let pool = WorkerPool::spawn(&engine, 3, 8, OverflowPolicy::Block, fatal_tx);

        let mut slots = Vec::new();
        for i in 0..6 {
            slots.push(pool.dispatch(Payload::from(format!("p{}", i))).await.unwrap());
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);

        assert_eq!(pool.shutdown(Duration::from_secs(5)).await, 0);
        assert_eq!(engine.journal().total(), 6);
    }

    #[tokio::test]
    async fn test_reject_when_full() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_millis(300)));
        let engine = engine(transport);
        let (fatal_tx, _fatal_rx) = watch::channel(None);
        let pool = WorkerPool::spawn(&engine, 1, 1, OverflowPolicy::Reject, fatal_tx);

        pool.dispatch(Payload::from("first")).await.unwrap();
        // Let the worker take "first" and park in the slow send
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.dispatch(Payload::from("second")).await.unwrap();

        let err = pool.dispatch(Payload::from("third")).await.unwrap_err();
        assert!(matches!(err, NodeError::QueueFull { worker: 0 }));
        assert_eq!(pool.queued(), 1);

        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(engine.journal().total(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_worker() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_secs(30)));
        let engine = engine(transport).with_send_timeout(Duration::from_secs(60));
        let (fatal_tx, _fatal_rx) = watch::channel(None);
        let pool = WorkerPool::spawn(&engine, 2, 4, OverflowPolicy::Block, fatal_tx);

        pool.dispatch(Payload::from("stuck")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let start = std::time::Instant::now();
        let aborted = pool.shutdown(Duration::from_millis(100)).await;
        assert_eq!(aborted, 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lock_timeout_stops_worker() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone());

        let shared = Arc::clone(engine.shared());
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _guard = shared.hold();
            locked_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        locked_rx.recv().unwrap();

        let (fatal_tx, mut fatal_rx) = watch::channel(None);
        let pool = WorkerPool::spawn(&engine, 1, 4, OverflowPolicy::Block, fatal_tx);
        pool.dispatch(Payload::from("x")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), fatal_rx.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        let fatal = fatal_rx.borrow().clone().unwrap();
        assert_eq!(
            fatal,
            FatalError {
                worker: 0,
                error: SharedStateError::LockTimeout(Duration::from_millis(50)),
            }
        );

        // The stopped worker's queue refuses further payloads
        let err = pool.dispatch(Payload::from("y")).await.unwrap_err();
        assert!(matches!(err, NodeError::WorkerStopped { worker: 0 }));
        assert_eq!(transport.attempts(), 0);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn test_slot_outlives_pool_borrow() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport);
        let (fatal_tx, _fatal_rx) = watch::channel(None);
        let pool = WorkerPool::spawn(&engine, 2, 4, OverflowPolicy::Block, fatal_tx);

        let first = pool.next_slot();
        let second = pool.next_slot();
        assert_eq!((first.worker(), second.worker()), (0, 1));

        assert_eq!(second.send(Payload::from("b")).await.unwrap(), 1);
        assert_eq!(first.send(Payload::from("a")).await.unwrap(), 0);

        assert_eq!(pool.shutdown(Duration::from_secs(5)).await, 0);
        assert_eq!(engine.journal().total(), 2);
    }
}
