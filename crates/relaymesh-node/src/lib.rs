//! # Relaymesh Node
//!
//! Runtime for one relaymesh node.
//!
//! This crate provides [`RelayNode`], which ties together:
//! - the forwarding engine and its shared dedup/load state (relaymesh-routing)
//! - a fixed [`WorkerPool`] fed from the node boundary
//! - the TCP listener and outbound transport (relaymesh-transport)
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaymesh_node::{MeshConfig, NodeConfig, RelayNode};
//!
//! let mesh = MeshConfig::from_file("routing.json")?;
//! let topology = mesh.topology_for(&"B".parse()?)?;
//!
//! let node = Arc::new(RelayNode::with_tcp(topology, NodeConfig::default()));
//! node.start().await?;
//! node.serve(TcpServer::bind(node.topology().identity().listen_addr).await?).await;
//!
//! // ... later
//! if let Some(summary) = node.shutdown().await {
//!     println!("{}", summary);
//! }
//! ```

mod config;
mod error;
pub mod pool;

pub use config::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_WORKERS, MeshConfig, NodeConfig,
    NodeEntry, OverflowPolicy,
};
pub use error::{ConfigError, NodeError, NodeResult};
pub use pool::{FatalError, Slot, WorkerPool};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use relaymesh_core::{NodeName, Payload, Topology, Transport};
use relaymesh_routing::{
    BenchmarkCounters, BenchmarkSummary, ForwardingEngine, LoadEntry, LoadSnapshot, MemoryJournal,
    SharedState,
};
use relaymesh_transport::{InboundHandler, RejectCode, Rejection, TcpServer, TcpTransport};

/// A running mesh participant
///
/// Lifecycle: [`new`](Self::new) → [`start`](Self::start) →
/// [`on_receive`](Self::on_receive)* → [`shutdown`](Self::shutdown).
pub struct RelayNode<T: Transport + 'static> {
    /// Runtime configuration
    config: NodeConfig,
    /// Immutable per-node routing view
    topology: Arc<Topology>,
    /// Dedup store and load table
    shared: Arc<SharedState>,
    /// Local record of accepted payloads
    journal: Arc<MemoryJournal>,
    /// Benchmark counters
    stats: Arc<BenchmarkCounters>,
    /// Engine template cloned into every worker
    engine: ForwardingEngine<T>,
    /// Worker pool (None until started, and again after shutdown)
    pool: RwLock<Option<WorkerPool>>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Fatal error channel
    fatal_tx: watch::Sender<Option<FatalError>>,
    /// Background task handles (listeners)
    background_tasks: RwLock<Vec<JoinHandle<()>>>,
    /// Whether the node has been started
    started: AtomicBool,
    /// Whether shutdown has begun
    stopping: AtomicBool,
}

impl RelayNode<TcpTransport> {
    /// Create a node that forwards over TCP using the topology's address book
    pub fn with_tcp(topology: Topology, config: NodeConfig) -> Self {
        let transport = TcpTransport::new(topology.address_book().clone())
            .with_connect_timeout(config.connect_timeout);
        Self::new(topology, Arc::new(transport), config)
    }
}

impl<T: Transport + 'static> RelayNode<T> {
    /// Create a node; call [`start`](Self::start) before delivering payloads
    pub fn new(topology: Topology, transport: Arc<T>, config: NodeConfig) -> Self {
        let topology = Arc::new(topology);
        let shared = Arc::new(
            SharedState::new(topology.neighbors(), config.dedup_capacity)
                .with_lock_timeout(config.lock_timeout),
        );
        let journal = Arc::new(MemoryJournal::new(config.journal_retention));
        let stats = Arc::new(BenchmarkCounters::new());

        let engine = ForwardingEngine::new(
            Arc::clone(&topology),
            Arc::clone(&shared),
            config.strategy,
            transport,
        )
        .with_journal(journal.clone())
        .with_stats(Arc::clone(&stats))
        .with_send_timeout(config.send_timeout);

        let (shutdown_tx, _) = broadcast::channel(1);
        let (fatal_tx, _) = watch::channel(None);

        info!(
            node = %topology.name(),
            neighbors = topology.neighbors().len(),
            strategy = %config.strategy,
            "Node created"
        );

        Self {
            config,
            topology,
            shared,
            journal,
            stats,
            engine,
            pool: RwLock::new(None),
            shutdown_tx,
            fatal_tx,
            background_tasks: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    /// Spawn the worker pool
    #[instrument(skip(self), fields(node = %self.topology.name()))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(NodeError::ShuttingDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        let pool = WorkerPool::spawn(
            &self.engine,
            self.config.workers,
            self.config.queue_capacity,
            self.config.overflow,
            self.fatal_tx.clone(),
        );
        *self.pool.write().await = Some(pool);

        info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            overflow = %self.config.overflow,
            "Node started"
        );
        Ok(())
    }

    /// Accept a payload for processing
    ///
    /// `Ok` means the payload was queued for a worker, not that it was
    /// forwarded.
    ///
    /// # Errors
    ///
    /// Not started, shutting down, queue full (reject policy), or the
    /// chosen worker has stopped.
    pub async fn on_receive(&self, payload: Payload) -> NodeResult<()> {
        // Subscribe before the flag check so a concurrent shutdown is never missed
        let mut shutdown = self.shutdown_tx.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            return Err(NodeError::ShuttingDown);
        }

        let slot = match self.pool.read().await.as_ref() {
            Some(pool) => pool.next_slot(),
            None if self.stopping.load(Ordering::SeqCst) => return Err(NodeError::ShuttingDown),
            None => return Err(NodeError::NotStarted),
        };

        tokio::select! {
            biased;
            _ = shutdown.recv() => Err(NodeError::ShuttingDown),
            queued = slot.send(payload) => queued.map(|_| ()),
        }
    }

    /// Serve inbound requests on `server` until shutdown
    pub async fn serve(self: &Arc<Self>, server: TcpServer) {
        let addr = server.local_addr();
        let handle = server.spawn(Arc::clone(self), self.shutdown_tx.subscribe());
        self.background_tasks.write().await.push(handle);
        debug!(node = %self.topology.name(), %addr, "Listener attached");
    }

    /// Stop accepting, drain workers, and flush the counters
    ///
    /// Only the first call returns a summary.
    #[instrument(skip(self), fields(node = %self.topology.name()))]
    pub async fn shutdown(&self) -> Option<BenchmarkSummary> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return None;
        }

        // Stop listeners
        let _ = self.shutdown_tx.send(());

        // Parked producers see the broadcast and release their slots
        let deadline = Instant::now() + self.config.shutdown_grace;
        let pool = match tokio::time::timeout_at(deadline, self.pool.write()).await {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("Worker pool still busy after grace period, leaving it");
                None
            }
        };
        if let Some(pool) = pool {
            let aborted = pool.shutdown_by(deadline).await;
            if aborted > 0 {
                warn!(aborted, "Workers aborted after grace period");
            }
        }

        let mut tasks = self.background_tasks.write().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }

        self.started.store(false, Ordering::SeqCst);

        let summary = self.stats.flush();
        if let Some(summary) = &summary {
            info!(
                processed = summary.processed,
                duplicates = summary.duplicates,
                forwarded = summary.forwarded,
                failed = summary.failed,
                terminal = summary.terminal,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                throughput = summary.throughput,
                "Node stopped"
            );
        }
        summary
    }

    /// Consistent copy of the load table
    pub fn load_snapshot(&self) -> NodeResult<LoadSnapshot> {
        Ok(self.shared.load_snapshot()?)
    }

    /// Live counter values
    pub fn stats(&self) -> BenchmarkSummary {
        self.stats.snapshot()
    }

    /// Observe fatal worker errors
    pub fn fatal(&self) -> watch::Receiver<Option<FatalError>> {
        self.fatal_tx.subscribe()
    }

    pub fn journal(&self) -> &Arc<MemoryJournal> {
        &self.journal
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn name(&self) -> &NodeName {
        self.topology.name()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Check if the node is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Transport + 'static> InboundHandler for RelayNode<T> {
    async fn on_deliver(&self, payload: Payload) -> Result<(), Rejection> {
        self.on_receive(payload).await.map_err(|e| {
            let code = match &e {
                NodeError::QueueFull { .. } => RejectCode::QueueFull,
                NodeError::NotStarted
                | NodeError::ShuttingDown
                | NodeError::WorkerStopped { .. } => RejectCode::Unavailable,
                _ => RejectCode::Internal,
            };
            debug!(error = %e, ?code, "Payload refused");
            Rejection::new(code, e.to_string())
        })
    }

    async fn on_load_query(&self) -> Result<(NodeName, Vec<LoadEntry>), Rejection> {
        let snapshot = self
            .load_snapshot()
            .map_err(|e| Rejection::new(RejectCode::Internal, e.to_string()))?;
        Ok((self.name().clone(), snapshot.entries().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_core::{AddressBook, MockTransport, NodeIdentity, RoutingTable};

    fn name(s: &str) -> NodeName {
        NodeName::new(s).unwrap()
    }

    fn node(neighbors: &[&str], config: NodeConfig) -> (RelayNode<MockTransport>, Arc<MockTransport>) {
        let routing =
            RoutingTable::new().with_route(name("B"), neighbors.iter().map(|n| name(n)).collect());
        let addresses: AddressBook = neighbors
            .iter()
            .map(|n| (name(n), "127.0.0.1:9".to_string()))
            .collect();
        let identity = NodeIdentity::new(name("B"), "127.0.0.1:0".parse().unwrap());
        let topology = Topology::new(identity, routing, addresses).unwrap();
        let transport = Arc::new(MockTransport::new());
        (RelayNode::new(topology, transport.clone(), config), transport)
    }

    #[tokio::test]
    async fn test_receive_before_start() {
        let (node, _) = node(&["C"], NodeConfig::default());
        assert!(matches!(
            node.on_receive(Payload::from("x")).await,
            Err(NodeError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_double_start() {
        let (node, _) = node(&["C"], NodeConfig::default());
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_flushes_once() {
        let (node, transport) = node(&["C", "D"], NodeConfig::default().with_workers(2));
        node.start().await.unwrap();

        for i in 0..10 {
            node.on_receive(Payload::from(format!("p{}", i))).await.unwrap();
        }
        node.on_receive(Payload::from("p0")).await.unwrap();

        let summary = node.shutdown().await.unwrap();
        assert_eq!(summary.processed, 10);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.forwarded, 10);
        assert_eq!(transport.total_deliveries(), 10);
        assert_eq!(node.load_snapshot().unwrap().total(), 10);

        assert!(node.shutdown().await.is_none());
        assert!(matches!(
            node.on_receive(Payload::from("late")).await,
            Err(NodeError::ShuttingDown)
        ));
        assert!(!node.is_started());
    }

    #[tokio::test]
    async fn test_inbound_handler_maps_errors() {
        let (node, _) = node(&["C"], NodeConfig::default());
        let rejection = node.on_deliver(Payload::from("x")).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::Unavailable);

        let (name_, entries) = node.on_load_query().await.unwrap();
        assert_eq!(name_.as_str(), "B");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].load, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wedged_shared_state_is_fatal() {
        let config = NodeConfig::default()
            .with_workers(1)
            .with_lock_timeout(std::time::Duration::from_millis(50));
        let (node, _) = node(&["C"], config);
        node.start().await.unwrap();
        let mut fatal = node.fatal();

        let shared = Arc::clone(&node.shared);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _guard = shared.hold();
            locked_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        locked_rx.recv().unwrap();

        node.on_receive(Payload::from("x")).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), fatal.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fatal.borrow().as_ref().map(|f| f.worker), Some(0));

        let rejection = node.on_deliver(Payload::from("y")).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::Unavailable);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        let summary = node.shutdown().await.unwrap();
        assert_eq!(summary.processed, 0);
    }
}
