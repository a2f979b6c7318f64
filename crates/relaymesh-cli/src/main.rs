//! Relaymesh - payload relay mesh
//!
//! `relaymesh run` starts one node of the mesh described by a routing file.
//! `relaymesh send` injects payloads at a node, and `relaymesh inspect`
//! reads a node's load table without touching it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use relaymesh_core::{NodeName, Payload};
use relaymesh_logging::{FileConfig, LogConfig, MeshSubscriberBuilder};
use relaymesh_node::{MeshConfig, NodeConfig, OverflowPolicy, RelayNode};
use relaymesh_routing::StrategyKind;
use relaymesh_transport::{TcpServer, deliver, query_load};

#[derive(Parser)]
#[command(
    name = "relaymesh",
    about = "Deduplicating, load-balancing payload relay mesh",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one node until Ctrl-C
    Run(RunArgs),

    /// Deliver payloads to a running node
    Send {
        /// Address of the receiving node (host:port)
        #[arg(long)]
        to: String,

        /// Payloads given inline
        payloads: Vec<String>,

        /// Files with one payload per line; each file is sent concurrently
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Connect timeout in milliseconds
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },

    /// Print the load table of a running node
    Inspect {
        /// Address of the node (host:port)
        #[arg(long)]
        addr: String,

        /// Connect timeout in milliseconds
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Name of this node in the routing file
    #[arg(short, long)]
    node: NodeName,

    /// Routing file
    #[arg(short, long, default_value = "routing.json")]
    config: PathBuf,

    /// Neighbor selection: round-robin or least-loaded
    #[arg(short, long, default_value = "round-robin")]
    strategy: StrategyKind,

    /// Number of workers
    #[arg(short, long, default_value_t = relaymesh_node::DEFAULT_WORKERS)]
    workers: usize,

    /// Per-worker queue capacity
    #[arg(long, default_value_t = relaymesh_node::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// What to do when a worker queue is full: block or reject
    #[arg(long, default_value = "block")]
    overflow: OverflowPolicy,

    /// Bound on one outbound send in milliseconds
    #[arg(long, default_value = "2000")]
    send_timeout_ms: u64,

    /// Fingerprints retained for deduplication
    #[arg(long, default_value_t = relaymesh_routing::DEFAULT_DEDUP_CAPACITY)]
    dedup_capacity: usize,

    /// Human-readable console logs instead of JSON lines
    #[arg(long)]
    pretty: bool,

    /// Also write JSONL logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl RunArgs {
    fn node_config(&self) -> NodeConfig {
        NodeConfig::default()
            .with_strategy(self.strategy)
            .with_workers(self.workers)
            .with_queue_capacity(self.queue_capacity)
            .with_overflow(self.overflow)
            .with_send_timeout(Duration::from_millis(self.send_timeout_ms))
            .with_dedup_capacity(self.dedup_capacity)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args, cli.verbose).await,
        Commands::Send {
            to,
            payloads,
            files,
            timeout_ms,
        } => {
            init_client_logging(cli.verbose);
            send(&to, payloads, files, Duration::from_millis(timeout_ms)).await
        }
        Commands::Inspect { addr, timeout_ms } => {
            init_client_logging(cli.verbose);
            inspect(&addr, Duration::from_millis(timeout_ms)).await
        }
    }
}

fn init_client_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let _ = MeshSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .with_level(level)
        .try_init();
}

async fn run(args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let mut logging = MeshSubscriberBuilder::new()
        .with_level(if verbose { "debug" } else { "info" })
        .with_pretty_console(args.pretty);
    if let Some(dir) = &args.log_dir {
        logging = logging.with_file_output(FileConfig::in_dir(dir));
    }
    let _guard = logging
        .for_node(args.node.as_str())
        .try_init()
        .context("Failed to initialize logging")?;

    let mesh = MeshConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load routing file {}", args.config.display()))?;
    let topology = mesh
        .topology_for(&args.node)
        .with_context(|| format!("Invalid configuration for node {}", args.node))?;
    let listen_addr = topology.identity().listen_addr;

    let node = Arc::new(RelayNode::with_tcp(topology, args.node_config()));
    node.start().await.context("Failed to start node")?;

    let server = TcpServer::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to listen on {}", listen_addr))?;
    node.serve(server).await;

    info!(node = %args.node, addr = %listen_addr, "Ready");

    let mut fatal = node.fatal();
    let failure = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Signal handler failed, shutting down");
            }
            None
        }
        failure = wait_fatal(&mut fatal) => Some(failure),
    };

    if let Some(summary) = node.shutdown().await {
        println!("{}", summary);
    }

    if let Some(failure) = failure {
        error!(error = %failure, "Node stopped on fatal error");
        bail!("{}", failure);
    }
    Ok(())
}

async fn wait_fatal(
    fatal: &mut tokio::sync::watch::Receiver<Option<relaymesh_node::FatalError>>,
) -> relaymesh_node::FatalError {
    loop {
        if let Some(failure) = fatal.borrow_and_update().clone() {
            return failure;
        }
        if fatal.changed().await.is_err() {
            // Sender lives as long as the node; park instead of spinning
            std::future::pending::<()>().await;
        }
    }
}

async fn send(
    to: &str,
    payloads: Vec<String>,
    files: Vec<PathBuf>,
    timeout: Duration,
) -> anyhow::Result<()> {
    if payloads.is_empty() && files.is_empty() {
        bail!("Nothing to send: give payloads or --file");
    }

    let mut senders = JoinSet::new();
    if !payloads.is_empty() {
        let to = to.to_string();
        senders.spawn(async move { send_batch(&to, payloads, timeout).await });
    }
    for path in files {
        let batch = read_payload_lines(&path).await?;
        let to = to.to_string();
        senders.spawn(async move { send_batch(&to, batch, timeout).await });
    }

    let (mut accepted, mut failed) = (0usize, 0usize);
    while let Some(result) = senders.join_next().await {
        let (ok, err) = result.context("Sender task panicked")?;
        accepted += ok;
        failed += err;
    }

    println!("accepted: {}  failed: {}", accepted, failed);
    if accepted == 0 && failed > 0 {
        bail!("No payload was accepted by {}", to);
    }
    Ok(())
}

async fn send_batch(to: &str, batch: Vec<String>, timeout: Duration) -> (usize, usize) {
    let (mut accepted, mut failed) = (0, 0);
    for line in batch {
        match deliver(to, Payload::from(line), timeout).await {
            Ok(()) => accepted += 1,
            Err(e) => {
                warn!(to, error = %e, "Delivery failed");
                failed += 1;
            }
        }
    }
    (accepted, failed)
}

/// Non-empty lines of `path`, trimmed of trailing line endings
async fn read_payload_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

async fn inspect(addr: &str, timeout: Duration) -> anyhow::Result<()> {
    let (node, entries) = query_load(addr, timeout)
        .await
        .with_context(|| format!("Failed to query {}", addr))?;

    println!("Load table of {} ({})", node, addr);
    if entries.is_empty() {
        println!("  (terminal node, no neighbors)");
        return Ok(());
    }
    let total: u64 = entries.iter().map(|e| e.load).sum();
    for entry in &entries {
        println!("  {:<16} {}", entry.neighbor.as_str(), entry.load);
    }
    println!("  {:<16} {}", "total", total);
    Ok(())
}
