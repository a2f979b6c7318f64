//! TCP server side
//!
//! [`TcpServer`] accepts connections and answers each request frame through
//! an [`InboundHandler`]. Every connection gets its own task; requests on one
//! connection are answered in order. When the shutdown channel fires the
//! accept loop exits and idle connections are closed.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, trace, warn};

use relaymesh_core::{NodeName, Payload};
use relaymesh_routing::LoadEntry;

use crate::protocol::{FramingError, RejectCode, WireMessage, read_message, write_message};

/// A refused request, sent back as [`WireMessage::Reject`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Node-side handling of inbound requests
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Accept a payload for processing
    ///
    /// `Ok` means accepted, not forwarded.
    async fn on_deliver(&self, payload: Payload) -> Result<(), Rejection>;

    /// Report this node's name and load table
    async fn on_load_query(&self) -> Result<(NodeName, Vec<LoadEntry>), Rejection>;
}

/// Errors starting the server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bound TCP listener ready to serve
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind to `addr` (port 0 picks a free port)
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop until `shutdown` fires or its sender is dropped
    ///
    /// Open connections finish the request in hand and are closed before
    /// this returns.
    pub async fn serve<H: InboundHandler>(
        self,
        handler: Arc<H>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(addr = %self.local_addr, "Server listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "Connection task failed");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        trace!(peer = %peer, "Connection accepted");
                        let handler = Arc::clone(&handler);
                        let stop = stop_rx.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, handler, stop).await {
                                debug!(peer = %peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                    }
                },
            }
        }

        let _ = stop_tx.send(true);
        let open = connections.len();
        while connections.join_next().await.is_some() {}
        info!(addr = %self.local_addr, open, "Server stopped");
    }

    /// Spawn [`serve`](Self::serve) onto the runtime
    pub fn spawn<H: InboundHandler>(
        self,
        handler: Arc<H>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.serve(handler, shutdown))
    }
}

async fn handle_connection<H: InboundHandler>(
    mut stream: TcpStream,
    handler: Arc<H>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), FramingError> {
    loop {
        let request = tokio::select! {
            _ = stop.changed() => break,
            request = read_message(&mut stream) => match request? {
                Some(request) => request,
                None => break,
            },
        };
        let reply = match request {
            WireMessage::Deliver(payload) => match handler.on_deliver(payload).await {
                Ok(()) => WireMessage::Ack,
                Err(rejection) => WireMessage::reject(rejection.code, rejection.message),
            },
            WireMessage::LoadQuery => match handler.on_load_query().await {
                Ok((node, entries)) => WireMessage::LoadReport { node, entries },
                Err(rejection) => WireMessage::reject(rejection.code, rejection.message),
            },
            other => WireMessage::reject(
                RejectCode::BadRequest,
                format!("{} is not a request", other.kind()),
            ),
        };
        write_message(&mut stream, &reply).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::{deliver, query_load};
    use relaymesh_core::TransportError;
    use std::time::Duration;

    use tokio::sync::Mutex;

    /// Handler that records deliveries and rejects "bad"
    #[derive(Default)]
    struct Recorder {
        received: Mutex<Vec<Payload>>,
    }

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn on_deliver(&self, payload: Payload) -> Result<(), Rejection> {
            if payload.as_bytes() == b"bad" {
                return Err(Rejection::new(RejectCode::QueueFull, "no room"));
            }
            self.received.lock().await.push(payload);
            Ok(())
        }

        async fn on_load_query(&self) -> Result<(NodeName, Vec<LoadEntry>), Rejection> {
            Ok((
                NodeName::new("B").unwrap(),
                vec![LoadEntry {
                    neighbor: NodeName::new("C").unwrap(),
                    load: 7,
                }],
            ))
        }
    }

    async fn start() -> (SocketAddr, Arc<Recorder>, broadcast::Sender<()>, JoinHandle<()>) {
        let server = TcpServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr();
        let handler = Arc::new(Recorder::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = server.spawn(Arc::clone(&handler), shutdown_rx);
        (addr, handler, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_deliver_and_query() {
        let (addr, handler, shutdown_tx, handle) = start().await;
        let addr = addr.to_string();
        let timeout = Duration::from_secs(1);

        deliver(&addr, Payload::from("x"), timeout).await.unwrap();
        assert_eq!(handler.received.lock().await.len(), 1);

        let (node, entries) = query_load(&addr, timeout).await.unwrap();
        assert_eq!(node.as_str(), "B");
        assert_eq!(entries[0].load, 7);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_reaches_client() {
        let (addr, handler, shutdown_tx, handle) = start().await;

        let err = deliver(&addr.to_string(), Payload::from("bad"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Rejected { code, .. } if code == RejectCode::QueueFull.as_u16()
        ));
        assert!(handler.received.lock().await.is_empty());

        drop(shutdown_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_request_rejected() {
        let (addr, _handler, shutdown_tx, handle) = start().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_message(&mut stream, &WireMessage::Ack).await.unwrap();
        let reply = read_message(&mut stream).await.unwrap().unwrap();
        assert!(matches!(
            reply,
            WireMessage::Reject { code, .. } if code == RejectCode::BadRequest.as_u16()
        ));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_closed_on_shutdown() {
        let (addr, handler, shutdown_tx, handle) = start().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_message(&mut stream, &WireMessage::Deliver(Payload::from("x")))
            .await
            .unwrap();
        assert_eq!(read_message(&mut stream).await.unwrap(), Some(WireMessage::Ack));

        // Client keeps the socket open; shutdown must not wait on it
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(read_message(&mut stream).await.unwrap(), None);
        assert_eq!(handler.received.lock().await.len(), 1);
    }
}
