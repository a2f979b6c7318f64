//! TCP client side
//!
//! [`TcpTransport`] is the production [`Transport`]: it resolves a neighbor
//! name through the mesh [`AddressBook`], opens a fresh connection, writes a
//! single `Deliver` frame and waits for `Ack` or `Reject`. There is no
//! connection reuse and no retry; the forwarding engine bounds the whole
//! exchange with its send timeout.
//!
//! The free functions [`deliver`] and [`query_load`] speak the same protocol
//! to a raw `host:port` and back the command-line client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use relaymesh_core::{AddressBook, NodeName, Payload, Transport, TransportError};
use relaymesh_routing::LoadEntry;

use crate::protocol::{WireMessage, read_message, write_message};

/// Default bound on establishing a TCP connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Length-prefixed TCP transport, one connection per send
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addresses: Arc<AddressBook>,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(addresses: AddressBook) -> Self {
        Self {
            addresses: Arc::new(addresses),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn resolve(&self, target: &NodeName) -> Result<&str, TransportError> {
        self.addresses
            .get(target)
            .ok_or_else(|| TransportError::AddressResolutionFailed(target.to_string()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, target: &NodeName, payload: Payload) -> Result<(), TransportError> {
        let addr = self.resolve(target)?;
        trace!(target = %target, addr, "delivering over tcp");
        deliver(addr, payload, self.connect_timeout).await
    }
}

/// Open a connection to `addr` within `timeout`
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            warn!(addr, timeout_ms = timeout.as_millis() as u64, "Connection timeout");
            TransportError::Timeout(timeout)
        })?
        .map_err(|e| {
            debug!(addr, error = %e, "Connection failed");
            TransportError::ConnectionFailed(format!("{}: {}", addr, e))
        })?;
    stream
        .set_nodelay(true)
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    Ok(stream)
}

/// One request/response exchange on a fresh connection
async fn request(
    addr: &str,
    msg: &WireMessage,
    connect_timeout: Duration,
) -> Result<WireMessage, TransportError> {
    let mut stream = connect(addr, connect_timeout).await?;
    write_message(&mut stream, msg).await?;
    read_message(&mut stream)
        .await?
        .ok_or(TransportError::ConnectionClosed)
}

/// Deliver one payload to the node listening at `addr`
///
/// # Errors
///
/// [`TransportError::Rejected`] if the node refused the payload, or a
/// connection/protocol error.
pub async fn deliver(
    addr: &str,
    payload: Payload,
    connect_timeout: Duration,
) -> Result<(), TransportError> {
    match request(addr, &WireMessage::Deliver(payload), connect_timeout).await? {
        WireMessage::Ack => Ok(()),
        WireMessage::Reject { code, message } => Err(TransportError::Rejected { code, message }),
        other => Err(TransportError::Protocol(format!(
            "unexpected reply to deliver: {}",
            other.kind()
        ))),
    }
}

/// Fetch the load table of the node listening at `addr`
pub async fn query_load(
    addr: &str,
    connect_timeout: Duration,
) -> Result<(NodeName, Vec<LoadEntry>), TransportError> {
    match request(addr, &WireMessage::LoadQuery, connect_timeout).await? {
        WireMessage::LoadReport { node, entries } => Ok((node, entries)),
        WireMessage::Reject { code, message } => Err(TransportError::Rejected { code, message }),
        other => Err(TransportError::Protocol(format!(
            "unexpected reply to load query: {}",
            other.kind()
        ))),
    }
}
