//! Mock transport implementation for testing
//!
//! Provides an in-memory [`Transport`] that records every successful delivery
//! and lets tests inject the failure modes the forwarding engine must survive:
//! unreachable neighbors and slow neighbors.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaymesh_core::{MockTransport, NodeName, Payload, Transport};
//!
//! let transport = MockTransport::new();
//! let c = NodeName::new("C").unwrap();
//!
//! transport.send(&c, Payload::from("x")).await.unwrap();
//! assert_eq!(transport.delivery_count(&c), 1);
//!
//! transport.set_unreachable(c.clone());
//! assert!(transport.send(&c, Payload::from("y")).await.is_err());
//! ```
//!
//! A mock can also be wired to real receivers with
//! [`connect_to`](MockTransport::connect_to); each delivery is then pushed
//! into that channel as well, which is how in-process meshes are assembled in
//! integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::identity::NodeName;
use crate::payload::Payload;
use crate::transport::Transport;

/// A mock transport for testing
///
/// Every send to a reachable target succeeds and is recorded. Sends to a
/// target marked unreachable fail with [`TransportError::ConnectionFailed`]
/// and are not recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Successful deliveries per target
    delivered: DashMap<NodeName, Vec<Payload>>,
    /// Targets that refuse connections
    unreachable: DashSet<NodeName>,
    /// Optional channels to push deliveries into
    outgoing: DashMap<NodeName, mpsc::Sender<Payload>>,
    /// Artificial per-send delay
    latency: Option<Duration>,
    /// Per-target delay, overriding `latency`
    target_latency: DashMap<NodeName, Duration>,
    /// Send attempts, successful or not
    attempts: AtomicU64,
}

impl MockTransport {
    /// Create a mock transport where every target is reachable
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixed delay to every send
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay sends to one target only
    pub fn set_target_latency(&self, target: NodeName, latency: Duration) {
        self.target_latency.insert(target, latency);
    }

    /// Make sends to `target` fail
    pub fn set_unreachable(&self, target: NodeName) {
        self.unreachable.insert(target);
    }

    /// Make sends to `target` succeed again
    pub fn set_reachable(&self, target: &NodeName) {
        self.unreachable.remove(target);
    }

    /// Also push deliveries for `target` into `inbox`
    pub fn connect_to(&self, target: NodeName, inbox: mpsc::Sender<Payload>) {
        self.outgoing.insert(target, inbox);
    }

    /// Payloads delivered to `target`, in delivery order
    pub fn delivered_to(&self, target: &NodeName) -> Vec<Payload> {
        self.delivered
            .get(target)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Number of successful deliveries to `target`
    pub fn delivery_count(&self, target: &NodeName) -> usize {
        self.delivered.get(target).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Number of successful deliveries across all targets
    pub fn total_deliveries(&self) -> usize {
        self.delivered.iter().map(|entry| entry.len()).sum()
    }

    /// Number of send attempts, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, target: &NodeName, payload: Payload) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .target_latency
            .get(target)
            .map(|entry| *entry.value())
            .or(self.latency);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.contains(target) {
            return Err(TransportError::ConnectionFailed(format!(
                "{} refused connection",
                target
            )));
        }

        let inbox = self.outgoing.get(target).map(|entry| entry.value().clone());
        if let Some(inbox) = inbox {
            inbox
                .send(payload.clone())
                .await
                .map_err(|_| TransportError::SendFailed("channel closed".into()))?;
        }

        self.delivered
            .entry(target.clone())
            .or_default()
            .push(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> NodeName {
        NodeName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_mock_transport_records_deliveries() {
        let transport = MockTransport::new();
        let c = name("C");

        transport.send(&c, Payload::from("x")).await.unwrap();
        transport.send(&c, Payload::from("y")).await.unwrap();

        assert_eq!(transport.delivery_count(&c), 2);
        assert_eq!(transport.delivered_to(&c)[1], Payload::from("y"));
        assert_eq!(transport.total_deliveries(), 2);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_unreachable() {
        let transport = MockTransport::new();
        let d = name("D");
        transport.set_unreachable(d.clone());

        let result = transport.send(&d, Payload::from("x")).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(transport.delivery_count(&d), 0);
        assert_eq!(transport.attempts(), 1);

        transport.set_reachable(&d);
        transport.send(&d, Payload::from("x")).await.unwrap();
        assert_eq!(transport.delivery_count(&d), 1);
    }

    #[tokio::test]
    async fn test_mock_transport_connected_inbox() {
        let transport = MockTransport::new();
        let b = name("B");
        let (tx, mut rx) = mpsc::channel(4);
        transport.connect_to(b.clone(), tx);

        transport.send(&b, Payload::from("hello")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Payload::from("hello"));
        assert_eq!(transport.delivery_count(&b), 1);
    }

    #[tokio::test]
    async fn test_mock_transport_closed_inbox_fails() {
        let transport = MockTransport::new();
        let b = name("B");
        let (tx, rx) = mpsc::channel(1);
        transport.connect_to(b.clone(), tx);
        drop(rx);

        let result = transport.send(&b, Payload::from("hello")).await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));
        assert_eq!(transport.delivery_count(&b), 0);
    }

    #[tokio::test]
    async fn test_mock_transport_latency() {
        let transport = MockTransport::new();
        let slow = name("S");
        transport.set_target_latency(slow.clone(), Duration::from_millis(50));

        let start = std::time::Instant::now();
        transport.send(&slow, Payload::from("x")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
