//! Transport abstraction for outbound delivery
//!
//! The [`Transport`] trait is the forwarding engine's only way to reach a
//! neighbor. Delivery is synchronous request/response: `send` resolves once
//! the neighbor has acknowledged (accepted for processing) or refused the
//! payload. Transports never retry on their own.
//!
//! ## Implementations
//!
//! - [`MockTransport`](crate::MockTransport): in-memory transport for testing
//! - `TcpTransport`: length-prefixed TCP transport (in relaymesh-transport)

use async_trait::async_trait;

use crate::error::TransportError;
use crate::identity::NodeName;
use crate::payload::Payload;

/// Outbound delivery to a named neighbor
///
/// Implementations resolve `target` to an address themselves, typically via
/// the mesh [`AddressBook`](crate::AddressBook). Timeouts are applied by the
/// caller.
///
/// # Example
///
/// ```rust,ignore
/// use relaymesh_core::{NodeName, Payload, Transport};
///
/// async fn relay<T: Transport>(transport: &T, next: &NodeName, payload: Payload) {
///     if let Err(e) = transport.send(next, payload).await {
///         tracing::warn!(error = %e, "hop failed");
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload` to `target` and wait for its acknowledgement
    ///
    /// # Errors
    ///
    /// Returns an error if the neighbor cannot be reached, refuses the
    /// payload, or the exchange fails mid-way.
    async fn send(&self, target: &NodeName, payload: Payload) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, target: &NodeName, payload: Payload) -> Result<(), TransportError> {
        (**self).send(target, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _target: &NodeName, _payload: Payload) -> Result<(), TransportError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_arc_forwards_to_inner() {
        let inner = Arc::new(CountingTransport {
            sent: AtomicUsize::new(0),
        });
        let shared: Arc<dyn Transport> = inner.clone();
        let target = NodeName::new("B").unwrap();

        shared.send(&target, Payload::from("x")).await.unwrap();
        Arc::clone(&shared)
            .send(&target, Payload::from("y"))
            .await
            .unwrap();

        assert_eq!(inner.sent.load(Ordering::SeqCst), 2);
    }
}
