//! Piece transfer client
//!
//! Wraps a [`PieceTransport`] with a per-attempt timeout, bounded retries
//! with exponential backoff, and cooperative cancellation.

use crate::metrics::names;
use crate::transport::PieceTransport;
use bytes::Bytes;
use metrics::counter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uplink_core::{NodeDescriptor, PieceId, Result, UplinkError};

/// Configuration for piece transfers
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Attempts per operation, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay
    pub max_backoff: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Retrying client for single-piece operations
#[derive(Clone)]
pub struct PieceTransferClient {
    transport: Arc<dyn PieceTransport>,
    config: TransferConfig,
}

impl PieceTransferClient {
    /// Create a client over `transport`
    pub fn new(transport: Arc<dyn PieceTransport>, config: TransferConfig) -> Self {
        Self { transport, config }
    }

    /// Get the transfer configuration
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Upload one piece to one node
    pub async fn put(
        &self,
        node: &NodeDescriptor,
        piece_id: PieceId,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let size = data.len() as u64;
        self.with_retry("put", node, cancel, || {
            self.transport.put(node, piece_id, data.clone())
        })
        .await?;
        counter!(names::PIECE_BYTES_SENT).increment(size);
        Ok(())
    }

    /// Download one piece from one node
    pub async fn get(
        &self,
        node: &NodeDescriptor,
        piece_id: PieceId,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let data = self
            .with_retry("get", node, cancel, || self.transport.get(node, piece_id))
            .await?;
        counter!(names::PIECE_BYTES_RECEIVED).increment(data.len() as u64);
        Ok(data)
    }

    /// Delete one piece from one node
    pub async fn delete(
        &self,
        node: &NodeDescriptor,
        piece_id: PieceId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.with_retry("delete", node, cancel, || {
            self.transport.delete(node, piece_id)
        })
        .await
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires
    async fn with_retry<F, Fut, T>(
        &self,
        op: &'static str,
        node: &NodeDescriptor,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return Err(UplinkError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UplinkError::Cancelled),
                result = tokio::time::timeout(self.config.timeout, operation()) => result,
            };

            let err = match outcome {
                Ok(Ok(value)) => {
                    counter!(names::PIECE_TRANSFERS_TOTAL, "op" => op).increment(1);
                    if attempt > 1 {
                        debug!(node = %node.id, op, attempt, "Transfer succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => UplinkError::transfer(
                    node.id.as_str(),
                    format!("{} timed out after {:?}", op, self.config.timeout),
                    true,
                ),
            };

            if !err.is_retryable() || attempt >= max_attempts {
                counter!(names::PIECE_TRANSFER_FAILURES, "op" => op).increment(1);
                debug!(node = %node.id, op, attempt, error = %err, "Transfer failed");
                return Err(err);
            }

            warn!(
                node = %node.id,
                op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying piece transfer"
            );
            counter!(names::PIECE_TRANSFER_RETRIES, "op" => op).increment(1);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UplinkError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(self.config.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryNetwork, NodeFault};

    fn fast_config() -> TransferConfig {
        TransferConfig {
            timeout: Duration::from_millis(200),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn setup() -> (Arc<MemoryNetwork>, PieceTransferClient, NodeDescriptor) {
        let network = Arc::new(MemoryNetwork::new());
        let node = network.add_node("node-1");
        let client = PieceTransferClient::new(network.clone(), fast_config());
        (network, client, node)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (network, client, node) = setup();
        let cancel = CancellationToken::new();
        let piece = PieceId::from_bytes([7u8; 32]);

        client
            .put(&node, piece, Bytes::from_static(b"abc"), &cancel)
            .await
            .unwrap();
        assert!(network.has_piece(&node.id, &piece));

        let data = client.get(&node, piece, &cancel).await.unwrap();
        assert_eq!(&data[..], b"abc");

        client.delete(&node, piece, &cancel).await.unwrap();
        assert!(!network.has_piece(&node.id, &piece));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let (network, client, node) = setup();
        network.set_fault(&node.id, NodeFault::Flaky { remaining: 2 });

        let piece = PieceId::from_bytes([1u8; 32]);
        client
            .put(&node, piece, Bytes::from_static(b"x"), &CancellationToken::new())
            .await
            .unwrap();

        // Two failed attempts, then success
        assert_eq!(network.put_count(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (network, client, node) = setup();
        network.set_fault(&node.id, NodeFault::Offline);

        let err = client
            .get(&node, PieceId::from_bytes([1u8; 32]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UplinkError::TransferFailed { .. }));
        assert_eq!(network.get_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_not_retried() {
        let (network, client, node) = setup();
        network.set_fault(&node.id, NodeFault::RejectAuth);

        let err = client
            .put(
                &node,
                PieceId::from_bytes([1u8; 32]),
                Bytes::from_static(b"x"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(network.put_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_not_retried() {
        let (network, client, node) = setup();
        let err = client
            .get(&node, PieceId::from_bytes([3u8; 32]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UplinkError::NotFound(_)));
        assert_eq!(network.get_count(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let (network, client, node) = setup();
        network.set_fault(&node.id, NodeFault::Latency(Duration::from_secs(5)));

        let err = client
            .get(&node, PieceId::from_bytes([1u8; 32]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(network.get_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (network, client, node) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .put(&node, PieceId::from_bytes([1u8; 32]), Bytes::new(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, UplinkError::Cancelled));
        assert_eq!(network.put_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_attempt() {
        let (network, client, node) = setup();
        network.set_fault(&node.id, NodeFault::Latency(Duration::from_millis(150)));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = client
            .get(&node, PieceId::from_bytes([1u8; 32]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UplinkError::Cancelled));
        assert_eq!(network.get_count(), 1);
    }
}
