//! Piece transport trait
//!
//! A transport performs exactly one attempt of one piece operation against
//! one node. Failures are classified as retryable or not; retrying is the
//! transfer client's job.

use async_trait::async_trait;
use bytes::Bytes;
use uplink_core::{NodeDescriptor, PieceId, Result};

#[async_trait]
pub trait PieceTransport: Send + Sync {
    /// Store a piece on `node`
    async fn put(&self, node: &NodeDescriptor, piece_id: PieceId, data: Bytes) -> Result<()>;

    /// Fetch a piece from `node`
    async fn get(&self, node: &NodeDescriptor, piece_id: PieceId) -> Result<Bytes>;

    /// Delete a piece from `node`
    async fn delete(&self, node: &NodeDescriptor, piece_id: PieceId) -> Result<()>;
}
