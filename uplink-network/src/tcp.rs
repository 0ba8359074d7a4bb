//! TCP piece transport
//!
//! One connection per call. Each direction carries a single
//! length-delimited frame holding a protobuf `PieceRequest` or
//! `PieceResponse`.

use crate::auth::PieceAuthorizer;
use crate::transport::PieceTransport;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, instrument};
use uplink_core::{NodeDescriptor, PieceId, Result, UplinkError};
use uplink_protocol::{Operation, PieceRequest, PieceResponse, Status, MAX_FRAME_SIZE};

/// Configuration for the TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum frame size in bytes
    pub max_frame_size: usize,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Bytes reserved in each frame for the request fields around a piece payload
pub const FRAME_ENVELOPE: usize = 4 * 1024;

/// Largest piece payload that fits in a frame of `max_frame_size` bytes
pub const fn max_piece_payload(max_frame_size: usize) -> usize {
    max_frame_size.saturating_sub(FRAME_ENVELOPE)
}

/// Frame codec shared by both ends of a piece connection
pub fn frame_codec(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_size)
        .new_codec()
}

/// Piece transport speaking the wire protocol over TCP
pub struct TcpTransport {
    config: TcpTransportConfig,
    authorizer: PieceAuthorizer,
}

impl TcpTransport {
    /// Create a transport with default configuration
    pub fn new(authorizer: PieceAuthorizer) -> Self {
        Self::with_config(TcpTransportConfig::default(), authorizer)
    }

    /// Create a transport with custom configuration
    pub fn with_config(config: TcpTransportConfig, authorizer: PieceAuthorizer) -> Self {
        Self { config, authorizer }
    }

    fn request(&self, operation: Operation, piece_id: &PieceId) -> PieceRequest {
        PieceRequest::new(
            operation,
            piece_id.as_bytes(),
            self.authorizer.sign(operation, piece_id),
        )
    }

    /// Send one request and wait for its response
    async fn call(&self, node: &NodeDescriptor, request: PieceRequest) -> Result<PieceResponse> {
        let node_name = node.id.as_str();

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&node.address))
            .await
            .map_err(|_| UplinkError::transfer(node_name, "connect timed out", true))?
            .map_err(|e| io_failure(node_name, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| io_failure(node_name, e))?;

        let mut framed = Framed::new(stream, frame_codec(self.config.max_frame_size));

        framed
            .send(Bytes::from(request.encode_to_vec()))
            .await
            .map_err(|e| io_failure(node_name, e))?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| UplinkError::transfer(node_name, "connection closed before response", true))?
            .map_err(|e| io_failure(node_name, e))?;

        PieceResponse::decode(frame.freeze()).map_err(|e| {
            UplinkError::transfer(node_name, format!("malformed response: {}", e), false)
        })
    }
}

/// Map a node's response status onto the error taxonomy
fn into_result(node: &NodeDescriptor, piece_id: &PieceId, response: PieceResponse) -> Result<Option<Bytes>> {
    let node_name = node.id.as_str();
    let status = Status::try_from(response.status).map_err(|_| {
        UplinkError::transfer(
            node_name,
            format!("unknown status {}", response.status),
            false,
        )
    })?;
    match status {
        Status::Ok => Ok(response.payload),
        Status::NotFound => Err(UplinkError::NotFound(format!(
            "piece {} on node {}",
            piece_id, node_name
        ))),
        Status::Internal => Err(UplinkError::transfer(
            node_name,
            format!("node error: {}", response.error_message),
            true,
        )),
        status @ (Status::Unspecified
        | Status::Unauthorized
        | Status::BadRequest
        | Status::VersionMismatch) => {
            Err(UplinkError::transfer(
                node_name,
                format!("{:?}: {}", status, response.error_message),
                false,
            ))
        }
    }
}

/// Transient socket errors are retryable; framing violations are not
fn io_failure(node: &str, err: std::io::Error) -> UplinkError {
    let retryable = !matches!(err.kind(), ErrorKind::InvalidData | ErrorKind::InvalidInput);
    UplinkError::transfer(node, err.to_string(), retryable)
}

#[async_trait]
impl PieceTransport for TcpTransport {
    #[instrument(skip(self, node, data), fields(node = %node.id, piece = %piece_id, size = data.len()))]
    async fn put(&self, node: &NodeDescriptor, piece_id: PieceId, data: Bytes) -> Result<()> {
        let request = self.request(Operation::Put, &piece_id).with_payload(data);
        let response = self.call(node, request).await?;
        into_result(node, &piece_id, response)?;
        debug!("Piece stored");
        Ok(())
    }

    #[instrument(skip(self, node), fields(node = %node.id, piece = %piece_id))]
    async fn get(&self, node: &NodeDescriptor, piece_id: PieceId) -> Result<Bytes> {
        let request = self.request(Operation::Get, &piece_id);
        let response = self.call(node, request).await?;
        let payload = into_result(node, &piece_id, response)?.ok_or_else(|| {
            UplinkError::transfer(node.id.as_str(), "response carried no payload", false)
        })?;
        debug!(size = payload.len(), "Piece retrieved");
        Ok(payload)
    }

    #[instrument(skip(self, node), fields(node = %node.id, piece = %piece_id))]
    async fn delete(&self, node: &NodeDescriptor, piece_id: PieceId) -> Result<()> {
        let request = self.request(Operation::Delete, &piece_id);
        let response = self.call(node, request).await?;
        into_result(node, &piece_id, response)?;
        Ok(())
    }
}
