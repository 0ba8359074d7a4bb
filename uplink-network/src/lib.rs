//! Uplink Network Layer
//!
//! Moves individual pieces between the uplink and storage nodes:
//! - **`PieceTransport`**: one put/get/delete against one node, no retries
//! - **`TcpTransport`**: the wire implementation (length-delimited protobuf frames)
//! - **`MemoryNetwork`**: an in-process node set with fault injection
//! - **`PieceTransferClient`**: timeouts, retry with exponential backoff,
//!   and cancellation on top of any transport
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             PieceTransferClient               │
//! │   timeout · retry/backoff · cancellation      │
//! └──────────────────────┬───────────────────────┘
//!                        │ dyn PieceTransport
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//!  ┌───────────────┐           ┌───────────────┐
//!  │ TcpTransport  │           │ MemoryNetwork │
//!  │ (wire frames) │           │ (tests/dev)   │
//!  └───────────────┘           └───────────────┘
//! ```

pub mod auth;
pub mod client;
pub mod memory;
pub mod metrics;
pub mod tcp;
pub mod transport;

// Re-exports
pub use auth::PieceAuthorizer;
pub use client::{PieceTransferClient, TransferConfig};
pub use memory::{MemoryNetwork, NodeFault};
pub use tcp::{max_piece_payload, TcpTransport, TcpTransportConfig};
pub use uplink_protocol::MAX_FRAME_SIZE;
pub use transport::PieceTransport;
