//! Uplink Core Library
//!
//! Core abstractions for the uplink client of a decentralized object store.
//! This crate provides:
//! - Reed-Solomon erasure coding with per-piece content hashes
//! - Segment encryption (AES-256-GCM) and per-segment key derivation
//! - The object/segment/piece data model and identifiers
//! - The shared error taxonomy

pub mod crypto;
pub mod erasure;
pub mod error;
pub mod node;
pub mod segment;

pub use crypto::{
    decrypt_segment, derive_key, encrypt_segment, ContentHash, EncryptedSegment, RootKey,
    SegmentKey,
};
pub use erasure::{ErasureCodec, ErasureScheme, Piece};
pub use error::{Result, UplinkError};
pub use node::{NodeDescriptor, NodeId};
pub use segment::{split_into_segments, PieceId, SegmentData, StreamId};

/// Default erasure scheme for production networks
/// - 29 pieces are enough to reconstruct a segment
/// - 80 acknowledged pieces make an upload healthy
/// - 110 pieces are sent per segment
pub const DEFAULT_REQUIRED_PIECES: usize = 29;
pub const DEFAULT_OPTIMAL_PIECES: usize = 80;
pub const DEFAULT_TOTAL_PIECES: usize = 110;

/// Scheme used by development profiles and small test networks.
pub const DEV_REQUIRED_PIECES: usize = 4;
pub const DEV_OPTIMAL_PIECES: usize = 6;
pub const DEV_TOTAL_PIECES: usize = 10;

/// Reed-Solomon over GF(2^8) cannot address more shards than this.
pub const MAX_TOTAL_PIECES: usize = 255;

/// Segment size constants
pub const DEV_SEGMENT_SIZE: usize = 1024 * 1024; // 1 MB
pub const DEFAULT_SEGMENT_SIZE: usize = 64 * 1024 * 1024; // 64 MB
pub const MAX_SEGMENT_SIZE: usize = 256 * 1024 * 1024; // 256 MB
