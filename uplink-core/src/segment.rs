//! Segment and piece identifiers
//!
//! An object is stored as an ordered list of segments. Each committed
//! version of an object has its own stream id; piece ids are derived from
//! (stream id, segment index, piece number) so they never collide across
//! segments or versions.

use crate::error::{Result, UplinkError};
use crate::MAX_SEGMENT_SIZE;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one committed version of an object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Allocate a fresh stream id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a piece on a storage node
///
/// Format: base58-encoded Blake3 hash of (stream id, segment index, piece number)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceId([u8; 32]);

impl PieceId {
    /// Derive the id of piece `piece_number` in segment `segment_index`
    pub fn derive(stream: &StreamId, segment_index: u32, piece_number: u16) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"uplink piece id v1");
        hasher.update(stream.as_bytes());
        hasher.update(&segment_index.to_le_bytes());
        hasher.update(&piece_number.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to base58 string
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl fmt::Debug for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceId({})", &self.to_base58()[..8])
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Plaintext of one segment before encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentData {
    /// Position within the object
    pub index: u32,
    /// Plaintext bytes
    pub data: Bytes,
}

impl SegmentData {
    pub fn new(index: u32, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Validate a configured segment size
pub fn check_segment_size(segment_size: usize) -> Result<()> {
    if segment_size == 0 || segment_size > MAX_SEGMENT_SIZE {
        return Err(UplinkError::Configuration(format!(
            "segment size must be in 1..={}, got {}",
            MAX_SEGMENT_SIZE, segment_size
        )));
    }
    Ok(())
}

/// Split an in-memory object into segments.
///
/// Every segment but the last is exactly `segment_size` bytes. A zero-length
/// object still yields exactly one (empty) segment.
pub fn split_into_segments(data: &Bytes, segment_size: usize) -> Result<Vec<SegmentData>> {
    check_segment_size(segment_size)?;

    if data.is_empty() {
        return Ok(vec![SegmentData::new(0, Bytes::new())]);
    }

    let count = data.len().div_ceil(segment_size);
    let segments = (0..count)
        .map(|i| {
            let start = i * segment_size;
            let end = (start + segment_size).min(data.len());
            SegmentData::new(i as u32, data.slice(start..end))
        })
        .collect();

    Ok(segments)
}
