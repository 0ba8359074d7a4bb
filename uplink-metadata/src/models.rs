//! Metadata models
//!
//! An object is described by one manifest: its segments in order, each
//! segment's encryption nonce, and where each of its pieces lives.

use crate::{MetadataError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uplink_core::{ContentHash, ErasureScheme, NodeDescriptor, PieceId, StreamId};

/// A bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Location and checksum of one stored piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceDescriptor {
    /// Piece number within the segment's erasure scheme
    pub number: u16,
    /// Node holding the piece
    pub node: NodeDescriptor,
    /// Id the node stores the piece under
    pub piece_id: PieceId,
    /// Blake3 hash of the piece bytes
    pub hash: ContentHash,
    /// Piece size in bytes
    pub size: u32,
}

/// One committed segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub index: u32,
    /// Plaintext size
    pub plain_size: u64,
    /// Ciphertext size, i.e. the length the codec reconstructs
    pub encrypted_size: u64,
    /// AES-GCM nonce used for this segment
    pub nonce: [u8; 12],
    /// Stored pieces, ordered by piece number
    pub pieces: Vec<PieceDescriptor>,
}

impl SegmentDescriptor {
    /// Look up a piece by number
    pub fn piece(&self, number: u16) -> Option<&PieceDescriptor> {
        self.pieces.iter().find(|p| p.number == number)
    }

    /// Piece numbers with a recorded location
    pub fn piece_numbers(&self) -> Vec<u16> {
        self.pieces.iter().map(|p| p.number).collect()
    }

    /// Check that piece numbers are unique and within the scheme
    pub fn validate(&self, scheme: &ErasureScheme) -> Result<()> {
        let mut seen = vec![false; scheme.total];
        for piece in &self.pieces {
            let n = piece.number as usize;
            if n >= scheme.total || seen[n] {
                return Err(MetadataError::Invalid(format!(
                    "segment {} has invalid or duplicate piece number {}",
                    self.index, piece.number
                )));
            }
            seen[n] = true;
        }
        Ok(())
    }
}

/// The persisted description of one object version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectManifest {
    pub bucket: String,
    pub path: String,
    pub stream_id: StreamId,
    /// Plaintext object size
    pub size: u64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Maximum plaintext bytes per segment
    pub segment_size: u64,
    /// Erasure scheme shared by every segment
    pub scheme: ErasureScheme,
    /// Segments in object order
    pub segments: Vec<SegmentDescriptor>,
}

impl ObjectManifest {
    /// Serialize for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MetadataError::Serialization(e.to_string()))
    }

    /// Deserialize from storage
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| MetadataError::Serialization(e.to_string()))
    }

    /// Look up a segment by index
    pub fn segment(&self, index: u32) -> Option<&SegmentDescriptor> {
        self.segments.iter().find(|s| s.index == index)
    }

    /// Check the structural invariants of a manifest before it is stored
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(MetadataError::Invalid("manifest has no segments".into()));
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.index as usize != i {
                return Err(MetadataError::Invalid(format!(
                    "segment at position {} has index {}",
                    i, segment.index
                )));
            }
            segment.validate(&self.scheme)?;
        }
        let total: u64 = self.segments.iter().map(|s| s.plain_size).sum();
        if total != self.size {
            return Err(MetadataError::Invalid(format!(
                "segment sizes sum to {} but object size is {}",
                total, self.size
            )));
        }
        Ok(())
    }

    /// Summary used by stat and list
    pub fn info(&self) -> ObjectInfo {
        ObjectInfo {
            bucket: self.bucket.clone(),
            path: self.path.clone(),
            stream_id: self.stream_id,
            size: self.size,
            content_type: self.content_type.clone(),
            created_at: self.created_at,
            segment_count: self.segments.len() as u32,
        }
    }
}

/// Object summary without piece locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub path: String,
    pub stream_id: StreamId,
    pub size: u64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub segment_count: u32,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    /// Resume point for the next page; `None` when the listing is complete
    pub next_cursor: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn manifest(bucket: &str, path: &str, segments: u32) -> ObjectManifest {
        let scheme = ErasureScheme::dev();
        let stream_id = StreamId::new();
        let segments: Vec<_> = (0..segments)
            .map(|index| SegmentDescriptor {
                index,
                plain_size: 100,
                encrypted_size: 116,
                nonce: [index as u8; 12],
                pieces: (0..scheme.total as u16)
                    .map(|number| PieceDescriptor {
                        number,
                        node: NodeDescriptor::new(format!("node-{}", number), "10.0.0.1:7777"),
                        piece_id: PieceId::derive(&stream_id, index, number),
                        hash: ContentHash::compute(&[number as u8]),
                        size: 29,
                    })
                    .collect(),
            })
            .collect();

        ObjectManifest {
            bucket: bucket.to_string(),
            path: path.to_string(),
            stream_id,
            size: 100 * segments.len() as u64,
            content_type: Some("application/octet-stream".into()),
            created_at: Utc::now(),
            segment_size: 100,
            scheme,
            segments,
        }
    }
}
