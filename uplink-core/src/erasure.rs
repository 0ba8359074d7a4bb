//! Reed-Solomon Erasure Coding
//!
//! Implements systematic (k, n) erasure coding over GF(2^8) where:
//! - k `required` pieces are plain data shards
//! - n - k pieces are parity
//! - any k authentic pieces reconstruct the exact input
//!
//! Every piece carries the Blake3 hash of its payload. Decoding refuses to
//! touch a piece whose payload no longer matches its hash.

use crate::crypto::ContentHash;
use crate::error::{Result, UplinkError};
use crate::MAX_TOTAL_PIECES;
use bytes::Bytes;
use rayon::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

/// Redundancy parameters of a segment, fixed when the segment is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureScheme {
    /// Pieces needed to reconstruct (K)
    pub required: usize,
    /// Acknowledged pieces at which an upload is healthy (O)
    pub optimal: usize,
    /// Pieces produced per segment (N)
    pub total: usize,
}

impl Default for ErasureScheme {
    fn default() -> Self {
        Self {
            required: crate::DEFAULT_REQUIRED_PIECES,
            optimal: crate::DEFAULT_OPTIMAL_PIECES,
            total: crate::DEFAULT_TOTAL_PIECES,
        }
    }
}

impl ErasureScheme {
    /// Create a validated scheme
    pub fn new(required: usize, optimal: usize, total: usize) -> Result<Self> {
        let scheme = Self {
            required,
            optimal,
            total,
        };
        scheme.validate()?;
        Ok(scheme)
    }

    /// Scheme for development networks (4/6/10)
    pub fn dev() -> Self {
        Self {
            required: crate::DEV_REQUIRED_PIECES,
            optimal: crate::DEV_OPTIMAL_PIECES,
            total: crate::DEV_TOTAL_PIECES,
        }
    }

    /// Check K ≥ 1, K ≤ O ≤ N, K < N and N ≤ 255
    pub fn validate(&self) -> Result<()> {
        if self.required == 0 {
            return Err(UplinkError::InvalidScheme(
                "required pieces must be > 0".to_string(),
            ));
        }
        if self.required > self.optimal || self.optimal > self.total {
            return Err(UplinkError::InvalidScheme(format!(
                "expected required <= optimal <= total, got {}/{}/{}",
                self.required, self.optimal, self.total
            )));
        }
        if self.required == self.total {
            return Err(UplinkError::InvalidScheme(
                "at least one parity piece is required".to_string(),
            ));
        }
        if self.total > MAX_TOTAL_PIECES {
            return Err(UplinkError::InvalidScheme(format!(
                "total pieces {} exceeds {}",
                self.total, MAX_TOTAL_PIECES
            )));
        }
        Ok(())
    }

    /// Number of parity pieces
    pub fn parity(&self) -> usize {
        self.total - self.required
    }
}

/// One erasure-coded fragment of a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    /// Piece number (0 to total-1); stable for the segment's lifetime
    pub number: u16,
    /// Piece payload
    pub data: Bytes,
    /// Hash the payload is expected to have
    pub hash: ContentHash,
}

impl Piece {
    /// Create a piece, hashing its payload
    pub fn new(number: u16, data: Bytes) -> Self {
        let hash = ContentHash::compute(&data);
        Self { number, data, hash }
    }

    /// Pair a fetched payload with the hash recorded at upload time
    pub fn with_expected_hash(number: u16, data: Bytes, hash: ContentHash) -> Self {
        Self { number, data, hash }
    }

    /// Whether the payload still matches its hash
    pub fn verify(&self) -> bool {
        self.hash.verify(&self.data)
    }

    /// Payload size
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Reed-Solomon encoder/decoder for one scheme
pub struct ErasureCodec {
    scheme: ErasureScheme,
    encoder: ReedSolomon,
}

impl ErasureCodec {
    /// Create a codec for `scheme`
    pub fn new(scheme: ErasureScheme) -> Result<Self> {
        scheme.validate()?;
        let encoder = ReedSolomon::new(scheme.required, scheme.parity())?;
        Ok(Self { scheme, encoder })
    }

    /// Get the erasure scheme
    pub fn scheme(&self) -> &ErasureScheme {
        &self.scheme
    }

    /// Size of every piece produced for an input of `data_len` bytes
    pub fn piece_size(&self, data_len: usize) -> usize {
        // Empty input still needs one byte per shard
        data_len.div_ceil(self.scheme.required).max(1)
    }

    /// Encode data into `total` pieces, deterministically
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Piece>> {
        let piece_size = self.piece_size(data.len());

        // Pad data to be evenly divisible by required
        let mut padded = data.to_vec();
        padded.resize(piece_size * self.scheme.required, 0);

        let mut shards: Vec<Vec<u8>> = padded.chunks(piece_size).map(|c| c.to_vec()).collect();
        shards.resize(self.scheme.total, vec![0u8; piece_size]);

        self.encoder.encode(&mut shards)?;

        // Hashing dominates for large segments
        let pieces = shards
            .into_par_iter()
            .enumerate()
            .map(|(i, shard)| Piece::new(i as u16, Bytes::from(shard)))
            .collect();

        Ok(pieces)
    }

    /// Reconstruct the original `original_size` bytes from any `required`
    /// authentic pieces.
    ///
    /// Fails with `InsufficientShares` below the threshold and with
    /// `CorruptShare` if any supplied piece does not match its hash.
    pub fn decode(&self, pieces: &[Piece], original_size: usize) -> Result<Bytes> {
        let total = self.scheme.total;
        let required = self.scheme.required;

        if pieces.len() < required {
            return Err(UplinkError::InsufficientShares {
                available: pieces.len(),
                required,
            });
        }

        let piece_size = pieces[0].size();
        if original_size > piece_size * required {
            return Err(UplinkError::ErasureCoding(format!(
                "original size {} exceeds capacity of {} pieces of {} bytes",
                original_size, required, piece_size
            )));
        }

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total];
        for piece in pieces {
            let index = piece.number as usize;
            if index >= total {
                return Err(UplinkError::ErasureCoding(format!(
                    "piece number {} out of range (total {})",
                    index, total
                )));
            }
            if slots[index].is_some() {
                return Err(UplinkError::ErasureCoding(format!(
                    "duplicate piece number {}",
                    index
                )));
            }
            if piece.size() != piece_size {
                return Err(UplinkError::ErasureCoding(format!(
                    "piece size mismatch: expected {}, got {}",
                    piece_size,
                    piece.size()
                )));
            }
            if !piece.verify() {
                return Err(UplinkError::CorruptShare {
                    piece: piece.number,
                });
            }
            slots[index] = Some(piece.data.to_vec());
        }

        self.encoder.reconstruct_data(&mut slots)?;

        let mut result = Vec::with_capacity(piece_size * required);
        for slot in slots.iter().take(required) {
            match slot {
                Some(shard) => result.extend_from_slice(shard),
                None => return Err(UplinkError::Internal("Reconstruction failed".to_string())),
            }
        }

        result.truncate(original_size);
        Ok(Bytes::from(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::subsequence;

    fn codec(k: usize, o: usize, n: usize) -> ErasureCodec {
        ErasureCodec::new(ErasureScheme::new(k, o, n).unwrap()).unwrap()
    }

    #[test]
    fn test_scheme_defaults() {
        let scheme = ErasureScheme::default();
        assert_eq!(scheme.required, 29);
        assert_eq!(scheme.optimal, 80);
        assert_eq!(scheme.total, 110);
        assert_eq!(scheme.parity(), 81);
        assert!(scheme.validate().is_ok());
    }

    #[test]
    fn test_scheme_validation() {
        assert!(ErasureScheme::new(0, 1, 2).is_err());
        assert!(ErasureScheme::new(4, 3, 10).is_err());
        assert!(ErasureScheme::new(4, 11, 10).is_err());
        assert!(ErasureScheme::new(4, 4, 4).is_err());
        assert!(ErasureScheme::new(100, 200, 300).is_err());
        assert!(ErasureScheme::new(4, 4, 5).is_ok());
        assert!(ErasureScheme::new(4, 6, 10).is_ok());
    }

    #[test]
    fn test_encode_decode_simple() {
        let codec = codec(4, 6, 10);
        let original = b"Hello, decentralized storage!";

        let pieces = codec.encode(original).unwrap();
        assert_eq!(pieces.len(), 10);

        let decoded = codec.decode(&pieces, original.len()).unwrap();
        assert_eq!(decoded.as_ref(), original);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let codec = codec(4, 6, 10);
        let data = vec![42u8; 10_000];
        assert_eq!(codec.encode(&data).unwrap(), codec.encode(&data).unwrap());
    }

    #[test]
    fn test_systematic_layout() {
        let codec = codec(4, 6, 10);
        let data: Vec<u8> = (0..16u8).collect();
        let pieces = codec.encode(&data).unwrap();

        // First K pieces are the plain data shards
        assert_eq!(pieces[0].data.as_ref(), &data[0..4]);
        assert_eq!(pieces[3].data.as_ref(), &data[12..16]);
        for (i, piece) in pieces.iter().enumerate() {
            assert_eq!(piece.number as usize, i);
        }
    }

    #[test]
    fn test_decode_with_only_parity() {
        let codec = codec(4, 6, 10);
        let original = vec![7u8; 1024 * 64];
        let pieces = codec.encode(&original).unwrap();

        let parity_only: Vec<Piece> = pieces.into_iter().skip(6).collect();
        assert_eq!(parity_only.len(), 4);
        let decoded = codec.decode(&parity_only, original.len()).unwrap();
        assert_eq!(decoded.as_ref(), original.as_slice());
    }

    #[test]
    fn test_empty_input() {
        let codec = codec(4, 6, 10);
        let pieces = codec.encode(b"").unwrap();
        assert_eq!(pieces.len(), 10);
        assert!(pieces.iter().all(|p| p.size() == 1));

        let decoded = codec.decode(&pieces[3..7], 0).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_too_few_pieces() {
        let codec = codec(4, 6, 10);
        let pieces = codec.encode(b"test data").unwrap();

        let result = codec.decode(&pieces[..3], 9);
        assert!(matches!(
            result,
            Err(UplinkError::InsufficientShares {
                available: 3,
                required: 4
            })
        ));
    }

    #[test]
    fn test_corrupt_piece_rejected() {
        let codec = codec(4, 6, 10);
        let original = b"corruption must never reach the output";
        let mut pieces = codec.encode(original).unwrap();

        let mut data = pieces[2].data.to_vec();
        data[0] ^= 0xFF;
        pieces[2].data = Bytes::from(data);

        let result = codec.decode(&pieces[..4], original.len());
        assert!(matches!(result, Err(UplinkError::CorruptShare { piece: 2 })));
    }

    #[test]
    fn test_duplicate_piece_numbers_rejected() {
        let codec = codec(4, 6, 10);
        let pieces = codec.encode(b"dup").unwrap();
        let dup = vec![
            pieces[0].clone(),
            pieces[0].clone(),
            pieces[1].clone(),
            pieces[2].clone(),
        ];
        assert!(matches!(
            codec.decode(&dup, 3),
            Err(UplinkError::ErasureCoding(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_any_k_subset_roundtrips(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            keep in subsequence((0..10usize).collect::<Vec<_>>(), 4),
        ) {
            let codec = codec(4, 6, 10);
            let pieces = codec.encode(&data).unwrap();
            let subset: Vec<Piece> = keep.iter().map(|&i| pieces[i].clone()).collect();
            let decoded = codec.decode(&subset, data.len()).unwrap();
            prop_assert_eq!(decoded.as_ref(), data.as_slice());
        }

        #[test]
        fn prop_below_threshold_fails(
            data in proptest::collection::vec(any::<u8>(), 1..2048),
            keep in subsequence((0..10usize).collect::<Vec<_>>(), 0..4),
        ) {
            let codec = codec(4, 6, 10);
            let pieces = codec.encode(&data).unwrap();
            let subset: Vec<Piece> = keep.iter().map(|&i| pieces[i].clone()).collect();
            let is_insufficient = matches!(
                codec.decode(&subset, data.len()),
                Err(UplinkError::InsufficientShares { .. })
            );
            prop_assert!(is_insufficient);
        }

        #[test]
        fn prop_tampered_piece_never_decodes_silently(
            data in proptest::collection::vec(any::<u8>(), 1..2048),
            victim in 0..4usize,
            offset in any::<usize>(),
            flip in 1..=255u8,
        ) {
            let codec = codec(4, 6, 10);
            let mut pieces = codec.encode(&data).unwrap();
            let mut payload = pieces[victim].data.to_vec();
            let at = offset % payload.len();
            payload[at] ^= flip;
            pieces[victim].data = Bytes::from(payload);

            let is_corrupt = matches!(
                codec.decode(&pieces[..4], data.len()),
                Err(UplinkError::CorruptShare { .. })
            );
            prop_assert!(is_corrupt);
        }
    }
}
