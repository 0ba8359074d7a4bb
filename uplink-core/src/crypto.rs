//! Segment cryptography
//!
//! Every segment is encrypted with its own AES-256-GCM key before it is
//! erasure coded, so storage nodes only ever hold fragments of ciphertext.
//! Segment keys come from the project's root key through a Blake3 keyed
//! hash; pieces are checked against Blake3 content hashes.

use crate::error::{Result, UplinkError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
/// GCM tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Domain separation for segment key derivation
const SEGMENT_KEY_CONTEXT: &[u8] = b"uplink segment key v1";

/// Blake3 digest of a piece
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash `data`, spreading inputs of `PARALLEL_HASH_THRESHOLD` bytes or
    /// more across the rayon pool
    pub fn compute(data: &[u8]) -> Self {
        Self(*digest(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Check `data` against this hash in constant time
    pub fn verify(&self, data: &[u8]) -> bool {
        digest(data) == blake3::Hash::from(self.0)
    }
}

/// Below this size rayon's fork overhead outweighs the gain
pub const PARALLEL_HASH_THRESHOLD: usize = 1024 * 1024;

fn digest(data: &[u8]) -> blake3::Hash {
    if data.len() < PARALLEL_HASH_THRESHOLD {
        return blake3::hash(data);
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update_rayon(data);
    hasher.finalize()
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({}…)", &hex[..12])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 32-byte secret that prints redacted and is wiped on drop
macro_rules! secret_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.0.fill(0);
            }
        }
    };
}

secret_key! {
    /// Root encryption key of a project; never leaves the client
    RootKey
}

secret_key! {
    /// Key for exactly one segment of one object path
    SegmentKey
}

impl RootKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&Aes256Gcm::generate_key(&mut OsRng));
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] =
            slice
                .try_into()
                .map_err(|_| UplinkError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Stretch a passphrase into a root key with Argon2id.
    ///
    /// `salt` must be at least 8 bytes.
    pub fn from_passphrase(passphrase: &[u8], salt: &[u8]) -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        argon2::Argon2::default()
            .hash_password_into(passphrase, salt, &mut key)
            .map_err(|e| UplinkError::Encryption(format!("key stretching failed: {}", e)))?;
        Ok(Self(key))
    }
}

/// Derive the key for segment `segment_index` of `bucket`/`path`.
///
/// Bucket and path are length-prefixed so that no two distinct
/// (bucket, path, index) triples share an input to the keyed hash.
pub fn derive_key(root: &RootKey, bucket: &str, path: &str, segment_index: u32) -> SegmentKey {
    let mut hasher = blake3::Hasher::new_keyed(root.as_bytes());
    hasher.update(SEGMENT_KEY_CONTEXT);
    hasher.update(&(bucket.len() as u64).to_le_bytes());
    hasher.update(bucket.as_bytes());
    hasher.update(&(path.len() as u64).to_le_bytes());
    hasher.update(path.as_bytes());
    hasher.update(&segment_index.to_le_bytes());
    SegmentKey(*hasher.finalize().as_bytes())
}

/// Output of [`encrypt_segment`]. The nonce is recorded in the segment
/// descriptor; only the ciphertext is erasure coded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSegment {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext followed by the GCM tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedSegment {
    /// Bytes added to every plaintext
    pub const OVERHEAD: usize = TAG_SIZE;

    pub fn len(&self) -> usize {
        self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

fn cipher(key: &SegmentKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt a plaintext segment under a fresh random nonce
pub fn encrypt_segment(plaintext: &[u8], key: &SegmentKey) -> Result<EncryptedSegment> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher(key)
        .encrypt(&nonce, plaintext)
        .map_err(|e| UplinkError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&nonce);
    Ok(EncryptedSegment {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a segment; any tampering surfaces as `AuthenticationFailed`
pub fn decrypt_segment(encrypted: &EncryptedSegment, key: &SegmentKey) -> Result<Vec<u8>> {
    if encrypted.ciphertext.len() < TAG_SIZE {
        return Err(UplinkError::AuthenticationFailed);
    }

    cipher(key)
        .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_slice())
        .map_err(|_| UplinkError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_piece_hash_verification() {
        let piece = vec![0xA5u8; 4096];
        let hash = ContentHash::compute(&piece);
        assert!(hash.verify(&piece));

        let mut flipped = piece.clone();
        flipped[4095] ^= 1;
        assert!(!hash.verify(&flipped));
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn test_large_input_hash_matches_serial_digest() {
        let data: Vec<u8> = (0..3 * PARALLEL_HASH_THRESHOLD).map(|i| (i % 253) as u8).collect();
        let hash = ContentHash::compute(&data);
        assert_eq!(hash.as_bytes(), blake3::hash(&data).as_bytes());
        assert!(hash.verify(&data));
    }

    #[test]
    fn test_content_hash_bincode_is_fixed_width() {
        let hash = ContentHash::compute(b"piece");
        let encoded = bincode::serialize(&hash).unwrap();
        assert_eq!(encoded.len(), 32);
        assert_eq!(bincode::deserialize::<ContentHash>(&encoded).unwrap(), hash);
    }

    #[test]
    fn test_keys_are_redacted() {
        let root = RootKey::from_bytes([9u8; KEY_SIZE]);
        assert_eq!(format!("{:?}", root), "RootKey(<redacted>)");
        let segment = derive_key(&root, "b", "p", 0);
        assert_eq!(format!("{:?}", segment), "SegmentKey(<redacted>)");
    }

    #[test]
    fn test_derive_key_deterministic() {
        let root = RootKey::from_bytes([7u8; KEY_SIZE]);
        let a = derive_key(&root, "photos", "2024/cat.jpg", 0);
        let b = derive_key(&root, "photos", "2024/cat.jpg", 0);
        assert_eq!(a, b);
        assert_ne!(a, derive_key(&root, "photos", "2024/cat.jpg", 1));
    }

    #[test]
    fn test_derive_key_depends_on_root() {
        let a = derive_key(&RootKey::from_bytes([1u8; KEY_SIZE]), "b", "p", 0);
        let b = derive_key(&RootKey::from_bytes([2u8; KEY_SIZE]), "b", "p", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_key_no_collisions_across_paths() {
        let root = RootKey::generate();
        let mut seen = HashSet::new();
        for i in 0..2_000 {
            let path = format!("dir/{}/object-{}", i % 37, i);
            let key = derive_key(&root, "bucket", &path, 3);
            assert!(seen.insert(*key.as_bytes()), "collision for {}", path);
        }
    }

    #[test]
    fn test_derive_key_bucket_path_boundary() {
        // Moving bytes between bucket and path must change the key
        let root = RootKey::generate();
        let a = derive_key(&root, "ab", "c", 0);
        let b = derive_key(&root, "a", "bc", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_segment_encrypt_decrypt() {
        let key = derive_key(&RootKey::generate(), "b", "p", 0);
        let segment = vec![3u8; 10_000];

        let sealed = encrypt_segment(&segment, &key).unwrap();
        assert_eq!(sealed.len(), segment.len() + EncryptedSegment::OVERHEAD);
        assert_ne!(&sealed.ciphertext[..segment.len()], &segment[..]);
        assert_eq!(decrypt_segment(&sealed, &key).unwrap(), segment);

        // Fresh nonce per call
        assert_ne!(encrypt_segment(&segment, &key).unwrap().nonce, sealed.nonce);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = derive_key(&RootKey::generate(), "b", "empty", 0);
        let encrypted = encrypt_segment(b"", &key).unwrap();
        assert_eq!(encrypted.len(), TAG_SIZE);
        assert!(decrypt_segment(&encrypted, &key).unwrap().is_empty());
    }

    #[test]
    fn test_segment_key_is_not_interchangeable() {
        let root = RootKey::generate();
        let sealed = encrypt_segment(b"segment zero", &derive_key(&root, "b", "p", 0)).unwrap();
        assert!(matches!(
            decrypt_segment(&sealed, &derive_key(&root, "b", "p", 1)),
            Err(UplinkError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_flipped_tag_bit_is_detected() {
        let key = derive_key(&RootKey::generate(), "b", "p", 0);
        let mut sealed = encrypt_segment(b"segment", &key).unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0x01;
        assert!(matches!(
            decrypt_segment(&sealed, &key),
            Err(UplinkError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = derive_key(&RootKey::generate(), "b", "p", 0);
        let mut encrypted = encrypt_segment(b"secret", &key).unwrap();
        encrypted.ciphertext.truncate(4);
        assert!(matches!(
            decrypt_segment(&encrypted, &key),
            Err(UplinkError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_root_key_from_passphrase() {
        let salt = b"project-salt-0001";
        let a = RootKey::from_passphrase(b"correct horse", salt).unwrap();
        assert_eq!(a, RootKey::from_passphrase(b"correct horse", salt).unwrap());
        assert_ne!(a, RootKey::from_passphrase(b"battery staple", salt).unwrap());
        assert_ne!(a, RootKey::from_passphrase(b"correct horse", b"other-salt").unwrap());

        assert!(RootKey::from_passphrase(b"pw", b"short").is_err());
    }

    #[test]
    fn test_root_key_from_slice_validates_length() {
        assert!(matches!(
            RootKey::from_slice(&[0u8; 16]),
            Err(UplinkError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }
}
