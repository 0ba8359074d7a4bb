//! Error types for the uplink
//!
//! Every upload, download, list and delete call terminates with either a
//! value or exactly one of these errors.

use thiserror::Error;

/// Result type alias for uplink operations
pub type Result<T> = std::result::Result<T, UplinkError>;

/// Unified error type for the uplink
#[derive(Error, Debug, Clone)]
pub enum UplinkError {
    // ===== Erasure Coding Errors =====
    #[error("Insufficient shares: have {available}, need {required}")]
    InsufficientShares { available: usize, required: usize },

    #[error("Corrupt share: piece {piece} failed hash verification")]
    CorruptShare { piece: u16 },

    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Invalid erasure scheme: {0}")]
    InvalidScheme(String),

    // ===== Cryptography Errors =====
    #[error("Authentication failed: segment ciphertext was tampered with or the key is wrong")]
    AuthenticationFailed,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ===== Placement Errors =====
    #[error("Insufficient nodes: have {available} eligible, need {required}")]
    InsufficientNodes { available: usize, required: usize },

    // ===== Transfer Errors =====
    #[error("Transfer to {node} failed (retryable: {retryable}): {reason}")]
    TransferFailed {
        node: String,
        reason: String,
        retryable: bool,
    },

    #[error("Quorum not met: {achieved}/{required}")]
    QuorumNotMet { achieved: usize, required: usize },

    // ===== Metadata Errors =====
    #[error("Manifest write failed: {0}")]
    ManifestWriteFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    // ===== Control Flow =====
    #[error("Operation cancelled")]
    Cancelled,

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UplinkError {
    /// Build a transfer failure for `node`.
    pub fn transfer(node: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        UplinkError::TransferFailed {
            node: node.into(),
            reason: reason.into(),
            retryable,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UplinkError::TransferFailed {
                retryable: true,
                ..
            } | UplinkError::Io(_)
        )
    }

    /// Integrity failures are permanent for the piece instance that caused them.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            UplinkError::CorruptShare { .. } | UplinkError::AuthenticationFailed
        )
    }
}

impl From<reed_solomon_erasure::Error> for UplinkError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        UplinkError::ErasureCoding(err.to_string())
    }
}

impl From<bincode::Error> for UplinkError {
    fn from(err: bincode::Error) -> Self {
        UplinkError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for UplinkError {
    fn from(err: std::io::Error) -> Self {
        UplinkError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UplinkError::InsufficientShares {
            available: 3,
            required: 4,
        };
        assert_eq!(err.to_string(), "Insufficient shares: have 3, need 4");

        let err = UplinkError::QuorumNotMet {
            achieved: 3,
            required: 4,
        };
        assert_eq!(err.to_string(), "Quorum not met: 3/4");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: UplinkError = io_err.into();
        assert!(matches!(err, UplinkError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(UplinkError::transfer("n1", "timeout", true).is_retryable());
        assert!(!UplinkError::transfer("n1", "unauthorized", false).is_retryable());
        assert!(!UplinkError::AuthenticationFailed.is_retryable());
        assert!(!UplinkError::Cancelled.is_retryable());
    }

    #[test]
    fn test_integrity_failures() {
        assert!(UplinkError::CorruptShare { piece: 2 }.is_integrity_failure());
        assert!(UplinkError::AuthenticationFailed.is_integrity_failure());
        assert!(!UplinkError::transfer("n1", "timeout", true).is_integrity_failure());
    }
}
