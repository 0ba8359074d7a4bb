//! Uplink Metadata
//!
//! The uplink's view of the two external services it depends on:
//!
//! - **`MetadataClient`**: bucket and object-manifest CRUD. Writing a
//!   manifest is the single point at which an object becomes visible.
//! - **`NodeDirectory`**: the source of candidate storage nodes.
//!
//! In-memory implementations of both are provided for tests and local
//! development.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────┐
//! │  Object Pipeline │        │  Node Selector   │
//! └────────┬─────────┘        └────────┬─────────┘
//!          │ dyn MetadataClient        │ dyn NodeDirectory
//!          ▼                           ▼
//! ┌──────────────────┐        ┌──────────────────────┐
//! │ MemoryMetadata-  │        │ StaticNodeDirectory  │
//! │ Store            │        │                      │
//! └──────────────────┘        └──────────────────────┘
//! ```

pub mod directory;
pub mod memory;
pub mod models;

pub use directory::{NodeDirectory, NodeFilter, StaticNodeDirectory};
pub use memory::MemoryMetadataStore;
pub use models::*;

use async_trait::async_trait;
use thiserror::Error;
use uplink_core::{StreamId, UplinkError};

/// Metadata service error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket already exists: {0}")]
    BucketExists(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Object not found: {bucket}/{path}")]
    ObjectNotFound { bucket: String, path: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Metadata service unavailable: {0}")]
    Unavailable(String),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MetadataError::BucketNotFound(_) | MetadataError::ObjectNotFound { .. }
        )
    }
}

impl From<MetadataError> for UplinkError {
    fn from(err: MetadataError) -> Self {
        match err {
            e if e.is_not_found() => UplinkError::NotFound(e.to_string()),
            MetadataError::Serialization(msg) => UplinkError::Serialization(msg),
            e => UplinkError::Metadata(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Bucket and object-manifest store
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Create a bucket
    async fn create_bucket(&self, name: &str) -> Result<BucketInfo>;

    /// Get a bucket
    async fn get_bucket(&self, name: &str) -> Result<BucketInfo>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, name: &str) -> Result<()>;

    /// List buckets ordered by name
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Publish a manifest, replacing any previous version at the same path
    async fn put_object_manifest(
        &self,
        bucket: &str,
        path: &str,
        manifest: &ObjectManifest,
    ) -> Result<()>;

    /// Fetch the current manifest at a path
    async fn get_object_manifest(&self, bucket: &str, path: &str) -> Result<ObjectManifest>;

    /// Remove an object, returning the manifest that was removed
    async fn delete_object(&self, bucket: &str, path: &str) -> Result<ObjectManifest>;

    /// One page of objects under `prefix`, ordered by path, starting after
    /// `cursor`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ObjectPage>;

    /// Replace one segment of an object, only if the object is still the
    /// version identified by `stream_id`
    async fn update_segment(
        &self,
        bucket: &str,
        path: &str,
        stream_id: StreamId,
        segment: SegmentDescriptor,
    ) -> Result<()>;
}
