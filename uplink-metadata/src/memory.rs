//! In-memory metadata store
//!
//! Used for testing and development. Not persistent. Manifests are stored
//! in their serialized form, as a remote store would hold them.

use crate::models::{BucketInfo, ObjectManifest, ObjectPage, SegmentDescriptor};
use crate::{MetadataClient, MetadataError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use uplink_core::StreamId;

struct BucketState {
    info: BucketInfo,
    objects: BTreeMap<String, Vec<u8>>,
}

/// In-memory metadata store
pub struct MemoryMetadataStore {
    buckets: RwLock<BTreeMap<String, BucketState>>,

    /// Fail every manifest write while set
    fail_writes: AtomicBool,

    /// Successful manifest writes (puts and segment updates)
    manifest_writes: AtomicU64,
}

impl MemoryMetadataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            fail_writes: AtomicBool::new(false),
            manifest_writes: AtomicU64::new(0),
        }
    }

    /// Make manifest writes fail until cleared
    pub fn fail_manifest_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Count of successful manifest writes
    pub fn manifest_writes(&self) -> u64 {
        self.manifest_writes.load(Ordering::SeqCst)
    }

    /// Number of objects in a bucket
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable("manifest writes disabled".into()));
        }
        Ok(())
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn object_not_found(bucket: &str, path: &str) -> MetadataError {
    MetadataError::ObjectNotFound {
        bucket: bucket.to_string(),
        path: path.to_string(),
    }
}

#[async_trait]
impl MetadataClient for MemoryMetadataStore {
    async fn create_bucket(&self, name: &str) -> Result<BucketInfo> {
        if name.is_empty() {
            return Err(MetadataError::Invalid("bucket name is empty".into()));
        }
        let mut buckets = self.buckets.write();
        if buckets.contains_key(name) {
            return Err(MetadataError::BucketExists(name.to_string()));
        }
        let info = BucketInfo::new(name);
        buckets.insert(
            name.to_string(),
            BucketState {
                info: info.clone(),
                objects: BTreeMap::new(),
            },
        );
        debug!(bucket = name, "Bucket created");
        Ok(info)
    }

    async fn get_bucket(&self, name: &str) -> Result<BucketInfo> {
        self.buckets
            .read()
            .get(name)
            .map(|b| b.info.clone())
            .ok_or_else(|| MetadataError::BucketNotFound(name.to_string()))
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        let empty = buckets
            .get(name)
            .map(|b| b.objects.is_empty())
            .ok_or_else(|| MetadataError::BucketNotFound(name.to_string()))?;
        if !empty {
            return Err(MetadataError::BucketNotEmpty(name.to_string()));
        }
        buckets.remove(name);
        debug!(bucket = name, "Bucket deleted");
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        Ok(self.buckets.read().values().map(|b| b.info.clone()).collect())
    }

    async fn put_object_manifest(
        &self,
        bucket: &str,
        path: &str,
        manifest: &ObjectManifest,
    ) -> Result<()> {
        self.check_writable()?;
        if manifest.bucket != bucket || manifest.path != path {
            return Err(MetadataError::Invalid(format!(
                "manifest for {}/{} written to {}/{}",
                manifest.bucket, manifest.path, bucket, path
            )));
        }
        manifest.validate()?;
        let encoded = manifest.to_bytes()?;

        let mut buckets = self.buckets.write();
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetadataError::BucketNotFound(bucket.to_string()))?;
        state.objects.insert(path.to_string(), encoded);
        self.manifest_writes.fetch_add(1, Ordering::SeqCst);

        debug!(bucket, path, stream = %manifest.stream_id, "Manifest stored");
        Ok(())
    }

    async fn get_object_manifest(&self, bucket: &str, path: &str) -> Result<ObjectManifest> {
        let buckets = self.buckets.read();
        let state = buckets
            .get(bucket)
            .ok_or_else(|| MetadataError::BucketNotFound(bucket.to_string()))?;
        let encoded = state
            .objects
            .get(path)
            .ok_or_else(|| object_not_found(bucket, path))?;
        ObjectManifest::from_bytes(encoded)
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> Result<ObjectManifest> {
        let mut buckets = self.buckets.write();
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetadataError::BucketNotFound(bucket.to_string()))?;
        let encoded = state
            .objects
            .remove(path)
            .ok_or_else(|| object_not_found(bucket, path))?;
        ObjectManifest::from_bytes(&encoded)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ObjectPage> {
        let limit = limit.max(1);
        let buckets = self.buckets.read();
        let state = buckets
            .get(bucket)
            .ok_or_else(|| MetadataError::BucketNotFound(bucket.to_string()))?;

        let start = match cursor {
            Some(c) if c >= prefix => Bound::Excluded(c.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };

        let mut objects = Vec::with_capacity(limit);
        let mut more = false;
        for (_, encoded) in state
            .objects
            .range((start, Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(prefix))
        {
            if objects.len() == limit {
                more = true;
                break;
            }
            objects.push(ObjectManifest::from_bytes(encoded)?.info());
        }

        let next_cursor = if more {
            objects.last().map(|o| o.path.clone())
        } else {
            None
        };
        Ok(ObjectPage {
            objects,
            next_cursor,
        })
    }

    async fn update_segment(
        &self,
        bucket: &str,
        path: &str,
        stream_id: StreamId,
        segment: SegmentDescriptor,
    ) -> Result<()> {
        self.check_writable()?;

        let mut buckets = self.buckets.write();
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetadataError::BucketNotFound(bucket.to_string()))?;
        let encoded = state
            .objects
            .get_mut(path)
            .ok_or_else(|| object_not_found(bucket, path))?;

        let mut manifest = ObjectManifest::from_bytes(encoded)?;
        if manifest.stream_id != stream_id {
            return Err(MetadataError::Conflict(format!(
                "{}/{} was overwritten (stream {} replaced by {})",
                bucket, path, stream_id, manifest.stream_id
            )));
        }

        let index = segment.index;
        let slot = manifest
            .segments
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| MetadataError::Invalid(format!("no segment {} in {}/{}", index, bucket, path)))?;
        if slot.encrypted_size != segment.encrypted_size || slot.nonce != segment.nonce {
            return Err(MetadataError::Invalid(format!(
                "segment {} update changes its content",
                index
            )));
        }
        segment.validate(&manifest.scheme)?;
        *slot = segment;

        *encoded = manifest.to_bytes()?;
        self.manifest_writes.fetch_add(1, Ordering::SeqCst);
        debug!(bucket, path, segment = index, "Segment updated");
        Ok(())
    }
}
