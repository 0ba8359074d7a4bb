//! Uplink client
//!
//! The public entry point: bucket management plus object upload, download,
//! stat, delete and listing on top of the object pipeline.

use crate::config::UplinkConfig;
use crate::orchestrator::SegmentOrchestrator;
use crate::pipeline::{segment_reader, ObjectPipeline, UploadOptions};
use crate::repair::{RepairReport, RepairService};
use crate::reputation::AtomicReputation;
use crate::selector::{NodeSelector, SelectorConfig};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uplink_core::{split_into_segments, ErasureCodec, Result, RootKey, UplinkError};
use uplink_metadata::{BucketInfo, MetadataClient, NodeDirectory, ObjectInfo, ObjectPage};
use uplink_network::{PieceTransferClient, PieceTransport};

/// Where a listing starts and how many objects each request fetches
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Resume after this path, e.g. the last path a previous listing returned
    pub cursor: Option<String>,
    /// Objects per metadata request; the configured default when `None`
    pub page_size: Option<usize>,
}

impl ListOptions {
    pub fn after(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Client for a decentralized object store
pub struct Uplink {
    config: UplinkConfig,
    metadata: Arc<dyn MetadataClient>,
    pipeline: ObjectPipeline,
    repair: Arc<RepairService>,
    reputation: Arc<AtomicReputation>,
}

impl Uplink {
    /// Build a client from its configuration and external services
    pub fn new(
        config: UplinkConfig,
        root_key: RootKey,
        metadata: Arc<dyn MetadataClient>,
        directory: Arc<dyn NodeDirectory>,
        transport: Arc<dyn PieceTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let codec = Arc::new(ErasureCodec::new(config.erasure.scheme())?);
        let reputation =
            Arc::new(AtomicReputation::default().with_window(config.selection.reputation_window));
        let selector = Arc::new(NodeSelector::new(
            SelectorConfig {
                diversity: config.selection.diversity,
                max_unreliable_fraction: config.selection.max_unreliable_fraction,
                unreliable_below: config.selection.unreliable_below,
            },
            reputation.clone(),
            config.selection.seed,
        ));
        let transfer = PieceTransferClient::new(transport, config.transfer.to_transfer_config());

        let orchestrator = Arc::new(SegmentOrchestrator::new(
            codec,
            transfer,
            selector,
            directory,
            reputation.clone(),
        ));
        let repair = Arc::new(RepairService::new(orchestrator.clone(), metadata.clone()));
        let pipeline = ObjectPipeline::new(
            orchestrator,
            metadata.clone(),
            repair.clone(),
            root_key,
            config.pipeline.clone(),
            config.segment.size,
        );

        info!(
            scheme = ?config.erasure.scheme(),
            segment_size = config.segment.size,
            "Uplink ready"
        );

        Ok(Self {
            config,
            metadata,
            pipeline,
            repair,
            reputation,
        })
    }

    pub fn config(&self) -> &UplinkConfig {
        &self.config
    }

    /// Reputation observed for storage nodes by this client
    pub fn reputation(&self) -> &Arc<AtomicReputation> {
        &self.reputation
    }

    /// Subscribe to reports of background segment repairs
    pub fn repair_events(&self) -> broadcast::Receiver<RepairReport> {
        self.repair.subscribe()
    }

    /// Stop background repairs and piece cleanup
    pub fn close(&self) {
        self.pipeline.background().cancel();
    }

    // ===== Buckets =====

    pub async fn create_bucket(&self, name: &str) -> Result<BucketInfo> {
        Ok(self.metadata.create_bucket(name).await?)
    }

    pub async fn stat_bucket(&self, name: &str) -> Result<BucketInfo> {
        Ok(self.metadata.get_bucket(name).await?)
    }

    /// Delete a bucket; fails while it still holds objects
    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        Ok(self.metadata.delete_bucket(name).await?)
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        Ok(self.metadata.list_buckets().await?)
    }

    // ===== Upload =====

    /// Upload everything `reader` yields as `bucket`/`path`
    pub async fn upload_object<R>(
        &self,
        bucket: &str,
        path: &str,
        reader: R,
        options: UploadOptions,
    ) -> Result<ObjectInfo>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.upload_object_with_cancel(bucket, path, reader, options, &CancellationToken::new())
            .await
    }

    /// [`Uplink::upload_object`] that stops when `cancel` fires.
    ///
    /// A cancelled upload never publishes a manifest. Pieces of segments
    /// that had already committed stay on their nodes until garbage
    /// collection.
    #[instrument(skip(self, reader, options, cancel))]
    pub async fn upload_object_with_cancel<R>(
        &self,
        bucket: &str,
        path: &str,
        reader: R,
        options: UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<ObjectInfo>
    where
        R: AsyncRead + Unpin + Send,
    {
        let segments = segment_reader(reader, self.config.segment.size);
        self.pipeline
            .upload(bucket, path, segments, options, cancel)
            .await
    }

    /// Upload an in-memory object
    pub async fn upload_bytes(
        &self,
        bucket: &str,
        path: &str,
        data: impl Into<Bytes>,
        options: UploadOptions,
    ) -> Result<ObjectInfo> {
        let segments = split_into_segments(&data.into(), self.config.segment.size)?;
        self.pipeline
            .upload(
                bucket,
                path,
                stream::iter(segments.into_iter().map(Ok)),
                options,
                &CancellationToken::new(),
            )
            .await
    }

    /// Upload a local file
    pub async fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        source: impl AsRef<Path>,
        options: UploadOptions,
    ) -> Result<ObjectInfo> {
        let file = tokio::fs::File::open(source).await?;
        self.upload_object(bucket, path, file, options).await
    }

    // ===== Download =====

    /// Stream an object's bytes in order.
    ///
    /// Missing objects fail here; piece and decryption failures surface as
    /// the stream's last item.
    pub async fn download_object(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        self.download_object_with_cancel(bucket, path, CancellationToken::new())
            .await
    }

    #[instrument(skip(self, cancel))]
    pub async fn download_object_with_cancel(
        &self,
        bucket: &str,
        path: &str,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let manifest = self.pipeline.manifest(bucket, path).await?;
        Ok(self.pipeline.download(manifest, cancel))
    }

    /// Download a whole object into memory
    pub async fn download_object_bytes(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let manifest = self.pipeline.manifest(bucket, path).await?;
        let mut out = BytesMut::with_capacity(manifest.size as usize);
        let mut chunks = self.pipeline.download(manifest, CancellationToken::new());
        while let Some(chunk) = chunks.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }

    /// Download an object into a local file, returning the bytes written
    pub async fn download_to_file(
        &self,
        bucket: &str,
        path: &str,
        dest: impl AsRef<Path>,
    ) -> Result<u64> {
        let mut chunks = self.download_object(bucket, path).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    // ===== Metadata =====

    pub async fn stat_object(&self, bucket: &str, path: &str) -> Result<ObjectInfo> {
        Ok(self.pipeline.manifest(bucket, path).await?.info())
    }

    /// Delete an object. It disappears as soon as this returns; its pieces
    /// are removed in the background.
    pub async fn delete_object(&self, bucket: &str, path: &str) -> Result<()> {
        self.pipeline.delete(bucket, path).await?;
        Ok(())
    }

    /// Fetch one page of objects under `prefix`
    pub async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        options: &ListOptions,
    ) -> Result<ObjectPage> {
        let limit = options
            .page_size
            .unwrap_or(self.config.pipeline.list_page_size)
            .max(1);
        Ok(self
            .metadata
            .list_objects(bucket, prefix, options.cursor.as_deref(), limit)
            .await?)
    }

    /// Lazily list every object under `prefix` in path order.
    ///
    /// Pages are fetched as the stream is polled. To resume an interrupted
    /// listing, pass the last returned path as [`ListOptions::cursor`].
    pub fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> BoxStream<'static, Result<ObjectInfo>> {
        let metadata = self.metadata.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let limit = options
            .page_size
            .unwrap_or(self.config.pipeline.list_page_size)
            .max(1);

        // None once the last page has been fetched
        let start = Some(options.cursor);
        stream::try_unfold(start, move |cursor| {
            let metadata = metadata.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move {
                let Some(cursor) = cursor else {
                    return Ok::<_, UplinkError>(None);
                };
                let page = metadata
                    .list_objects(&bucket, &prefix, cursor.as_deref(), limit)
                    .await?;
                let next = page.next_cursor.map(Some);
                Ok(Some((page.objects, next)))
            }
        })
        .map_ok(|objects| stream::iter(objects.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}
