//! Object pipeline
//!
//! Upload: split → encrypt → orchestrate segments → write the manifest.
//! Download: read the manifest → fetch segments → decrypt → stream bytes.
//!
//! Segments of one object upload concurrently and may commit in any order;
//! the manifest is written only after every segment has committed, so an
//! object is either fully visible or not visible at all.

use crate::config::PipelineSettings;
use crate::metrics::names;
use crate::orchestrator::SegmentOrchestrator;
use crate::repair::{RepairRequest, RepairService};
use bytes::Bytes;
use chrono::Utc;
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uplink_core::{
    decrypt_segment, derive_key, encrypt_segment, EncryptedSegment, NodeDescriptor, PieceId, Result,
    RootKey, SegmentData, StreamId, UplinkError,
};
use uplink_metadata::{MetadataClient, ObjectInfo, ObjectManifest, SegmentDescriptor};

/// Called with each segment index as it commits
pub type SegmentCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Per-upload options
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub on_segment_committed: Option<SegmentCallback>,
}

impl UploadOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn on_segment_committed(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_segment_committed = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("content_type", &self.content_type)
            .field("on_segment_committed", &self.on_segment_committed.is_some())
            .finish()
    }
}

struct ReaderState<R> {
    reader: R,
    index: u32,
    finished: bool,
}

/// Split a reader into numbered segments of `segment_size` bytes.
///
/// An empty reader yields a single empty segment.
pub fn segment_reader<R>(
    reader: R,
    segment_size: usize,
) -> impl Stream<Item = Result<SegmentData>> + Send
where
    R: AsyncRead + Unpin + Send,
{
    let state = ReaderState {
        reader,
        index: 0,
        finished: false,
    };
    stream::try_unfold(state, move |state| next_segment(state, segment_size))
}

async fn next_segment<R>(
    mut state: ReaderState<R>,
    segment_size: usize,
) -> Result<Option<(SegmentData, ReaderState<R>)>>
where
    R: AsyncRead + Unpin,
{
    if state.finished {
        return Ok(None);
    }

    let mut buf = vec![0u8; segment_size];
    let mut filled = 0;
    while filled < segment_size {
        let n = state.reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);

    if filled < segment_size {
        state.finished = true;
    }
    if filled == 0 && state.index > 0 {
        return Ok(None);
    }

    let segment = SegmentData::new(state.index, buf);
    state.index += 1;
    Ok(Some((segment, state)))
}

/// Encrypts, distributes and reassembles whole objects
#[derive(Clone)]
pub struct ObjectPipeline {
    orchestrator: Arc<SegmentOrchestrator>,
    metadata: Arc<dyn MetadataClient>,
    repair: Arc<RepairService>,
    root_key: Arc<RootKey>,
    settings: PipelineSettings,
    segment_size: usize,
    /// Parent of every background task (repairs, piece cleanup)
    background: CancellationToken,
}

impl ObjectPipeline {
    pub fn new(
        orchestrator: Arc<SegmentOrchestrator>,
        metadata: Arc<dyn MetadataClient>,
        repair: Arc<RepairService>,
        root_key: RootKey,
        settings: PipelineSettings,
        segment_size: usize,
    ) -> Self {
        Self {
            orchestrator,
            metadata,
            repair,
            root_key: Arc::new(root_key),
            settings,
            segment_size,
            background: CancellationToken::new(),
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Token cancelled when background work should stop
    pub fn background(&self) -> &CancellationToken {
        &self.background
    }

    /// Upload an object from a stream of segments.
    ///
    /// Fails without writing a manifest if any segment misses quorum or
    /// `cancel` fires before every segment has committed.
    #[instrument(skip(self, segments, options, cancel), fields(bucket = %bucket, path = %path))]
    pub async fn upload<S>(
        &self,
        bucket: &str,
        path: &str,
        segments: S,
        options: UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<ObjectInfo>
    where
        S: Stream<Item = Result<SegmentData>> + Send,
    {
        self.metadata.get_bucket(bucket).await?;

        let stream_id = StreamId::new();
        // Aborts sibling segments when one fails
        let abort = cancel.child_token();
        let concurrency = self.settings.max_concurrent_segments.max(1);

        let uploads = segments
            .map(|segment| {
                let abort = &abort;
                let options = &options;
                async move {
                    let segment = segment?;
                    let descriptor = self
                        .upload_segment(bucket, path, stream_id, segment, abort)
                        .await?;
                    if let Some(callback) = &options.on_segment_committed {
                        callback(descriptor.index);
                    }
                    Ok::<_, UplinkError>(descriptor)
                }
            })
            .buffer_unordered(concurrency);
        futures::pin_mut!(uploads);

        let mut committed: Vec<SegmentDescriptor> = Vec::new();
        while let Some(result) = uploads.next().await {
            match result {
                Ok(descriptor) => committed.push(descriptor),
                Err(e) => {
                    abort.cancel();
                    if cancel.is_cancelled() {
                        return Err(UplinkError::Cancelled);
                    }
                    warn!(error = %e, committed = committed.len(), "Upload aborted");
                    return Err(e);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(UplinkError::Cancelled);
        }

        committed.sort_by_key(|s| s.index);
        let manifest = ObjectManifest {
            bucket: bucket.to_string(),
            path: path.to_string(),
            stream_id,
            size: committed.iter().map(|s| s.plain_size).sum(),
            content_type: options.content_type.clone(),
            created_at: Utc::now(),
            segment_size: self.segment_size as u64,
            scheme: *self.orchestrator.scheme(),
            segments: committed,
        };
        manifest
            .validate()
            .map_err(|e| UplinkError::ManifestWriteFailed(e.to_string()))?;

        self.metadata
            .put_object_manifest(bucket, path, &manifest)
            .await
            .map_err(|e| UplinkError::ManifestWriteFailed(e.to_string()))?;

        counter!(names::OBJECTS_UPLOADED).increment(1);
        info!(
            stream = %stream_id,
            size = manifest.size,
            segments = manifest.segments.len(),
            "Object uploaded"
        );
        Ok(manifest.info())
    }

    async fn upload_segment(
        &self,
        bucket: &str,
        path: &str,
        stream_id: StreamId,
        segment: SegmentData,
        cancel: &CancellationToken,
    ) -> Result<SegmentDescriptor> {
        if cancel.is_cancelled() {
            return Err(UplinkError::Cancelled);
        }

        let index = segment.index;
        let plain_size = segment.size() as u64;
        let key = derive_key(&self.root_key, bucket, path, index);
        let encrypted = tokio::task::spawn_blocking(move || encrypt_segment(&segment.data, &key))
            .await
            .map_err(|e| UplinkError::Internal(format!("encrypt task failed: {}", e)))??;

        self.orchestrator
            .upload_segment(stream_id, index, plain_size, encrypted, cancel)
            .await
    }

    /// Fetch the current manifest of an object
    pub async fn manifest(&self, bucket: &str, path: &str) -> Result<ObjectManifest> {
        Ok(self.metadata.get_object_manifest(bucket, path).await?)
    }

    /// Stream an object's plaintext, one chunk per segment, in order.
    ///
    /// The stream ends after the first error.
    pub fn download(
        &self,
        manifest: ObjectManifest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<Bytes>> {
        let manifest = Arc::new(manifest);
        let concurrency = self.settings.max_concurrent_downloads.max(1);
        let pipeline = self.clone();
        let segments = manifest.segments.len();

        let chunks = stream::iter(0..segments)
            .map(move |position| {
                let pipeline = pipeline.clone();
                let manifest = manifest.clone();
                let cancel = cancel.clone();
                async move {
                    pipeline
                        .download_segment(&manifest, position, &cancel)
                        .await
                }
            })
            .buffered(concurrency)
            // (segments still expected, whether an error was already yielded)
            .scan((segments, false), |(remaining, failed), item| {
                if *failed {
                    return future::ready(None);
                }
                match &item {
                    Ok(_) => {
                        *remaining -= 1;
                        if *remaining == 0 {
                            counter!(names::OBJECTS_DOWNLOADED).increment(1);
                        }
                    }
                    Err(_) => *failed = true,
                }
                future::ready(Some(item))
            });

        chunks.boxed()
    }

    #[instrument(skip(self, manifest, cancel), fields(stream = %manifest.stream_id))]
    async fn download_segment(
        &self,
        manifest: &ObjectManifest,
        position: usize,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let segment = manifest.segments.get(position).ok_or_else(|| {
            UplinkError::Internal(format!("segment {} missing from manifest", position))
        })?;

        let fetched = self
            .orchestrator
            .download_segment(&manifest.scheme, segment, cancel)
            .await?;

        if self.settings.repair_on_read
            && RepairRequest::is_needed(&manifest.scheme, segment.pieces.len(), fetched.failed.len())
        {
            let request = RepairRequest {
                bucket: manifest.bucket.clone(),
                path: manifest.path.clone(),
                stream_id: manifest.stream_id,
                scheme: manifest.scheme,
                segment: segment.clone(),
                ciphertext: fetched.ciphertext.clone(),
                failed: fetched.failed.clone(),
            };
            if self
                .repair
                .spawn(request, self.background.child_token())
                .is_some()
            {
                debug!(
                    segment = segment.index,
                    failed = fetched.failed.len(),
                    corrupt = fetched.corrupt.len(),
                    "Repair scheduled"
                );
            }
        }

        let key = derive_key(&self.root_key, &manifest.bucket, &manifest.path, segment.index);
        let encrypted = EncryptedSegment {
            nonce: segment.nonce,
            ciphertext: fetched.ciphertext.to_vec(),
        };
        let plaintext = tokio::task::spawn_blocking(move || decrypt_segment(&encrypted, &key))
            .await
            .map_err(|e| UplinkError::Internal(format!("decrypt task failed: {}", e)))??;

        if plaintext.len() as u64 != segment.plain_size {
            return Err(UplinkError::Internal(format!(
                "segment {} decrypted to {} bytes, manifest records {}",
                segment.index,
                plaintext.len(),
                segment.plain_size
            )));
        }

        Ok(Bytes::from(plaintext))
    }

    /// Remove an object. The manifest delete is the commit point; piece
    /// deletion runs detached and is best-effort.
    #[instrument(skip(self), fields(bucket = %bucket, path = %path))]
    pub async fn delete(&self, bucket: &str, path: &str) -> Result<ObjectInfo> {
        let manifest = self.metadata.delete_object(bucket, path).await?;
        let info = manifest.info();

        let pieces: Vec<(NodeDescriptor, PieceId)> = manifest
            .segments
            .iter()
            .flat_map(|s| s.pieces.iter())
            .map(|p| (p.node.clone(), p.piece_id))
            .collect();
        let stream_id = manifest.stream_id;
        let transfer = self.orchestrator.transfer().clone();
        let cancel = self.background.child_token();

        tokio::spawn(async move {
            let total = pieces.len();
            let deletes = pieces.into_iter().map(move |(node, piece_id)| {
                let transfer = transfer.clone();
                let cancel = cancel.clone();
                async move {
                    match transfer.delete(&node, piece_id, &cancel).await {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(node = %node.id, piece = %piece_id, error = %e, "Piece delete failed");
                            false
                        }
                    }
                }
            });
            let failed = stream::iter(deletes)
                .buffer_unordered(16)
                .filter(|ok| future::ready(!*ok))
                .count()
                .await;
            if failed > 0 {
                warn!(
                    stream = %stream_id,
                    failed,
                    total,
                    "Some pieces were left for garbage collection"
                );
            }
        });

        Ok(info)
    }
}
