//! Repair on read
//!
//! When a download notices lost or corrupt pieces and the segment is at or
//! below its optimal redundancy, the reconstructed ciphertext is re-encoded
//! and the missing pieces are stored on fresh nodes. Repairs run in the
//! background; callers observe them through [`RepairService::subscribe`].

use crate::metrics::names;
use crate::orchestrator::SegmentOrchestrator;
use bytes::Bytes;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uplink_core::{ErasureScheme, NodeId, Piece, StreamId, UplinkError};
use uplink_metadata::{MetadataClient, MetadataError, SegmentDescriptor};

/// Capacity of the report channel; slow subscribers miss older reports
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// A segment that needs repair
#[derive(Debug, Clone)]
pub struct RepairRequest {
    pub bucket: String,
    pub path: String,
    pub stream_id: StreamId,
    pub scheme: ErasureScheme,
    pub segment: SegmentDescriptor,
    /// Reconstructed ciphertext of the segment
    pub ciphertext: Bytes,
    /// Pieces the download could not use
    pub failed: Vec<u16>,
}

impl RepairRequest {
    /// Whether a read that lost `failed` of `listed` pieces should repair
    pub fn is_needed(scheme: &ErasureScheme, listed: usize, failed: usize) -> bool {
        failed > 0 && listed.saturating_sub(failed) <= scheme.optimal
    }

    /// Piece numbers to rebuild: the failed ones first, then numbers the
    /// manifest never listed, until the segment is back at optimal
    pub fn plan(&self) -> Vec<u16> {
        let failed: HashSet<u16> = self.failed.iter().copied().collect();
        let healthy = self.segment.pieces.len().saturating_sub(failed.len());
        let wanted = failed.len().max(self.scheme.optimal.saturating_sub(healthy));

        let listed: HashSet<u16> = self.segment.pieces.iter().map(|p| p.number).collect();
        let mut numbers: Vec<u16> = self.failed.clone();
        numbers.sort_unstable();
        numbers.dedup();
        numbers.extend(
            (0..self.scheme.total as u16).filter(|n| !listed.contains(n)),
        );
        numbers.truncate(wanted);
        numbers
    }
}

/// How a repair ended
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// The segment now lists `added` replacement pieces
    Repaired { added: usize },
    /// Nothing was changed, e.g. the object was replaced meanwhile
    Skipped(String),
    Failed(String),
}

impl RepairOutcome {
    /// Counter that records this outcome
    pub fn metric(&self) -> &'static str {
        match self {
            RepairOutcome::Repaired { .. } => names::REPAIRS_SUCCEEDED,
            RepairOutcome::Skipped(_) => names::REPAIRS_SKIPPED,
            RepairOutcome::Failed(_) => names::REPAIRS_FAILED,
        }
    }
}

/// Published once per repair attempt
#[derive(Debug, Clone)]
pub struct RepairReport {
    pub bucket: String,
    pub path: String,
    pub segment: u32,
    pub outcome: RepairOutcome,
    pub duration: Duration,
}

/// Background repair of degraded segments
pub struct RepairService {
    orchestrator: Arc<SegmentOrchestrator>,
    metadata: Arc<dyn MetadataClient>,
    events: broadcast::Sender<RepairReport>,
    /// Segments with a repair in flight
    active: Mutex<HashSet<(StreamId, u32)>>,
}

impl RepairService {
    pub fn new(orchestrator: Arc<SegmentOrchestrator>, metadata: Arc<dyn MetadataClient>) -> Self {
        let (events, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            orchestrator,
            metadata,
            events,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Receive a report for every repair started after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RepairReport> {
        self.events.subscribe()
    }

    /// Start a detached repair.
    ///
    /// Returns `None` when the same segment is already being repaired.
    pub fn spawn(
        self: &Arc<Self>,
        request: RepairRequest,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<RepairReport>> {
        let key = (request.stream_id, request.segment.index);
        if !self.active.lock().insert(key) {
            debug!(segment = request.segment.index, "Repair already running");
            return None;
        }

        counter!(names::REPAIRS_STARTED).increment(1);
        let service = self.clone();
        Some(tokio::spawn(async move {
            let started = Instant::now();
            let outcome = service.repair(&request, &cancel).await;
            service.active.lock().remove(&key);

            counter!(outcome.metric()).increment(1);
            match &outcome {
                RepairOutcome::Repaired { added } => {
                    info!(
                        bucket = %request.bucket,
                        path = %request.path,
                        segment = request.segment.index,
                        added,
                        "Segment repaired"
                    );
                }
                RepairOutcome::Skipped(reason) => {
                    debug!(
                        bucket = %request.bucket,
                        path = %request.path,
                        segment = request.segment.index,
                        reason = %reason,
                        "Segment repair skipped"
                    );
                }
                RepairOutcome::Failed(reason) => {
                    warn!(
                        bucket = %request.bucket,
                        path = %request.path,
                        segment = request.segment.index,
                        reason = %reason,
                        "Segment repair failed"
                    );
                }
            }

            let report = RepairReport {
                bucket: request.bucket,
                path: request.path,
                segment: request.segment.index,
                outcome,
                duration: started.elapsed(),
            };
            // No subscribers is fine
            let _ = service.events.send(report.clone());
            report
        }))
    }

    #[instrument(skip_all, fields(stream = %request.stream_id, segment = request.segment.index))]
    async fn repair(&self, request: &RepairRequest, cancel: &CancellationToken) -> RepairOutcome {
        let numbers = request.plan();
        if numbers.is_empty() {
            return RepairOutcome::Skipped("nothing to rebuild".to_string());
        }

        let codec = match self.orchestrator.codec_for(&request.scheme) {
            Ok(codec) => codec,
            Err(e) => return RepairOutcome::Failed(e.to_string()),
        };
        let pieces = match self
            .orchestrator
            .encode(codec, request.ciphertext.clone())
            .await
        {
            Ok(pieces) => pieces,
            Err(e) => return RepairOutcome::Failed(e.to_string()),
        };

        let mut rebuilt: Vec<Piece> = Vec::with_capacity(numbers.len());
        for number in &numbers {
            let Some(piece) = pieces.get(*number as usize) else {
                return RepairOutcome::Failed(format!("piece {} out of range", number));
            };
            // Encoding is deterministic, so a listed piece must match its hash
            if let Some(listed) = request.segment.piece(*number) {
                if listed.hash != piece.hash {
                    return RepairOutcome::Failed(format!(
                        "re-encoded piece {} does not match the manifest",
                        number
                    ));
                }
            }
            rebuilt.push(piece.clone());
        }

        let exclude: HashSet<NodeId> = request
            .segment
            .pieces
            .iter()
            .map(|p| p.node.id.clone())
            .collect();

        let stored = match self
            .orchestrator
            .replace_pieces(
                request.stream_id,
                request.segment.index,
                &rebuilt,
                &exclude,
                cancel,
            )
            .await
        {
            Ok(distribution) => distribution.stored,
            Err(UplinkError::Cancelled) => return RepairOutcome::Skipped("cancelled".to_string()),
            Err(e) => return RepairOutcome::Failed(e.to_string()),
        };
        if stored.is_empty() {
            return RepairOutcome::Failed("no replacement piece was stored".to_string());
        }

        let added = stored.len();
        let mut segment = request.segment.clone();
        segment
            .pieces
            .retain(|p| !request.failed.contains(&p.number));
        segment.pieces.extend(stored);
        segment.pieces.sort_by_key(|p| p.number);

        match self
            .metadata
            .update_segment(&request.bucket, &request.path, request.stream_id, segment)
            .await
        {
            Ok(()) => RepairOutcome::Repaired { added },
            Err(e @ MetadataError::Conflict(_)) => RepairOutcome::Skipped(e.to_string()),
            Err(e) if e.is_not_found() => RepairOutcome::Skipped(e.to_string()),
            Err(e) => RepairOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplink_core::{ContentHash, NodeDescriptor, PieceId};
    use uplink_metadata::PieceDescriptor;

    fn segment(numbers: &[u16]) -> SegmentDescriptor {
        let stream = StreamId::new();
        SegmentDescriptor {
            index: 0,
            plain_size: 10,
            encrypted_size: 26,
            nonce: [0; 12],
            pieces: numbers
                .iter()
                .map(|&n| PieceDescriptor {
                    number: n,
                    node: NodeDescriptor::new(format!("node-{}", n), "10.0.0.1:7777"),
                    piece_id: PieceId::derive(&stream, 0, n),
                    hash: ContentHash::compute(&[n as u8]),
                    size: 7,
                })
                .collect(),
        }
    }

    fn request(numbers: &[u16], failed: &[u16]) -> RepairRequest {
        RepairRequest {
            bucket: "b".into(),
            path: "p".into(),
            stream_id: StreamId::new(),
            scheme: ErasureScheme::dev(),
            segment: segment(numbers),
            ciphertext: Bytes::new(),
            failed: failed.to_vec(),
        }
    }

    #[test]
    fn test_repair_threshold() {
        let scheme = ErasureScheme::dev();
        // Six listed, one lost: five healthy is at or below optimal
        assert!(RepairRequest::is_needed(&scheme, 6, 1));
        // Ten listed, two lost: eight healthy is still above optimal
        assert!(!RepairRequest::is_needed(&scheme, 10, 2));
        assert!(RepairRequest::is_needed(&scheme, 10, 4));
        assert!(!RepairRequest::is_needed(&scheme, 6, 0));
    }

    #[test]
    fn test_plan_restores_optimal() {
        // Five healthy of six listed: one failed piece is enough
        let req = request(&[0, 1, 2, 3, 4, 5], &[3]);
        assert_eq!(req.plan(), vec![3]);

        // Three healthy: the failed pair plus one unlisted number
        let req = request(&[0, 1, 2, 3, 4], &[4, 1]);
        assert_eq!(req.plan(), vec![1, 4, 5]);
    }

    #[test]
    fn test_skipped_repair_is_not_counted_as_failure() {
        assert_eq!(
            RepairOutcome::Skipped("cancelled".into()).metric(),
            names::REPAIRS_SKIPPED
        );
        assert_eq!(
            RepairOutcome::Failed("no nodes".into()).metric(),
            names::REPAIRS_FAILED
        );
        assert_eq!(
            RepairOutcome::Repaired { added: 2 }.metric(),
            names::REPAIRS_SUCCEEDED
        );
    }
}
