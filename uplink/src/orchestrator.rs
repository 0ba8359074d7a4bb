//! Segment orchestration
//!
//! Drives one segment through its upload states
//!
//! ```text
//! Encoding → Distributing → AwaitingQuorum → Committed
//!                 ▲               │
//!                 └── replacement ┘ (once)          any → Failed
//! ```
//!
//! and fetches a threshold of verified pieces on download.
//!
//! Each piece upload runs as its own task. The segment commits as soon as
//! the optimal number of acks arrive; uploads still in flight at that
//! point are detached and finish on their own.

use crate::metrics::names;
use crate::reputation::ReputationService;
use crate::selector::NodeSelector;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uplink_core::{
    EncryptedSegment, ErasureCodec, ErasureScheme, NodeDescriptor, NodeId, Piece, PieceId,
    Result, StreamId, UplinkError,
};
use uplink_metadata::{NodeDirectory, NodeFilter, PieceDescriptor, SegmentDescriptor};
use uplink_network::PieceTransferClient;

/// Upload state of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Encoding,
    Distributing,
    AwaitingQuorum,
    Committed,
    Failed,
}

impl SegmentState {
    /// Whether the state machine permits moving to `next`
    pub fn can_advance_to(self, next: SegmentState) -> bool {
        use SegmentState::*;
        match (self, next) {
            (Committed | Failed, _) => false,
            (_, Failed) => true,
            (Encoding, Distributing)
            | (Distributing, AwaitingQuorum)
            | (AwaitingQuorum, Distributing)
            | (AwaitingQuorum, Committed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SegmentState::Committed | SegmentState::Failed)
    }
}

struct Progress {
    index: u32,
    state: SegmentState,
}

impl Progress {
    fn new(index: u32) -> Self {
        Self {
            index,
            state: SegmentState::Encoding,
        }
    }

    fn advance(&mut self, next: SegmentState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(segment = self.index, from = ?self.state, to = ?next, "Segment state");
        self.state = next;
    }
}

/// Outcome of one piece upload task
struct PutOutcome {
    descriptor: PieceDescriptor,
    result: Result<()>,
}

/// Pieces stored and lost by one distribution round
#[derive(Debug, Default)]
pub struct Distribution {
    pub stored: Vec<PieceDescriptor>,
    pub failed: Vec<u16>,
}

/// Result of fetching a segment
#[derive(Debug)]
pub struct SegmentDownload {
    /// Reconstructed ciphertext
    pub ciphertext: Bytes,
    /// Pieces that could not be fetched or failed verification
    pub failed: Vec<u16>,
    /// Subset of `failed` whose node returned data that did not match its hash
    pub corrupt: Vec<u16>,
}

/// Parallel piece transfers for individual segments
pub struct SegmentOrchestrator {
    codec: Arc<ErasureCodec>,
    transfer: PieceTransferClient,
    selector: Arc<NodeSelector>,
    directory: Arc<dyn NodeDirectory>,
    reputation: Arc<dyn ReputationService>,
}

impl SegmentOrchestrator {
    pub fn new(
        codec: Arc<ErasureCodec>,
        transfer: PieceTransferClient,
        selector: Arc<NodeSelector>,
        directory: Arc<dyn NodeDirectory>,
        reputation: Arc<dyn ReputationService>,
    ) -> Self {
        Self {
            codec,
            transfer,
            selector,
            directory,
            reputation,
        }
    }

    /// Scheme new segments are encoded with
    pub fn scheme(&self) -> &ErasureScheme {
        self.codec.scheme()
    }

    pub fn transfer(&self) -> &PieceTransferClient {
        &self.transfer
    }

    /// Codec for a stored segment's scheme
    pub fn codec_for(&self, scheme: &ErasureScheme) -> Result<Arc<ErasureCodec>> {
        if scheme == self.codec.scheme() {
            return Ok(self.codec.clone());
        }
        Ok(Arc::new(ErasureCodec::new(*scheme)?))
    }

    /// Erasure code `data` off the async runtime
    pub async fn encode(&self, codec: Arc<ErasureCodec>, data: Bytes) -> Result<Vec<Piece>> {
        tokio::task::spawn_blocking(move || codec.encode(&data))
            .await
            .map_err(|e| UplinkError::Internal(format!("encode task failed: {}", e)))?
    }

    /// Select `count` nodes outside `exclude`
    pub async fn select_nodes(
        &self,
        count: usize,
        exclude: &HashSet<NodeId>,
    ) -> Result<Vec<NodeDescriptor>> {
        let filter = NodeFilter::new().excluding(exclude);
        let candidates = self.directory.list_candidate_nodes(&filter).await?;
        self.selector.select(&candidates, count, exclude)
    }

    /// Upload one encrypted segment and wait for quorum.
    ///
    /// Commits once `optimal` pieces are acknowledged. If every upload has
    /// finished short of that, the failed pieces get one round on fresh
    /// nodes; the segment then commits with at least `required` pieces or
    /// fails with `QuorumNotMet`.
    #[instrument(skip(self, encrypted, cancel), fields(stream = %stream_id, segment = index))]
    pub async fn upload_segment(
        &self,
        stream_id: StreamId,
        index: u32,
        plain_size: u64,
        encrypted: EncryptedSegment,
        cancel: &CancellationToken,
    ) -> Result<SegmentDescriptor> {
        if cancel.is_cancelled() {
            return Err(UplinkError::Cancelled);
        }

        let mut progress = Progress::new(index);
        let scheme = *self.codec.scheme();
        let encrypted_size = encrypted.len() as u64;
        let nonce = encrypted.nonce;

        let pieces = self
            .encode(self.codec.clone(), Bytes::from(encrypted.ciphertext))
            .await?;

        let result = self
            .distribute_with_quorum(&mut progress, stream_id, &pieces, &scheme, cancel)
            .await;

        let mut stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                progress.advance(SegmentState::Failed);
                counter!(names::SEGMENTS_FAILED).increment(1);
                return Err(e);
            }
        };

        stored.sort_by_key(|p| p.number);
        progress.advance(SegmentState::Committed);
        counter!(names::SEGMENTS_COMMITTED).increment(1);
        info!(pieces = stored.len(), size = plain_size, "Segment committed");

        Ok(SegmentDescriptor {
            index,
            plain_size,
            encrypted_size,
            nonce,
            pieces: stored,
        })
    }

    async fn distribute_with_quorum(
        &self,
        progress: &mut Progress,
        stream_id: StreamId,
        pieces: &[Piece],
        scheme: &ErasureScheme,
        cancel: &CancellationToken,
    ) -> Result<Vec<PieceDescriptor>> {
        progress.advance(SegmentState::Distributing);
        let nodes = self.select_nodes(scheme.total, &HashSet::new()).await?;
        let used: HashSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        let targets: Vec<_> = pieces.iter().zip(nodes).collect();

        progress.advance(SegmentState::AwaitingQuorum);
        let first = self
            .distribute(stream_id, progress.index, targets, scheme.optimal, cancel)
            .await?;
        let mut stored = first.stored;

        if stored.len() < scheme.optimal && !first.failed.is_empty() {
            progress.advance(SegmentState::Distributing);
            warn!(
                acks = stored.len(),
                optimal = scheme.optimal,
                failed = first.failed.len(),
                "Quorum short, retrying failed pieces on new nodes"
            );

            let count = first.failed.len().min(scheme.optimal - stored.len());
            match self.select_nodes(count, &used).await {
                Ok(nodes) => {
                    let targets: Vec<_> = first
                        .failed
                        .iter()
                        .filter_map(|&number| pieces.get(number as usize))
                        .zip(nodes)
                        .collect();
                    progress.advance(SegmentState::AwaitingQuorum);
                    let retry = self
                        .distribute(stream_id, progress.index, targets, count, cancel)
                        .await?;
                    stored.extend(retry.stored);
                }
                Err(e) => {
                    progress.advance(SegmentState::AwaitingQuorum);
                    warn!(error = %e, "No replacement nodes available");
                }
            }
        }

        if stored.len() < scheme.required {
            return Err(UplinkError::QuorumNotMet {
                achieved: stored.len(),
                required: scheme.required,
            });
        }
        if stored.len() < scheme.optimal {
            counter!(names::SEGMENTS_DEGRADED).increment(1);
            warn!(
                acks = stored.len(),
                optimal = scheme.optimal,
                "Segment committed below optimal redundancy"
            );
        }
        Ok(stored)
    }

    /// Upload each piece to its paired node concurrently, returning once
    /// `stop_after` acks arrive or every upload has finished
    async fn distribute(
        &self,
        stream_id: StreamId,
        index: u32,
        targets: Vec<(&Piece, NodeDescriptor)>,
        stop_after: usize,
        cancel: &CancellationToken,
    ) -> Result<Distribution> {
        let (tx, mut rx) = mpsc::channel(targets.len().max(1));
        for (piece, node) in targets {
            let descriptor = PieceDescriptor {
                number: piece.number,
                node,
                piece_id: PieceId::derive(&stream_id, index, piece.number),
                hash: piece.hash,
                size: piece.size() as u32,
            };
            self.spawn_put(descriptor, piece.data.clone(), tx.clone(), cancel.clone());
        }
        drop(tx);

        let mut round = Distribution::default();
        while round.stored.len() < stop_after {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UplinkError::Cancelled),
                outcome = rx.recv() => outcome,
            };
            let Some(outcome) = outcome else {
                break;
            };

            match outcome.result {
                Ok(()) => round.stored.push(outcome.descriptor),
                Err(UplinkError::Cancelled) => return Err(UplinkError::Cancelled),
                Err(e) => {
                    warn!(
                        node = %outcome.descriptor.node.id,
                        piece = outcome.descriptor.number,
                        error = %e,
                        "Piece upload failed"
                    );
                    round.failed.push(outcome.descriptor.number);
                }
            }
        }

        Ok(round)
    }

    fn spawn_put(
        &self,
        descriptor: PieceDescriptor,
        data: Bytes,
        tx: mpsc::Sender<PutOutcome>,
        cancel: CancellationToken,
    ) {
        let transfer = self.transfer.clone();
        let reputation = self.reputation.clone();

        tokio::spawn(async move {
            let result = transfer
                .put(&descriptor.node, descriptor.piece_id, data, &cancel)
                .await;

            match &result {
                Ok(()) => {
                    reputation.record_success(&descriptor.node.id);
                    counter!(names::PIECES_UPLOADED).increment(1);
                    debug!(node = %descriptor.node.id, piece = descriptor.number, "Piece stored");
                }
                Err(UplinkError::Cancelled) => {}
                Err(_) => {
                    reputation.record_failure(&descriptor.node.id);
                    counter!(names::PIECES_FAILED).increment(1);
                }
            }

            // The receiver is gone once quorum was reached
            let _ = tx.send(PutOutcome { descriptor, result }).await;
        });
    }

    /// Store `pieces` on newly selected nodes outside `exclude`, waiting for
    /// every upload. Returns the pieces that were stored.
    pub async fn replace_pieces(
        &self,
        stream_id: StreamId,
        index: u32,
        pieces: &[Piece],
        exclude: &HashSet<NodeId>,
        cancel: &CancellationToken,
    ) -> Result<Distribution> {
        let nodes = self.select_nodes(pieces.len(), exclude).await?;
        let targets: Vec<_> = pieces.iter().zip(nodes).collect();
        self.distribute(stream_id, index, targets, pieces.len(), cancel)
            .await
    }

    /// Fetch and reconstruct one segment's ciphertext.
    ///
    /// Requests `required` pieces from the best-scored nodes and replaces
    /// every failed or corrupt piece with the next candidate until enough
    /// verified pieces are in hand.
    #[instrument(skip_all, fields(segment = segment.index))]
    pub async fn download_segment(
        &self,
        scheme: &ErasureScheme,
        segment: &SegmentDescriptor,
        cancel: &CancellationToken,
    ) -> Result<SegmentDownload> {
        let codec = self.codec_for(scheme)?;
        let required = scheme.required;

        if segment.pieces.len() < required {
            return Err(UplinkError::InsufficientShares {
                available: segment.pieces.len(),
                required,
            });
        }

        let mut order: Vec<(f64, &PieceDescriptor)> = segment
            .pieces
            .iter()
            .map(|p| (self.reputation.score(&p.node), p))
            .collect();
        order.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut queue = order.into_iter().map(|(_, p)| p);

        let mut in_flight = FuturesUnordered::new();
        for descriptor in queue.by_ref().take(required) {
            in_flight.push(self.fetch_piece(descriptor, cancel));
        }

        let mut valid = Vec::with_capacity(required);
        let mut failed = Vec::new();
        let mut corrupt = Vec::new();
        while valid.len() < required {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UplinkError::Cancelled),
                next = in_flight.next() => next,
            };
            let Some((number, result)) = next else {
                break;
            };

            match result {
                Ok(piece) => valid.push(piece),
                Err(UplinkError::Cancelled) => return Err(UplinkError::Cancelled),
                Err(e) => {
                    if e.is_integrity_failure() {
                        counter!(names::PIECES_CORRUPT).increment(1);
                        warn!(piece = number, error = %e, "Discarding corrupt piece");
                        corrupt.push(number);
                    } else {
                        warn!(piece = number, error = %e, "Piece unavailable");
                    }
                    failed.push(number);
                    if let Some(descriptor) = queue.next() {
                        in_flight.push(self.fetch_piece(descriptor, cancel));
                    }
                }
            }
        }
        // Drops any straggling requests
        drop(in_flight);

        if valid.len() < required {
            return Err(UplinkError::InsufficientShares {
                available: valid.len(),
                required,
            });
        }

        let size = segment.encrypted_size as usize;
        let ciphertext = tokio::task::spawn_blocking(move || codec.decode(&valid, size))
            .await
            .map_err(|e| UplinkError::Internal(format!("decode task failed: {}", e)))??;

        Ok(SegmentDownload {
            ciphertext,
            failed,
            corrupt,
        })
    }

    async fn fetch_piece(
        &self,
        descriptor: &PieceDescriptor,
        cancel: &CancellationToken,
    ) -> (u16, Result<Piece>) {
        let node = &descriptor.node;
        let result = match self.transfer.get(node, descriptor.piece_id, cancel).await {
            Ok(data) => {
                let piece = Piece::with_expected_hash(descriptor.number, data, descriptor.hash);
                if piece.verify() {
                    self.reputation.record_success(&node.id);
                    Ok(piece)
                } else {
                    self.reputation.record_failure(&node.id);
                    Err(UplinkError::CorruptShare {
                        piece: descriptor.number,
                    })
                }
            }
            Err(UplinkError::Cancelled) => Err(UplinkError::Cancelled),
            Err(e) => {
                self.reputation.record_failure(&node.id);
                Err(e)
            }
        };
        (descriptor.number, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reputation::AtomicReputation;
    use crate::selector::SelectorConfig;
    use std::time::Duration;
    use uplink_core::{derive_key, encrypt_segment, RootKey};
    use uplink_metadata::StaticNodeDirectory;
    use uplink_network::{MemoryNetwork, NodeFault, TransferConfig};

    struct Harness {
        network: Arc<MemoryNetwork>,
        orchestrator: SegmentOrchestrator,
    }

    fn harness(nodes: usize, transfer: TransferConfig) -> Harness {
        let network = Arc::new(MemoryNetwork::with_nodes(nodes));
        let listed = network.descriptors();
        harness_with(network, listed, transfer)
    }

    fn harness_with(
        network: Arc<MemoryNetwork>,
        listed: Vec<NodeDescriptor>,
        transfer: TransferConfig,
    ) -> Harness {
        let directory = Arc::new(StaticNodeDirectory::new(listed));
        let reputation = Arc::new(AtomicReputation::default());
        let selector = Arc::new(NodeSelector::new(
            SelectorConfig::default(),
            reputation.clone(),
            Some(11),
        ));
        let codec = Arc::new(ErasureCodec::new(ErasureScheme::dev()).unwrap());
        let orchestrator = SegmentOrchestrator::new(
            codec,
            PieceTransferClient::new(network.clone(), transfer),
            selector,
            directory,
            reputation,
        );
        Harness {
            network,
            orchestrator,
        }
    }

    fn fast_transfer() -> TransferConfig {
        TransferConfig {
            timeout: Duration::from_secs(5),
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn encrypted(plaintext: &[u8]) -> EncryptedSegment {
        let key = derive_key(&RootKey::from_bytes([7u8; 32]), "b", "p", 0);
        encrypt_segment(plaintext, &key).unwrap()
    }

    fn fail_nodes(network: &MemoryNetwork, count: usize) {
        for node in network.descriptors().iter().take(count) {
            network.set_fault(&node.id, NodeFault::Offline);
        }
    }

    #[test]
    fn test_state_transitions() {
        use SegmentState::*;
        assert!(Encoding.can_advance_to(Distributing));
        assert!(AwaitingQuorum.can_advance_to(Distributing));
        assert!(AwaitingQuorum.can_advance_to(Committed));
        assert!(Distributing.can_advance_to(Failed));
        assert!(!Encoding.can_advance_to(Committed));
        assert!(!Committed.can_advance_to(Failed));
        assert!(Failed.is_terminal());
    }

    #[tokio::test]
    async fn test_upload_commits_at_optimal() {
        let h = harness(10, fast_transfer());
        let descriptor = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 11, encrypted(b"hello world"), &CancellationToken::new())
            .await
            .unwrap();

        // Quorum is the first O acks
        assert_eq!(descriptor.pieces.len(), 6);
        let numbers = descriptor.piece_numbers();
        let unique: HashSet<_> = numbers.iter().collect();
        assert_eq!(unique.len(), 6);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_exactly_optimal_acks_does_not_wait_for_stragglers() {
        let h = harness(10, TransferConfig {
            timeout: Duration::from_secs(60),
            ..fast_transfer()
        });
        let slow: Vec<_> = h.network.descriptors().into_iter().skip(6).collect();
        for node in &slow {
            h.network.set_fault(&node.id, NodeFault::Latency(Duration::from_secs(30)));
        }

        let started = std::time::Instant::now();
        let descriptor = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(descriptor.pieces.len(), 6);
        assert!(descriptor
            .pieces
            .iter()
            .all(|p| !slow.iter().any(|s| s.id == p.node.id)));
    }

    #[tokio::test]
    async fn test_below_required_fails_with_quorum_not_met() {
        let h = harness(10, fast_transfer());
        fail_nodes(&h.network, 7);

        let err = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UplinkError::QuorumNotMet {
                achieved: 3,
                required: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_replacement_round_uses_spare_nodes() {
        let network = Arc::new(MemoryNetwork::with_nodes(14));
        let mut listed = network.descriptors();
        // The first ten outrank the spares, so they form the initial round
        for spare in listed.iter_mut().skip(10) {
            spare.reputation = 0.9;
        }
        for node in listed.iter().take(5) {
            network.set_fault(&node.id, NodeFault::Offline);
        }
        let spares: Vec<_> = listed.iter().skip(10).map(|n| n.id.clone()).collect();
        let h = harness_with(network, listed, fast_transfer());

        let descriptor = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(descriptor.pieces.len(), 6);
        let on_spares = descriptor
            .pieces
            .iter()
            .filter(|p| spares.contains(&p.node.id))
            .count();
        assert_eq!(on_spares, 1);
        let nodes: HashSet<_> = descriptor.pieces.iter().map(|p| p.node.id.clone()).collect();
        assert_eq!(nodes.len(), 6);
    }

    #[tokio::test]
    async fn test_degraded_commit_between_required_and_optimal() {
        let h = harness(10, fast_transfer());
        fail_nodes(&h.network, 5);

        let descriptor = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(descriptor.pieces.len(), 5);
    }

    #[tokio::test]
    async fn test_insufficient_nodes() {
        let h = harness(9, fast_transfer());
        let err = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UplinkError::InsufficientNodes { .. }));
        assert_eq!(h.network.put_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_upload_issues_no_puts() {
        let h = harness(10, fast_transfer());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UplinkError::Cancelled));
        assert_eq!(h.network.put_count(), 0);
    }

    #[tokio::test]
    async fn test_download_roundtrip_and_corrupt_piece() {
        let h = harness(10, fast_transfer());
        let plaintext = vec![42u8; 5000];
        let segment = encrypted(&plaintext);
        let ciphertext = segment.ciphertext.clone();

        let descriptor = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 5000, segment, &CancellationToken::new())
            .await
            .unwrap();

        let scheme = ErasureScheme::dev();
        let clean = h
            .orchestrator
            .download_segment(&scheme, &descriptor, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(&clean.ciphertext[..], &ciphertext[..]);
        assert!(clean.failed.is_empty());
        assert!(clean.corrupt.is_empty());

        // One corrupt holder and one lost piece still leave K verified pieces
        h.network.set_fault(&descriptor.pieces[0].node.id, NodeFault::Corrupt);
        h.network
            .remove_piece(&descriptor.pieces[1].node.id, &descriptor.pieces[1].piece_id);

        let degraded = h
            .orchestrator
            .download_segment(&scheme, &descriptor, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(&degraded.ciphertext[..], &ciphertext[..]);
        // Only the hash mismatch counts as corrupt; the lost piece is merely unavailable
        assert_eq!(degraded.corrupt, vec![descriptor.pieces[0].number]);
        assert!(degraded.failed.contains(&descriptor.pieces[0].number));
        assert!(degraded.failed.contains(&descriptor.pieces[1].number));
    }

    #[tokio::test]
    async fn test_download_below_threshold() {
        let h = harness(10, fast_transfer());
        let descriptor = h
            .orchestrator
            .upload_segment(StreamId::new(), 0, 3, encrypted(b"abc"), &CancellationToken::new())
            .await
            .unwrap();

        for piece in descriptor.pieces.iter().take(3) {
            h.network.set_fault(&piece.node.id, NodeFault::Offline);
        }

        let err = h
            .orchestrator
            .download_segment(&ErasureScheme::dev(), &descriptor, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UplinkError::InsufficientShares {
                available: 3,
                required: 4
            }
        ));
    }
}
