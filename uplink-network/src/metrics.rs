//! Piece transfer metrics
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether and where to export them.

use metrics::describe_counter;

/// Metric names as constants
pub mod names {
    pub const PIECE_TRANSFERS_TOTAL: &str = "uplink_piece_transfers_total";
    pub const PIECE_TRANSFER_FAILURES: &str = "uplink_piece_transfer_failures_total";
    pub const PIECE_TRANSFER_RETRIES: &str = "uplink_piece_transfer_retries_total";
    pub const PIECE_BYTES_SENT: &str = "uplink_piece_bytes_sent_total";
    pub const PIECE_BYTES_RECEIVED: &str = "uplink_piece_bytes_received_total";
}

/// Register metric descriptions
pub fn describe_metrics() {
    describe_counter!(
        names::PIECE_TRANSFERS_TOTAL,
        "Piece operations that completed successfully, by operation"
    );
    describe_counter!(
        names::PIECE_TRANSFER_FAILURES,
        "Piece operations that failed after all attempts, by operation"
    );
    describe_counter!(
        names::PIECE_TRANSFER_RETRIES,
        "Retries of transient piece transfer failures"
    );
    describe_counter!(names::PIECE_BYTES_SENT, "Piece payload bytes uploaded");
    describe_counter!(names::PIECE_BYTES_RECEIVED, "Piece payload bytes downloaded");
}
