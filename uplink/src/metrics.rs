//! Segment, object and repair metrics
//!
//! Recorded through the `metrics` facade; no exporter is installed here.

use metrics::describe_counter;

/// Metric names as constants
pub mod names {
    // Pieces
    pub const PIECES_UPLOADED: &str = "uplink_pieces_uploaded_total";
    pub const PIECES_FAILED: &str = "uplink_pieces_failed_total";
    pub const PIECES_CORRUPT: &str = "uplink_pieces_corrupt_total";

    // Segments
    pub const SEGMENTS_COMMITTED: &str = "uplink_segments_committed_total";
    pub const SEGMENTS_DEGRADED: &str = "uplink_segments_degraded_total";
    pub const SEGMENTS_FAILED: &str = "uplink_segments_failed_total";

    // Objects
    pub const OBJECTS_UPLOADED: &str = "uplink_objects_uploaded_total";
    pub const OBJECTS_DOWNLOADED: &str = "uplink_objects_downloaded_total";

    // Repair
    pub const REPAIRS_STARTED: &str = "uplink_repairs_started_total";
    pub const REPAIRS_SUCCEEDED: &str = "uplink_repairs_succeeded_total";
    pub const REPAIRS_FAILED: &str = "uplink_repairs_failed_total";
    pub const REPAIRS_SKIPPED: &str = "uplink_repairs_skipped_total";
}

/// Register metric descriptions
pub fn describe_metrics() {
    describe_counter!(names::PIECES_UPLOADED, "Pieces acknowledged by storage nodes");
    describe_counter!(names::PIECES_FAILED, "Piece uploads that failed after retries");
    describe_counter!(
        names::PIECES_CORRUPT,
        "Downloaded pieces that failed hash verification"
    );

    describe_counter!(names::SEGMENTS_COMMITTED, "Segments that reached upload quorum");
    describe_counter!(
        names::SEGMENTS_DEGRADED,
        "Segments committed with fewer than the optimal number of pieces"
    );
    describe_counter!(names::SEGMENTS_FAILED, "Segments that failed to reach quorum");

    describe_counter!(names::OBJECTS_UPLOADED, "Objects whose manifest was published");
    describe_counter!(names::OBJECTS_DOWNLOADED, "Objects fully downloaded");

    describe_counter!(names::REPAIRS_STARTED, "Repair-on-read tasks started");
    describe_counter!(names::REPAIRS_SUCCEEDED, "Repairs that updated the segment");
    describe_counter!(names::REPAIRS_FAILED, "Repairs that could not restore redundancy");
    describe_counter!(
        names::REPAIRS_SKIPPED,
        "Repairs abandoned because of cancellation or a concurrent overwrite"
    );
}
