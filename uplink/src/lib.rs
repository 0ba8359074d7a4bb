//! Uplink
//!
//! Client for a decentralized object store. Objects are split into
//! segments, each segment is encrypted and erasure coded, and the pieces
//! are spread over independent storage nodes. Reads need only a threshold
//! of the pieces.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Uplink                          │
//! │        buckets · objects · listing · repair events     │
//! └───────────────────────────┬────────────────────────────┘
//!                             ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                    ObjectPipeline                      │
//! │     segment → encrypt → orchestrate → manifest         │
//! └──────────────┬─────────────────────────┬───────────────┘
//!                ▼                         ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │   SegmentOrchestrator    │◄──│      RepairService       │
//! │ quorum upload · K-of-N   │   │  background re-upload    │
//! │ download                 │   └──────────────────────────┘
//! └──────┬───────────┬───────┘
//!        ▼           ▼
//! ┌────────────┐ ┌─────────────────────┐
//! │NodeSelector│ │ PieceTransferClient │
//! │ reputation │ │ timeout · retry     │
//! └────────────┘ └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uplink::{ConfigProfile, UploadOptions, Uplink, UplinkConfig};
//! use uplink_core::RootKey;
//! use uplink_metadata::{MemoryMetadataStore, StaticNodeDirectory};
//! use uplink_network::MemoryNetwork;
//!
//! # async fn demo() -> uplink_core::Result<()> {
//! let network = Arc::new(MemoryNetwork::with_nodes(12));
//! let uplink = Uplink::new(
//!     UplinkConfig::defaults_for(ConfigProfile::Dev),
//!     RootKey::generate(),
//!     Arc::new(MemoryMetadataStore::new()),
//!     Arc::new(StaticNodeDirectory::new(network.descriptors())),
//!     network,
//! )?;
//!
//! uplink.create_bucket("photos").await?;
//! uplink
//!     .upload_bytes("photos", "cat.jpg", vec![0u8; 1024], UploadOptions::default())
//!     .await?;
//! let _data = uplink.download_object_bytes("photos", "cat.jpg").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod repair;
pub mod reputation;
pub mod selector;
pub mod telemetry;

// Re-exports
pub use client::{ListOptions, Uplink};
pub use config::{ConfigError, ConfigProfile, UplinkConfig};
pub use orchestrator::{SegmentDownload, SegmentOrchestrator, SegmentState};
pub use pipeline::{segment_reader, ObjectPipeline, SegmentCallback, UploadOptions};
pub use repair::{RepairOutcome, RepairReport, RepairRequest, RepairService};
pub use reputation::{AtomicReputation, ReputationService};
pub use selector::{NodeSelector, SelectorConfig};
