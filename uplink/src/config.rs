//! Configuration management for the uplink
//!
//! Supports loading from TOML files and environment variables.
//!
//! ```toml
//! [segment]
//! size = 67108864
//!
//! [erasure]
//! required = 29
//! optimal = 80
//! total = 110
//!
//! [selection]
//! diversity = true
//!
//! [transfer]
//! timeout_ms = 30000
//!
//! [pipeline]
//! max_concurrent_segments = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uplink_core::{
    EncryptedSegment, ErasureScheme, UplinkError, DEFAULT_SEGMENT_SIZE, DEV_SEGMENT_SIZE,
    MAX_SEGMENT_SIZE,
};
use uplink_network::{max_piece_payload, TransferConfig, MAX_FRAME_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for UplinkError {
    fn from(err: ConfigError) -> Self {
        UplinkError::Configuration(err.to_string())
    }
}

/// Which set of defaults to start from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigProfile {
    /// Production network: 64 MiB segments, 29/80/110
    Release,
    /// Small local networks: 1 MiB segments, 4/6/10, short timeouts
    Dev,
}

/// Complete uplink configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkConfig {
    #[serde(default)]
    pub segment: SegmentSettings,

    #[serde(default)]
    pub erasure: ErasureSettings,

    #[serde(default)]
    pub selection: SelectionSettings,

    #[serde(default)]
    pub transfer: TransferSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl UplinkConfig {
    /// Defaults for a profile
    pub fn defaults_for(profile: ConfigProfile) -> Self {
        match profile {
            ConfigProfile::Release => Self::default(),
            ConfigProfile::Dev => {
                let scheme = ErasureScheme::dev();
                Self {
                    segment: SegmentSettings {
                        size: DEV_SEGMENT_SIZE,
                    },
                    erasure: ErasureSettings {
                        required: scheme.required,
                        optimal: scheme.optimal,
                        total: scheme.total,
                    },
                    selection: SelectionSettings::default(),
                    transfer: TransferSettings {
                        timeout_ms: 5_000,
                        max_attempts: 3,
                        initial_backoff_ms: 10,
                        max_backoff_ms: 200,
                    },
                    pipeline: PipelineSettings::default(),
                }
            }
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: UplinkConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(size) = env_parse("UPLINK_SEGMENT_SIZE") {
            self.segment.size = size;
        }
        if let Some(k) = env_parse("UPLINK_ERASURE_REQUIRED") {
            self.erasure.required = k;
        }
        if let Some(o) = env_parse("UPLINK_ERASURE_OPTIMAL") {
            self.erasure.optimal = o;
        }
        if let Some(n) = env_parse("UPLINK_ERASURE_TOTAL") {
            self.erasure.total = n;
        }
        if let Some(ms) = env_parse("UPLINK_TRANSFER_TIMEOUT_MS") {
            self.transfer.timeout_ms = ms;
        }
        if let Some(n) = env_parse("UPLINK_MAX_CONCURRENT_SEGMENTS") {
            self.pipeline.max_concurrent_segments = n;
        }
        if let Ok(value) = std::env::var("UPLINK_NODE_DIVERSITY") {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.selection.diversity = true,
                "0" | "false" | "off" | "no" => self.selection.diversity = false,
                other => tracing::warn!(value = other, "Ignoring invalid UPLINK_NODE_DIVERSITY"),
            }
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment.size == 0 || self.segment.size > MAX_SEGMENT_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "segment size must be between 1 and {} bytes",
                MAX_SEGMENT_SIZE
            )));
        }

        let scheme = self.erasure.scheme();
        scheme
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let piece_size = (self.segment.size + EncryptedSegment::OVERHEAD).div_ceil(scheme.required);
        if piece_size > max_piece_payload(MAX_FRAME_SIZE) {
            return Err(ConfigError::ValidationError(format!(
                "pieces of {} bytes exceed the {} byte frame limit; lower segment size or raise required pieces",
                piece_size, MAX_FRAME_SIZE
            )));
        }

        if !(0.0..=1.0).contains(&self.selection.max_unreliable_fraction) {
            return Err(ConfigError::ValidationError(
                "max_unreliable_fraction must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.selection.unreliable_below) {
            return Err(ConfigError::ValidationError(
                "unreliable_below must be within [0, 1]".to_string(),
            ));
        }

        if self.transfer.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transfer timeout cannot be 0".to_string(),
            ));
        }
        if self.transfer.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.pipeline.max_concurrent_segments == 0 || self.pipeline.max_concurrent_downloads == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.list_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "list_page_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Segmenting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSettings {
    /// Maximum plaintext bytes per segment
    #[serde(default = "default_segment_size")]
    pub size: usize,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            size: default_segment_size(),
        }
    }
}

fn default_segment_size() -> usize {
    DEFAULT_SEGMENT_SIZE
}

/// Redundancy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErasureSettings {
    /// Pieces needed to reconstruct (K)
    #[serde(default = "default_required")]
    pub required: usize,

    /// Acks at which an upload is complete (O)
    #[serde(default = "default_optimal")]
    pub optimal: usize,

    /// Pieces per segment (N)
    #[serde(default = "default_total")]
    pub total: usize,
}

impl ErasureSettings {
    pub fn scheme(&self) -> ErasureScheme {
        ErasureScheme {
            required: self.required,
            optimal: self.optimal,
            total: self.total,
        }
    }
}

impl Default for ErasureSettings {
    fn default() -> Self {
        Self {
            required: default_required(),
            optimal: default_optimal(),
            total: default_total(),
        }
    }
}

fn default_required() -> usize {
    uplink_core::DEFAULT_REQUIRED_PIECES
}

fn default_optimal() -> usize {
    uplink_core::DEFAULT_OPTIMAL_PIECES
}

fn default_total() -> usize {
    uplink_core::DEFAULT_TOTAL_PIECES
}

/// Node selection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSettings {
    /// Prefer distinct networks among equally scored nodes
    #[serde(default = "default_true")]
    pub diversity: bool,

    /// Largest share of a selection that may be unreliable nodes
    #[serde(default = "default_max_unreliable_fraction")]
    pub max_unreliable_fraction: f64,

    /// Score below which a node counts as unreliable
    #[serde(default = "default_unreliable_below")]
    pub unreliable_below: f64,

    /// Observations per node before older ones are halved; 0 disables decay
    #[serde(default = "default_reputation_window")]
    pub reputation_window: u32,

    /// Fixed RNG seed for reproducible selection (tests only)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            diversity: true,
            max_unreliable_fraction: default_max_unreliable_fraction(),
            unreliable_below: default_unreliable_below(),
            reputation_window: default_reputation_window(),
            seed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_unreliable_fraction() -> f64 {
    0.1
}

fn default_unreliable_below() -> f64 {
    0.5
}

fn default_reputation_window() -> u32 {
    crate::reputation::DEFAULT_OBSERVATION_WINDOW
}

/// Piece transfer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Deadline for one attempt of one piece operation
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per piece operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl TransferSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Convert to the transfer client's configuration
    pub fn to_transfer_config(&self) -> TransferConfig {
        TransferConfig {
            timeout: self.timeout(),
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Object pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Segments uploaded concurrently per object
    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// Segments fetched ahead of the reader per download
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Objects fetched per listing request
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,

    /// Repair under-replicated segments found while reading
    #[serde(default = "default_true")]
    pub repair_on_read: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_segments: default_max_concurrent_segments(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            list_page_size: default_list_page_size(),
            repair_on_read: true,
        }
    }
}

fn default_max_concurrent_segments() -> usize {
    4
}

fn default_max_concurrent_downloads() -> usize {
    2
}

fn default_list_page_size() -> usize {
    100
}
