//! Engine configuration
//!
//! Configured externally (file or CLI), immutable after startup. The
//! `aerocdc init` command writes the default configuration to
//! `<data_dir>/aerocdc.json`; every other command loads it from there.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read or written
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured value violates a constraint
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration.
///
/// All byte and time thresholds are validated at startup; a configuration
/// that cannot uphold the backpressure or retention contracts is rejected
/// rather than silently clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root data directory (log segments, slot and publication state)
    pub data_dir: PathBuf,

    /// Target size of one log segment file in bytes.
    ///
    /// Segments are the unit of retention: a segment is recycled only when
    /// it lies entirely below the retention floor.
    pub segment_size_bytes: u64,

    /// Maximum number of concurrently open (uncommitted) transactions the
    /// reassembler will buffer before failing fast.
    pub max_open_transactions: usize,

    /// Backpressure high-water mark: the session stops pulling from the
    /// decode pipeline once this many unacknowledged bytes are in flight.
    pub high_watermark_bytes: u64,

    /// Backpressure low-water mark: the session resumes pulling once
    /// unacknowledged bytes fall below this.
    pub low_watermark_bytes: u64,

    /// Idle keepalive interval in seconds.
    pub keepalive_interval_secs: u64,

    /// Hard timeout for a backpressure pause. A session paused longer than
    /// this is closed with a delivery stall; the slot is preserved.
    pub stall_timeout_secs: u64,

    /// Capacity of the session's outbound frame channel.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./aerocdc-data"),
            segment_size_bytes: 16 * 1024 * 1024,
            max_open_transactions: 1024,
            high_watermark_bytes: 4 * 1024 * 1024,
            low_watermark_bytes: 1024 * 1024,
            keepalive_interval_secs: 10,
            stall_timeout_secs: 60,
            channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Create a configuration rooted at the given data directory, with
    /// default thresholds.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Path of the config file inside the data directory.
    pub fn file_path(data_dir: &Path) -> PathBuf {
        data_dir.join("aerocdc.json")
    }

    /// Validate threshold relationships.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "segment_size_bytes must be non-zero".to_string(),
            ));
        }
        if self.max_open_transactions == 0 {
            return Err(ConfigError::Invalid(
                "max_open_transactions must be non-zero".to_string(),
            ));
        }
        if self.low_watermark_bytes >= self.high_watermark_bytes {
            return Err(ConfigError::Invalid(format!(
                "low_watermark_bytes ({}) must be below high_watermark_bytes ({})",
                self.low_watermark_bytes, self.high_watermark_bytes
            )));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "keepalive_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.stall_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "stall_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate configuration from `<data_dir>/aerocdc.json`.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(Self::file_path(data_dir))?;
        let mut config: EngineConfig = serde_json::from_str(&raw)?;
        // The file travels with its directory
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Persist configuration to `<data_dir>/aerocdc.json`.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.validate()?;
        fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(Self::file_path(&self.data_dir), json)?;
        Ok(())
    }
}
