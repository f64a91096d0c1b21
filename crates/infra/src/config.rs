//! Typed engine configuration.
//!
//! All sections deserialize with defaults, so a partial JSON document (or `{}`)
//! is a valid configuration. Call [`EngineConfig::validate`] before wiring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::CompressionAlgorithm;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Take a snapshot every N versions (0 disables the default policy).
    pub snapshot_frequency: u64,
    pub max_snapshot_age_hours: u64,
    pub compression: CompressionAlgorithm,
    /// Run age-based cleanup after each snapshot is created.
    pub auto_cleanup: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            snapshot_frequency: 100,
            max_snapshot_age_hours: 168,
            compression: CompressionAlgorithm::default(),
            auto_cleanup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bounded queue length per subscriber.
    pub subscriber_capacity: usize,
    /// Page size used when reading history for catch-up subscriptions.
    pub catch_up_batch_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: chronicle_events::DEFAULT_SUBSCRIBER_CAPACITY,
            catch_up_batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub flush_interval_ms: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub snapshot: SnapshotConfig,
    pub stream: StreamConfig,
    pub quota: QuotaConfig,
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot.max_snapshot_age_hours == 0 {
            return Err(ConfigError::Invalid(
                "snapshot.max_snapshot_age_hours must be > 0".to_string(),
            ));
        }
        if self.stream.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stream.subscriber_capacity must be > 0".to_string(),
            ));
        }
        if self.stream.catch_up_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "stream.catch_up_batch_size must be > 0".to_string(),
            ));
        }
        if self.quota.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "quota.flush_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
