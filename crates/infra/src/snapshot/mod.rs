//! Snapshot service: compressed, checksummed caches of aggregate state.
//!
//! A snapshot is never authoritative. Anything wrong with one (checksum,
//! compression, undecodable state) degrades to full event replay in the
//! repository.

mod compression;
mod policy;
mod service;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chronicle_core::{AggregateId, TenantId};

pub use compression::{CompressionAlgorithm, sha256_hex};
pub use policy::{EventCount, EveryNVersions, SnapshotContext, SnapshotPolicy, TimeBased};
pub use service::SnapshotService;
pub use store::{InMemorySnapshotStore, SnapshotStore};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(
        "snapshot checksum mismatch for {aggregate_id} at version {version}: expected {expected}, got {actual}"
    )]
    ChecksumMismatch {
        aggregate_id: AggregateId,
        version: u64,
        expected: String,
        actual: String,
    },

    #[error("compression error: {0}")]
    Compression(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot storage failure: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Serialization(err.to_string())
    }
}

/// Aggregate state captured at `aggregate_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub aggregate_version: u64,
    pub compressed_payload: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
    /// SHA-256 (lowercase hex) of the decompressed payload.
    pub checksum: String,
    pub compression_algorithm: CompressionAlgorithm,
    pub created_at: DateTime<Utc>,
    /// Events applied since the previous snapshot of this aggregate.
    pub event_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

impl Snapshot {
    /// `compressed_size / original_size`, or 1.0 for an empty payload.
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.original_size as f64
        }
    }
}
