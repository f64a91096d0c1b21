//! Per-tenant resource quotas.
//!
//! Counters live in memory (atomics) and are periodically flushed to a
//! [`QuotaStore`]. Usage recorded after the last flush is lost if the process
//! dies before the next one.

mod manager;
mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chronicle_core::TenantId;

pub use manager::{QuotaReservation, TenantQuotaManager, TenantUsage};
pub use store::{InMemoryQuotaStore, QuotaRecord, QuotaStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Events appended today (UTC).
    Events,
    StorageMb,
    Streams,
    Projections,
    Aggregates,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Events,
        ResourceType::StorageMb,
        ResourceType::Streams,
        ResourceType::Projections,
        ResourceType::Aggregates,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Events => "events",
            ResourceType::StorageMb => "storage_mb",
            ResourceType::Streams => "streams",
            ResourceType::Projections => "projections",
            ResourceType::Aggregates => "aggregates",
        }
    }
}

impl core::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits per resource; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_events_per_day: Option<u64>,
    pub max_storage_mb: Option<u64>,
    pub max_concurrent_streams: Option<u64>,
    pub max_projections: Option<u64>,
    pub max_aggregates: Option<u64>,
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn limit(&self, resource: ResourceType) -> Option<u64> {
        match resource {
            ResourceType::Events => self.max_events_per_day,
            ResourceType::StorageMb => self.max_storage_mb,
            ResourceType::Streams => self.max_concurrent_streams,
            ResourceType::Projections => self.max_projections,
            ResourceType::Aggregates => self.max_aggregates,
        }
    }

    pub fn with_limit(mut self, resource: ResourceType, limit: Option<u64>) -> Self {
        let slot = match resource {
            ResourceType::Events => &mut self.max_events_per_day,
            ResourceType::StorageMb => &mut self.max_storage_mb,
            ResourceType::Streams => &mut self.max_concurrent_streams,
            ResourceType::Projections => &mut self.max_projections,
            ResourceType::Aggregates => &mut self.max_aggregates,
        };
        *slot = limit;
        self
    }
}

/// Named, immutable limit presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaTier {
    Starter,
    Standard,
    Professional,
    Enterprise,
}

impl QuotaTier {
    pub fn limits(self) -> ResourceLimits {
        match self {
            QuotaTier::Starter => ResourceLimits {
                max_events_per_day: Some(10_000),
                max_storage_mb: Some(100),
                max_concurrent_streams: Some(5),
                max_projections: Some(3),
                max_aggregates: Some(1_000),
            },
            QuotaTier::Standard => ResourceLimits {
                max_events_per_day: Some(100_000),
                max_storage_mb: Some(1_024),
                max_concurrent_streams: Some(25),
                max_projections: Some(10),
                max_aggregates: Some(10_000),
            },
            QuotaTier::Professional => ResourceLimits {
                max_events_per_day: Some(1_000_000),
                max_storage_mb: Some(10_240),
                max_concurrent_streams: Some(100),
                max_projections: Some(50),
                max_aggregates: Some(100_000),
            },
            QuotaTier::Enterprise => ResourceLimits::unlimited(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error(
        "quota exceeded for tenant {tenant_id}: {resource} limit {limit}, current {current}, requested {requested}"
    )]
    Exceeded {
        tenant_id: TenantId,
        resource: ResourceType,
        limit: u64,
        current: u64,
        requested: u64,
    },

    #[error("quota storage failure: {0}")]
    Storage(String),
}
