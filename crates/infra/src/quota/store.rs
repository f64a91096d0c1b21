use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_core::TenantId;

use super::{QuotaError, ResourceType};

/// Durable value of one `(tenant, resource)` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub tenant_id: TenantId,
    pub resource: ResourceType,
    pub usage: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Durable quota counters keyed by `(tenant_id, resource)`.
pub trait QuotaStore: Send + Sync {
    fn load(&self) -> Result<Vec<QuotaRecord>, QuotaError>;

    /// Upsert every record in one write.
    fn flush(&self, records: &[QuotaRecord]) -> Result<(), QuotaError>;
}

impl<S> QuotaStore for Arc<S>
where
    S: QuotaStore + ?Sized,
{
    fn load(&self) -> Result<Vec<QuotaRecord>, QuotaError> {
        (**self).load()
    }

    fn flush(&self, records: &[QuotaRecord]) -> Result<(), QuotaError> {
        (**self).flush(records)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    records: RwLock<HashMap<(TenantId, ResourceType), QuotaRecord>>,
    flushes: AtomicU64,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed flushes.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Acquire)
    }

    pub fn usage(&self, tenant_id: TenantId, resource: ResourceType) -> Option<u64> {
        self.records
            .read()
            .ok()?
            .get(&(tenant_id, resource))
            .map(|r| r.usage)
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn load(&self) -> Result<Vec<QuotaRecord>, QuotaError> {
        let records = self
            .records
            .read()
            .map_err(|_| QuotaError::Storage("lock poisoned".to_string()))?;
        Ok(records.values().copied().collect())
    }

    fn flush(&self, records: &[QuotaRecord]) -> Result<(), QuotaError> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| QuotaError::Storage("lock poisoned".to_string()))?;
        for record in records {
            stored.insert((record.tenant_id, record.resource), *record);
        }
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
