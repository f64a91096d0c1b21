//! Wiring of the in-memory engine from an [`EngineConfig`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use chronicle_events::{EventCodec, EventRegistry, EventStreamBus};

use crate::config::{ConfigError, EngineConfig};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::quota::{InMemoryQuotaStore, TenantQuotaManager};
use crate::repository::Repository;
use crate::snapshot::{InMemorySnapshotStore, SnapshotService};
use crate::workers::{QuotaFlushWorker, WorkerHandle};

pub type InMemoryRepository = Repository<Arc<InMemoryEventStore>, EventStreamBus>;

/// Store, bus, snapshots and quotas sharing one set of position counters.
#[derive(Debug)]
pub struct InMemoryEngine {
    config: EngineConfig,
    repository: InMemoryRepository,
    snapshot_store: Arc<InMemorySnapshotStore>,
    quota_store: Arc<InMemoryQuotaStore>,
    quotas: Arc<TenantQuotaManager>,
}

impl InMemoryEngine {
    pub fn new(config: EngineConfig, registry: EventRegistry) -> Result<Self, ConfigError> {
        Self::with_quota_store(config, registry, Arc::new(InMemoryQuotaStore::new()))
    }

    /// Engine whose quota counters start from what `quota_store` last
    /// flushed. A failed restore is logged and the counters start at zero.
    pub fn with_quota_store(
        config: EngineConfig,
        registry: EventRegistry,
        quota_store: Arc<InMemoryQuotaStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(registry);

        let store = Arc::new(InMemoryEventStore::with_codec(EventCodec::new(Arc::clone(
            &registry,
        ))));
        let bus = EventStreamBus::with_counters(config.stream.subscriber_capacity, store.positions());

        let snapshot_store = Arc::new(InMemorySnapshotStore::new());
        let snapshots = SnapshotService::new(snapshot_store.clone(), config.snapshot.clone());

        let quotas = Arc::new(TenantQuotaManager::new().with_store(quota_store.clone()));
        if let Err(err) = quotas.restore() {
            warn!(error = %err, "quota counters not restored");
        }

        let repository = Repository::new(store, bus)
            .with_registry(registry)
            .with_snapshots(snapshots)
            .with_quotas(Arc::clone(&quotas))
            .with_stream_config(config.stream.clone());

        info!(
            snapshot_frequency = config.snapshot.snapshot_frequency,
            compression = %config.snapshot.compression,
            subscriber_capacity = config.stream.subscriber_capacity,
            "in-memory engine ready"
        );

        Ok(Self {
            config,
            repository,
            snapshot_store,
            quota_store,
            quotas,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &InMemoryRepository {
        &self.repository
    }

    pub fn event_store(&self) -> &Arc<InMemoryEventStore> {
        self.repository.store()
    }

    pub fn snapshot_store(&self) -> &Arc<InMemorySnapshotStore> {
        &self.snapshot_store
    }

    pub fn quota_store(&self) -> &Arc<InMemoryQuotaStore> {
        &self.quota_store
    }

    pub fn quotas(&self) -> &Arc<TenantQuotaManager> {
        &self.quotas
    }

    /// Start the periodic quota flush at `quota.flush_interval_ms`.
    pub fn start_quota_flush(&self) -> io::Result<WorkerHandle> {
        QuotaFlushWorker::spawn(
            Arc::clone(&self.quotas),
            Duration::from_millis(self.config.quota.flush_interval_ms),
        )
    }
}
