//! Infrastructure layer: storage boundary, persistence engine, snapshots,
//! tenant quotas and configuration.

pub mod clock;
pub mod config;
pub mod engine;
pub mod event_store;
pub mod quota;
pub mod repository;
pub mod snapshot;
pub mod workers;

pub use config::{ConfigError, EngineConfig, QuotaConfig, SnapshotConfig, StreamConfig};
pub use engine::{InMemoryEngine, InMemoryRepository};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use quota::{
    QuotaError, QuotaReservation, QuotaTier, ResourceLimits, ResourceType, TenantQuotaManager,
    TenantUsage,
};
pub use repository::{LoadSource, Repository, RepositoryError};
pub use snapshot::{
    CompressionAlgorithm, Snapshot, SnapshotError, SnapshotPolicy, SnapshotService, SnapshotStore,
};
