use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use chronicle_core::{AggregateId, AggregateRoot, TenantId};
use chronicle_events::{Aggregate, AggregateState, EventMetadata};

use super::compression::sha256_hex;
use super::policy::{EveryNVersions, SnapshotContext, SnapshotPolicy};
use super::store::SnapshotStore;
use super::{Snapshot, SnapshotError};
use crate::clock::{Clock, system_clock};
use crate::config::SnapshotConfig;

/// Creates, verifies and restores snapshots according to a [`SnapshotPolicy`].
pub struct SnapshotService {
    store: Arc<dyn SnapshotStore>,
    policy: Box<dyn SnapshotPolicy>,
    config: SnapshotConfig,
    clock: Clock,
}

impl core::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnapshotService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SnapshotService {
    /// Service using the default `EveryNVersions(snapshot_frequency)` policy.
    pub fn new(store: Arc<dyn SnapshotStore>, config: SnapshotConfig) -> Self {
        Self {
            store,
            policy: Box::new(EveryNVersions(config.snapshot_frequency)),
            config,
            clock: system_clock(),
        }
    }

    pub fn with_policy(mut self, policy: impl SnapshotPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn create_snapshot(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        version: u64,
        state_bytes: &[u8],
        event_count: u64,
    ) -> Result<Snapshot, SnapshotError> {
        self.create_tenant_snapshot(aggregate_id, aggregate_type, version, state_bytes, event_count, None)
    }

    /// Like [`create_snapshot`](Self::create_snapshot), recording the owning tenant.
    pub fn create_tenant_snapshot(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        version: u64,
        state_bytes: &[u8],
        event_count: u64,
        tenant_id: Option<TenantId>,
    ) -> Result<Snapshot, SnapshotError> {
        let algorithm = self.config.compression;
        let compressed_payload = algorithm.compress(state_bytes)?;

        let snapshot = Snapshot {
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            aggregate_version: version,
            original_size: state_bytes.len() as u64,
            compressed_size: compressed_payload.len() as u64,
            compressed_payload,
            checksum: sha256_hex(state_bytes),
            compression_algorithm: algorithm,
            created_at: (self.clock)(),
            event_count,
            tenant_id,
        };
        self.store.put(snapshot.clone())?;

        info!(
            aggregate_id = %aggregate_id,
            aggregate_type,
            version,
            algorithm = %algorithm,
            original_size = snapshot.original_size,
            compressed_size = snapshot.compressed_size,
            "snapshot created"
        );

        if self.config.auto_cleanup {
            if let Err(err) = self.cleanup_old_snapshots() {
                warn!(error = %err, "snapshot cleanup failed");
            }
        }

        Ok(snapshot)
    }

    pub fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>, SnapshotError> {
        self.store.get_latest(aggregate_id)
    }

    /// Decompressed state bytes, verified against the stored checksum.
    ///
    /// A payload that does not decompress, or decompresses to the wrong size,
    /// is reported as `ChecksumMismatch` as well.
    pub fn decompress_verified(&self, snapshot: &Snapshot) -> Result<Vec<u8>, SnapshotError> {
        let mismatch = |actual: String| SnapshotError::ChecksumMismatch {
            aggregate_id: snapshot.aggregate_id,
            version: snapshot.aggregate_version,
            expected: snapshot.checksum.clone(),
            actual,
        };

        let bytes = snapshot
            .compression_algorithm
            .decompress(&snapshot.compressed_payload)
            .map_err(|err| mismatch(format!("undecodable payload ({err})")))?;

        let actual = sha256_hex(&bytes);
        if actual != snapshot.checksum || bytes.len() as u64 != snapshot.original_size {
            return Err(mismatch(actual));
        }
        Ok(bytes)
    }

    pub fn should_take_snapshot(
        &self,
        aggregate_id: AggregateId,
        version: u64,
    ) -> Result<bool, SnapshotError> {
        let ctx = self.context(aggregate_id, version)?;
        Ok(self.policy.should_snapshot(&ctx))
    }

    fn context(&self, aggregate_id: AggregateId, version: u64) -> Result<SnapshotContext, SnapshotError> {
        let last = self.store.get_latest(aggregate_id)?;
        Ok(SnapshotContext {
            aggregate_id,
            version,
            last_snapshot_version: last.as_ref().map(|s| s.aggregate_version),
            last_snapshot_at: last.as_ref().map(|s| s.created_at),
            now: (self.clock)(),
        })
    }

    /// Snapshot the aggregate's state if the policy asks for it.
    ///
    /// Call after the aggregate's events were saved: the snapshot is taken at
    /// `aggregate.version()`.
    pub fn maybe_snapshot<S>(&self, aggregate: &Aggregate<S>) -> Result<Option<Snapshot>, SnapshotError>
    where
        S: AggregateState + Serialize,
    {
        let version = aggregate.version();
        let ctx = self.context(*aggregate.id(), version)?;
        if !self.policy.should_snapshot(&ctx) {
            return Ok(None);
        }

        // Round-trip through `Value` so object keys come out sorted.
        let state_bytes = serde_json::to_vec(&serde_json::to_value(aggregate.state())?)?;
        self.create_tenant_snapshot(
            *aggregate.id(),
            aggregate.aggregate_type(),
            version,
            &state_bytes,
            ctx.events_since_last_snapshot(),
            aggregate.metadata().tenant_id,
        )
        .map(Some)
    }

    /// Rebuild an aggregate at the snapshot's version. Later events still need
    /// to be replayed on top.
    pub fn restore<S>(&self, snapshot: &Snapshot) -> Result<Aggregate<S>, SnapshotError>
    where
        S: AggregateState + DeserializeOwned,
    {
        if snapshot.aggregate_type != S::AGGREGATE_TYPE {
            return Err(SnapshotError::Serialization(format!(
                "snapshot is for aggregate type '{}', expected '{}'",
                snapshot.aggregate_type,
                S::AGGREGATE_TYPE
            )));
        }

        let bytes = self.decompress_verified(snapshot)?;
        let state: S = serde_json::from_slice(&bytes)?;
        let mut aggregate =
            Aggregate::from_snapshot(snapshot.aggregate_id, snapshot.aggregate_version, state)
                .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        if let Some(tenant_id) = snapshot.tenant_id {
            aggregate.set_metadata(EventMetadata::for_tenant(tenant_id));
        }
        Ok(aggregate)
    }

    /// Remove snapshots older than `max_snapshot_age_hours`, keeping the newest
    /// one of every aggregate.
    pub fn cleanup_old_snapshots(&self) -> Result<usize, SnapshotError> {
        let max_age_hours = i64::try_from(self.config.max_snapshot_age_hours).unwrap_or(i64::MAX);
        let max_age = Duration::try_hours(max_age_hours).unwrap_or(Duration::MAX);
        let cutoff = (self.clock)()
            .checked_sub_signed(max_age)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let removed = self.store.delete_older_than(cutoff)?;
        if removed > 0 {
            debug!(removed, %cutoff, "old snapshots removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use chronicle_events::{DomainEvent, HandlerTable, HandlerTableBuilder};

    use super::*;
    use crate::snapshot::{CompressionAlgorithm, EventCount, InMemorySnapshotStore};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Counted {
        by: u64,
    }
    impl DomainEvent for Counted {
        const EVENT_TYPE: &'static str = "counter.counted";
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        total: u64,
    }

    impl AggregateState for Counter {
        const AGGREGATE_TYPE: &'static str = "counter";

        fn handlers() -> HandlerTableBuilder<Self> {
            HandlerTable::builder(Self::AGGREGATE_TYPE)
                .on(|s: &mut Counter, e: &Counted| s.total += e.by)
        }
    }

    fn counter_at(version: u64) -> Aggregate<Counter> {
        let mut counter = Aggregate::<Counter>::new(AggregateId::new()).unwrap();
        for _ in 0..version {
            counter.apply(Counted { by: 2 }).unwrap();
        }
        counter
    }

    fn service(config: SnapshotConfig) -> SnapshotService {
        SnapshotService::new(Arc::new(InMemorySnapshotStore::new()), config)
    }

    #[test]
    fn snapshot_round_trips_for_every_algorithm() {
        for compression in [
            CompressionAlgorithm::Gzip,
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Zstd,
            CompressionAlgorithm::None,
        ] {
            let svc = service(SnapshotConfig {
                compression,
                ..SnapshotConfig::default()
            });
            let id = AggregateId::new();
            let state = br#"{"total":42}"#;
            let snap = svc.create_snapshot(id, "counter", 21, state, 21).unwrap();

            assert_eq!(snap.compression_algorithm, compression);
            assert_eq!(snap.original_size, state.len() as u64);
            assert_eq!(svc.decompress_verified(&snap).unwrap(), state);
            assert_eq!(svc.load_latest_snapshot(id).unwrap(), Some(snap));
        }
    }

    #[test]
    fn any_flipped_byte_is_a_checksum_mismatch() {
        let svc = service(SnapshotConfig {
            compression: CompressionAlgorithm::None,
            ..SnapshotConfig::default()
        });
        let state = serde_json::to_vec(&Counter { total: 99 }).unwrap();
        let snap = svc
            .create_snapshot(AggregateId::new(), "counter", 5, &state, 5)
            .unwrap();

        for idx in 0..snap.compressed_payload.len() {
            let mut corrupt = snap.clone();
            corrupt.compressed_payload[idx] ^= 0xff;
            let err = svc.decompress_verified(&corrupt).unwrap_err();
            assert!(
                matches!(err, SnapshotError::ChecksumMismatch { version: 5, .. }),
                "byte {idx}: {err:?}"
            );
        }
    }

    #[test]
    fn corrupt_compressed_stream_is_a_checksum_mismatch() {
        let svc = service(SnapshotConfig::default());
        let state = serde_json::to_vec(&Counter { total: 7 }).unwrap();
        let snap = svc
            .create_snapshot(AggregateId::new(), "counter", 1, &state, 1)
            .unwrap();

        let body = snap.compressed_payload.len() / 2;
        let crc = snap.compressed_payload.len() - 8;
        for idx in [body, crc] {
            let mut corrupt = snap.clone();
            corrupt.compressed_payload[idx] ^= 0xff;
            assert!(matches!(
                svc.decompress_verified(&corrupt),
                Err(SnapshotError::ChecksumMismatch { .. })
            ));
        }

        let mut tampered = snap.clone();
        tampered.checksum = sha256_hex(b"something else");
        assert!(svc.decompress_verified(&tampered).is_err());
    }

    #[test]
    fn default_policy_snapshots_on_frequency_multiples() {
        let svc = service(SnapshotConfig {
            snapshot_frequency: 3,
            ..SnapshotConfig::default()
        });

        assert!(svc.maybe_snapshot(&counter_at(2)).unwrap().is_none());
        let snap = svc.maybe_snapshot(&counter_at(3)).unwrap().unwrap();
        assert_eq!(snap.aggregate_version, 3);
        assert_eq!(snap.event_count, 3);
        assert!(svc.should_take_snapshot(AggregateId::new(), 6).unwrap());
    }

    #[test]
    fn restore_rebuilds_state_at_snapshot_version() {
        let svc = service(SnapshotConfig {
            snapshot_frequency: 4,
            ..SnapshotConfig::default()
        });
        let counter = counter_at(4);
        let snap = svc.maybe_snapshot(&counter).unwrap().unwrap();

        let restored: Aggregate<Counter> = svc.restore(&snap).unwrap();
        assert_eq!(restored.version(), 4);
        assert_eq!(restored.state(), counter.state());
        assert!(!restored.is_new());
    }

    #[test]
    fn event_count_policy_counts_since_last_snapshot() {
        let svc = service(SnapshotConfig::default()).with_policy(EventCount(2));
        let mut counter = counter_at(2);
        assert!(svc.maybe_snapshot(&counter).unwrap().is_some());

        counter.apply(Counted { by: 1 }).unwrap();
        assert!(svc.maybe_snapshot(&counter).unwrap().is_none());
        counter.apply(Counted { by: 1 }).unwrap();
        let second = svc.maybe_snapshot(&counter).unwrap().unwrap();
        assert_eq!(second.event_count, 2);
        assert_eq!(svc.store().list(*counter.id()).unwrap().len(), 2);
    }

    #[test]
    fn auto_cleanup_prunes_expired_snapshots_but_keeps_newest() {
        let now: Arc<Mutex<DateTime<Utc>>> = Arc::new(Mutex::new(Utc::now()));
        let clock_now = Arc::clone(&now);
        let svc = service(SnapshotConfig {
            max_snapshot_age_hours: 24,
            auto_cleanup: true,
            ..SnapshotConfig::default()
        })
        .with_clock(Arc::new(move || *clock_now.lock().unwrap()));

        let id = AggregateId::new();
        svc.create_snapshot(id, "counter", 1, b"{}", 1).unwrap();
        svc.create_snapshot(id, "counter", 2, b"{}", 1).unwrap();

        *now.lock().unwrap() += Duration::hours(48);
        svc.create_snapshot(id, "counter", 3, b"{}", 1).unwrap();

        let versions: Vec<_> = svc
            .store()
            .list(id)
            .unwrap()
            .iter()
            .map(|s| s.aggregate_version)
            .collect();
        assert_eq!(versions, vec![3]);
    }
}
