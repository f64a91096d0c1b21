//! Event-sourced repository: the persistence engine callers talk to.
//!
//! The repository composes an [`EventStore`] (durable, ordered append/read), an
//! [`EventBus`] (live fan-out of committed events) and, optionally, a
//! [`SnapshotService`] and a [`TenantQuotaManager`].
//!
//! ## Save flow
//!
//! ```text
//! Aggregate (uncommitted events)
//!   ↓
//! 1. Validate payloads against the event registry
//!   ↓
//! 2. Reserve tenant quota (events, plus one aggregate for a new stream)
//!   ↓
//! 3. Append atomically with ExpectedVersion = persisted version
//!   ↓         (on failure: release the reservation, nothing written)
//! 4. Publish committed envelopes in commit order
//! ```
//!
//! The uncommitted buffer is **not** cleared by `save`; callers invoke
//! [`Aggregate::mark_committed`] once they accept the commit. Saving the same
//! aggregate twice therefore fails with a concurrency conflict instead of
//! silently duplicating events.
//!
//! ## Delivery
//!
//! Events are published only after the append is durable. If publication
//! fails the events stay persisted and the caller gets `Publish`; subscribers
//! catching up from the store will still see them (at-least-once).

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use chronicle_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId};
use chronicle_events::{
    Aggregate, AggregateState, EventBus, EventEnvelope, EventRegistry, Projection, ProjectionError,
    ProjectionRunner, RecordedEvent, Subscription, SubscriptionFilter, SubscriptionId,
};

use crate::config::StreamConfig;
use crate::event_store::{EventStore, EventStoreError};
use crate::quota::{QuotaError, QuotaReservation, ResourceType, TenantQuotaManager};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotService};

/// Unified error taxonomy for repository callers.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic concurrency conflict. Reload and retry; never retried internally.
    #[error(
        "concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}"
    )]
    Concurrency {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("aggregate '{aggregate_type}' has no handler for event '{event_type}'")]
    UnhandledEvent {
        aggregate_type: String,
        event_type: String,
    },

    #[error(
        "snapshot checksum mismatch for {aggregate_id} at version {version}: expected {expected}, got {actual}"
    )]
    ChecksumMismatch {
        aggregate_id: AggregateId,
        version: u64,
        expected: String,
        actual: String,
    },

    #[error(
        "quota exceeded for tenant {tenant_id}: {resource} limit {limit}, current {current}, requested {requested}"
    )]
    QuotaExceeded {
        tenant_id: TenantId,
        resource: ResourceType,
        limit: u64,
        current: u64,
        requested: u64,
    },

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// Events were committed but could not be published.
    #[error("publish failed after commit: {0}")]
    Publish(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<EventStoreError> for RepositoryError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency {
                aggregate_id,
                expected,
                actual,
            } => RepositoryError::Concurrency {
                aggregate_id,
                expected,
                actual,
            },
            EventStoreError::AggregateTypeMismatch(msg) | EventStoreError::InvalidAppend(msg) => {
                RepositoryError::Validation(msg)
            }
            EventStoreError::Storage(msg) => RepositoryError::Storage(msg),
        }
    }
}

impl From<DomainError> for RepositoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::Serialization(msg) => RepositoryError::Validation(msg),
            DomainError::UnhandledEvent {
                aggregate_type,
                event_type,
            } => RepositoryError::UnhandledEvent {
                aggregate_type,
                event_type,
            },
        }
    }
}

impl From<SnapshotError> for RepositoryError {
    fn from(value: SnapshotError) -> Self {
        match value {
            SnapshotError::ChecksumMismatch {
                aggregate_id,
                version,
                expected,
                actual,
            } => RepositoryError::ChecksumMismatch {
                aggregate_id,
                version,
                expected,
                actual,
            },
            other => RepositoryError::Snapshot(other.to_string()),
        }
    }
}

impl From<QuotaError> for RepositoryError {
    fn from(value: QuotaError) -> Self {
        match value {
            QuotaError::Exceeded {
                tenant_id,
                resource,
                limit,
                current,
                requested,
            } => RepositoryError::QuotaExceeded {
                tenant_id,
                resource,
                limit,
                current,
                requested,
            },
            QuotaError::Storage(msg) => RepositoryError::Storage(msg),
        }
    }
}

/// How [`Repository::load_with_source`] rebuilt an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Every event was replayed.
    FullReplay,
    /// State came from the snapshot at `version`; only later events were replayed.
    Snapshot { version: u64 },
}

/// Quota taken for one save, given back if the append fails.
struct Reservation<'a> {
    quotas: &'a TenantQuotaManager,
    taken: Vec<QuotaReservation>,
}

impl Reservation<'_> {
    fn release(self) {
        for reservation in self.taken {
            self.quotas.release_tenant_usage(reservation);
        }
    }
}

/// Event-sourced repository over a store and a bus.
///
/// `S` and `B` are usually `Arc`s of shared in-process components; any
/// [`EventStore`] / [`EventBus`] works. For subscriptions to report the same
/// positions as the store, build the bus over [`EventStore::positions`].
pub struct Repository<S, B>
where
    S: EventStore,
    B: EventBus,
{
    store: S,
    bus: B,
    registry: Arc<EventRegistry>,
    snapshots: Option<SnapshotService>,
    quotas: Option<Arc<TenantQuotaManager>>,
    stream: StreamConfig,
    /// Held across append + publish so subscribers see commit order.
    commit_lock: Mutex<()>,
}

impl<S, B> core::fmt::Debug for Repository<S, B>
where
    S: EventStore,
    B: EventBus,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repository")
            .field("registered_events", &self.registry.len())
            .field("snapshots", &self.snapshots)
            .field("quotas", &self.quotas.is_some())
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<S, B> Repository<S, B>
where
    S: EventStore,
    B: EventBus,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            registry: Arc::new(EventRegistry::new()),
            snapshots: None,
            quotas: None,
            stream: StreamConfig::default(),
            commit_lock: Mutex::new(()),
        }
    }

    /// Validate registered payloads on save with this registry.
    pub fn with_registry(mut self, registry: Arc<EventRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotService) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_quotas(mut self, quotas: Arc<TenantQuotaManager>) -> Self {
        self.quotas = Some(quotas);
        self
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn snapshots(&self) -> Option<&SnapshotService> {
        self.snapshots.as_ref()
    }

    pub fn quotas(&self) -> Option<&Arc<TenantQuotaManager>> {
        self.quotas.as_ref()
    }

    /// Persist the aggregate's uncommitted events and publish them.
    ///
    /// Returns the committed envelopes (empty when there was nothing to save).
    /// The aggregate is left untouched; call `mark_committed()` afterwards.
    pub fn save<St>(&self, aggregate: &Aggregate<St>) -> Result<Vec<EventEnvelope>, RepositoryError>
    where
        St: AggregateState,
    {
        let events = aggregate.uncommitted_events();
        if events.is_empty() {
            return Ok(vec![]);
        }
        for event in events {
            self.registry.validate(event)?;
        }

        let aggregate_id = *aggregate.id();
        let persisted = aggregate.persisted_version();
        let expected = ExpectedVersion::from_version(persisted);
        let reservation = self.reserve(aggregate, events.len() as u64, persisted == 0)?;

        let _commit = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let committed = match self.store.append(events.to_vec(), expected) {
            Ok(committed) => committed,
            Err(err) => {
                if let Some(reservation) = reservation {
                    reservation.release();
                }
                match &err {
                    EventStoreError::Concurrency { expected, actual, .. } => warn!(
                        aggregate_id = %aggregate_id,
                        expected,
                        actual,
                        "optimistic concurrency conflict"
                    ),
                    other => warn!(aggregate_id = %aggregate_id, error = %other, "append failed"),
                }
                return Err(err.into());
            }
        };

        info!(
            aggregate_id = %aggregate_id,
            aggregate_type = aggregate.aggregate_type(),
            events = committed.len(),
            version = aggregate.version(),
            global_position = committed.last().map(EventEnvelope::global_position),
            "events committed"
        );

        for envelope in &committed {
            self.bus.publish(envelope.clone()).map_err(|err| {
                warn!(
                    aggregate_id = %aggregate_id,
                    global_position = envelope.global_position(),
                    error = ?err,
                    "publish failed after commit"
                );
                RepositoryError::Publish(format!("{err:?}"))
            })?;
        }

        Ok(committed)
    }

    fn reserve<St>(
        &self,
        aggregate: &Aggregate<St>,
        events: u64,
        new_stream: bool,
    ) -> Result<Option<Reservation<'_>>, RepositoryError>
    where
        St: AggregateState,
    {
        let (Some(quotas), Some(tenant_id)) = (&self.quotas, aggregate.metadata().tenant_id) else {
            return Ok(None);
        };

        let mut reservation = Reservation {
            quotas,
            taken: Vec::with_capacity(2),
        };
        let mut wanted = vec![(ResourceType::Events, events)];
        if new_stream {
            wanted.push((ResourceType::Aggregates, 1));
        }
        for (resource, amount) in wanted {
            match quotas.reserve_tenant_quota(tenant_id, resource, amount) {
                Ok(taken) => reservation.taken.push(taken),
                Err(err) => {
                    reservation.release();
                    warn!(tenant_id = %tenant_id, error = %err, "save rejected by quota");
                    return Err(err.into());
                }
            }
        }
        Ok(Some(reservation))
    }

    /// [`save`](Self::save), then snapshot if the snapshot policy asks for it.
    ///
    /// Snapshot failures are logged and reported as `None`; the commit stands.
    pub fn save_with_snapshot<St>(
        &self,
        aggregate: &Aggregate<St>,
    ) -> Result<(Vec<EventEnvelope>, Option<Snapshot>), RepositoryError>
    where
        St: AggregateState + Serialize,
    {
        let committed = self.save(aggregate)?;
        let snapshot = match (&self.snapshots, committed.is_empty()) {
            (Some(snapshots), false) => snapshots.maybe_snapshot(aggregate).unwrap_or_else(|err| {
                warn!(aggregate_id = %aggregate.id(), error = %err, "snapshot after save failed");
                None
            }),
            _ => None,
        };
        Ok((committed, snapshot))
    }

    /// Events with `aggregate_version > from_version`, ascending.
    pub fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<RecordedEvent>, RepositoryError> {
        Ok(self
            .store
            .read_stream(aggregate_id, from_version)?
            .into_iter()
            .map(EventEnvelope::into_event)
            .collect())
    }

    /// Rebuild from the full event stream; `None` if the stream is empty.
    pub fn load<St>(&self, aggregate_id: AggregateId) -> Result<Option<Aggregate<St>>, RepositoryError>
    where
        St: AggregateState,
    {
        let events = self.load_events(aggregate_id, 0)?;
        if events.is_empty() {
            return Ok(None);
        }
        let aggregate = Aggregate::<St>::from_events(events)?;
        debug!(aggregate_id = %aggregate_id, version = aggregate.version(), "aggregate loaded");
        Ok(Some(aggregate))
    }

    /// Rebuild from the latest valid snapshot plus later events, falling back
    /// to full replay when there is no usable snapshot.
    pub fn load_with_snapshot<St>(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<Aggregate<St>>, RepositoryError>
    where
        St: AggregateState + DeserializeOwned,
    {
        Ok(self
            .load_with_source(aggregate_id)?
            .map(|(aggregate, _)| aggregate))
    }

    /// Like [`load_with_snapshot`](Self::load_with_snapshot), also reporting
    /// where the state came from.
    pub fn load_with_source<St>(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<(Aggregate<St>, LoadSource)>, RepositoryError>
    where
        St: AggregateState + DeserializeOwned,
    {
        if let Some(snapshots) = &self.snapshots {
            match self.load_from_snapshot::<St>(snapshots, aggregate_id) {
                Ok(Some((aggregate, version))) => {
                    debug!(
                        aggregate_id = %aggregate_id,
                        snapshot_version = version,
                        version = aggregate.version(),
                        "aggregate loaded from snapshot"
                    );
                    return Ok(Some((aggregate, LoadSource::Snapshot { version })));
                }
                Ok(None) => {}
                Err(err) => warn!(
                    aggregate_id = %aggregate_id,
                    error = %err,
                    "snapshot unusable, falling back to full replay"
                ),
            }
        }

        Ok(self
            .load(aggregate_id)?
            .map(|aggregate| (aggregate, LoadSource::FullReplay)))
    }

    fn load_from_snapshot<St>(
        &self,
        snapshots: &SnapshotService,
        aggregate_id: AggregateId,
    ) -> Result<Option<(Aggregate<St>, u64)>, RepositoryError>
    where
        St: AggregateState + DeserializeOwned,
    {
        let Some(snapshot) = snapshots.load_latest_snapshot(aggregate_id)? else {
            return Ok(None);
        };
        let version = snapshot.aggregate_version;
        let persisted = self.store.stream_version(aggregate_id)?;
        if version > persisted {
            return Err(RepositoryError::Validation(format!(
                "snapshot version {version} is ahead of stream version {persisted}"
            )));
        }

        let mut aggregate = snapshots.restore::<St>(&snapshot)?;
        aggregate.replay(self.load_events(aggregate_id, version)?)?;
        Ok(Some((aggregate, version)))
    }

    /// Every event of an aggregate type, ascending by global position.
    pub fn load_events_by_type(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>, RepositoryError> {
        Ok(self.store.read_by_type(aggregate_type)?)
    }

    /// Persisted version of the aggregate (0 if it has no events).
    pub fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<u64, RepositoryError> {
        Ok(self.store.stream_version(aggregate_id)?)
    }

    /// Up to `limit` events after `after_position` from the global log.
    pub fn read_all(
        &self,
        after_position: u64,
        limit: usize,
    ) -> Result<Vec<EventEnvelope>, RepositoryError> {
        Ok(self.store.read_all(after_position, limit)?)
    }

    /// Subscribe to committed events.
    ///
    /// With `from_position` set, history after that position is loaded from the
    /// store ahead of live delivery; the live queue is registered first so no
    /// commit falls in between, and duplicates are skipped by position.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Result<Subscription, RepositoryError> {
        let from_position = filter.from_position;
        let mut subscription = self.bus.subscribe(filter);

        if let Some(mut after) = from_position {
            let batch = self.stream.catch_up_batch_size.max(1);
            loop {
                let page = self.store.read_all(after, batch)?;
                let Some(last) = page.last().map(EventEnvelope::global_position) else {
                    break;
                };
                let full = page.len() == batch;
                after = last;
                subscription.push_backlog(page);
                if !full {
                    break;
                }
            }
            debug!(
                subscription = %subscription.id(),
                from_position,
                caught_up_to = after,
                "catch-up subscription registered"
            );
        }

        Ok(subscription)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn get_global_position(&self) -> u64 {
        self.store.positions().global()
    }

    pub fn get_stream_position(&self, aggregate_id: AggregateId) -> u64 {
        self.store.positions().stream(aggregate_id)
    }

    /// Build a projection from scratch over the whole global log.
    pub fn rebuild_projection<P>(
        &self,
        projection: P,
    ) -> Result<ProjectionRunner<P>, RepositoryError>
    where
        P: Projection,
    {
        let mut runner = ProjectionRunner::new(projection);
        let batch = self.stream.catch_up_batch_size.max(1);
        loop {
            let page = self.store.read_all(runner.cursor().last_global_position(), batch)?;
            runner.run(page.iter())?;
            if page.len() < batch {
                break;
            }
        }
        info!(
            projection = runner.projection().name(),
            position = runner.cursor().last_global_position(),
            "projection rebuilt"
        );
        Ok(runner)
    }
}
