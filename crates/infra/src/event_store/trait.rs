use std::sync::Arc;

use thiserror::Error;

use chronicle_core::{AggregateId, ExpectedVersion};
use chronicle_events::{EventEnvelope, PositionCounters, RecordedEvent};

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, batch shape) as
/// opposed to model errors (validation, unhandled events).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error(
        "optimistic concurrency check failed for {aggregate_id}: expected version {expected}, found {actual}"
    )]
    Concurrency {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// Backend I/O failure. Surfaced, never retried internally.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Append-only event storage backend.
///
/// ## Append semantics
///
/// `append()`:
/// - requires all events to target one aggregate stream (same id and type)
/// - checks the optimistic concurrency expectation against the stream version
/// - requires `aggregate_version`s to continue the stream contiguously
/// - assigns global positions in batch order
/// - persists the batch atomically (all or nothing)
///
/// ## Read semantics
///
/// `read_stream(id, from_version)` is **exclusive**: it returns events with
/// `aggregate_version > from_version` in ascending order, so `from_version = 0`
/// yields the whole stream and an unknown stream yields nothing.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<RecordedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<EventEnvelope>, EventStoreError>;

    fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<EventEnvelope>, EventStoreError>;

    /// Every event of an aggregate type, in ascending global position.
    fn read_by_type(&self, aggregate_type: &str) -> Result<Vec<EventEnvelope>, EventStoreError>;

    /// Global log scan: up to `limit` events with position `> after_position`.
    fn read_all(&self, after_position: u64, limit: usize)
    -> Result<Vec<EventEnvelope>, EventStoreError>;

    /// Current persisted version of a stream (0 if it does not exist).
    fn stream_version(&self, aggregate_id: AggregateId) -> Result<u64, EventStoreError>;

    /// Counters the backend assigns positions from.
    fn positions(&self) -> Arc<PositionCounters>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<RecordedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        (**self).read_stream(aggregate_id, from_version)
    }

    fn read_by_type(&self, aggregate_type: &str) -> Result<Vec<EventEnvelope>, EventStoreError> {
        (**self).read_by_type(aggregate_type)
    }

    fn read_all(
        &self,
        after_position: u64,
        limit: usize,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        (**self).read_all(after_position, limit)
    }

    fn stream_version(&self, aggregate_id: AggregateId) -> Result<u64, EventStoreError> {
        (**self).stream_version(aggregate_id)
    }

    fn positions(&self) -> Arc<PositionCounters> {
        (**self).positions()
    }
}
