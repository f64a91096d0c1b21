use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chronicle_core::{AggregateId, ExpectedVersion};
use chronicle_events::{EventCodec, EventEnvelope, PositionCounters, RecordedEvent};

use super::r#trait::{EventStore, EventStoreError};

#[derive(Debug)]
struct StoredRecord {
    global_position: u64,
    /// Canonical encoding, so reads go through the same decode path as a real backend.
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Stream {
    aggregate_type: String,
    /// Indexes into the global log, in version order.
    entries: Vec<usize>,
}

#[derive(Debug, Default)]
struct StoreState {
    log: Vec<StoredRecord>,
    streams: HashMap<AggregateId, Stream>,
    by_type: HashMap<String, Vec<usize>>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: RwLock<StoreState>,
    codec: EventCodec,
    counters: Arc<PositionCounters>,
    unavailable: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose encode/decode path validates registered payloads.
    pub fn with_codec(codec: EventCodec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    /// Simulate a backend outage: every call fails with `Storage` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw encoded bytes of the event at a global position.
    pub fn raw_event(&self, global_position: u64) -> Option<Vec<u8>> {
        let state = self.state.read().ok()?;
        let idx = usize::try_from(global_position.checked_sub(1)?).ok()?;
        state.log.get(idx).map(|r| r.bytes.clone())
    }

    fn ensure_available(&self) -> Result<(), EventStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Storage("backend unavailable".to_string()));
        }
        Ok(())
    }

    fn decode(&self, record: &StoredRecord) -> Result<EventEnvelope, EventStoreError> {
        let event = self
            .codec
            .decode(&record.bytes)
            .map_err(|e| EventStoreError::Storage(format!("corrupt record: {e}")))?;
        Ok(EventEnvelope::new(record.global_position, event))
    }

    fn read_indexes<'a>(
        &self,
        state: &StoreState,
        indexes: impl IntoIterator<Item = &'a usize>,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        indexes
            .into_iter()
            .map(|&idx| self.decode(&state.log[idx]))
            .collect()
    }

    fn validate_batch(events: &[RecordedEvent]) -> Result<(), EventStoreError> {
        let first = &events[0];
        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != first.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
            let expected = u64::try_from(idx)
                .ok()
                .and_then(|offset| first.aggregate_version.checked_add(offset));
            if expected != Some(e.aggregate_version) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch versions are not contiguous (index {idx})"
                )));
            }
        }
        Ok(())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<RecordedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        self.ensure_available()?;
        if events.is_empty() {
            return Ok(vec![]);
        }
        Self::validate_batch(&events)?;

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        // Encode before taking the lock so a bad payload cannot leave a partial batch.
        let encoded = events
            .iter()
            .map(|e| {
                self.codec
                    .encode(e)
                    .map_err(|err| EventStoreError::InvalidAppend(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self
            .state
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        let current = state
            .streams
            .get(&aggregate_id)
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency {
                aggregate_id,
                expected: expected_version.as_version().unwrap_or(current),
                actual: current,
            });
        }

        if let Some(stream) = state.streams.get(&aggregate_id) {
            if stream.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    stream.aggregate_type, aggregate_type
                )));
            }
        }

        if events[0].aggregate_version != current + 1 {
            return Err(EventStoreError::InvalidAppend(format!(
                "first event has version {}, stream is at {current}",
                events[0].aggregate_version
            )));
        }

        // Assign global positions and append (append-only).
        let mut committed = Vec::with_capacity(events.len());
        for (event, bytes) in events.into_iter().zip(encoded) {
            let idx = state.log.len();
            let global_position = idx as u64 + 1;
            state.log.push(StoredRecord {
                global_position,
                bytes,
            });
            let stream = state.streams.entry(aggregate_id).or_default();
            stream.aggregate_type.clone_from(&aggregate_type);
            stream.entries.push(idx);
            state
                .by_type
                .entry(aggregate_type.clone())
                .or_default()
                .push(idx);

            self.counters
                .advance(global_position, aggregate_id, event.aggregate_version);
            committed.push(EventEnvelope::new(global_position, event));
        }

        Ok(committed)
    }

    fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        self.ensure_available()?;
        let state = self
            .state
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        let Some(stream) = state.streams.get(&aggregate_id) else {
            return Ok(vec![]);
        };
        // Version v lives at entries[v - 1]; exclusive lower bound.
        let skip = usize::try_from(from_version).unwrap_or(usize::MAX);
        self.read_indexes(&state, stream.entries.iter().skip(skip))
    }

    fn read_by_type(&self, aggregate_type: &str) -> Result<Vec<EventEnvelope>, EventStoreError> {
        self.ensure_available()?;
        let state = self
            .state
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        match state.by_type.get(aggregate_type) {
            Some(indexes) => self.read_indexes(&state, indexes),
            None => Ok(vec![]),
        }
    }

    fn read_all(
        &self,
        after_position: u64,
        limit: usize,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        self.ensure_available()?;
        let state = self
            .state
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        let start = usize::try_from(after_position).unwrap_or(usize::MAX);
        state
            .log
            .iter()
            .skip(start)
            .take(limit)
            .map(|r| self.decode(r))
            .collect()
    }

    fn stream_version(&self, aggregate_id: AggregateId) -> Result<u64, EventStoreError> {
        self.ensure_available()?;
        let state = self
            .state
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(state
            .streams
            .get(&aggregate_id)
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0))
    }

    fn positions(&self) -> Arc<PositionCounters> {
        Arc::clone(&self.counters)
    }
}
