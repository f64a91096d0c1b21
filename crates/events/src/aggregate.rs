//! Event-sourced aggregates: typed handler tables and deterministic replay.
//!
//! Every aggregate type declares, up front, which event types it handles and
//! with which typed function (`AggregateState::handlers`). The table is checked
//! when it is built, so a duplicate registration is a startup error, and an
//! event without a handler is rejected the moment it is applied or replayed.
//!
//! `apply` and replay share one dispatch path: a freshly applied event goes
//! through the same payload decoding as a replayed one, so the state reached by
//! applying N events always equals the state reached by replaying them.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_core::{AggregateId, AggregateRoot, DomainError, DomainResult};

use crate::event::{DomainEvent, EventMetadata, RecordedEvent};

type Handler<S> = Box<dyn Fn(&mut S, &RecordedEvent) -> DomainResult<()> + Send + Sync>;

/// Mapping from event-type tag to the handler that evolves state `S`.
pub struct HandlerTable<S> {
    aggregate_type: &'static str,
    handlers: HashMap<&'static str, Handler<S>>,
}

impl<S> HandlerTable<S> {
    pub fn builder(aggregate_type: &'static str) -> HandlerTableBuilder<S> {
        HandlerTableBuilder {
            aggregate_type,
            handlers: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    fn dispatch(&self, state: &mut S, event: &RecordedEvent) -> DomainResult<()> {
        let handler = self
            .handlers
            .get(event.event_type.as_str())
            .ok_or_else(|| DomainError::unhandled(self.aggregate_type, event.event_type.clone()))?;
        handler(state, event)
    }
}

impl<S> core::fmt::Debug for HandlerTable<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerTable")
            .field("aggregate_type", &self.aggregate_type)
            .field("event_types", &types)
            .finish()
    }
}

pub struct HandlerTableBuilder<S> {
    aggregate_type: &'static str,
    handlers: HashMap<&'static str, Handler<S>>,
    duplicates: Vec<&'static str>,
}

impl<S: 'static> HandlerTableBuilder<S> {
    /// Register the handler for event type `E`.
    pub fn on<E, F>(mut self, handler: F) -> Self
    where
        E: DomainEvent,
        F: Fn(&mut S, &E) + Send + Sync + 'static,
    {
        let erased: Handler<S> = Box::new(move |state, recorded| {
            // Decode before touching state: a bad payload leaves the aggregate as it was.
            let event = recorded.decode_payload::<E>()?;
            handler(state, &event);
            Ok(())
        });
        if self.handlers.insert(E::EVENT_TYPE, erased).is_some() {
            self.duplicates.push(E::EVENT_TYPE);
        }
        self
    }

    pub fn build(self) -> DomainResult<HandlerTable<S>> {
        if !self.duplicates.is_empty() {
            return Err(DomainError::validation(format!(
                "aggregate '{}' registers more than one handler for: {}",
                self.aggregate_type,
                self.duplicates.join(", ")
            )));
        }
        Ok(HandlerTable {
            aggregate_type: self.aggregate_type,
            handlers: self.handlers,
        })
    }
}

/// State of an event-sourced aggregate type.
///
/// Implementations must be deterministic: handlers may only mutate `self`.
pub trait AggregateState: Default + Send + Sync + 'static {
    /// Stable aggregate type identifier (e.g. "account").
    const AGGREGATE_TYPE: &'static str;

    /// Declare the handled event types.
    fn handlers() -> HandlerTableBuilder<Self>;

    /// Build and validate the handler table.
    fn handler_table() -> DomainResult<HandlerTable<Self>> {
        Self::handlers().build()
    }
}

/// An aggregate instance: identity, version, typed state and pending events.
pub struct Aggregate<S: AggregateState> {
    id: AggregateId,
    version: u64,
    state: S,
    uncommitted: Vec<RecordedEvent>,
    is_new: bool,
    metadata: EventMetadata,
    handlers: Arc<HandlerTable<S>>,
}

impl<S: AggregateState> Aggregate<S> {
    /// A brand-new aggregate (version 0, nothing persisted).
    pub fn new(id: AggregateId) -> DomainResult<Self> {
        Ok(Self::with_handlers(id, Arc::new(S::handler_table()?)))
    }

    /// Like [`new`](Self::new), sharing an already validated handler table.
    pub fn with_handlers(id: AggregateId, handlers: Arc<HandlerTable<S>>) -> Self {
        Self {
            id,
            version: 0,
            state: S::default(),
            uncommitted: Vec::new(),
            is_new: true,
            metadata: EventMetadata::default(),
            handlers,
        }
    }

    /// Rebuild from an ordered event sequence; the first event fixes identity.
    pub fn from_events(events: impl IntoIterator<Item = RecordedEvent>) -> DomainResult<Self> {
        Self::from_events_with(Arc::new(S::handler_table()?), events)
    }

    pub fn from_events_with(
        handlers: Arc<HandlerTable<S>>,
        events: impl IntoIterator<Item = RecordedEvent>,
    ) -> DomainResult<Self> {
        let mut events = events.into_iter().peekable();
        let first = events
            .peek()
            .ok_or_else(|| DomainError::validation("cannot rebuild an aggregate from no events"))?;

        let mut aggregate = Self::with_handlers(first.aggregate_id, handlers);
        aggregate.metadata.tenant_id = first.tenant_id;
        aggregate.is_new = false;
        aggregate.replay(events)?;
        Ok(aggregate)
    }

    /// Restore from snapshotted state at `version`; replay later events with [`replay`](Self::replay).
    pub fn from_snapshot(id: AggregateId, version: u64, state: S) -> DomainResult<Self> {
        let mut aggregate = Self::new(id)?;
        aggregate.version = version;
        aggregate.state = state;
        aggregate.is_new = false;
        Ok(aggregate)
    }

    /// Replay persisted events on top of the current state.
    pub fn replay(&mut self, events: impl IntoIterator<Item = RecordedEvent>) -> DomainResult<()> {
        if !self.uncommitted.is_empty() {
            return Err(DomainError::validation(
                "cannot replay history onto an aggregate with uncommitted events",
            ));
        }
        for event in events {
            self.replay_one(&event)?;
        }
        Ok(())
    }

    fn replay_one(&mut self, event: &RecordedEvent) -> DomainResult<()> {
        if event.aggregate_id != self.id {
            return Err(DomainError::validation(format!(
                "event {} belongs to aggregate {}, not {}",
                event.event_id, event.aggregate_id, self.id
            )));
        }
        if event.aggregate_type != S::AGGREGATE_TYPE {
            return Err(DomainError::validation(format!(
                "event {} has aggregate type '{}', expected '{}'",
                event.event_id,
                event.aggregate_type,
                S::AGGREGATE_TYPE
            )));
        }
        if event.aggregate_version != self.version + 1 {
            return Err(DomainError::validation(format!(
                "out-of-order event: expected version {}, found {}",
                self.version + 1,
                event.aggregate_version
            )));
        }

        self.handlers.dispatch(&mut self.state, event)?;
        self.version += 1;
        Ok(())
    }

    /// Apply a new domain event: stamp metadata, evolve state, queue for save.
    pub fn apply<E: DomainEvent>(&mut self, event: E) -> DomainResult<&RecordedEvent> {
        if !self.handlers.handles(E::EVENT_TYPE) {
            return Err(DomainError::unhandled(S::AGGREGATE_TYPE, E::EVENT_TYPE));
        }

        let recorded = RecordedEvent::from_typed(
            self.id,
            S::AGGREGATE_TYPE,
            self.version + 1,
            &self.metadata,
            &event,
        )?;
        self.handlers.dispatch(&mut self.state, &recorded)?;
        self.version += 1;
        self.uncommitted.push(recorded);

        Ok(&self.uncommitted[self.uncommitted.len() - 1])
    }

    /// Clear the uncommitted buffer after a successful save.
    ///
    /// Until this is called, saving the same instance again is detected as a
    /// concurrency conflict.
    pub fn mark_committed(&mut self) -> Vec<RecordedEvent> {
        self.is_new = false;
        std::mem::take(&mut self.uncommitted)
    }

    pub fn aggregate_type(&self) -> &'static str {
        S::AGGREGATE_TYPE
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn uncommitted_events(&self) -> &[RecordedEvent] {
        &self.uncommitted
    }

    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Version the persisted stream must be at for these uncommitted events to follow.
    pub fn persisted_version(&self) -> u64 {
        self.version - self.uncommitted.len() as u64
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: EventMetadata) {
        self.metadata = metadata;
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn handlers(&self) -> &Arc<HandlerTable<S>> {
        &self.handlers
    }
}

impl<S: AggregateState> AggregateRoot for Aggregate<S> {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl<S: AggregateState + Clone> Clone for Aggregate<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            version: self.version,
            state: self.state.clone(),
            uncommitted: self.uncommitted.clone(),
            is_new: self.is_new,
            metadata: self.metadata.clone(),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<S: AggregateState + core::fmt::Debug> core::fmt::Debug for Aggregate<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Aggregate")
            .field("id", &self.id)
            .field("aggregate_type", &S::AGGREGATE_TYPE)
            .field("version", &self.version)
            .field("is_new", &self.is_new)
            .field("uncommitted", &self.uncommitted.len())
            .field("state", &self.state)
            .finish()
    }
}
