use serde::{Deserialize, Serialize};

use chronicle_core::{AggregateId, TenantId};

use crate::event::RecordedEvent;

/// A committed event together with its stream positions.
///
/// This is the unit delivered to subscribers and projections.
///
/// Notes:
/// - `global_position` is a total order across every stream in the store (starts at 1).
/// - `stream_position` is the order within the aggregate's own stream and equals
///   the event's `aggregate_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    global_position: u64,
    stream_position: u64,
    event: RecordedEvent,
}

impl EventEnvelope {
    pub fn new(global_position: u64, event: RecordedEvent) -> Self {
        Self {
            global_position,
            stream_position: event.aggregate_version,
            event,
        }
    }

    pub fn global_position(&self) -> u64 {
        self.global_position
    }

    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.event.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.event.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.event.tenant_id
    }

    pub fn event(&self) -> &RecordedEvent {
        &self.event
    }

    pub fn into_event(self) -> RecordedEvent {
        self.event
    }
}
