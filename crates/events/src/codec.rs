//! Canonical byte encoding of recorded events.
//!
//! Encoding is JSON with a fixed field order (struct order, then unknown
//! top-level fields sorted by key), so `encode(decode(bytes)) == bytes` for any
//! bytes this codec produced, including fields of unregistered event types.

use std::sync::Arc;

use chronicle_core::DomainResult;

use crate::event::RecordedEvent;
use crate::registry::EventRegistry;

#[derive(Debug, Clone, Default)]
pub struct EventCodec {
    registry: Arc<EventRegistry>,
}

impl EventCodec {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn encode(&self, event: &RecordedEvent) -> DomainResult<Vec<u8>> {
        self.registry.validate(event)?;
        Ok(serde_json::to_vec(event)?)
    }

    pub fn decode(&self, bytes: &[u8]) -> DomainResult<RecordedEvent> {
        let event: RecordedEvent = serde_json::from_slice(bytes)?;
        self.registry.validate(&event)?;
        Ok(event)
    }
}
