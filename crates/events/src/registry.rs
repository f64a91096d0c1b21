//! Event registry: event-type identifiers mapped to payload schemas.
//!
//! The registry is an explicit object handed to the components that decode
//! events (codec, repository). There is no process-wide registry.
//!
//! Decoding an event whose type is not registered never fails and never drops
//! data: it resolves to a [`GenericEvent`] that carries the payload verbatim.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use chronicle_core::{DomainError, DomainResult};

use crate::event::{DomainEvent, RecordedEvent};

type Validator = fn(&JsonValue) -> Result<(), serde_json::Error>;

fn validate_as<E: DomainEvent>(payload: &JsonValue) -> Result<(), serde_json::Error> {
    E::deserialize(payload).map(|_| ())
}

/// Schema entry for one registered event type.
#[derive(Debug, Clone, Copy)]
pub struct EventSchema {
    event_type: &'static str,
    event_version: u32,
    validate: Validator,
}

impl EventSchema {
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    /// Check that a payload conforms to this schema.
    pub fn validate(&self, payload: &JsonValue) -> DomainResult<()> {
        (self.validate)(payload).map_err(|e| {
            DomainError::validation(format!(
                "payload does not match schema '{}' v{}: {e}",
                self.event_type, self.event_version
            ))
        })
    }
}

/// Fallback view of an event whose type is not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericEvent {
    pub event_type: String,
    pub event_version: u32,
    pub payload: JsonValue,
}

impl GenericEvent {
    /// Look up a top-level payload field (object payloads only).
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.payload.as_object().and_then(|m| m.get(name))
    }

    pub fn into_payload(self) -> JsonValue {
        self.payload
    }
}

/// Outcome of resolving a recorded event against the registry.
#[derive(Debug, Clone)]
pub enum ResolvedEvent<'a> {
    Registered {
        schema: EventSchema,
        event: &'a RecordedEvent,
    },
    Generic(GenericEvent),
}

impl ResolvedEvent<'_> {
    pub fn is_registered(&self) -> bool {
        matches!(self, ResolvedEvent::Registered { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    schemas: HashMap<&'static str, EventSchema>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload schema. Registering the same type twice is rejected.
    pub fn register<E: DomainEvent>(&mut self) -> DomainResult<()> {
        if self.schemas.contains_key(E::EVENT_TYPE) {
            return Err(DomainError::validation(format!(
                "event type '{}' is already registered",
                E::EVENT_TYPE
            )));
        }
        self.schemas.insert(
            E::EVENT_TYPE,
            EventSchema {
                event_type: E::EVENT_TYPE,
                event_version: E::EVENT_VERSION,
                validate: validate_as::<E>,
            },
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<E: DomainEvent>(mut self) -> DomainResult<Self> {
        self.register::<E>()?;
        Ok(self)
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.schemas.contains_key(event_type)
    }

    pub fn schema(&self, event_type: &str) -> Option<EventSchema> {
        self.schemas.get(event_type).copied()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Validate a registered event's payload; unregistered events pass as-is.
    pub fn validate(&self, event: &RecordedEvent) -> DomainResult<()> {
        match self.schemas.get(event.event_type.as_str()) {
            Some(schema) => schema.validate(&event.payload),
            None => Ok(()),
        }
    }

    pub fn resolve<'a>(&self, event: &'a RecordedEvent) -> DomainResult<ResolvedEvent<'a>> {
        match self.schemas.get(event.event_type.as_str()) {
            Some(schema) => {
                schema.validate(&event.payload)?;
                Ok(ResolvedEvent::Registered {
                    schema: *schema,
                    event,
                })
            }
            None => Ok(ResolvedEvent::Generic(GenericEvent {
                event_type: event.event_type.clone(),
                event_version: event.event_version,
                payload: event.payload.clone(),
            })),
        }
    }

    /// Decode a registered event into its typed payload.
    pub fn decode<E: DomainEvent>(&self, event: &RecordedEvent) -> DomainResult<E> {
        if !self.is_registered(E::EVENT_TYPE) {
            return Err(DomainError::validation(format!(
                "event type '{}' is not registered",
                E::EVENT_TYPE
            )));
        }
        event.decode_payload::<E>()
    }
}
