//! Event model: typed domain payloads and the immutable recorded form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use chronicle_core::{AggregateId, DomainError, DomainResult, TenantId, UserId};

/// A typed domain event payload.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution via `EVENT_VERSION`)
/// - identified by a stable type tag used for handler dispatch and decoding
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + core::fmt::Debug + Send + Sync + 'static
{
    /// Stable event type identifier (e.g. "account.opened").
    const EVENT_TYPE: &'static str;

    /// Schema version for this event type.
    const EVENT_VERSION: u32 = 1;
}

/// Causal/actor metadata stamped onto every event an aggregate applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub causation_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
}

impl EventMetadata {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }
}

/// An event as applied to an aggregate and persisted in its stream.
///
/// `aggregate_version` is the owning aggregate's version right after this event
/// was applied (the first event of a stream has version 1). Once persisted, a
/// recorded event is never mutated.
///
/// `extra` holds top-level fields written by other producers that this model
/// does not know about; they are carried verbatim so re-encoding is lossless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub aggregate_version: u64,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,

    pub payload: JsonValue,

    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl RecordedEvent {
    /// Build a recorded event from a typed payload.
    pub fn from_typed<E: DomainEvent>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        aggregate_version: u64,
        metadata: &EventMetadata,
        event: &E,
    ) -> DomainResult<Self> {
        let payload = serde_json::to_value(event)?;
        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: E::EVENT_TYPE.to_string(),
            event_version: E::EVENT_VERSION,
            aggregate_version,
            timestamp: Utc::now(),
            causation_id: metadata.causation_id,
            correlation_id: metadata.correlation_id,
            user_id: metadata.user_id,
            tenant_id: metadata.tenant_id,
            payload,
            extra: BTreeMap::new(),
        })
    }

    /// Decode the payload into a typed event, checking the type tag first.
    pub fn decode_payload<E: DomainEvent>(&self) -> DomainResult<E> {
        if self.event_type != E::EVENT_TYPE {
            return Err(DomainError::validation(format!(
                "event type '{}' cannot be decoded as '{}'",
                self.event_type,
                E::EVENT_TYPE
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn metadata(&self) -> EventMetadata {
        EventMetadata {
            causation_id: self.causation_id,
            correlation_id: self.correlation_id,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
        }
    }
}
