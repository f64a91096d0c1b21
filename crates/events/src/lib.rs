//! `chronicle-events`: the event & aggregate model and the stream bus.
//!
//! Pure mechanics: no storage, no IO. Persistence lives in `chronicle-infra`.

pub mod aggregate;
pub mod bus;
pub mod codec;
pub mod envelope;
pub mod event;
pub mod projection;
pub mod registry;
pub mod runner;
pub mod stream_bus;

pub use aggregate::{Aggregate, AggregateState, HandlerTable, HandlerTableBuilder};
pub use bus::{EventBus, Subscription, SubscriptionFilter, SubscriptionId, Unsubscribe};
pub use codec::EventCodec;
pub use envelope::EventEnvelope;
pub use event::{DomainEvent, EventMetadata, RecordedEvent};
pub use projection::Projection;
pub use registry::{EventRegistry, EventSchema, GenericEvent, ResolvedEvent};
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
pub use stream_bus::{DEFAULT_SUBSCRIBER_CAPACITY, EventStreamBus, PositionCounters, StreamBusError};
