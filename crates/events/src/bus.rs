//! Event publishing/subscription abstraction.
//!
//! Subscribers register a [`SubscriptionFilter`] and pull matching envelopes in
//! ascending global position from a [`Subscription`].
//!
//! ## Delivery model
//!
//! - **Publish after commit**: only durably appended events are published.
//! - **Isolated bounded queues**: every subscriber owns its own queue, so a slow
//!   or vanished consumer never blocks writers or other subscribers.
//! - **Full queue => drop + lag counter**: when a subscriber's queue is full the
//!   envelope is dropped for that subscriber and its [`Subscription::lagged`]
//!   counter grows. A lagging consumer can resubscribe with `from_position` set
//!   to its last seen position to catch up from the store.
//! - **Exclusive resume**: `from_position = p` delivers positions `> p`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::envelope::EventEnvelope;

/// Identifier of a live subscription on a bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which events a subscriber wants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub aggregate_type: Option<String>,
    pub event_type: Option<String>,
    /// Resume after this global position (exclusive).
    pub from_position: Option<u64>,
}

impl SubscriptionFilter {
    /// Everything, live only.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn from_position(mut self, position: u64) -> Self {
        self.from_position = Some(position);
        self
    }

    /// Type filters only; positions are enforced by the subscription itself.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        self.aggregate_type
            .as_deref()
            .is_none_or(|t| t == envelope.aggregate_type())
            && self
                .event_type
                .as_deref()
                .is_none_or(|t| t == envelope.event_type())
    }
}

/// Cancels a subscription on the bus that created it.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// A live, cancellable, position-resumable pull iterator over envelopes.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    filter: SubscriptionFilter,
    receiver: Receiver<EventEnvelope>,
    backlog: VecDeque<EventEnvelope>,
    last_position: u64,
    lagged: Arc<AtomicU64>,
    bus: Option<Weak<dyn Unsubscribe>>,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        filter: SubscriptionFilter,
        receiver: Receiver<EventEnvelope>,
        lagged: Arc<AtomicU64>,
        bus: Option<Weak<dyn Unsubscribe>>,
    ) -> Self {
        let last_position = filter.from_position.unwrap_or(0);
        Self {
            id,
            filter,
            receiver,
            backlog: VecDeque::new(),
            last_position,
            lagged,
            bus,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Global position of the last envelope handed out (or the resume point).
    pub fn last_position(&self) -> u64 {
        self.last_position
    }

    /// Number of live deliveries dropped because this subscriber's queue was full.
    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    /// Queue historical envelopes (catch-up) ahead of live delivery.
    ///
    /// Envelopes not matching the filter, or at/below the resume point, are ignored.
    pub fn push_backlog(&mut self, envelopes: impl IntoIterator<Item = EventEnvelope>) {
        let mut floor = self
            .backlog
            .back()
            .map(EventEnvelope::global_position)
            .unwrap_or(self.last_position);
        for env in envelopes {
            if env.global_position() > floor && self.filter.matches(&env) {
                floor = env.global_position();
                self.backlog.push_back(env);
            }
        }
    }

    fn accept(&mut self, env: EventEnvelope) -> Option<EventEnvelope> {
        // Live copies of events already delivered from the backlog are skipped.
        if env.global_position() <= self.last_position {
            return None;
        }
        self.last_position = env.global_position();
        Some(env)
    }

    /// Next envelope without blocking.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        while let Some(env) = self.backlog.pop_front() {
            if let Some(env) = self.accept(env) {
                return Some(env);
            }
        }
        loop {
            match self.receiver.try_recv() {
                Ok(env) => {
                    if let Some(env) = self.accept(env) {
                        return Some(env);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Block for up to `timeout` waiting for the next envelope.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<EventEnvelope, RecvTimeoutError> {
        while let Some(env) = self.backlog.pop_front() {
            if let Some(env) = self.accept(env) {
                return Ok(env);
            }
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let env = self.receiver.recv_timeout(remaining)?;
            if let Some(env) = self.accept(env) {
                return Ok(env);
            }
        }
    }

    /// Drain everything currently available without blocking.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Stop receiving. Idempotent; already queued envelopes can still be drained.
    pub fn unsubscribe(&mut self) -> bool {
        match self.bus.take().and_then(|bus| bus.upgrade()) {
            Some(bus) => bus.unsubscribe(self.id),
            None => false,
        }
    }
}

impl Iterator for Subscription {
    type Item = EventEnvelope;

    /// Blocks until the next envelope; ends once the subscription is cancelled
    /// and its queue is empty.
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(env) = self.backlog.pop_front() {
            if let Some(env) = self.accept(env) {
                return Some(env);
            }
        }
        loop {
            let env = self.receiver.recv().ok()?;
            if let Some(env) = self.accept(env) {
                return Some(env);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Position-ordered pub/sub over committed envelopes.
pub trait EventBus: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Fan an envelope out to every matching subscriber. Never blocks on a slow subscriber.
    fn publish(&self, envelope: EventEnvelope) -> Result<(), Self::Error>;

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription;

    /// Idempotent: returns whether a live subscriber was removed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Highest global position published so far (0 when nothing was published).
    fn global_position(&self) -> u64;

    /// Highest stream position published for an aggregate (0 when none).
    fn stream_position(&self, aggregate_id: chronicle_core::AggregateId) -> u64;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, envelope: EventEnvelope) -> Result<(), Self::Error> {
        (**self).publish(envelope)
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        (**self).subscribe(filter)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }

    fn global_position(&self) -> u64 {
        (**self).global_position()
    }

    fn stream_position(&self, aggregate_id: chronicle_core::AggregateId) -> u64 {
        (**self).stream_position(aggregate_id)
    }
}
