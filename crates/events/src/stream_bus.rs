//! In-process event stream bus.
//!
//! - No IO / no async
//! - Fan-out to isolated bounded queues (`sync_channel`)
//! - Full queue: drop for that subscriber and bump its lag counter
//! - Dead subscribers are pruned while publishing

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use thiserror::Error;
use tracing::{debug, warn};

use chronicle_core::AggregateId;

use crate::bus::{EventBus, Subscription, SubscriptionFilter, SubscriptionId, Unsubscribe};
use crate::envelope::EventEnvelope;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Global and per-stream position counters.
///
/// The storage backend advances these while committing; the bus reads them (and
/// advances them monotonically on publish when it is not sharing the backend's
/// counters).
#[derive(Debug, Default)]
pub struct PositionCounters {
    global: AtomicU64,
    streams: RwLock<HashMap<AggregateId, u64>>,
}

impl PositionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self) -> u64 {
        self.global.load(Ordering::Acquire)
    }

    pub fn stream(&self, aggregate_id: AggregateId) -> u64 {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&aggregate_id)
            .copied()
            .unwrap_or(0)
    }

    /// Move counters forward; never moves them back.
    pub fn advance(&self, global_position: u64, aggregate_id: AggregateId, stream_position: u64) {
        self.global.fetch_max(global_position, Ordering::AcqRel);
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        let current = streams.entry(aggregate_id).or_insert(0);
        if stream_position > *current {
            *current = stream_position;
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("subscriber registry lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Subscriber {
    filter: SubscriptionFilter,
    sender: SyncSender<EventEnvelope>,
    lagged: Arc<AtomicU64>,
}

#[derive(Debug)]
struct BusInner {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
    counters: Arc<PositionCounters>,
}

impl Unsubscribe for BusInner {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(subscription = %id, "subscription cancelled");
        }
        removed
    }
}

/// Cloneable handle to a shared in-process bus.
#[derive(Debug, Clone)]
pub struct EventStreamBus {
    inner: Arc<BusInner>,
}

impl Default for EventStreamBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl EventStreamBus {
    /// Bus with its own position counters.
    pub fn new(subscriber_capacity: usize) -> Self {
        Self::with_counters(subscriber_capacity, Arc::new(PositionCounters::new()))
    }

    /// Bus reading the same counters the storage backend assigns positions from.
    pub fn with_counters(subscriber_capacity: usize, counters: Arc<PositionCounters>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: subscriber_capacity.max(1),
                counters,
            }),
        }
    }

    pub fn counters(&self) -> &Arc<PositionCounters> {
        &self.inner.counters
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventBus for EventStreamBus {
    type Error = StreamBusError;

    fn publish(&self, envelope: EventEnvelope) -> Result<(), Self::Error> {
        self.inner.counters.advance(
            envelope.global_position(),
            envelope.aggregate_id(),
            envelope.stream_position(),
        );

        let mut subs = self
            .inner
            .subscribers
            .lock()
            .map_err(|_| StreamBusError::Poisoned)?;

        subs.retain(|id, sub| {
            if !sub.filter.matches(&envelope) {
                return true;
            }
            if sub
                .filter
                .from_position
                .is_some_and(|p| envelope.global_position() <= p)
            {
                return true;
            }
            match sub.sender.try_send(envelope.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    let lagged = sub.lagged.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        subscription = %id,
                        global_position = envelope.global_position(),
                        lagged,
                        "subscriber queue full, dropping event"
                    );
                    true
                }
                // Receiver dropped: prune.
                Err(TrySendError::Disconnected(_)) => false,
            }
        });

        Ok(())
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::sync_channel(self.inner.capacity);
        let lagged = Arc::new(AtomicU64::new(0));

        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    filter: filter.clone(),
                    sender: tx,
                    lagged: Arc::clone(&lagged),
                },
            );
        debug!(subscription = %id, ?filter, "subscription registered");

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        let weak: Weak<dyn Unsubscribe> = weak;
        Subscription::new(id, filter, rx, lagged, Some(weak))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    fn global_position(&self) -> u64 {
        self.inner.counters.global()
    }

    fn stream_position(&self, aggregate_id: AggregateId) -> u64 {
        self.inner.counters.stream(aggregate_id)
    }
}
