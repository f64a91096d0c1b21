use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use chronicle_core::TenantId;

use super::store::{QuotaRecord, QuotaStore};
use super::{QuotaError, QuotaTier, ResourceLimits, ResourceType};
use crate::clock::{Clock, system_clock};

/// Low bits of the packed `events` slot hold the count, high bits the day.
const WINDOW_DAY_SHIFT: u32 = 40;
const WINDOW_COUNT_MAX: u64 = (1 << WINDOW_DAY_SHIFT) - 1;
const WINDOW_DAY_MAX: u64 = u64::MAX >> WINDOW_DAY_SHIFT;

fn day_number(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.date_naive().num_days_from_ce())
        .unwrap_or(0)
        .min(WINDOW_DAY_MAX)
}

/// Daily `events` usage and the UTC day it belongs to, stored in one atomic
/// word so a rollover and a reservation cannot interleave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventsWindow {
    day: u64,
    count: u64,
}

impl EventsWindow {
    fn unpack(raw: u64) -> Self {
        Self {
            day: raw >> WINDOW_DAY_SHIFT,
            count: raw & WINDOW_COUNT_MAX,
        }
    }

    fn pack(self) -> u64 {
        (self.day << WINDOW_DAY_SHIFT) | self.count.min(WINDOW_COUNT_MAX)
    }

    /// The window as seen on `today`: an earlier day counts as empty.
    fn on(self, today: u64) -> Self {
        if self.day < today {
            Self { day: today, count: 0 }
        } else {
            self
        }
    }
}

#[derive(Debug)]
struct TenantCounters {
    /// One slot per resource; the `events` slot is a packed [`EventsWindow`].
    usage: [AtomicU64; ResourceType::ALL.len()],
    limits: RwLock<ResourceLimits>,
}

impl TenantCounters {
    fn new(limits: ResourceLimits, today: u64) -> Self {
        let counters = Self {
            usage: Default::default(),
            limits: RwLock::new(limits),
        };
        counters.store(ResourceType::Events, today, 0);
        counters
    }

    fn slot(&self, resource: ResourceType) -> &AtomicU64 {
        &self.usage[resource.index()]
    }

    fn limit(&self, resource: ResourceType) -> Option<u64> {
        self.limits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .limit(resource)
    }

    fn load(&self, resource: ResourceType, today: u64) -> u64 {
        let raw = self.slot(resource).load(Ordering::Acquire);
        match resource {
            ResourceType::Events => EventsWindow::unpack(raw).on(today).count,
            _ => raw,
        }
    }

    fn store(&self, resource: ResourceType, today: u64, value: u64) {
        let raw = match resource {
            ResourceType::Events => EventsWindow { day: today, count: value }.pack(),
            _ => value,
        };
        self.slot(resource).store(raw, Ordering::Release);
    }

    /// CAS loop moving one counter from `current` to `next(current, day)`.
    ///
    /// `day` is the window the `events` count belongs to (`today` for every
    /// other resource). Returns the new value and that day, or the current
    /// value when `next` declines. `events` counts saturate at 2^40 - 1.
    fn update(
        &self,
        resource: ResourceType,
        today: u64,
        next: impl Fn(u64, u64) -> Option<u64>,
    ) -> Result<(u64, u64), u64> {
        let slot = self.slot(resource);
        let mut raw = slot.load(Ordering::Acquire);
        loop {
            let (current, day, next_raw) = match resource {
                ResourceType::Events => {
                    let window = EventsWindow::unpack(raw).on(today);
                    let count = next(window.count, window.day)
                        .ok_or(window.count)?
                        .min(WINDOW_COUNT_MAX);
                    (count, window.day, EventsWindow { count, ..window }.pack())
                }
                _ => {
                    let value = next(raw, today).ok_or(raw)?;
                    (value, today, value)
                }
            };
            match slot.compare_exchange_weak(raw, next_raw, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok((current, day)),
                Err(actual) => raw = actual,
            }
        }
    }

    fn usage(&self, today: u64) -> [u64; ResourceType::ALL.len()] {
        ResourceType::ALL.map(|resource| self.load(resource, today))
    }
}

/// Quota taken by [`TenantQuotaManager::reserve_tenant_quota`].
///
/// Hand it back to [`TenantQuotaManager::release_tenant_usage`] if the work
/// it paid for did not happen. An `events` reservation only releases into
/// the daily window it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct QuotaReservation {
    tenant_id: TenantId,
    resource: ResourceType,
    amount: u64,
    usage: u64,
    day: u64,
}

impl QuotaReservation {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Usage right after the reservation was taken.
    pub fn usage(&self) -> u64 {
        self.usage
    }
}

/// Point-in-time copy of one tenant's counters and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantUsage {
    pub tenant_id: TenantId,
    pub limits: ResourceLimits,
    usage: [u64; ResourceType::ALL.len()],
}

impl TenantUsage {
    pub fn get(&self, resource: ResourceType) -> u64 {
        self.usage[resource.index()]
    }

    /// Remaining headroom, `None` when unlimited.
    pub fn remaining(&self, resource: ResourceType) -> Option<u64> {
        self.limits
            .limit(resource)
            .map(|limit| limit.saturating_sub(self.get(resource)))
    }
}

/// In-memory, lock-free per-tenant usage accounting.
///
/// `check_tenant_quota` followed by `record_tenant_usage` is not atomic: two
/// callers can both pass the check and together overshoot the limit. Use
/// [`reserve_tenant_quota`](Self::reserve_tenant_quota) when that matters.
///
/// Read-only calls never register a tenant; unknown tenants read as zero
/// usage under the default limits.
pub struct TenantQuotaManager {
    tenants: DashMap<TenantId, Arc<TenantCounters>>,
    default_limits: ResourceLimits,
    store: Option<Arc<dyn QuotaStore>>,
    clock: Clock,
}

impl core::fmt::Debug for TenantQuotaManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantQuotaManager")
            .field("tenants", &self.tenants.len())
            .field("default_limits", &self.default_limits)
            .field("durable", &self.store.is_some())
            .finish()
    }
}

impl Default for TenantQuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantQuotaManager {
    /// Manager where unprovisioned tenants are unlimited.
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            default_limits: ResourceLimits::unlimited(),
            store: None,
            clock: system_clock(),
        }
    }

    /// Limits applied to tenants seen before they are provisioned.
    pub fn with_default_limits(mut self, limits: ResourceLimits) -> Self {
        self.default_limits = limits;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn QuotaStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn today(&self) -> u64 {
        day_number((self.clock)())
    }

    /// Counters for a tenant, registering it on first use.
    fn counters(&self, tenant_id: TenantId) -> Arc<TenantCounters> {
        Arc::clone(
            self.tenants
                .entry(tenant_id)
                .or_insert_with(|| Arc::new(TenantCounters::new(self.default_limits, self.today())))
                .value(),
        )
    }

    fn existing(&self, tenant_id: TenantId) -> Option<Arc<TenantCounters>> {
        self.tenants.get(&tenant_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn set_tenant_limits(&self, tenant_id: TenantId, limits: ResourceLimits) {
        let counters = self.counters(tenant_id);
        *counters.limits.write().unwrap_or_else(PoisonError::into_inner) = limits;
        info!(tenant_id = %tenant_id, ?limits, "tenant limits set");
    }

    pub fn set_tenant_tier(&self, tenant_id: TenantId, tier: QuotaTier) {
        self.set_tenant_limits(tenant_id, tier.limits());
    }

    pub fn tenant_limits(&self, tenant_id: TenantId) -> ResourceLimits {
        match self.tenants.get(&tenant_id) {
            Some(counters) => *counters.limits.read().unwrap_or_else(PoisonError::into_inner),
            None => self.default_limits,
        }
    }

    /// Read-only pre-flight: would `amount` more fit under the limit?
    pub fn check_tenant_quota(
        &self,
        tenant_id: TenantId,
        resource: ResourceType,
        amount: u64,
    ) -> Result<(), QuotaError> {
        let (limit, current) = match self.existing(tenant_id) {
            Some(counters) => (counters.limit(resource), counters.load(resource, self.today())),
            None => (self.default_limits.limit(resource), 0),
        };
        let Some(limit) = limit else {
            return Ok(());
        };
        if current.saturating_add(amount) > limit {
            return Err(QuotaError::Exceeded {
                tenant_id,
                resource,
                limit,
                current,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Unconditional atomic add. Returns the new usage.
    pub fn record_tenant_usage(&self, tenant_id: TenantId, resource: ResourceType, amount: u64) -> u64 {
        let counters = self.counters(tenant_id);
        match counters.update(resource, self.today(), |current, _| {
            Some(current.saturating_add(amount))
        }) {
            Ok((usage, _)) | Err(usage) => usage,
        }
    }

    /// Atomic check-and-add: either all of `amount` is added without passing
    /// the limit, or nothing is.
    pub fn reserve_tenant_quota(
        &self,
        tenant_id: TenantId,
        resource: ResourceType,
        amount: u64,
    ) -> Result<QuotaReservation, QuotaError> {
        let counters = self.counters(tenant_id);
        let limit = counters.limit(resource);

        match counters.update(resource, self.today(), |current, _| {
            let next = current.checked_add(amount)?;
            match limit {
                Some(limit) if next > limit => None,
                _ => Some(next),
            }
        }) {
            Ok((usage, day)) => Ok(QuotaReservation {
                tenant_id,
                resource,
                amount,
                usage,
                day,
            }),
            Err(current) => {
                debug!(tenant_id = %tenant_id, %resource, current, amount, "quota reservation rejected");
                Err(QuotaError::Exceeded {
                    tenant_id,
                    resource,
                    limit: limit.unwrap_or(u64::MAX),
                    current,
                    requested: amount,
                })
            }
        }
    }

    /// Give back an unused reservation (saturating at zero).
    ///
    /// Returns `false` when nothing was released: an `events` reservation
    /// whose daily window has rolled over since it was taken.
    pub fn release_tenant_usage(&self, reservation: QuotaReservation) -> bool {
        let counters = self.counters(reservation.tenant_id);
        let released = counters
            .update(reservation.resource, self.today(), |current, day| {
                (reservation.resource != ResourceType::Events || day == reservation.day)
                    .then(|| current.saturating_sub(reservation.amount))
            })
            .is_ok();
        if !released {
            debug!(
                tenant_id = %reservation.tenant_id,
                resource = %reservation.resource,
                amount = reservation.amount,
                "reservation expired with its window"
            );
        }
        released
    }

    pub fn get_tenant_usage(&self, tenant_id: TenantId) -> TenantUsage {
        match self.existing(tenant_id) {
            Some(counters) => TenantUsage {
                tenant_id,
                limits: *counters.limits.read().unwrap_or_else(PoisonError::into_inner),
                usage: counters.usage(self.today()),
            },
            None => TenantUsage {
                tenant_id,
                limits: self.default_limits,
                usage: [0; ResourceType::ALL.len()],
            },
        }
    }

    /// Zero one counter, or all of them when `resource` is `None`.
    pub fn reset_tenant_usage(&self, tenant_id: TenantId, resource: Option<ResourceType>) {
        let counters = self.counters(tenant_id);
        let today = self.today();
        match resource {
            Some(resource) => counters.store(resource, today, 0),
            None => {
                for resource in ResourceType::ALL {
                    counters.store(resource, today, 0);
                }
            }
        }
        info!(tenant_id = %tenant_id, ?resource, "tenant usage reset");
    }

    /// Tenants with live counters.
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Write every counter to the durable store. Returns how many records were
    /// written (0 without a store).
    pub fn flush(&self) -> Result<usize, QuotaError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let now = (self.clock)();
        let today = day_number(now);
        let snapshot: Vec<(TenantId, Arc<TenantCounters>)> = self
            .tenants
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let records: Vec<QuotaRecord> = snapshot
            .iter()
            .flat_map(|(tenant_id, counters)| {
                ResourceType::ALL.map(|resource| QuotaRecord {
                    tenant_id: *tenant_id,
                    resource,
                    usage: counters.load(resource, today),
                    recorded_at: now,
                })
            })
            .collect();

        store.flush(&records)?;
        debug!(records = records.len(), "quota counters flushed");
        Ok(records.len())
    }

    /// Seed counters from the durable store. `events` counters recorded on an
    /// earlier UTC day are not restored.
    pub fn restore(&self) -> Result<usize, QuotaError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let today = self.today();
        let mut restored = 0;
        for record in store.load()? {
            if record.resource == ResourceType::Events && day_number(record.recorded_at) != today {
                continue;
            }
            self.counters(record.tenant_id)
                .store(record.resource, today, record.usage);
            restored += 1;
        }
        info!(restored, "quota counters restored");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;

    use chrono::Duration;

    use super::*;
    use crate::clock::fixed_clock;
    use crate::quota::InMemoryQuotaStore;

    fn limited(tenant: TenantId, resource: ResourceType, limit: u64) -> TenantQuotaManager {
        let manager = TenantQuotaManager::new();
        manager.set_tenant_limits(tenant, ResourceLimits::unlimited().with_limit(resource, Some(limit)));
        manager
    }

    #[test]
    fn check_allows_up_to_remaining_headroom() {
        let tenant = TenantId::new();
        let manager = limited(tenant, ResourceType::Events, 1000);
        manager.record_tenant_usage(tenant, ResourceType::Events, 100);

        assert!(manager.check_tenant_quota(tenant, ResourceType::Events, 900).is_ok());
        let err = manager
            .check_tenant_quota(tenant, ResourceType::Events, 901)
            .unwrap_err();
        assert_eq!(
            err,
            QuotaError::Exceeded {
                tenant_id: tenant,
                resource: ResourceType::Events,
                limit: 1000,
                current: 100,
                requested: 901,
            }
        );
        // Checks never consume.
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Events), 100);
    }

    #[test]
    fn unprovisioned_tenants_use_default_limits() {
        let tenant = TenantId::new();
        let open = TenantQuotaManager::new();
        assert!(open.check_tenant_quota(tenant, ResourceType::Streams, u64::MAX).is_ok());

        let strict = TenantQuotaManager::new().with_default_limits(QuotaTier::Starter.limits());
        assert!(strict.check_tenant_quota(tenant, ResourceType::Streams, 6).is_err());
        assert_eq!(strict.tenant_limits(tenant), QuotaTier::Starter.limits());
    }

    #[test]
    fn reserve_is_all_or_nothing_and_release_saturates() {
        let tenant = TenantId::new();
        let manager = limited(tenant, ResourceType::Aggregates, 10);

        let first = manager.reserve_tenant_quota(tenant, ResourceType::Aggregates, 8).unwrap();
        assert_eq!(first.usage(), 8);
        assert!(manager.reserve_tenant_quota(tenant, ResourceType::Aggregates, 3).is_err());
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Aggregates), 8);

        manager.reset_tenant_usage(tenant, Some(ResourceType::Aggregates));
        assert!(manager.release_tenant_usage(first));
        let usage = manager.get_tenant_usage(tenant);
        assert_eq!(usage.get(ResourceType::Aggregates), 0);
        assert_eq!(usage.remaining(ResourceType::Aggregates), Some(10));
        assert_eq!(usage.remaining(ResourceType::Events), None);
    }

    #[test]
    fn concurrent_records_sum_exactly() {
        let tenant = TenantId::new();
        let manager = Arc::new(TenantQuotaManager::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        manager.record_tenant_usage(tenant, ResourceType::Events, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Events), 8000);
    }

    #[test]
    fn concurrent_reservations_never_pass_the_limit() {
        let tenant = TenantId::new();
        let manager = Arc::new(limited(tenant, ResourceType::Events, 500));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    (0..200)
                        .filter(|_| {
                            manager
                                .reserve_tenant_quota(tenant, ResourceType::Events, 1)
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 500);
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Events), 500);
    }

    #[test]
    fn events_window_resets_on_a_new_utc_day() {
        let now = Arc::new(Mutex::new(Utc::now()));
        let clock_now = Arc::clone(&now);
        let manager =
            TenantQuotaManager::new().with_clock(Arc::new(move || *clock_now.lock().unwrap()));
        let tenant = TenantId::new();

        manager.record_tenant_usage(tenant, ResourceType::Events, 40);
        manager.record_tenant_usage(tenant, ResourceType::Aggregates, 4);

        *now.lock().unwrap() += Duration::days(1);
        let usage = manager.get_tenant_usage(tenant);
        assert_eq!(usage.get(ResourceType::Events), 0);
        assert_eq!(usage.get(ResourceType::Aggregates), 4);
    }

    #[test]
    fn reservations_racing_midnight_are_all_counted_in_the_new_window() {
        let day_one = Utc::now();
        let rolled = Arc::new(AtomicBool::new(false));
        let clock_rolled = Arc::clone(&rolled);
        let clock: Clock = Arc::new(move || {
            if clock_rolled.load(Ordering::Acquire) {
                day_one + Duration::days(1)
            } else {
                day_one
            }
        });

        let tenant = TenantId::new();
        let manager = Arc::new(limited(tenant, ResourceType::Events, 100).with_clock(clock));
        manager.reserve_tenant_quota(tenant, ResourceType::Events, 100).unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let rolled = Arc::clone(&rolled);
                let attempts = Arc::clone(&attempts);
                thread::spawn(move || {
                    (0..200)
                        .filter(|_| {
                            if attempts.fetch_add(1, Ordering::AcqRel) == 400 {
                                rolled.store(true, Ordering::Release);
                            }
                            manager
                                .reserve_tenant_quota(tenant, ResourceType::Events, 1)
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Yesterday was full, so every grant belongs to today.
        assert_eq!(granted, 100);
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Events), 100);
    }

    #[test]
    fn releasing_yesterdays_reservation_leaves_today_untouched() {
        let now = Arc::new(Mutex::new(Utc::now()));
        let clock_now = Arc::clone(&now);
        let tenant = TenantId::new();
        let manager = limited(tenant, ResourceType::Events, 10)
            .with_clock(Arc::new(move || *clock_now.lock().unwrap()));

        let yesterday = manager.reserve_tenant_quota(tenant, ResourceType::Events, 5).unwrap();
        let aggregate = manager.reserve_tenant_quota(tenant, ResourceType::Aggregates, 1).unwrap();
        *now.lock().unwrap() += Duration::days(1);
        manager.record_tenant_usage(tenant, ResourceType::Events, 5);

        assert!(!manager.release_tenant_usage(yesterday));
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Events), 5);
        assert!(manager.reserve_tenant_quota(tenant, ResourceType::Events, 6).is_err());
        assert!(manager.reserve_tenant_quota(tenant, ResourceType::Events, 5).is_ok());

        // Non-daily counters release regardless of the day.
        assert!(manager.release_tenant_usage(aggregate));
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Aggregates), 0);
    }

    #[test]
    fn read_only_calls_do_not_register_tenants() {
        let manager = TenantQuotaManager::new().with_default_limits(QuotaTier::Starter.limits());
        let tenant = TenantId::new();

        assert!(manager.check_tenant_quota(tenant, ResourceType::Events, 10).is_ok());
        let usage = manager.get_tenant_usage(tenant);
        assert_eq!(usage.get(ResourceType::Events), 0);
        assert_eq!(usage.limits, QuotaTier::Starter.limits());
        assert_eq!(manager.tenant_limits(tenant), QuotaTier::Starter.limits());
        assert_eq!(manager.tenant_count(), 0);

        manager.record_tenant_usage(tenant, ResourceType::Events, 1);
        assert_eq!(manager.tenant_count(), 1);
    }

    #[test]
    fn restore_skips_event_counters_from_an_earlier_day() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let tenant = TenantId::new();
        let day_one = Utc::now();

        let manager = TenantQuotaManager::new()
            .with_store(store.clone())
            .with_clock(fixed_clock(day_one));
        manager.record_tenant_usage(tenant, ResourceType::Events, 7);
        manager.record_tenant_usage(tenant, ResourceType::Streams, 2);
        manager.flush().unwrap();

        let next_day = TenantQuotaManager::new()
            .with_store(store.clone())
            .with_clock(fixed_clock(day_one + Duration::days(1)));
        assert_eq!(next_day.restore().unwrap(), ResourceType::ALL.len() - 1);
        let usage = next_day.get_tenant_usage(tenant);
        assert_eq!(usage.get(ResourceType::Events), 0);
        assert_eq!(usage.get(ResourceType::Streams), 2);
    }

    #[test]
    fn flush_then_restore_recovers_counters() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let tenant = TenantId::new();

        let manager = TenantQuotaManager::new().with_store(store.clone());
        manager.record_tenant_usage(tenant, ResourceType::Events, 12);
        manager.record_tenant_usage(tenant, ResourceType::StorageMb, 3);
        assert_eq!(manager.flush().unwrap(), ResourceType::ALL.len());
        assert_eq!(store.usage(tenant, ResourceType::Events), Some(12));

        let restarted = TenantQuotaManager::new().with_store(store.clone());
        assert_eq!(restarted.restore().unwrap(), ResourceType::ALL.len());
        let usage = restarted.get_tenant_usage(tenant);
        assert_eq!(usage.get(ResourceType::Events), 12);
        assert_eq!(usage.get(ResourceType::StorageMb), 3);
    }

    #[test]
    fn reset_clears_one_or_all_counters() {
        let tenant = TenantId::new();
        let manager = TenantQuotaManager::new();
        manager.record_tenant_usage(tenant, ResourceType::Streams, 2);
        manager.record_tenant_usage(tenant, ResourceType::Projections, 2);

        manager.reset_tenant_usage(tenant, Some(ResourceType::Streams));
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Streams), 0);
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Projections), 2);

        manager.reset_tenant_usage(tenant, None);
        assert_eq!(manager.get_tenant_usage(tenant).get(ResourceType::Projections), 0);
    }
}
