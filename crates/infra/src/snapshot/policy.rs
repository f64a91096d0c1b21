use chrono::{DateTime, Duration, Utc};

use chronicle_core::AggregateId;

/// Facts a policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotContext {
    pub aggregate_id: AggregateId,
    pub version: u64,
    pub last_snapshot_version: Option<u64>,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

impl SnapshotContext {
    pub fn events_since_last_snapshot(&self) -> u64 {
        self.version
            .saturating_sub(self.last_snapshot_version.unwrap_or(0))
    }
}

/// Decides when a new snapshot should be taken.
pub trait SnapshotPolicy: Send + Sync {
    fn should_snapshot(&self, ctx: &SnapshotContext) -> bool;
}

/// Snapshot whenever the version is a non-zero multiple of the frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EveryNVersions(pub u64);

impl SnapshotPolicy for EveryNVersions {
    fn should_snapshot(&self, ctx: &SnapshotContext) -> bool {
        self.0 > 0 && ctx.version > 0 && ctx.version % self.0 == 0
    }
}

/// Snapshot once `interval` has passed since the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBased(pub Duration);

impl SnapshotPolicy for TimeBased {
    fn should_snapshot(&self, ctx: &SnapshotContext) -> bool {
        if ctx.events_since_last_snapshot() == 0 {
            return false;
        }
        match ctx.last_snapshot_at {
            Some(at) => ctx.now - at >= self.0,
            None => true,
        }
    }
}

/// Snapshot after `n` events have been applied since the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCount(pub u64);

impl SnapshotPolicy for EventCount {
    fn should_snapshot(&self, ctx: &SnapshotContext) -> bool {
        self.0 > 0 && ctx.events_since_last_snapshot() >= self.0
    }
}
