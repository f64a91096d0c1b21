use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use chronicle_core::AggregateId;

use super::{Snapshot, SnapshotError};

/// Snapshot persistence boundary.
///
/// Snapshots are keyed by `(aggregate_id, aggregate_version)`; writing a newer
/// version supersedes, never replaces, older ones.
pub trait SnapshotStore: Send + Sync {
    fn put(&self, snapshot: Snapshot) -> Result<(), SnapshotError>;

    /// Highest-version snapshot of the aggregate.
    fn get_latest(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>, SnapshotError>;

    /// All snapshots of the aggregate, ascending by version.
    fn list(&self, aggregate_id: AggregateId) -> Result<Vec<Snapshot>, SnapshotError>;

    /// Delete snapshots created before `cutoff`, except the newest snapshot of
    /// each aggregate. Returns how many were removed.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SnapshotError>;
}

impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    fn put(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        (**self).put(snapshot)
    }

    fn get_latest(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>, SnapshotError> {
        (**self).get_latest(aggregate_id)
    }

    fn list(&self, aggregate_id: AggregateId) -> Result<Vec<Snapshot>, SnapshotError> {
        (**self).list(aggregate_id)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SnapshotError> {
        (**self).delete_older_than(cutoff)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<AggregateId, BTreeMap<u64, Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .map(|s| s.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SnapshotError {
    SnapshotError::Storage("lock poisoned".to_string())
}

impl SnapshotStore for InMemorySnapshotStore {
    fn put(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let mut snapshots = self.snapshots.write().map_err(|_| poisoned())?;
        snapshots
            .entry(snapshot.aggregate_id)
            .or_default()
            .insert(snapshot.aggregate_version, snapshot);
        Ok(())
    }

    fn get_latest(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>, SnapshotError> {
        let snapshots = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(snapshots
            .get(&aggregate_id)
            .and_then(|versions| versions.values().next_back())
            .cloned())
    }

    fn list(&self, aggregate_id: AggregateId) -> Result<Vec<Snapshot>, SnapshotError> {
        let snapshots = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(snapshots
            .get(&aggregate_id)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SnapshotError> {
        let mut snapshots = self.snapshots.write().map_err(|_| poisoned())?;
        let mut removed = 0;
        for versions in snapshots.values_mut() {
            let Some(&newest) = versions.keys().next_back() else {
                continue;
            };
            let before = versions.len();
            versions.retain(|&version, snap| version == newest || snap.created_at >= cutoff);
            removed += before - versions.len();
        }
        Ok(removed)
    }
}
