// ── Reactive record collection ──
//
// Concurrent storage for one record type keyed by record id, with a
// version counter published over a `watch` channel so consumers can
// wait for changes without polling.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection for a single record type.
///
/// Every effective mutation bumps the version. Writing a record equal to
/// the stored one is a no-op, which keeps replays of the same update
/// from waking subscribers.
pub struct RecordCollection<T: PartialEq + Send + Sync + 'static> {
    by_id: DashMap<String, Arc<T>>,
    version: watch::Sender<u64>,
}

impl<T: PartialEq + Send + Sync + 'static> RecordCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            by_id: DashMap::new(),
            version,
        }
    }

    /// Insert or overwrite a record. Returns `true` if anything changed.
    pub(crate) fn upsert(&self, id: String, record: T) -> bool {
        if self
            .by_id
            .get(&id)
            .is_some_and(|existing| **existing == record)
        {
            return false;
        }
        self.by_id.insert(id, Arc::new(record));
        self.bump_version();
        true
    }

    /// Remove a record. Returns the removed record if it existed.
    pub(crate) fn remove(&self, id: &str) -> Option<Arc<T>> {
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All record ids, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.by_id.iter().map(|r| r.key().clone()).collect()
    }

    /// All records, in no particular order.
    pub fn values(&self) -> Vec<Arc<T>> {
        self.by_id.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Records ordered by id, for stable comparison and output.
    pub fn to_sorted(&self) -> BTreeMap<String, Arc<T>> {
        self.by_id
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect()
    }

    /// Current version; bumped on every effective mutation.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribe to version changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}
