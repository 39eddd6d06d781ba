use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::render::surface::{BlockKind, SubBlock, VisualHandle};
use crate::state::change_tracker::FieldChangeTracker;

/// Tracked state of one entity on screen.
#[derive(Debug, Clone)]
pub struct ViewRecord {
    pub key: String,
    pub handle: VisualHandle,
    pub fields: FieldChangeTracker,
    /// Optional sub-blocks currently attached to the visual block, as last drawn.
    pub blocks: BTreeMap<BlockKind, SubBlock>,
}

impl ViewRecord {
    fn new(key: String, handle: VisualHandle) -> Self {
        Self {
            key,
            handle,
            fields: FieldChangeTracker::new(),
            blocks: BTreeMap::new(),
        }
    }
}

/// Result of [`ViewRecordStore::upsert`].
#[derive(Debug)]
pub enum Upsert<'a> {
    /// First sighting of the key; the record needs its initial render.
    Created(&'a mut ViewRecord),
    /// Known key; the record is to be patched in place.
    Existing(&'a mut ViewRecord),
}

/// Rendered records of one panel, keyed by entity key, in first-sighting order.
///
/// At most one record exists per key. Re-sighting a key never reorders it.
#[derive(Debug, Clone, Default)]
pub struct ViewRecordStore {
    records: HashMap<String, ViewRecord>,
    order: VecDeque<String>,
}

impl ViewRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`, creating it with the handle produced by
    /// `render` when the key is new. `render` is not called for known keys.
    pub fn upsert(&mut self, key: &str, render: impl FnOnce() -> VisualHandle) -> Upsert<'_> {
        match self.records.entry(key.to_string()) {
            Entry::Occupied(entry) => Upsert::Existing(entry.into_mut()),
            Entry::Vacant(entry) => {
                self.order.push_back(key.to_string());
                Upsert::Created(entry.insert(ViewRecord::new(key.to_string(), render())))
            }
        }
    }

    /// Removes earliest-inserted records until at most `max_size` remain and
    /// returns them, oldest first, so the caller can release their handles.
    pub fn evict_overflow(&mut self, max_size: usize) -> Vec<ViewRecord> {
        let mut evicted = Vec::new();
        while self.order.len() > max_size {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            if let Some(record) = self.records.remove(&key) {
                evicted.push(record);
            }
        }
        evicted
    }

    /// Explicit removal; a missing key is a no-op.
    pub fn remove(&mut self, key: &str) -> Option<ViewRecord> {
        let record = self.records.remove(key)?;
        self.order.retain(|k| k != key);
        Some(record)
    }

    pub fn get(&self, key: &str) -> Option<&ViewRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ViewRecord> {
        self.order.iter().filter_map(|k| self.records.get(k))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles() -> impl FnMut() -> VisualHandle {
        let mut next = 0;
        move || {
            next += 1;
            VisualHandle(next)
        }
    }

    #[test]
    fn upsert_creates_once_per_key() {
        let mut store = ViewRecordStore::new();
        let mut next = handles();

        assert!(matches!(store.upsert("NIFTY", &mut next), Upsert::Created(_)));
        match store.upsert("NIFTY", || panic!("must not render a known key")) {
            Upsert::Existing(record) => assert_eq!(record.handle, VisualHandle(1)),
            Upsert::Created(_) => panic!("expected existing record"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn overflow_evicts_earliest_inserted_not_least_recently_updated() {
        let mut store = ViewRecordStore::new();
        let mut next = handles();
        for key in ["a", "b", "c"] {
            store.upsert(key, &mut next);
        }
        // Touching "a" again must not protect it from eviction.
        store.upsert("a", &mut next);
        store.upsert("d", &mut next);

        let evicted = store.evict_overflow(3);
        let evicted: Vec<_> = evicted.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(evicted, ["a"]);
        assert_eq!(store.keys().collect::<Vec<_>>(), ["b", "c", "d"]);
    }

    #[test]
    fn evict_under_capacity_is_noop() {
        let mut store = ViewRecordStore::new();
        let mut next = handles();
        store.upsert("a", &mut next);
        assert!(store.evict_overflow(20).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_missing_key_is_noop() {
        let mut store = ViewRecordStore::new();
        let mut next = handles();
        store.upsert("a", &mut next);
        store.upsert("b", &mut next);

        assert!(store.remove("zzz").is_none());
        let removed = store.remove("a").unwrap();
        assert_eq!(removed.handle, VisualHandle(1));
        assert_eq!(store.keys().collect::<Vec<_>>(), ["b"]);
        assert!(!store.contains("a"));
    }
}
