// ── Keyed, sorted reactive collection ──
//
// Concurrent storage with push-based change notification via `watch`.
// Every mutation rebuilds a sorted snapshot for subscribers.

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

pub(crate) struct SortedCollection<T: Send + Sync + 'static> {
    /// Keys are normalized by the owner (lowercased address, raw ssid).
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
    order: fn(&T, &T) -> Ordering,
}

impl<T: Send + Sync + 'static> SortedCollection<T> {
    pub(crate) fn new(order: fn(&T, &T) -> Ordering) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
            order,
        }
    }

    /// Insert `item`, or replace the existing entry when `replace` says so.
    /// Returns `true` if the collection changed.
    pub(crate) fn merge(&self, key: String, item: T, replace: impl FnOnce(&T, &T) -> bool) -> bool {
        let changed = match self.by_key.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(item));
                true
            }
            Entry::Occupied(mut slot) => {
                if replace(slot.get().as_ref(), &item) {
                    slot.insert(Arc::new(item));
                    true
                } else {
                    false
                }
            }
        };
        if changed {
            self.rebuild_snapshot();
        }
        changed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.rebuild_snapshot();
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| (self.order)(a, b));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_value_desc(a: &(String, i32), b: &(String, i32)) -> Ordering {
        b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
    }

    fn item(key: &str, v: i32) -> (String, i32) {
        (key.to_owned(), v)
    }

    #[test]
    fn snapshot_is_sorted_after_each_merge() {
        let c = SortedCollection::new(by_value_desc);
        c.merge("a".into(), item("a", 1), |_, _| true);
        c.merge("b".into(), item("b", 5), |_, _| true);
        c.merge("c".into(), item("c", 3), |_, _| true);

        let keys: Vec<_> = c.snapshot().iter().map(|e| e.0.clone()).collect();
        assert_eq!(keys, ["b", "c", "a"]);
    }

    #[test]
    fn merge_respects_replace_policy() {
        let c = SortedCollection::new(by_value_desc);
        assert!(c.merge("a".into(), item("a", 1), |_, _| false));
        assert!(!c.merge("a".into(), item("a", 9), |_, _| false));
        assert_eq!(c.get("a").map(|e| e.1), Some(1));
        assert!(c.merge("a".into(), item("a", 9), |old, new| new.1 > old.1));
        assert_eq!(c.get("a").map(|e| e.1), Some(9));
        assert_eq!(c.snapshot().len(), 1);
    }

    #[test]
    fn subscribers_see_clears() {
        let c = SortedCollection::new(by_value_desc);
        let mut rx = c.subscribe();
        c.merge("a".into(), item("a", 1), |_, _| true);
        assert!(rx.has_changed().unwrap_or(false));
        rx.borrow_and_update();
        c.clear();
        assert!(rx.borrow_and_update().is_empty());
    }
}
