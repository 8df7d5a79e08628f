//! Per-session reference list (§3, §4.5 / C4): the set of `(poa_idx,
//! object_id)` pairs the remote peer currently holds a reference to. Drives
//! distributed refcounting — `AddReference` inserts, `ReleaseObject`
//! removes, and session teardown drains the whole set back into the owning
//! POAs.

use ahash::HashSet;
use parking_lot::Mutex;

/// Mirrors the `Table` pre-sizing idea from session bookkeeping: most
/// sessions hold a handful of remote references, not hundreds.
const DEFAULT_CAPACITY: usize = 16;

#[derive(Default)]
pub struct ReferenceList {
    entries: Mutex<HashSet<(u16, u64)>>,
}

impl ReferenceList {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashSet::with_capacity_and_hasher(
                DEFAULT_CAPACITY,
                Default::default(),
            )),
        }
    }

    /// Record an `AddReference`. Returns `false` if the pair was already
    /// present (a duplicate `AddReference`, which callers may choose to
    /// treat as a protocol warning rather than an error).
    pub fn add(&self, poa_idx: u16, object_id: u64) -> bool {
        self.entries.lock().insert((poa_idx, object_id))
    }

    /// Record a `ReleaseObject`. Returns `false` if the pair was not being
    /// tracked (a peer releasing something it never added a reference to).
    pub fn remove(&self, poa_idx: u16, object_id: u64) -> bool {
        self.entries.lock().remove(&(poa_idx, object_id))
    }

    pub fn contains(&self, poa_idx: u16, object_id: u64) -> bool {
        self.entries.lock().contains(&(poa_idx, object_id))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every entry, for atomic release on session close (§4.5
    /// Closure). The caller is responsible for calling `Poa::release_object`
    /// for each returned pair.
    pub fn drain(&self) -> Vec<(u16, u64)> {
        self.entries.lock().drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_round_trips() {
        let list = ReferenceList::new();
        assert!(list.add(1, 7));
        assert!(list.contains(1, 7));
        assert!(!list.add(1, 7));
        assert!(list.remove(1, 7));
        assert!(!list.contains(1, 7));
    }

    #[test]
    fn drain_empties_and_returns_all_entries() {
        let list = ReferenceList::new();
        list.add(1, 7);
        list.add(2, 9);

        let mut drained = list.drain();
        drained.sort();

        assert_eq!(drained, vec![(1, 7), (2, 9)]);
        assert!(list.is_empty());
    }

    #[test]
    fn remove_of_untracked_pair_is_rejected() {
        let list = ReferenceList::new();
        assert!(!list.remove(1, 7));
    }
}
