use std::{num::NonZeroUsize, sync::Mutex};

use lru::LruCache;
use tesseract_core::Entry;

/// Antispam/dedupe table (C5): maps the SHA-256 of an entry's canonical
/// bytes to the index it was first sequenced at.
///
/// Bounded by an LRU so a long-running log doesn't grow this table
/// unboundedly; entries that age out simply stop being deduplicated and get
/// re-sequenced, which is safe (duplicate leaves are a cost, not a
/// correctness problem).
pub struct Dedupe {
    cache: Mutex<LruCache<[u8; 32], u64>>,
}

impl Dedupe {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1"),
            )),
        }
    }

    /// Returns the previously-assigned index for `entry`, if any.
    pub fn lookup(&self, entry: &Entry) -> Option<u64> {
        self.cache.lock().unwrap().get(&entry.dedupe_key()).copied()
    }

    /// Records that `entry` was sequenced at `index`. Called by the
    /// appender immediately after assigning the index, acting as its own
    /// in-process follower.
    pub fn record(&self, entry: &Entry, index: u64) {
        self.cache.lock().unwrap().put(entry.dedupe_key(), index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesseract_core::EntryType;

    fn entry(tag: u8) -> Entry {
        Entry {
            entry_type: EntryType::X509,
            cert_der: vec![tag],
            precertificate: vec![],
            issuer_key_hash: [0u8; 32],
            fingerprints_chain: vec![],
        }
    }

    #[test]
    fn records_and_looks_up() {
        let dedupe = Dedupe::new(16);
        let entry = entry(1);
        assert_eq!(dedupe.lookup(&entry), None);

        dedupe.record(&entry, 42);
        assert_eq!(dedupe.lookup(&entry), Some(42));
    }

    #[test]
    fn distinct_entries_do_not_collide() {
        let dedupe = Dedupe::new(16);
        dedupe.record(&entry(1), 1);
        dedupe.record(&entry(2), 2);
        assert_eq!(dedupe.lookup(&entry(1)), Some(1));
        assert_eq!(dedupe.lookup(&entry(2)), Some(2));
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let dedupe = Dedupe::new(1);
        dedupe.record(&entry(1), 1);
        dedupe.record(&entry(2), 2);
        assert_eq!(dedupe.lookup(&entry(1)), None);
        assert_eq!(dedupe.lookup(&entry(2)), Some(2));
    }
}
