//! Per-source connection-counts cache.
//!
//! Amortises per-source probability estimation across threshold iterations
//! that reuse the same centers. Eviction is approximate LFU driven by an
//! access counter that the clustering engine can also zero explicitly, to
//! push covered-but-non-center entries toward eviction ahead of centers.
//!
//! This is deliberately hand-rolled over [`std::collections::HashMap`]
//! rather than built on a general-purpose LRU or concurrent-map crate: the
//! eviction policy here keys on an externally-mutable access counter, not
//! recency of access, which those crates' APIs do not expose.

use std::collections::HashMap;

use crate::graph::VertexId;

/// A source vertex's accumulated connection counts, valid up to
/// `samples_seen` samples.
#[derive(Clone, Debug)]
pub struct CountsElement {
    /// Number of samples (from the front of the pool) folded into `counts`.
    pub samples_seen: usize,
    /// `counts[u]` is the number of worlds among the first `samples_seen`
    /// in which `u` shared the source vertex's component.
    pub counts: Vec<u64>,
    access_counter: u64,
    insertion_order: u64,
}

impl CountsElement {
    fn new(n: usize, insertion_order: u64) -> Self {
        Self {
            samples_seen: 0,
            counts: vec![0; n],
            access_counter: 1,
            insertion_order,
        }
    }
}

/// Bounded-capacity cache from source vertex to its [`CountsElement`].
#[derive(Debug)]
pub struct CountsCache {
    capacity: usize,
    entries: HashMap<VertexId, CountsElement>,
    hits: u64,
    misses: u64,
    next_insertion_order: u64,
}

impl CountsCache {
    /// Creates an empty cache with room for `capacity` entries before
    /// eviction kicks in.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            next_insertion_order: 0,
        }
    }

    /// Returns a mutable reference to `v`'s entry, creating a
    /// zero-initialised one of length `n` if absent. Counts a hit or miss
    /// accordingly and bumps the entry's access counter.
    pub fn get_or_new(&mut self, v: VertexId, n: usize) -> &mut CountsElement {
        let existed = self.entries.contains_key(&v);
        if existed {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        let insertion_order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let entry = self
            .entries
            .entry(v)
            .or_insert_with(|| CountsElement::new(n, insertion_order));
        entry.access_counter = entry.access_counter.saturating_add(1);
        entry
    }

    /// Returns whether `v` currently has a cached entry.
    #[must_use]
    pub fn contains(&self, v: VertexId) -> bool {
        self.entries.contains_key(&v)
    }

    /// Sets `v`'s access counter to `k` directly. Used by the engine to
    /// zero a covered-but-non-center entry so `cleanup()` evicts it first.
    pub fn set_accessed(&mut self, v: VertexId, k: u64) {
        if let Some(entry) = self.entries.get_mut(&v) {
            entry.access_counter = k;
        }
    }

    /// Evicts entries with the smallest access counter until the cache size
    /// is at most `capacity`. Ties are broken by oldest insertion first.
    pub fn cleanup(&mut self) {
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.access_counter, entry.insertion_order))
                .map(|(&v, _)| v);
            let Some(victim) = victim else {
                break;
            };
            self.entries.remove(&victim);
        }
    }

    /// Fraction of `get_or_new` calls that found an existing entry.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            #[expect(
                clippy::cast_precision_loss,
                reason = "hit/miss tallies are far below f64's exact-integer range"
            )]
            let rate = self.hits as f64 / total as f64;
            rate
        }
    }

    /// Current number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_new_creates_zeroed_entry() {
        let mut cache = CountsCache::new(4);
        let entry = cache.get_or_new(0, 3);
        assert_eq!(entry.samples_seen, 0);
        assert_eq!(entry.counts, vec![0, 0, 0]);
    }

    #[test]
    fn cleanup_evicts_least_accessed_entry() {
        let mut cache = CountsCache::new(2);
        cache.get_or_new(0, 3);
        cache.get_or_new(1, 3);
        cache.set_accessed(0, 0);
        cache.get_or_new(2, 3);
        cache.cleanup();
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(0));
    }

    #[test]
    fn hit_rate_tracks_repeated_access() {
        let mut cache = CountsCache::new(4);
        cache.get_or_new(0, 3);
        cache.get_or_new(0, 3);
        cache.get_or_new(1, 3);
        assert!((cache.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn set_accessed_on_missing_entry_is_a_no_op() {
        let mut cache = CountsCache::new(4);
        cache.set_accessed(5, 0);
        assert!(!cache.contains(5));
    }
}
