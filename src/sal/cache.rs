// Primitive result cache.
// Keyed by input hash; bounded by entry count (least recently used goes first) and TTL.
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub input_hash: String,
    pub primitive: String,
    pub output: Json,
    pub output_hash: String,
    /// RFC 3339, informational.
    pub created_at: String,
    /// Milliseconds since the Unix epoch; TTL is measured from here.
    pub created_at_ms: i64,
    pub hit_count: u64,
    /// Logical clock value of the last insert or hit.
    #[serde(default)]
    pub last_used: u64,
    /// Imported entries never expire.
    #[serde(default, skip_serializing)]
    pub pinned: bool,
}

#[derive(Debug)]
pub struct PrimitiveCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    ttl: Option<Duration>,
    clock: u64,
    evictions: u64,
}

impl PrimitiveCache {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
            clock: 0,
            evictions: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn is_expired(&self, entry: &CacheEntry, now_ms: i64) -> bool {
        match self.ttl {
            _ if entry.pinned => false,
            Some(ttl) => now_ms.saturating_sub(entry.created_at_ms) >= ttl.as_millis() as i64,
            None => false,
        }
    }

    /// Returns a live entry and records the hit; an expired entry is dropped.
    pub fn get(&mut self, input_hash: &str, now_ms: i64) -> Option<CacheEntry> {
        let expired = match self.entries.get(input_hash) {
            Some(e) => self.is_expired(e, now_ms),
            None => return None,
        };
        if expired {
            debug!(hash = %short(input_hash), "cache entry expired");
            self.entries.remove(input_hash);
            return None;
        }
        let stamp = self.tick();
        let entry = self.entries.get_mut(input_hash)?;
        entry.hit_count += 1;
        entry.last_used = stamp;
        Some(entry.clone())
    }

    pub fn put(&mut self, mut entry: CacheEntry) {
        entry.last_used = self.tick();
        self.entries.insert(entry.input_hash.clone(), entry);
        self.prune();
    }

    /// Inserts an entry that is exempt from TTL (replay bundles).
    pub fn put_pinned(&mut self, mut entry: CacheEntry) {
        entry.pinned = true;
        self.put(entry);
    }

    fn prune(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let before = self.entries.len();
        let mut by_age: Vec<(u64, String)> = self
            .entries
            .values()
            .map(|e| (e.last_used, e.input_hash.clone()))
            .collect();
        by_age.sort();
        for (_, hash) in by_age {
            if self.entries.len() <= self.max_entries {
                break;
            }
            self.entries.remove(&hash);
            self.evictions += 1;
        }
        debug!(before, after = self.entries.len(), "cache pruned");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn contains(&self, input_hash: &str) -> bool {
        self.entries.contains_key(input_hash)
    }

    /// Entries in insertion-independent order (by hash), for export.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        let mut all: Vec<CacheEntry> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.input_hash.cmp(&b.input_hash));
        all
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, created_at_ms: i64) -> CacheEntry {
        CacheEntry {
            input_hash: hash.to_string(),
            primitive: "infer".into(),
            output: Json::String(format!("out-{hash}")),
            output_hash: format!("h-{hash}"),
            created_at: String::new(),
            created_at_ms,
            hit_count: 0,
            last_used: 0,
            pinned: false,
        }
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let mut cache = PrimitiveCache::new(2, None);
        cache.put(entry("a", 0));
        cache.put(entry("b", 0));
        assert!(cache.get("a", 0).is_some()); // a is now fresher than b
        cache.put(entry("c", 0));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn ttl_expires_entries_but_not_pinned_ones() {
        let mut cache = PrimitiveCache::new(8, Some(Duration::from_secs(10)));
        cache.put(entry("old", 0));
        cache.put_pinned(entry("replayed", 0));
        assert!(cache.get("old", 5_000).is_some());
        assert!(cache.get("old", 10_000).is_none());
        assert!(!cache.contains("old"));
        assert!(cache.get("replayed", 1_000_000).is_some());
    }

    #[test]
    fn hits_are_counted() {
        let mut cache = PrimitiveCache::new(4, None);
        cache.put(entry("k", 0));
        cache.get("k", 0);
        let e = cache.get("k", 0).unwrap();
        assert_eq!(e.hit_count, 2);
    }
}
