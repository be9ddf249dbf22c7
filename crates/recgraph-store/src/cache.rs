//! Parsed-query cache
//!
//! Record operations issue the same handful of query shapes over and over.
//! Parsed ASTs are kept keyed by query text, bounded by an approximate byte
//! budget and evicted oldest-first.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use recgraph_core::Result;

use crate::dql::{parse, Query};

/// Rough footprint of a parsed query relative to its text
const AST_SIZE_FACTOR: usize = 8;

#[derive(Default)]
struct Entries {
    map: HashMap<String, Arc<Query>>,
    order: VecDeque<String>,
    bytes: usize,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

/// Bounded cache of parsed queries
pub struct QueryCache {
    capacity_bytes: usize,
    entries: Mutex<Entries>,
    stats: CacheStats,
}

impl QueryCache {
    /// Cache holding at most `capacity_mb` megabytes; 0 disables caching
    pub fn new(capacity_mb: u64) -> Self {
        Self {
            capacity_bytes: (capacity_mb as usize).saturating_mul(1024 * 1024),
            entries: Mutex::new(Entries::default()),
            stats: CacheStats::default(),
        }
    }

    fn footprint(text: &str) -> usize {
        text.len().saturating_mul(AST_SIZE_FACTOR)
    }

    /// Parse `text`, reusing a cached AST when available
    pub fn get_or_parse(&self, text: &str) -> Result<Arc<Query>> {
        if let Some(query) = self.entries.lock().map.get(text) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(query));
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let query = Arc::new(parse(text)?);
        let size = Self::footprint(text);
        if size > self.capacity_bytes {
            return Ok(query);
        }

        let mut entries = self.entries.lock();
        if entries.map.contains_key(text) {
            return Ok(query);
        }
        while entries.bytes + size > self.capacity_bytes {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            if entries.map.remove(&oldest).is_some() {
                entries.bytes = entries.bytes.saturating_sub(Self::footprint(&oldest));
            }
        }
        entries.map.insert(text.to_string(), Arc::clone(&query));
        entries.order.push_back(text.to_string());
        entries.bytes += size;
        Ok(query)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.map.clear();
        entries.order.clear();
        entries.bytes = 0;
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_miss() {
        let cache = QueryCache::new(1);
        let q = "{ q(func: has(a)) { uid } }";
        cache.get_or_parse(q).unwrap();
        cache.get_or_parse(q).unwrap();
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.len(), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = QueryCache::new(0);
        cache.get_or_parse("{ q(func: has(a)) { uid } }").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let cache = QueryCache::new(1);
        assert!(cache.get_or_parse("{ q( }").is_err());
        assert!(cache.is_empty());
    }
}
