//! Per-request data fetching statistics.
//!
//! One [`DataFetchingStats`] is created per incoming request and shared by
//! every repository serving that request. Counters only ever go up; the
//! request reads a [`StatsSnapshot`] once at the end and reports it next to
//! the GraphQL response.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The counters tracked for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCounter {
    /// Round trips to the record store.
    SqlCalls,
    /// Cache read calls (single or multi-key).
    CacheGets,
    /// Cache write calls (single or multi-key).
    CacheSets,
}

/// Request-scoped fetch counters.
///
/// Increments are atomic so concurrently running fetches of the same request
/// never lose updates, whichever runtime flavor drives them.
#[derive(Debug, Default)]
pub struct DataFetchingStats {
    sql_calls: AtomicU64,
    cache_gets: AtomicU64,
    cache_sets: AtomicU64,
}

impl DataFetchingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: StatCounter) {
        let cell = match counter {
            StatCounter::SqlCalls => &self.sql_calls,
            StatCounter::CacheGets => &self.cache_gets,
            StatCounter::CacheSets => &self.cache_sets,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sql_call(&self) {
        self.increment(StatCounter::SqlCalls);
    }

    pub fn record_cache_get(&self) {
        self.increment(StatCounter::CacheGets);
    }

    pub fn record_cache_set(&self) {
        self.increment(StatCounter::CacheSets);
    }

    /// Copy of the current counts.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sql_calls: self.sql_calls.load(Ordering::Relaxed),
            cache_gets: self.cache_gets.load(Ordering::Relaxed),
            cache_sets: self.cache_sets.load(Ordering::Relaxed),
        }
    }
}

/// Immutable copy of [`DataFetchingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub sql_calls: u64,
    pub cache_gets: u64,
    pub cache_sets: u64,
}

impl StatsSnapshot {
    pub fn new(sql_calls: u64, cache_gets: u64, cache_sets: u64) -> Self {
        Self {
            sql_calls,
            cache_gets,
            cache_sets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_zero() {
        let stats = DataFetchingStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_increment_touches_only_named_counter() {
        let stats = DataFetchingStats::new();
        stats.increment(StatCounter::SqlCalls);
        stats.record_cache_get();
        stats.record_cache_get();
        assert_eq!(stats.snapshot(), StatsSnapshot::new(1, 2, 0));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let stats = DataFetchingStats::new();
        let before = stats.snapshot();
        stats.record_cache_set();
        assert_eq!(before.cache_sets, 0);
        assert_eq!(stats.snapshot().cache_sets, 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let stats = Arc::new(DataFetchingStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_sql_call();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread should not panic");
        }
        assert_eq!(stats.snapshot().sql_calls, 8000);
    }

    #[test]
    fn test_snapshot_wire_names() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(StatsSnapshot::new(1, 2, 3))?;
        assert_eq!(json["sqlCalls"], 1);
        assert_eq!(json["cacheGets"], 2);
        assert_eq!(json["cacheSets"], 3);
        Ok(())
    }
}
