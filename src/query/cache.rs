use lru::LruCache;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::sql::{Ident, TableRef};
use super::DateRange;

/// Full argument tuple of a memoized query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Series {
        table: TableRef,
        range: DateRange,
        partition: Ident,
        key_word: String,
        index: Ident,
    },
    Partitions {
        table: TableRef,
        partition: Ident,
    },
    Columns {
        table: TableRef,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Bounded LRU memo of query results.
///
/// Entries are shared as `Arc<DataFrame>`, so a hit hands back the exact
/// table produced by the first call.
pub struct QueryCache {
    inner: Mutex<LruCache<QueryKey, Arc<DataFrame>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<QueryKey, Arc<DataFrame>>> {
        // A poisoned cache only ever holds complete entries.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<DataFrame>> {
        let found = self.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, key: QueryKey, value: Arc<DataFrame>) {
        self.lock().put(key, value);
    }

    /// Return the cached value for `key` or compute, store and return it.
    ///
    /// The lock is not held while `compute` runs. Errors are not cached.
    pub fn get_or_try_insert<E>(
        &self,
        key: QueryKey,
        compute: impl FnOnce() -> Result<DataFrame, E>,
    ) -> Result<Arc<DataFrame>, E> {
        if let Some(hit) = self.get(&key) {
            tracing::debug!(?key, "Query cache hit");
            return Ok(hit);
        }
        tracing::debug!(?key, "Query cache miss");
        let value = Arc::new(compute()?);
        self.insert(key, Arc::clone(&value));
        Ok(value)
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.lock();
        CacheStats {
            entries: guard.len(),
            capacity: guard.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
