//! Query result cache.
//!
//! Entries hold card ids and scores only. A lookup re-checks every card
//! through the caller's validator, so staleness never needs an eager sweep:
//! one card that is gone, stale or no longer valid turns the entry into a miss.

use codeprism_core::CodeprismError;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: String,
    pub branch: Option<String>,
    pub limit: usize,
}

impl CacheKey {
    /// `query` must already be normalized.
    pub fn new(query: &str, branch: Option<&str>, limit: usize) -> Self {
        Self {
            query: query.to_string(),
            branch: branch.map(str::to_string),
            limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedHit {
    pub card_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct SearchCache {
    entries: Mutex<LruCache<CacheKey, Vec<CachedHit>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<CacheKey, Vec<CachedHit>>>, CodeprismError> {
        self.entries
            .lock()
            .map_err(|e| CodeprismError::LockPoisoned(format!("search cache: {e}")))
    }

    /// Return the entry when `is_live` accepts every card in it. A rejected
    /// entry is dropped.
    pub fn get(
        &self,
        key: &CacheKey,
        is_live: impl Fn(&[CachedHit]) -> Result<bool, CodeprismError>,
    ) -> Result<Option<Vec<CachedHit>>, CodeprismError> {
        let entry = self.lock()?.get(key).cloned();
        let Some(hits) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };
        if is_live(&hits)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Ok(Some(hits))
        } else {
            self.lock()?.pop(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query = %key.query, "cache entry invalidated by stale card");
            Ok(None)
        }
    }

    pub fn put(&self, key: CacheKey, hits: Vec<CachedHit>) -> Result<(), CodeprismError> {
        self.lock()?.put(key, hits);
        Ok(())
    }

    /// Drop every entry, e.g. after a new card is created.
    pub fn clear(&self) -> Result<(), CodeprismError> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, capacity) = self
            .entries
            .lock()
            .map(|c| (c.len(), c.cap().get()))
            .unwrap_or((0, 0));
        CacheStats {
            entries,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
