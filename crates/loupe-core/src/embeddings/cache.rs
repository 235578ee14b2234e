//! Content-Addressed Embedding Cache
//!
//! LRU keyed by sha256(input_type + text) so identical content across
//! files collapses to one entry. Lock held only for the map operation;
//! hit/miss counters are lock-free.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

use super::InputType;

/// Default cache capacity
pub const DEFAULT_CACHE_CAPACITY: usize = 5000;

/// Hit/miss counters snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Shared content-addressed LRU of embedding vectors
pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key: sha256 over the input type and the exact text
    pub fn key(text: &str, input_type: InputType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input_type.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a vector by content
    pub fn get(&self, text: &str, input_type: InputType) -> Option<Vec<f32>> {
        let key = Self::key(text, input_type);
        let mut cache = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        match cache.get(&key) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a vector by content
    pub fn put(&self, text: &str, input_type: InputType, vector: Vec<f32>) {
        let key = Self::key(text, input_type);
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key, vector);
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Entries currently cached
    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================
