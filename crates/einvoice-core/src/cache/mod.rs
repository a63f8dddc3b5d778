//! Bounded, expiring store for pipeline results.
//!
//! Entries expire a fixed time after they were last written and the oldest
//! insertion is evicted once the capacity is exceeded. Every removed entry is
//! handed to the removal listener exactly once, after all cache locks have
//! been released.

mod cleanup;

pub use cleanup::StagedFileCleanup;

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CacheCleanupError;
use crate::models::config::CacheConfig;
use crate::models::result::PipelineResult;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Removed through [`ResultCache::invalidate`].
    Explicit,
    /// Evicted because the cache was over capacity.
    Size,
    /// Outlived its time to live.
    Expired,
    /// Overwritten by a `put` for the same key.
    Replaced,
}

/// Callback invoked for every entry that leaves the cache.
pub trait RemovalListener<K, V>: Send + Sync {
    fn on_removal(&self, key: &K, value: &V, cause: RemovalCause) -> Result<(), CacheCleanupError>;
}

impl<K, V, F> RemovalListener<K, V> for F
where
    F: Fn(&K, &V, RemovalCause) -> Result<(), CacheCleanupError> + Send + Sync,
{
    fn on_removal(&self, key: &K, value: &V, cause: RemovalCause) -> Result<(), CacheCleanupError> {
        self(key, value, cause)
    }
}

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_write_at: Instant,
    /// Insertion sequence number, distinguishes a live entry from stale
    /// records of the same key in the insertion queue.
    seq: u64,
}

/// Concurrent cache with size and time bounds.
pub struct ResultCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    order: Mutex<VecDeque<(K, u64)>>,
    next_seq: AtomicU64,
    max_entries: usize,
    ttl: Duration,
    listener: Box<dyn RemovalListener<K, V>>,
}

/// Cache of staged pipeline results.
pub type InvoiceCache = ResultCache<Uuid, PipelineResult>;

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache bounded by `config`.
    pub fn new(config: &CacheConfig, listener: impl RemovalListener<K, V> + 'static) -> Self {
        Self::with_bounds(config.max_entries, config.ttl(), listener)
    }

    pub fn with_bounds(
        max_entries: usize,
        ttl: Duration,
        listener: impl RemovalListener<K, V> + 'static,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            max_entries: max_entries.max(1),
            ttl,
            listener: Box::new(listener),
        }
    }

    /// Insert or replace an entry.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let previous = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let created_at = occupied.get().created_at;
                Some(occupied.insert(CacheEntry {
                    value,
                    created_at,
                    last_write_at: now,
                    seq,
                }))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value,
                    created_at: now,
                    last_write_at: now,
                    seq,
                });
                None
            }
        };

        {
            let mut order = self.lock_order();
            order.push_back((key.clone(), seq));
            if order.len() > self.max_entries * 2 + 16 {
                // Drop records of replaced or removed entries.
                order.retain(|(k, s)| self.entries.get(k).is_some_and(|e| e.seq == *s));
            }
        }

        if let Some(previous) = previous {
            self.notify(&key, &previous.value, RemovalCause::Replaced);
        }
        self.evict_overflow();
    }

    /// Look an entry up. An expired entry is removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !self.is_expired(&entry, now) {
                return Some(entry.value.clone());
            }
        }

        // Only the caller whose remove_if succeeds fires the listener.
        if let Some((key, entry)) = self.entries.remove_if(key, |_, e| self.is_expired(e, now)) {
            debug!(
                "Cache entry expired {:?} after it was created",
                now.saturating_duration_since(entry.created_at)
            );
            self.notify(&key, &entry.value, RemovalCause::Expired);
        }
        None
    }

    /// Remove an entry, returning its value if it was present.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let (key, entry) = self.entries.remove(key)?;
        self.notify(&key, &entry.value, RemovalCause::Explicit);
        Some(entry.value)
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Remove all expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|e| self.is_expired(e.value(), now))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if let Some((key, entry)) = self.entries.remove_if(&key, |_, e| self.is_expired(e, now)) {
                self.notify(&key, &entry.value, RemovalCause::Expired);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_write_at) >= self.ttl
    }

    fn lock_order(&self) -> MutexGuard<'_, VecDeque<(K, u64)>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evict the oldest insertions until the cache is within capacity.
    fn evict_overflow(&self) {
        let mut evicted = Vec::new();
        {
            // Lock order: insertion queue, then map shards.
            let mut order = self.lock_order();
            while self.entries.len() > self.max_entries {
                let Some((key, seq)) = order.pop_front() else {
                    break;
                };
                if let Some(removed) = self.entries.remove_if(&key, |_, e| e.seq == seq) {
                    evicted.push(removed);
                }
            }
        }

        for (key, entry) in evicted {
            self.notify(&key, &entry.value, RemovalCause::Size);
        }
    }

    fn notify(&self, key: &K, value: &V, cause: RemovalCause) {
        if let Err(e) = self.listener.on_removal(key, value, cause) {
            warn!("Cache removal listener failed ({:?}): {}", cause, e);
        }
    }
}
