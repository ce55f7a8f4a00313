//! Memory Tier - Process-Local Bounded Cache
//!
//! Entry-count bounded map from fully-qualified key to [`CacheEntry`].
//!
//! # Design
//!
//! - One `RwLock<HashMap>`: `get` shares the read lock, every structural
//!   change (`set`, `delete`, `clear`, eviction, lazy expiry) takes the write
//!   lock
//! - Lazy expiry: `get` removes an expired entry it runs into, re-checking
//!   under the write lock so concurrent readers remove it at most once
//! - Eviction when a new key would exceed capacity: expired entries first,
//!   then the oldest 25% by creation time (minimum 1)
//!
//! Eviction orders by creation time, not last access. A long-lived entry
//! that is read constantly goes before a young entry nobody reads; tracking
//! access time would turn every `get` into a write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use super::entry::CacheEntry;
use super::EVICTION_DIVISOR;
use crate::config::MAX_TTL_SECONDS;
use crate::error::{Error, Result};

/// Process-local, bounded key/value store with TTL
pub struct MemoryTier<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    capacity: usize,
    sequence: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> MemoryTier<V> {
    /// Create an empty tier holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("memory_tier_capacity must be positive"));
        }
        Ok(Self {
            entries: RwLock::new(HashMap::with_capacity(capacity.min(4096))),
            capacity,
            sequence: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    /// Get a copy of the live value stored under `key`
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_live_at(Instant::now()) => {
                    return Some(entry.value().clone());
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade and re-check, another reader or writer may have
        // already removed or replaced it.
        let mut entries = self.entries.write();
        let live = entries.get(key).map(|entry| entry.is_live_at(Instant::now()));
        match live {
            Some(true) => entries.get(key).map(|entry| entry.value().clone()),
            Some(false) => {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "memory tier entry expired");
                None
            }
            None => None,
        }
    }

    /// Insert or replace `key`, expiring `ttl` from now
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(Error::config("ttl must be positive"));
        }
        if ttl > Duration::from_secs(MAX_TTL_SECONDS) {
            return Err(Error::config(format!(
                "ttl must not exceed {} seconds",
                MAX_TTL_SECONDS
            )));
        }

        let key = key.into();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry::new(value, ttl, sequence)
            .ok_or_else(|| Error::config("ttl expiry is not representable"))?;

        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            self.evict_locked(&mut entries);
        }
        entries.insert(key, entry);
        Ok(())
    }

    /// Remove `key`, returning whether anything was removed
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every entry whose key contains `pattern` (all entries when the
    /// pattern is absent or empty)
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write();
        match pattern.filter(|p| !p.is_empty()) {
            None => {
                let removed = entries.len();
                entries.clear();
                removed
            }
            Some(pattern) => {
                let before = entries.len();
                entries.retain(|key, _| !key.contains(pattern));
                before - entries.len()
            }
        }
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live_at(now));
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Evict so that one more key fits. Caller holds the write lock.
    fn evict_locked(&self, entries: &mut HashMap<String, CacheEntry<V>>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live_at(now));
        let expired = before - entries.len();
        self.expirations.fetch_add(expired as u64, Ordering::Relaxed);

        if entries.len() < self.capacity {
            debug!(expired, "memory tier eviction satisfied by expired entries");
            return;
        }

        let mut candidates: Vec<(Instant, u64, String)> = entries
            .iter()
            .map(|(key, entry)| (entry.created(), entry.sequence(), key.clone()))
            .collect();
        candidates.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let target = (entries.len() / EVICTION_DIVISOR).max(1);
        for (_, _, key) in candidates.into_iter().take(target) {
            entries.remove(&key);
        }
        self.evictions.fetch_add(target as u64, Ordering::Relaxed);
        debug!(expired, evicted = target, "memory tier eviction");
    }

    /// Whether a (possibly expired) entry is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Live keys containing `pattern` (all live keys when absent or empty)
    pub fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        let now = Instant::now();
        let pattern = pattern.unwrap_or("");
        self.entries
            .read()
            .iter()
            .filter(|(key, entry)| entry.is_live_at(now) && key.contains(pattern))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Current entry count
    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live entries removed to make room
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Expired entries removed (lazily, by sweep, or during eviction)
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Creation and expiry instants of `key`
    pub fn lifetime(&self, key: &str) -> Option<(Instant, Instant)> {
        self.entries
            .read()
            .get(key)
            .map(|entry| (entry.created(), entry.expires()))
    }
}

impl<V> std::fmt::Debug for MemoryTier<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTier")
            .field("size", &self.entries.read().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
