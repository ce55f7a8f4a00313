//! Cache Statistics
//!
//! Relaxed atomic counters; values are approximate under contention.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-manager operation counters
#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    shared_tier_errors: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared_tier_error(&self) {
        self.shared_tier_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn shared_tier_errors(&self) -> u64 {
        self.shared_tier_errors.load(Ordering::Relaxed)
    }
}

/// Point-in-time statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Live entries dropped by memory tier eviction
    pub evictions: u64,
    /// Expired entries removed from the memory tier
    pub expirations: u64,
    /// Failed shared tier calls
    pub shared_tier_errors: u64,
    /// Memory tier entry count
    pub memory_usage: u64,
    /// Shared tier bytes (0 when unknown)
    pub shared_tier_usage: u64,
    /// hits / (hits + misses), 0 when nothing was looked up
    pub hit_rate: f64,
}

impl CacheStats {
    /// Compute the hit rate from the hit and miss counters
    pub fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
