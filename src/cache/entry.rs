//! Memory tier entries

use std::time::{Duration, Instant};

/// A value held by the memory tier together with its lifetime bounds
///
/// `expires_at` is always `created_at + ttl` and strictly after `created_at`.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    /// Insertion order, breaks `created_at` ties during eviction
    sequence: u64,
}

impl<V> CacheEntry<V> {
    /// Create an entry created now. `ttl` must be non-zero.
    ///
    /// `None` when the expiry instant is not representable.
    pub(crate) fn new(value: V, ttl: Duration, sequence: u64) -> Option<Self> {
        Self::created_at(value, Instant::now(), ttl, sequence)
    }

    pub(crate) fn created_at(
        value: V,
        created_at: Instant,
        ttl: Duration,
        sequence: u64,
    ) -> Option<Self> {
        debug_assert!(!ttl.is_zero());
        Some(Self {
            value,
            created_at,
            expires_at: created_at.checked_add(ttl)?,
            sequence,
        })
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn created(&self) -> Instant {
        self.created_at
    }

    #[inline]
    pub fn expires(&self) -> Instant {
        self.expires_at
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }

    #[inline]
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Live iff `now < expires_at`
    #[inline]
    pub fn is_live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        !self.is_live_at(Instant::now())
    }

    /// Time left before expiry
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

// =============================================================================
// Tests
// =============================================================================
