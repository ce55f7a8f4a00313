//! Two-Tier Cache System
//!
//! Process-local memory tier backed by an optional networked shared tier.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           Cache Manager                               │
//! │          (namespacing, stats, degradation, maintenance)               │
//! ├──────────────────────────────────┬───────────────────────────────────┤
//! │  Memory Tier                     │  Shared Tier (optional)           │
//! │  ┌────────────────────────────┐  │  ┌─────────────────────────────┐  │
//! │  │ RwLock<HashMap>            │  │  │ Redis / in-memory backend   │  │
//! │  │ lazy expiry, FIFO eviction │  │  │ server-side TTL, timeouts   │  │
//! │  │ values stored in-process   │  │  │ payloads encoded by Codec   │  │
//! │  └────────────────────────────┘  │  └─────────────────────────────┘  │
//! │               ▲                  │                 │                 │
//! │               └───── repopulate on shared hit ─────┘                 │
//! └──────────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! # Consistency
//!
//! - Reads check memory first, then the shared tier
//! - Writes land in memory unconditionally and are mirrored best-effort
//! - No cross-instance invalidation: other instances keep serving their
//!   memory copy until it expires
//!
//! # Degradation
//!
//! A shared tier that fails is marked disconnected and skipped; the cache
//! keeps serving from memory and the maintenance task reconnects it.

mod codec;
mod entry;
mod exporter;
mod health;
mod manager;
mod memory;
mod namespace;
mod shared;
mod stats;

pub use codec::CodecKind;
pub use entry::CacheEntry;
pub use exporter::PrometheusExporter;
pub use health::{HealthReport, HealthStatus, MemoryTierHealth, SharedTierHealth};
pub use manager::{CacheManager, SharedTierState, WriteOutcome};
pub use memory::MemoryTier;
pub use namespace::KeyNamespacer;
pub use shared::{InMemorySharedTier, RedisSharedTier, SharedTier, TierResult};
pub use stats::{CacheStats, StatsCounters};

/// Fraction of live entries dropped once expired-first eviction is not
/// enough (1/4)
pub const EVICTION_DIVISOR: usize = 4;

/// Metric namespace used by the CLI exporter
pub const METRICS_NAMESPACE: &str = "tiercache";

// =============================================================================
// Tests
// =============================================================================
