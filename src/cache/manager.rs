//! Cache Manager - Unified Two-Tier Cache
//!
//! Orchestrates the memory tier and the optional shared tier. The memory tier
//! is authoritative for the local call; the shared tier is an optimization
//! that is mirrored best-effort and consulted on memory misses.
//!
//! # Shared tier lifecycle
//!
//! ```text
//! Unconfigured                        (no shared tier)
//! Disconnected ──connect()──▶ Connecting ──▶ Connected
//!      ▲                            │             │
//!      └────────── failure ─────────┴─────────────┘
//! ```
//!
//! Any failed call moves `Connected` to `Disconnected`; from then on the
//! shared tier is skipped until the maintenance task reconnects it. Every
//! transition is logged once, individual failed calls are not.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::health::{HealthReport, MemoryTierHealth, SharedTierHealth};
use super::memory::MemoryTier;
use super::namespace::KeyNamespacer;
use super::shared::{RedisSharedTier, SharedTier, TierResult};
use super::stats::{CacheStats, StatsCounters};
use crate::config::CacheConfig;
use crate::error::{Error, Result, TierError};

/// Keys per batch delete issued by a remote `clear`
const CLEAR_BATCH: usize = 500;

/// Shared tier connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedTierState {
    /// No shared tier configured
    Unconfigured,
    /// Connection attempt in flight
    Connecting,
    /// Reachable, used for reads and writes
    Connected,
    /// Configured but unreachable, skipped
    Disconnected,
}

impl fmt::Display for SharedTierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedTierState::Unconfigured => write!(f, "unconfigured"),
            SharedTierState::Connecting => write!(f, "connecting"),
            SharedTierState::Connected => write!(f, "connected"),
            SharedTierState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Result of the best-effort shared tier half of a write
///
/// Only logged; never changes what the caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    Skipped,
    Failed,
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::Ok => write!(f, "ok"),
            WriteOutcome::Skipped => write!(f, "skipped"),
            WriteOutcome::Failed => write!(f, "failed"),
        }
    }
}

struct TierStatus {
    state: SharedTierState,
    last_error: Option<String>,
    /// Bumped on every transition into `Connected`
    epoch: u64,
}

/// Two-tier cache manager
///
/// Construct one per logical cache and share it behind an `Arc`. Values are
/// cloned in and out; callers never hold references into the tiers.
pub struct CacheManager<V> {
    config: CacheConfig,
    namespacer: KeyNamespacer,
    memory: MemoryTier<V>,
    shared: Option<Arc<dyn SharedTier>>,
    status: Mutex<TierStatus>,
    counters: StatsCounters,
    instance_id: Uuid,
    shutdown: CancellationToken,
}

impl<V> CacheManager<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a manager from a configuration
    ///
    /// A configured `shared_tier_address` gets a Redis adapter; the
    /// connection itself is only opened by [`connect`](Self::connect).
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let shared = match &config.shared_tier_address {
            Some(address) => {
                let tier = RedisSharedTier::new(address, config.shared_tier_timeout())
                    .map_err(|e| Error::config(e.to_string()))?
                    .with_scan_timeout(config.shared_tier_scan_timeout());
                Some(Arc::new(tier) as Arc<dyn SharedTier>)
            }
            None => None,
        };
        Self::build(config, shared)
    }

    /// Create a manager over an explicit shared tier backend
    pub fn with_shared_tier(config: CacheConfig, shared: Arc<dyn SharedTier>) -> Result<Self> {
        config.validate()?;
        Self::build(config, Some(shared))
    }

    /// Create a memory-only manager, ignoring any configured address
    pub fn memory_only(mut config: CacheConfig) -> Result<Self> {
        config.shared_tier_address = None;
        Self::new(config)
    }

    fn build(config: CacheConfig, shared: Option<Arc<dyn SharedTier>>) -> Result<Self> {
        let memory = MemoryTier::new(config.memory_tier_capacity)?;
        let status = match &shared {
            Some(_) => TierStatus {
                state: SharedTierState::Disconnected,
                last_error: Some("not connected yet".to_string()),
                epoch: 0,
            },
            None => TierStatus {
                state: SharedTierState::Unconfigured,
                last_error: None,
                epoch: 0,
            },
        };

        let instance_id = Uuid::new_v4();
        debug!(
            instance = %instance_id,
            capacity = config.memory_tier_capacity,
            codec = %config.codec,
            prefix = %config.key_prefix,
            shared_tier = shared.is_some(),
            "cache manager created"
        );

        Ok(Self {
            namespacer: KeyNamespacer::new(config.key_prefix.clone()),
            memory,
            shared,
            status: Mutex::new(status),
            counters: StatsCounters::new(),
            instance_id,
            shutdown: CancellationToken::new(),
            config,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect the shared tier. Returns whether it is connected afterwards.
    ///
    /// A failure is not an error: the manager keeps serving from memory.
    pub async fn connect(&self) -> bool {
        let Some(shared) = self.shared.clone() else {
            return false;
        };

        self.transition(SharedTierState::Connecting, None);
        match shared.connect().await {
            Ok(()) => {
                self.transition(SharedTierState::Connected, None);
                true
            }
            Err(e) => {
                self.transition(SharedTierState::Disconnected, Some(&e));
                false
            }
        }
    }

    /// Reconnect attempt from the maintenance loop; failures stay quiet
    async fn try_reconnect(&self) -> bool {
        let Some(shared) = self.shared.clone() else {
            return false;
        };

        match shared.connect().await {
            Ok(()) => {
                self.transition(SharedTierState::Connected, None);
                true
            }
            Err(e) => {
                debug!(error = %e, "shared tier reconnect failed");
                self.status.lock().last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Spawn the background expiry sweep / reconnect loop
    ///
    /// The task holds only a weak reference and ends on
    /// [`shutdown`](Self::shutdown) or when the manager is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let period = self.config.maintenance_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.run_maintenance().await;
                    }
                }
            }
            debug!("cache maintenance task stopped");
        })
    }

    /// One maintenance pass: purge expired memory entries and reconnect a
    /// disconnected shared tier. Returns the number of purged entries.
    pub async fn run_maintenance(&self) -> usize {
        let purged = self.memory.purge_expired();
        if purged > 0 {
            debug!(purged, "expired memory tier entries purged");
        }

        if self.state() == SharedTierState::Disconnected && !self.shutdown.is_cancelled() {
            self.try_reconnect().await;
        }
        purged
    }

    /// Stop maintenance and close the shared tier connection
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(shared) = &self.shared {
            shared.disconnect().await;
            let mut status = self.status.lock();
            status.state = SharedTierState::Disconnected;
            status.last_error = Some("shut down".to_string());
        }
        info!(instance = %self.instance_id, "cache manager shut down");
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Look up `key`, falling back to the shared tier on a memory miss
    pub async fn get(&self, key: &str) -> Option<V> {
        let full_key = self.namespacer.namespace(key);

        if let Some(value) = self.memory.get(&full_key) {
            self.counters.record_hit();
            return Some(value);
        }

        let Some((shared, epoch)) = self.active_shared() else {
            self.counters.record_miss();
            return None;
        };

        match shared.get(&full_key).await {
            Ok(Some(payload)) => match self.config.codec.decode::<V>(&payload) {
                Ok(value) => {
                    // Remote remaining TTL is unknown, repopulate with the default
                    if let Err(e) =
                        self.memory
                            .set(full_key.clone(), value.clone(), self.config.default_ttl())
                    {
                        warn!(key = %full_key, error = %e, "memory tier repopulation failed");
                    }
                    self.counters.record_hit();
                    debug!(key = %full_key, "cache hit (shared tier)");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %full_key, error = %e, "undecodable shared tier payload, treating as miss");
                    self.counters.record_miss();
                    None
                }
            },
            Ok(None) => {
                self.counters.record_miss();
                None
            }
            Err(e) => {
                self.record_tier_failure("get", epoch, &e);
                self.counters.record_miss();
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL
    pub async fn set(&self, key: &str, value: V) -> Result<()> {
        self.set_with_ttl(key, value, self.config.default_ttl_seconds)
            .await
    }

    /// Store `value` under `key` for `ttl_seconds`
    ///
    /// Succeeds once the memory tier holds the value. A zero TTL, or one
    /// above [`MAX_TTL_SECONDS`](crate::config::MAX_TTL_SECONDS), is a
    /// configuration error and reaches neither tier.
    pub async fn set_with_ttl(&self, key: &str, value: V, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            return Err(Error::config("ttl_seconds must be positive"));
        }

        let full_key = self.namespacer.namespace(key);
        let shared = self.active_shared();
        let payload = shared
            .as_ref()
            .map(|_| self.config.codec.encode(&value));

        self.memory
            .set(full_key.clone(), value, Duration::from_secs(ttl_seconds))?;

        let outcome = match (shared, payload) {
            (Some((shared, epoch)), Some(Ok(payload))) => {
                match shared.set(&full_key, payload, ttl_seconds).await {
                    Ok(()) => WriteOutcome::Ok,
                    Err(e) => {
                        self.record_tier_failure("set", epoch, &e);
                        WriteOutcome::Failed
                    }
                }
            }
            (_, Some(Err(e))) => {
                warn!(key = %full_key, error = %e, "value not encodable for shared tier");
                WriteOutcome::Failed
            }
            _ => WriteOutcome::Skipped,
        };

        self.counters.record_set();
        debug!(key = %full_key, ttl_seconds, shared = %outcome, "cache set");
        Ok(())
    }

    /// Remove `key` from both tiers
    ///
    /// Returns whether the memory tier held it. `deletes` counts every call,
    /// including deletes of absent keys.
    pub async fn delete(&self, key: &str) -> bool {
        let full_key = self.namespacer.namespace(key);
        let removed = self.memory.delete(&full_key);

        let outcome = match self.active_shared() {
            Some((shared, epoch)) => match shared.delete(&full_key).await {
                Ok(()) => WriteOutcome::Ok,
                Err(e) => {
                    self.record_tier_failure("delete", epoch, &e);
                    WriteOutcome::Failed
                }
            },
            None => WriteOutcome::Skipped,
        };

        self.counters.record_delete();
        debug!(key = %full_key, removed, shared = %outcome, "cache delete");
        removed
    }

    /// Remove every entry whose fully-qualified key contains `pattern`
    /// (everything when absent or empty); returns the memory tier count
    ///
    /// The shared tier is cleared through `SCAN`, keeping only keys under
    /// this manager's prefix that contain `pattern`, the same rule the memory
    /// tier applies. With an empty prefix and no pattern that is every key of
    /// the remote database.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        let removed = self.memory.clear(pattern);

        let outcome = match self.active_shared() {
            Some((shared, epoch)) => match self.clear_remote(shared.as_ref(), pattern).await {
                Ok(remote) => {
                    debug!(pattern = pattern.unwrap_or(""), remote, "shared tier keys cleared");
                    WriteOutcome::Ok
                }
                Err(e) => {
                    self.record_tier_failure("clear", epoch, &e);
                    WriteOutcome::Failed
                }
            },
            None => WriteOutcome::Skipped,
        };

        info!(pattern = pattern.unwrap_or(""), removed, shared = %outcome, "cache cleared");
        removed
    }

    async fn clear_remote(
        &self,
        shared: &dyn SharedTier,
        pattern: Option<&str>,
    ) -> TierResult<usize> {
        let keys = self.scan_remote(shared, pattern).await?;
        for batch in keys.chunks(CLEAR_BATCH) {
            shared.delete_many(batch).await?;
        }
        Ok(keys.len())
    }

    /// Fully-qualified shared tier keys matching `pattern` in this namespace
    async fn scan_remote(
        &self,
        shared: &dyn SharedTier,
        pattern: Option<&str>,
    ) -> TierResult<Vec<String>> {
        let glob = self.namespacer.scan_pattern(pattern);
        let mut keys = shared.scan(&glob).await?;
        keys.retain(|full_key| self.namespacer.matches(full_key, pattern));
        Ok(keys)
    }

    /// Logical keys containing `pattern` held by either tier, sorted
    pub async fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        let mut found = self.memory.keys(pattern);

        if let Some((shared, epoch)) = self.active_shared() {
            match self.scan_remote(shared.as_ref(), pattern).await {
                Ok(remote) => found.extend(remote),
                Err(e) => self.record_tier_failure("scan", epoch, &e),
            }
        }

        let mut keys: Vec<String> = found
            .iter()
            .filter_map(|full_key| self.namespacer.strip(full_key))
            .map(str::to_string)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached.
    pub async fn get_or_insert_with<F, Fut, E>(&self, key: &str, compute: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, value.clone()).await {
            warn!(key = %key, error = %e, "computed value not cached");
        }
        Ok(value)
    }

    /// Statistics snapshot
    ///
    /// `shared_tier_usage` is fetched from the shared tier and is 0 when it
    /// is absent, disconnected, or does not answer.
    pub async fn stats(&self) -> CacheStats {
        let shared_tier_usage = match self.active_shared() {
            Some((shared, _)) => shared.usage_bytes().await.unwrap_or_else(|e| {
                debug!(error = %e, "shared tier usage unavailable");
                0
            }),
            None => 0,
        };
        self.snapshot(shared_tier_usage)
    }

    fn snapshot(&self, shared_tier_usage: u64) -> CacheStats {
        let hits = self.counters.hits();
        let misses = self.counters.misses();
        CacheStats {
            hits,
            misses,
            sets: self.counters.sets(),
            deletes: self.counters.deletes(),
            evictions: self.memory.evictions(),
            expirations: self.memory.expirations(),
            shared_tier_errors: self.counters.shared_tier_errors(),
            memory_usage: self.memory.size() as u64,
            shared_tier_usage,
            hit_rate: CacheStats::hit_rate(hits, misses),
        }
    }

    /// Health report; pings a connected shared tier
    pub async fn health_check(&self) -> HealthReport {
        let shared_tier = match &self.shared {
            None => SharedTierHealth::disabled(),
            Some(shared) => {
                let connected = match self.active_shared() {
                    Some((_, epoch)) => match shared.ping().await {
                        Ok(()) => true,
                        Err(e) => {
                            self.record_tier_failure("ping", epoch, &e);
                            false
                        }
                    },
                    None => false,
                };

                SharedTierHealth {
                    enabled: true,
                    connected,
                    backend: Some(shared.name().to_string()),
                    error: if connected {
                        None
                    } else {
                        self.status.lock().last_error.clone()
                    },
                }
            }
        };

        let memory_tier = MemoryTierHealth {
            enabled: true,
            items: self.memory.size(),
            capacity: self.memory.capacity(),
        };

        HealthReport::new(self.instance_id, memory_tier, shared_tier, self.stats().await)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// The shared tier with the connection epoch the call starts under
    fn active_shared(&self) -> Option<(Arc<dyn SharedTier>, u64)> {
        let status = self.status.lock();
        match (&self.shared, status.state) {
            (Some(shared), SharedTierState::Connected) => Some((shared.clone(), status.epoch)),
            _ => None,
        }
    }

    /// Count a failed call; disconnect only if no reconnect happened since
    /// the call started under `epoch`
    fn record_tier_failure(&self, operation: &str, epoch: u64, error: &TierError) {
        self.counters.record_shared_tier_error();
        debug!(operation, epoch, error = %error, "shared tier call failed");
        self.transition_from(Some(epoch), SharedTierState::Disconnected, Some(error));
    }

    /// Move to `next`, logging only when the state actually changes
    fn transition(&self, next: SharedTierState, error: Option<&TierError>) {
        self.transition_from(None, next, error);
    }

    /// Like [`transition`](Self::transition), but a no-op when `epoch` is
    /// given and is no longer the current connection
    fn transition_from(
        &self,
        epoch: Option<u64>,
        next: SharedTierState,
        error: Option<&TierError>,
    ) {
        let previous = {
            let mut status = self.status.lock();
            if epoch.is_some_and(|epoch| epoch != status.epoch) {
                debug!(
                    instance = %self.instance_id,
                    epoch = status.epoch,
                    "failure from an earlier connection ignored"
                );
                return;
            }
            let previous = status.state;
            if next == SharedTierState::Connected && previous != SharedTierState::Connected {
                status.epoch += 1;
            }
            status.state = next;
            if let Some(error) = error {
                status.last_error = Some(error.to_string());
            } else if next == SharedTierState::Connected {
                status.last_error = None;
            }
            previous
        };

        if previous == next {
            return;
        }

        match (previous, next) {
            (_, SharedTierState::Connected) => {
                info!(instance = %self.instance_id, "shared tier connected");
            }
            (SharedTierState::Connecting, SharedTierState::Disconnected) => {
                warn!(
                    instance = %self.instance_id,
                    error = %error.map(|e| e.to_string()).unwrap_or_default(),
                    "shared tier unreachable, continuing in memory-only mode"
                );
            }
            (_, SharedTierState::Disconnected) => {
                warn!(
                    instance = %self.instance_id,
                    error = %error.map(|e| e.to_string()).unwrap_or_default(),
                    "shared tier lost, degrading to memory-only mode"
                );
            }
            (_, state) => {
                debug!(instance = %self.instance_id, state = %state, "shared tier state changed");
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current shared tier state
    pub fn state(&self) -> SharedTierState {
        self.status.lock().state
    }

    /// Shared tier configured but not connected
    pub fn is_degraded(&self) -> bool {
        self.shared.is_some() && self.state() != SharedTierState::Connected
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn namespacer(&self) -> &KeyNamespacer {
        &self.namespacer
    }

    /// Get reference to the memory tier
    pub fn memory_tier(&self) -> &MemoryTier<V> {
        &self.memory
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

impl<V> fmt::Debug for CacheManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("instance_id", &self.instance_id)
            .field("memory", &self.memory)
            .field("state", &self.status.lock().state)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
