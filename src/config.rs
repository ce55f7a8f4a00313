//! Cache configuration
//!
//! A [`CacheConfig`] is built once (from a builder, a YAML file, or CLI flags),
//! validated, and then handed to [`CacheManager::new`](crate::CacheManager::new).
//! The manager never mutates it afterwards.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CodecKind;
use crate::error::{Error, Result};

/// Default TTL for entries written without an explicit TTL (1 hour)
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Default maximum number of entries in the memory tier
pub const DEFAULT_MEMORY_TIER_CAPACITY: usize = 10_000;

/// Default bound on every shared tier call
pub const DEFAULT_SHARED_TIER_TIMEOUT_MS: u64 = 500;

/// Default deadline for a whole shared tier key scan (all `SCAN` rounds)
pub const DEFAULT_SHARED_TIER_SCAN_TIMEOUT_MS: u64 = 5_000;

/// Default period of the maintenance task
pub const DEFAULT_MAINTENANCE_INTERVAL_SECONDS: u64 = 30;

/// Longest accepted TTL (10 years); keeps expiry instants representable
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 3600;

/// Immutable configuration bundle for a `CacheManager`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Shared tier connection string (`redis://host:port/db`); `None` means
    /// memory-only mode
    pub shared_tier_address: Option<String>,
    /// TTL applied by `set` and by shared-tier repopulation
    pub default_ttl_seconds: u64,
    /// Maximum number of entries held by the memory tier
    pub memory_tier_capacity: usize,
    /// Codec used for shared tier payloads
    pub codec: CodecKind,
    /// Prefix prepended to every logical key
    pub key_prefix: String,
    /// Timeout applied to each shared tier call
    pub shared_tier_timeout_ms: u64,
    /// Deadline for a complete key scan, used by `clear` and `keys`
    pub shared_tier_scan_timeout_ms: u64,
    /// Period of the expiry sweep / reconnect loop
    pub maintenance_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared_tier_address: None,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            memory_tier_capacity: DEFAULT_MEMORY_TIER_CAPACITY,
            codec: CodecKind::default(),
            key_prefix: String::new(),
            shared_tier_timeout_ms: DEFAULT_SHARED_TIER_TIMEOUT_MS,
            shared_tier_scan_timeout_ms: DEFAULT_SHARED_TIER_SCAN_TIMEOUT_MS,
            maintenance_interval_seconds: DEFAULT_MAINTENANCE_INTERVAL_SECONDS,
        }
    }
}

impl CacheConfig {
    /// Start a builder from the defaults
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load and validate a configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate a configuration from a YAML document
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(raw)
            .map_err(|e| Error::config(format!("invalid cache configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every construction parameter
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_seconds == 0 {
            return Err(Error::config("default_ttl_seconds must be positive"));
        }
        if self.default_ttl_seconds > MAX_TTL_SECONDS {
            return Err(Error::config(format!(
                "default_ttl_seconds must not exceed {}",
                MAX_TTL_SECONDS
            )));
        }
        if self.memory_tier_capacity == 0 {
            return Err(Error::config("memory_tier_capacity must be positive"));
        }
        if self.shared_tier_timeout_ms == 0 {
            return Err(Error::config("shared_tier_timeout_ms must be positive"));
        }
        if self.shared_tier_scan_timeout_ms == 0 {
            return Err(Error::config("shared_tier_scan_timeout_ms must be positive"));
        }
        if self.maintenance_interval_seconds == 0 {
            return Err(Error::config("maintenance_interval_seconds must be positive"));
        }
        if let Some(address) = &self.shared_tier_address {
            if address.trim().is_empty() {
                return Err(Error::config("shared_tier_address must not be blank"));
            }
        }
        Ok(())
    }

    /// Whether a shared tier is configured
    pub fn has_shared_tier(&self) -> bool {
        self.shared_tier_address.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn shared_tier_timeout(&self) -> Duration {
        Duration::from_millis(self.shared_tier_timeout_ms)
    }

    pub fn shared_tier_scan_timeout(&self) -> Duration {
        Duration::from_millis(self.shared_tier_scan_timeout_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_seconds)
    }
}

/// Builder for [`CacheConfig`]
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn shared_tier_address(mut self, address: impl Into<String>) -> Self {
        self.config.shared_tier_address = Some(address.into());
        self
    }

    pub fn default_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.default_ttl_seconds = seconds;
        self
    }

    pub fn memory_tier_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_tier_capacity = capacity;
        self
    }

    pub fn codec(mut self, codec: CodecKind) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn shared_tier_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.shared_tier_timeout_ms = timeout_ms;
        self
    }

    pub fn shared_tier_scan_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.shared_tier_scan_timeout_ms = timeout_ms;
        self
    }

    pub fn maintenance_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.maintenance_interval_seconds = seconds;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Tests
// =============================================================================
