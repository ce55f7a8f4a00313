//! tiercache - Hybrid Two-Tier Cache
//!
//! A process-local, bounded memory tier in front of an optional networked
//! shared tier (Redis). Lookups try memory first and repopulate it from the
//! shared tier; writes land in memory and are mirrored best-effort. When the
//! shared tier is unreachable the cache keeps working from memory alone.
//!
//! # Example
//!
//! ```no_run
//! use tiercache::{CacheConfig, CacheManager};
//!
//! # async fn run() -> tiercache::Result<()> {
//! let config = CacheConfig::builder()
//!     .shared_tier_address("redis://127.0.0.1:6379")
//!     .key_prefix("billing:")
//!     .build()?;
//!
//! let cache = CacheManager::<String>::new(config)?;
//! cache.connect().await;
//!
//! cache.set("invoice:42", "paid".to_string()).await?;
//! assert_eq!(cache.get("invoice:42").await.as_deref(), Some("paid"));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tiers, codec, manager, stats and health reporting
//! - [`config`] - Configuration bundle, builder and YAML loading
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cache::{CacheManager, CacheStats, CodecKind, HealthReport, HealthStatus, SharedTierState};
pub use config::CacheConfig;
pub use error::{Error, Result};

/// Crate version reported by the CLI and health output
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
