//! tiercache - Two-Tier Cache Operator CLI
//!
//! Inspect and manipulate a tiered cache from the command line.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          tiercache CLI                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  YAML / env  │───▶│ CacheManager │───▶│ Shared Tier  │       │
//! │  │   + flags    │    │ (JSON values)│    │   (Redis)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every invocation is a fresh process, so the memory tier starts empty and
//! the subcommands are mostly useful against a shared tier.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::cache::{InMemorySharedTier, PrometheusExporter, METRICS_NAMESPACE};
use tiercache::{CacheConfig, CacheManager, CodecKind};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - hybrid memory / shared-tier cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; flags below override its values
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Shared tier backend
    #[arg(long, env = "TIERCACHE_SHARED_TIER", value_enum, default_value = "redis")]
    shared_tier: SharedTierMode,

    /// Shared tier connection string (e.g. redis://127.0.0.1:6379/0)
    #[arg(long, env = "TIERCACHE_SHARED_TIER_ADDRESS")]
    shared_tier_address: Option<String>,

    /// Default TTL in seconds
    #[arg(long, env = "TIERCACHE_DEFAULT_TTL_SECONDS")]
    default_ttl_seconds: Option<u64>,

    /// Memory tier capacity (entries)
    #[arg(long, env = "TIERCACHE_MEMORY_TIER_CAPACITY")]
    memory_tier_capacity: Option<usize>,

    /// Shared tier payload codec (compact, readable)
    #[arg(long, env = "TIERCACHE_CODEC")]
    codec: Option<CodecKind>,

    /// Prefix prepended to every key
    #[arg(long, env = "TIERCACHE_KEY_PREFIX")]
    key_prefix: Option<String>,

    /// Timeout for each shared tier call in milliseconds
    #[arg(long, env = "TIERCACHE_SHARED_TIER_TIMEOUT_MS")]
    shared_tier_timeout_ms: Option<u64>,

    /// Deadline for a whole shared tier key scan (clear, keys) in milliseconds
    #[arg(long, env = "TIERCACHE_SHARED_TIER_SCAN_TIMEOUT_MS")]
    shared_tier_scan_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TIERCACHE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "TIERCACHE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SharedTierMode {
    /// Redis at --shared-tier-address (memory-only when no address is set)
    Redis,
    /// Process-local stand-in, for trying the CLI without a server
    Memory,
    /// Memory tier only
    #[value(name = "none")]
    Disabled,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the health report
    Health,
    /// Print statistics
    Stats {
        /// Prometheus text format instead of JSON
        #[arg(long)]
        prometheus: bool,
    },
    /// Print the value stored under a key
    Get { key: String },
    /// Store a JSON value under a key
    Set {
        key: String,
        /// JSON document, e.g. '{"name":"a"}' or '"text"'
        value: String,
        /// TTL in seconds (defaults to the configured default TTL)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete a key from both tiers
    Delete { key: String },
    /// Delete every key containing a pattern (everything when omitted)
    Clear { pattern: Option<String> },
    /// List keys containing a pattern
    Keys { pattern: Option<String> },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = build_config(&args)?;
    let cache = build_manager(&args, config)?;

    if !cache.connect().await && cache.is_degraded() {
        warn!("Shared tier unavailable, running memory-only");
    }

    let result = run(&cache, args.command).await;
    cache.shutdown().await;

    println!("{}", result?);
    Ok(())
}

async fn run(cache: &CacheManager<Value>, command: Command) -> anyhow::Result<String> {
    let output = match command {
        Command::Health => serde_json::to_string_pretty(&cache.health_check().await)?,
        Command::Stats { prometheus: true } => {
            let exporter = PrometheusExporter::new(METRICS_NAMESPACE)?;
            exporter.observe(&cache.stats().await);
            exporter.render()?.trim_end().to_string()
        }
        Command::Stats { prometheus: false } => {
            serde_json::to_string_pretty(&cache.stats().await)?
        }
        Command::Get { key } => match cache.get(&key).await {
            Some(value) => serde_json::to_string_pretty(&value)?,
            None => bail!("key '{}' not found", key),
        },
        Command::Set { key, value, ttl } => {
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("value for '{}' is not valid JSON", key))?;
            let ttl = ttl.unwrap_or(cache.config().default_ttl_seconds);
            cache.set_with_ttl(&key, value, ttl).await?;
            info!(key = %key, ttl, "value stored");
            json!({ "key": key, "ttl_seconds": ttl, "shared_tier": cache.state().to_string() })
                .to_string()
        }
        Command::Delete { key } => {
            let removed = cache.delete(&key).await;
            json!({ "key": key, "removed_from_memory": removed }).to_string()
        }
        Command::Clear { pattern } => {
            let removed = cache.clear(pattern.as_deref()).await;
            json!({ "pattern": pattern, "removed_from_memory": removed }).to_string()
        }
        Command::Keys { pattern } => {
            serde_json::to_string_pretty(&cache.keys(pattern.as_deref()).await)?
        }
    };
    Ok(output)
}

// =============================================================================
// Configuration
// =============================================================================

fn build_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CacheConfig::default(),
    };

    if let Some(address) = &args.shared_tier_address {
        config.shared_tier_address = Some(address.clone());
    }
    if let Some(ttl) = args.default_ttl_seconds {
        config.default_ttl_seconds = ttl;
    }
    if let Some(capacity) = args.memory_tier_capacity {
        config.memory_tier_capacity = capacity;
    }
    if let Some(codec) = args.codec {
        config.codec = codec;
    }
    if let Some(prefix) = &args.key_prefix {
        config.key_prefix = prefix.clone();
    }
    if let Some(timeout_ms) = args.shared_tier_timeout_ms {
        config.shared_tier_timeout_ms = timeout_ms;
    }
    if let Some(timeout_ms) = args.shared_tier_scan_timeout_ms {
        config.shared_tier_scan_timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

fn build_manager(args: &Args, config: CacheConfig) -> anyhow::Result<CacheManager<Value>> {
    let manager = match args.shared_tier {
        SharedTierMode::Redis => CacheManager::new(config)?,
        SharedTierMode::Memory => {
            CacheManager::with_shared_tier(config, Arc::new(InMemorySharedTier::new()))?
        }
        SharedTierMode::Disabled => CacheManager::memory_only(config)?,
    };
    Ok(manager)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr, stdout carries the command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Tests
// =============================================================================
