//! Prometheus exposition of cache statistics

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use super::stats::CacheStats;
use crate::error::Result;

/// Mirrors [`CacheStats`] snapshots into a private Prometheus registry
///
/// Monotonic statistics are counters (`_total`); entry and byte usage are
/// gauges.
pub struct PrometheusExporter {
    registry: Registry,
    hits: IntCounter,
    misses: IntCounter,
    sets: IntCounter,
    deletes: IntCounter,
    evictions: IntCounter,
    expirations: IntCounter,
    shared_tier_errors: IntCounter,
    memory_usage: IntGauge,
    shared_tier_usage: IntGauge,
    hit_rate: Gauge,
}

impl PrometheusExporter {
    /// Create an exporter whose metric names start with `namespace_`
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter> {
            let counter = IntCounter::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };
        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let hits = counter("hits_total", "Lookups served from either tier")?;
        let misses = counter("misses_total", "Lookups served by neither tier")?;
        let sets = counter("sets_total", "Completed set operations")?;
        let deletes = counter("deletes_total", "Delete operations")?;
        let evictions =
            counter("evictions_total", "Live memory tier entries evicted for capacity")?;
        let expirations = counter("expirations_total", "Expired memory tier entries removed")?;
        let shared_tier_errors =
            counter("shared_tier_errors_total", "Failed shared tier calls")?;
        let memory_usage = int_gauge("memory_tier_entries", "Entries held by the memory tier")?;
        let shared_tier_usage = int_gauge("shared_tier_bytes", "Bytes used by the shared tier")?;

        let hit_rate = Gauge::with_opts(
            Opts::new("hit_rate", "hits / (hits + misses)").namespace(namespace),
        )?;
        registry.register(Box::new(hit_rate.clone()))?;

        Ok(Self {
            registry,
            hits,
            misses,
            sets,
            deletes,
            evictions,
            expirations,
            shared_tier_errors,
            memory_usage,
            shared_tier_usage,
            hit_rate,
        })
    }

    /// Bring the metrics up to a snapshot
    ///
    /// Counters only move forward: a snapshot older than one already
    /// observed leaves them where they are.
    pub fn observe(&self, stats: &CacheStats) {
        advance(&self.hits, stats.hits);
        advance(&self.misses, stats.misses);
        advance(&self.sets, stats.sets);
        advance(&self.deletes, stats.deletes);
        advance(&self.evictions, stats.evictions);
        advance(&self.expirations, stats.expirations);
        advance(&self.shared_tier_errors, stats.shared_tier_errors);
        self.memory_usage.set(stats.memory_usage as i64);
        self.shared_tier_usage.set(stats.shared_tier_usage as i64);
        self.hit_rate.set(stats.hit_rate);
    }

    /// Render the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let delta = total.saturating_sub(counter.get());
    if delta > 0 {
        counter.inc_by(delta);
    }
}

// =============================================================================
// Tests
// =============================================================================
