//! tiercache Integration Tests
//!
//! Exercises the public API end to end:
//! - Two-tier read/write flow across manager instances
//! - Degradation when the shared tier fails
//! - Memory tier invariants (TTL, capacity, eviction order)
//! - Reporting (stats, health, Prometheus exposition)

use std::sync::Arc;
use std::time::Duration;

use tiercache::cache::{InMemorySharedTier, SharedTier};
use tiercache::{CacheConfig, CacheManager, CodecKind, HealthStatus, SharedTierState};

fn config(prefix: &str) -> CacheConfig {
    CacheConfig::builder()
        .key_prefix(prefix)
        .memory_tier_capacity(64)
        .build()
        .unwrap()
}

async fn connected(
    config: CacheConfig,
    shared: &Arc<InMemorySharedTier>,
) -> CacheManager<serde_json::Value> {
    let manager = CacheManager::with_shared_tier(config, shared.clone()).unwrap();
    assert!(manager.connect().await);
    manager
}

// =============================================================================
// Two-Tier Flow
// =============================================================================

mod cache_tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_instances_share_through_shared_tier() {
        let shared = Arc::new(InMemorySharedTier::new());
        let writer = connected(config("app:"), &shared).await;
        let reader = connected(config("app:"), &shared).await;

        writer.set("user:1", json!({ "name": "ada" })).await.unwrap();

        assert_eq!(reader.memory_tier().size(), 0);
        assert_eq!(reader.get("user:1").await, Some(json!({ "name": "ada" })));
        assert_eq!(reader.memory_tier().size(), 1);
        assert_eq!(reader.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_prefixes_isolate_caches() {
        let shared = Arc::new(InMemorySharedTier::new());
        let billing = connected(config("billing:"), &shared).await;
        let search = connected(config("search:"), &shared).await;

        billing.set("k", json!(1)).await.unwrap();
        search.set("k", json!(2)).await.unwrap();

        assert_eq!(billing.get("k").await, Some(json!(1)));
        assert_eq!(search.get("k").await, Some(json!(2)));

        billing.clear(None).await;
        assert!(shared.peek("billing:k").is_none());
        assert!(shared.peek("search:k").is_some());
    }

    #[tokio::test]
    async fn test_readable_codec_stores_json() {
        let shared = Arc::new(InMemorySharedTier::new());
        let cfg = CacheConfig::builder()
            .codec(CodecKind::Readable)
            .build()
            .unwrap();
        let manager = connected(cfg, &shared).await;

        manager.set("k", json!({ "a": [1, 2] })).await.unwrap();
        let raw = shared.peek("k").unwrap();
        assert_eq!(raw.as_ref(), br#"{"a":[1,2]}"#);
    }

    #[tokio::test]
    async fn test_codec_switch_reads_as_miss() {
        let shared = Arc::new(InMemorySharedTier::new());
        let compact = connected(config("c:"), &shared).await;
        compact.set("k", json!("value")).await.unwrap();

        let readable_cfg = CacheConfig::builder()
            .key_prefix("c:")
            .codec(CodecKind::Readable)
            .build()
            .unwrap();
        let readable = connected(readable_cfg, &shared).await;

        assert_eq!(readable.get("k").await, None);
        assert_eq!(readable.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_set_with_ttl_reaches_shared_tier() {
        let shared = Arc::new(InMemorySharedTier::new());
        let manager = connected(config("t:"), &shared).await;

        manager
            .set_with_ttl("short", json!(true), 1)
            .await
            .unwrap();
        assert!(shared.peek("t:short").is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(shared.peek("t:short").is_none());
        assert_eq!(manager.get("short").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_callers() {
        let shared = Arc::new(InMemorySharedTier::new());
        let manager = Arc::new(connected(config("p:"), &shared).await);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let key = format!("k{}", i % 4);
                    manager.set(&key, json!(i)).await.unwrap();
                    manager.get(&key).await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }
        let stats = manager.stats().await;
        assert_eq!(stats.sets, 16);
        assert_eq!(stats.hits, 16);
        assert_eq!(manager.memory_tier().size(), 4);
    }
}

// =============================================================================
// Degradation
// =============================================================================

mod degradation_tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_operations_survive_unreachable_shared_tier() {
        let shared = Arc::new(InMemorySharedTier::unavailable());
        let manager =
            CacheManager::<serde_json::Value>::with_shared_tier(config("d:"), shared.clone())
                .unwrap();
        assert!(!manager.connect().await);

        manager.set("k", json!(1)).await.unwrap();
        assert_eq!(manager.get("k").await, Some(json!(1)));
        assert!(manager.delete("k").await);
        assert_eq!(manager.clear(None).await, 0);

        let report = manager.health_check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(shared.writes(), 0);
    }

    #[tokio::test]
    async fn test_failure_mid_session_degrades_then_recovers() {
        let shared = Arc::new(InMemorySharedTier::new());
        let manager = connected(config("r:"), &shared).await;

        shared.set_available(false);
        assert_eq!(manager.get("absent").await, None);
        assert_eq!(manager.state(), SharedTierState::Disconnected);
        assert_eq!(manager.health_check().await.status, HealthStatus::Degraded);

        shared.set_available(true);
        manager.run_maintenance().await;
        assert_eq!(manager.state(), SharedTierState::Connected);
        assert_eq!(manager.health_check().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_background_maintenance_reconnects() {
        let shared = Arc::new(InMemorySharedTier::unavailable());
        let cfg = CacheConfig::builder()
            .maintenance_interval_seconds(1)
            .build()
            .unwrap();
        let manager = Arc::new(
            CacheManager::<serde_json::Value>::with_shared_tier(cfg, shared.clone()).unwrap(),
        );
        assert!(!manager.connect().await);

        let handle = manager.spawn_maintenance();
        shared.set_available(true);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while manager.state() != SharedTierState::Connected {
            assert!(tokio::time::Instant::now() < deadline, "never reconnected");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        manager.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_only_matches_shared_semantics() {
        let memory_only = CacheManager::<serde_json::Value>::new(config("e:")).unwrap();
        let shared = Arc::new(InMemorySharedTier::new());
        let tiered = connected(config("e:"), &shared).await;

        for manager in [&memory_only, &tiered] {
            manager.set("a", json!("x")).await.unwrap();
            assert_eq!(manager.get("a").await, Some(json!("x")));
            assert!(manager.delete("a").await);
            assert!(!manager.delete("a").await);
            assert_eq!(manager.get("a").await, None);
        }

        let (a, b) = (memory_only.stats().await, tiered.stats().await);
        assert_eq!((a.hits, a.misses, a.sets, a.deletes), (b.hits, b.misses, b.sets, b.deletes));
    }
}

// =============================================================================
// Memory Tier Invariants
// =============================================================================

mod memory_tier_tests {
    use super::*;
    use tiercache::cache::MemoryTier;

    #[test]
    fn test_capacity_scenario_evicts_oldest() {
        let tier = MemoryTier::new(4).unwrap();
        for key in ["a", "b", "c", "d"] {
            tier.set(key, key.to_string(), Duration::from_secs(60)).unwrap();
        }
        tier.set("e", "e".to_string(), Duration::from_secs(60)).unwrap();

        assert_eq!(tier.size(), 4);
        assert!(!tier.contains("a"));
        for key in ["b", "c", "d", "e"] {
            assert!(tier.contains(key));
        }
    }

    #[test]
    fn test_expired_entry_removed_on_get() {
        let tier = MemoryTier::new(4).unwrap();
        tier.set("k", 1u32, Duration::from_millis(20)).unwrap();
        assert_eq!(tier.size(), 1);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(tier.get("k"), None);
        assert_eq!(tier.size(), 0);
        assert_eq!(tier.expirations(), 1);
    }

    #[tokio::test]
    async fn test_clear_user_prefix_scenario() {
        let manager = CacheManager::<String>::new(CacheConfig::default()).unwrap();
        for key in ["user:1", "user:2", "session:1"] {
            manager.set(key, key.to_string()).await.unwrap();
        }

        assert_eq!(manager.clear(Some("user:")).await, 2);
        assert_eq!(manager.get("session:1").await.as_deref(), Some("session:1"));
        assert_eq!(manager.get("user:1").await, None);
    }

    #[tokio::test]
    async fn test_capacity_holds_under_load() {
        let cfg = CacheConfig::builder().memory_tier_capacity(10).build().unwrap();
        let manager = CacheManager::<u64>::new(cfg).unwrap();
        for i in 0..100u64 {
            manager.set(&format!("k{}", i), i).await.unwrap();
            assert!(manager.memory_tier().size() <= 10);
        }
        assert!(manager.stats().await.evictions > 0);
    }
}

// =============================================================================
// Reporting
// =============================================================================

mod reporting_tests {
    use super::*;
    use tiercache::cache::PrometheusExporter;

    #[tokio::test]
    async fn test_stats_and_exposition() {
        let shared = Arc::new(InMemorySharedTier::new());
        let manager = connected(config("m:"), &shared).await;

        manager.set("a", serde_json::json!(1)).await.unwrap();
        manager.get("a").await;
        manager.get("b").await;
        manager.get("c").await;

        let stats = manager.stats().await;
        assert_eq!(stats.hit_rate, 1.0 / 3.0);
        assert_eq!(stats.memory_usage, 1);
        assert_eq!(stats.shared_tier_usage, shared.usage_bytes().await.unwrap());

        let exporter = PrometheusExporter::new("tiercache").unwrap();
        exporter.observe(&stats);
        let text = exporter.render().unwrap();
        assert!(text.contains("tiercache_misses_total 2"));
        assert!(text.contains("tiercache_sets_total 1"));
    }

    #[tokio::test]
    async fn test_health_report_json_shape() {
        let manager = CacheManager::<String>::new(CacheConfig::default()).unwrap();
        let report = manager.health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["memory_tier"]["enabled"], true);
        assert_eq!(json["shared_tier"]["enabled"], false);
        assert!(json["checked_at"].is_string());
        assert_eq!(json["instance_id"], manager.instance_id().to_string());
    }

    #[test]
    fn test_yaml_config_drives_manager() {
        let cfg = CacheConfig::from_yaml_str(
            "key_prefix: \"yaml:\"\nmemory_tier_capacity: 2\ndefault_ttl_seconds: 5\n",
        )
        .unwrap();
        let manager = CacheManager::<String>::new(cfg).unwrap();
        assert_eq!(manager.memory_tier().capacity(), 2);
        assert_eq!(manager.namespacer().prefix(), "yaml:");
    }
}
