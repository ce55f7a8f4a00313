//! Health Reports
//!
//! A cache that lost its shared tier still serves from memory, so the worst
//! status a manager reports is [`HealthStatus::Degraded`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stats::CacheStats;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every configured tier is reachable
    Healthy,
    /// Shared tier configured but unreachable, memory tier serving alone
    Degraded,
}

impl HealthStatus {
    /// Check if status is healthy
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Memory tier section of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTierHealth {
    pub enabled: bool,
    pub items: usize,
    pub capacity: usize,
}

/// Shared tier section of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedTierHealth {
    pub enabled: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SharedTierHealth {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            connected: false,
            backend: None,
            error: None,
        }
    }
}

/// Overall health report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub instance_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub memory_tier: MemoryTierHealth,
    pub shared_tier: SharedTierHealth,
    pub stats: CacheStats,
}

impl HealthReport {
    /// Assemble a report, deriving the status from the shared tier section
    pub fn new(
        instance_id: Uuid,
        memory_tier: MemoryTierHealth,
        shared_tier: SharedTierHealth,
        stats: CacheStats,
    ) -> Self {
        let status = if shared_tier.enabled && !shared_tier.connected {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            instance_id,
            checked_at: Utc::now(),
            memory_tier,
            shared_tier,
            stats,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> MemoryTierHealth {
        MemoryTierHealth {
            enabled: true,
            items: 3,
            capacity: 10,
        }
    }

    #[test]
    fn test_disabled_shared_tier_is_healthy() {
        let report = HealthReport::new(
            Uuid::new_v4(),
            memory(),
            SharedTierHealth::disabled(),
            CacheStats::default(),
        );
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_unreachable_shared_tier_is_degraded() {
        let shared = SharedTierHealth {
            enabled: true,
            connected: false,
            backend: Some("redis".to_string()),
            error: Some("connection refused".to_string()),
        };
        let report = HealthReport::new(Uuid::new_v4(), memory(), shared, CacheStats::default());
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.status.is_healthy());
    }

    #[test]
    fn test_report_serialization() {
        let report = HealthReport::new(
            Uuid::nil(),
            memory(),
            SharedTierHealth::disabled(),
            CacheStats::default(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["memory_tier"]["items"], 3);
        assert_eq!(json["shared_tier"]["enabled"], false);
        assert!(json["shared_tier"].get("error").is_none());
    }
}
