//! Engine configuration
//!
//! One serde-friendly struct covering every tunable the engine exposes,
//! with defaults matching the production deployment this system grew out
//! of: 7/4/3 tiered retention, a weekly offsite window, and a 36-hour
//! backup staleness alarm.

use blob_store::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BackupError, BackupResult};
use crate::health::HealthConfig;
use crate::retention::RetentionPolicy;
use crate::scheduler::ScheduleConfig;

/// Configuration for the backup engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identity of the protected database; keys the backup/restore lease
    pub database: String,
    /// Tiered retention keep counts
    pub retention: RetentionPolicy,
    /// Snapshots created within this many days are eligible for offsite
    /// replication
    pub replication_window_days: i64,
    /// Attempts per adapter call, including the first
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry
    pub retry_delay_ms: u64,
    /// Timeout applied to each individual adapter call
    pub op_timeout_ms: u64,
    /// Artifacts smaller than this are rejected as failed dumps
    pub min_snapshot_bytes: u64,
    /// Lease lifetime; an expired lease can be taken over
    pub lease_ttl_secs: u64,
    /// Path of the append-only run log
    pub sync_log_path: PathBuf,
    /// Maximum records retained in the run log
    pub sync_log_cap: usize,
    /// Health monitor thresholds
    pub health: HealthConfig,
    /// Periodic trigger intervals
    pub schedule: ScheduleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: "postgres".to_string(),
            retention: RetentionPolicy::default(),
            replication_window_days: 7,
            max_retries: 3,
            retry_delay_ms: 500,
            op_timeout_ms: 30_000,
            min_snapshot_bytes: 1000,
            lease_ttl_secs: 3600,
            sync_log_path: PathBuf::from("backup_log.json"),
            sync_log_cap: 100,
            health: HealthConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check invariants that would otherwise surface as confusing runtime
    /// behavior. Called at startup of each component.
    pub fn validate(&self) -> BackupResult<()> {
        if self.database.is_empty() {
            return Err(BackupError::Configuration {
                message: "database identity must not be empty".to_string(),
            });
        }
        if self.replication_window_days < 1 {
            return Err(BackupError::Configuration {
                message: format!(
                    "replication_window_days must be at least 1, got {}",
                    self.replication_window_days
                ),
            });
        }
        if self.max_retries == 0 {
            return Err(BackupError::Configuration {
                message: "max_retries must be at least 1".to_string(),
            });
        }
        if self.sync_log_cap == 0 {
            return Err(BackupError::Configuration {
                message: "sync_log_cap must be at least 1".to_string(),
            });
        }
        if !(self.health.undersized_ratio > 0.0 && self.health.undersized_ratio <= 1.0) {
            return Err(BackupError::Configuration {
                message: format!(
                    "undersized_ratio must be within (0, 1], got {}",
                    self.health.undersized_ratio
                ),
            });
        }
        if self.health.baseline_window == 0 {
            return Err(BackupError::Configuration {
                message: "baseline_window must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Retry bounds for adapter calls, derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            op_timeout: Duration::from_millis(self.op_timeout_ms),
        }
    }

    /// Lease lifetime as a chrono duration.
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs as i64)
    }

    /// Replication eligibility window as a chrono duration.
    pub fn replication_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.replication_window_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retention.daily_keep, 7);
        assert_eq!(config.retention.weekly_keep, 4);
        assert_eq!(config.retention.monthly_keep, 3);
        assert_eq!(config.replication_window_days, 7);
        assert_eq!(config.min_snapshot_bytes, 1000);
    }

    #[test]
    fn rejects_empty_database() {
        let config = EngineConfig {
            database: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BackupError::Configuration { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_undersized_ratio() {
        for ratio in [0.0, -0.5, 1.5] {
            let mut config = EngineConfig::default();
            config.health.undersized_ratio = ratio;
            assert!(
                matches!(config.validate(), Err(BackupError::Configuration { .. })),
                "ratio {ratio} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_max_retries() {
        let config = EngineConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_policy_reflects_config() {
        let config = EngineConfig {
            max_retries: 5,
            retry_delay_ms: 250,
            op_timeout_ms: 1000,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.op_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn toml_round_trip_with_partial_input() {
        let config: EngineConfig = serde_json::from_str(r#"{"database": "appdb"}"#).unwrap();
        assert_eq!(config.database, "appdb");
        assert_eq!(config.retention.daily_keep, 7);
        assert!(config.validate().is_ok());
    }
}
