//! Collector configuration
//!
//! Env-var driven configuration for the Xray connection, the collection
//! loop, the output sink, and the state store.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::XRAY_TIMESTAMP_FORMAT;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default scheme for the Xray endpoint.
pub const DEFAULT_XRAY_SCHEME: &str = "http";

/// Default Xray API port.
pub const DEFAULT_XRAY_PORT: u16 = 8000;

/// Default path of the violations list endpoint.
pub const DEFAULT_VIOLATIONS_PATH: &str = "/api/v1/violations";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default retry budget for transient transport failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default exponential backoff base in seconds.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;

/// Default size of the detail-fetch worker pool.
pub const DEFAULT_NUM_WORKERS: usize = 5;

/// Fixed page size requested from the list endpoint.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Default wall-clock budget for one collection run, in seconds.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 300;

/// Default backfill horizon for a fresh state store, in days.
pub const DEFAULT_BACKFILL_DAYS: i64 = 30;

/// Default location of the JSON state file.
pub const DEFAULT_STATE_PATH: &str = "./xvc-state.json";

/// Default single-instance lock expiry in minutes.
pub const DEFAULT_LOCK_EXPIRY_MINS: u64 = 10;

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub xray: XrayConfig,
    pub collection: CollectionConfig,
    pub sink: SinkConfig,
    pub state: StateConfig,
}

/// Xray API connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrayConfig {
    pub scheme: String,
    pub hostname: String,
    pub port: u16,
    pub violations_path: String,
    pub username: String,
    pub password: String,
}

impl XrayConfig {
    /// Full URL of the violations list endpoint.
    pub fn violations_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.hostname, self.port, self.violations_path
        )
    }
}

/// Collection loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub num_workers: usize,
    pub page_limit: u64,
    pub time_budget_secs: u64,
    pub backfill_days: i64,
    /// Explicit initial window start (Xray timestamp format). Overrides the
    /// backfill computation when set.
    pub start_from: Option<String>,
}

impl CollectionConfig {
    /// Per-request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Run time budget as Duration
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    /// Window lower bound to use when no checkpoint exists yet.
    pub fn default_created_from(&self) -> String {
        match &self.start_from {
            Some(ts) => ts.clone(),
            None => (Utc::now() - ChronoDuration::days(self.backfill_days))
                .format(XRAY_TIMESTAMP_FORMAT)
                .to_string(),
        }
    }
}

/// Output sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Receiver URL registered under the `HTTP_LOGS_ENDPOINT` key.
    pub http_logs_endpoint: String,
}

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub path: PathBuf,
    pub lock_expiry_mins: u64,
}

impl StateConfig {
    /// Lock expiry as Duration
    pub fn lock_expiry(&self) -> Duration {
        Duration::from_secs(self.lock_expiry_mins * 60)
    }
}

impl CollectorConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = CollectorConfig {
            xray: XrayConfig {
                scheme: std::env::var("XVC_XRAY_SCHEME")
                    .unwrap_or_else(|_| DEFAULT_XRAY_SCHEME.to_string()),
                hostname: std::env::var("XVC_XRAY_HOSTNAME").unwrap_or_default(),
                port: std::env::var("XVC_XRAY_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_XRAY_PORT),
                violations_path: std::env::var("XVC_XRAY_VIOLATIONS_PATH")
                    .unwrap_or_else(|_| DEFAULT_VIOLATIONS_PATH.to_string()),
                username: std::env::var("XVC_XRAY_USERNAME").unwrap_or_default(),
                password: std::env::var("XVC_XRAY_PASSWORD").unwrap_or_default(),
            },
            collection: CollectionConfig {
                timeout_secs: std::env::var("XVC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
                max_retries: std::env::var("XVC_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_RETRIES),
                backoff_factor: std::env::var("XVC_BACKOFF_FACTOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BACKOFF_FACTOR),
                num_workers: std::env::var("XVC_NUM_WORKERS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_NUM_WORKERS),
                page_limit: std::env::var("XVC_PAGE_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PAGE_LIMIT),
                time_budget_secs: std::env::var("XVC_TIME_BUDGET_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIME_BUDGET_SECS),
                backfill_days: std::env::var("XVC_BACKFILL_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BACKFILL_DAYS),
                start_from: std::env::var("XVC_START_FROM").ok(),
            },
            sink: SinkConfig {
                http_logs_endpoint: std::env::var("XVC_HTTP_LOGS_ENDPOINT").unwrap_or_default(),
            },
            state: StateConfig {
                path: std::env::var("XVC_STATE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_PATH)),
                lock_expiry_mins: std::env::var("XVC_LOCK_EXPIRY_MINS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOCK_EXPIRY_MINS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.xray.hostname.is_empty() {
            anyhow::bail!("XVC_XRAY_HOSTNAME cannot be empty");
        }
        if self.xray.port == 0 {
            anyhow::bail!("XVC_XRAY_PORT must be greater than 0");
        }
        if self.xray.username.is_empty() {
            anyhow::bail!("XVC_XRAY_USERNAME cannot be empty");
        }
        if self.sink.http_logs_endpoint.is_empty() {
            anyhow::bail!("XVC_HTTP_LOGS_ENDPOINT cannot be empty");
        }
        if self.collection.num_workers == 0 {
            anyhow::bail!("XVC_NUM_WORKERS must be greater than 0");
        }
        if self.collection.page_limit == 0 {
            anyhow::bail!("XVC_PAGE_LIMIT must be greater than 0");
        }
        if self.collection.timeout_secs == 0 {
            anyhow::bail!("XVC_TIMEOUT_SECS must be greater than 0");
        }
        if let Some(start_from) = &self.collection.start_from {
            if chrono::NaiveDateTime::parse_from_str(start_from, XRAY_TIMESTAMP_FORMAT).is_err() {
                anyhow::bail!(
                    "XVC_START_FROM must match {}, got: {}",
                    XRAY_TIMESTAMP_FORMAT,
                    start_from
                );
            }
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            xray: XrayConfig {
                scheme: DEFAULT_XRAY_SCHEME.to_string(),
                hostname: "localhost".to_string(),
                port: DEFAULT_XRAY_PORT,
                violations_path: DEFAULT_VIOLATIONS_PATH.to_string(),
                username: "admin".to_string(),
                password: String::new(),
            },
            collection: CollectionConfig::default(),
            sink: SinkConfig {
                http_logs_endpoint: String::new(),
            },
            state: StateConfig {
                path: PathBuf::from(DEFAULT_STATE_PATH),
                lock_expiry_mins: DEFAULT_LOCK_EXPIRY_MINS,
            },
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            num_workers: DEFAULT_NUM_WORKERS,
            page_limit: DEFAULT_PAGE_LIMIT,
            time_budget_secs: DEFAULT_TIME_BUDGET_SECS,
            backfill_days: DEFAULT_BACKFILL_DAYS,
            start_from: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_url() {
        let config = XrayConfig {
            scheme: "http".to_string(),
            hostname: "xray.local".to_string(),
            port: 8000,
            violations_path: "/api/v1/violations".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(
            config.violations_url(),
            "http://xray.local:8000/api/v1/violations"
        );
    }

    #[test]
    fn test_default_created_from_prefers_start_from() {
        let config = CollectionConfig {
            start_from: Some("2024-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert_eq!(config.default_created_from(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_default_created_from_backfill_format() {
        let config = CollectionConfig::default();
        let created_from = config.default_created_from();
        assert!(
            chrono::NaiveDateTime::parse_from_str(&created_from, XRAY_TIMESTAMP_FORMAT).is_ok(),
            "unexpected timestamp: {}",
            created_from
        );
    }

    #[test]
    fn test_validation_empty_hostname() {
        let config = CollectorConfig {
            sink: SinkConfig {
                http_logs_endpoint: "http://sumo.local/receiver".to_string(),
            },
            xray: XrayConfig {
                hostname: String::new(),
                ..CollectorConfig::default().xray
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_workers() {
        let mut config = CollectorConfig::default();
        config.sink.http_logs_endpoint = "http://sumo.local/receiver".to_string();
        config.collection.num_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_start_from() {
        let mut config = CollectorConfig::default();
        config.sink.http_logs_endpoint = "http://sumo.local/receiver".to_string();
        config.collection.start_from = Some("yesterday".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid() {
        let mut config = CollectorConfig::default();
        config.sink.http_logs_endpoint = "http://sumo.local/receiver".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let config = CollectionConfig {
            timeout_secs: 30,
            time_budget_secs: 120,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.time_budget(), Duration::from_secs(120));

        let state = StateConfig {
            path: PathBuf::from("/tmp/state.json"),
            lock_expiry_mins: 10,
        };
        assert_eq!(state.lock_expiry(), Duration::from_secs(600));
    }
}
