//! Exporter configuration

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Port for the metrics and health endpoints
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Pause between sampling cycles in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_seconds: u64,

    /// Usage lookups in flight per cycle
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Missed cycles before a series is dropped (0 keeps series forever)
    #[serde(default)]
    pub stale_after_cycles: u64,

    /// Start of the measurement window, RFC 3339
    #[serde(default)]
    pub benchmark_start_time: Option<String>,
}

fn default_metrics_port() -> u16 {
    8000
}

fn default_collection_interval() -> u64 {
    10
}

fn default_max_concurrent_fetches() -> usize {
    4
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            collection_interval_seconds: default_collection_interval(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            stale_after_cycles: 0,
            benchmark_start_time: None,
        }
    }
}

impl ExporterConfig {
    /// Load configuration from the environment
    ///
    /// `EXPORTER_*` variables map onto fields. `COLLECTION_INTERVAL_SECONDS`
    /// and `BENCHMARK_START_TIME` are also honored unprefixed.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXPORTER").try_parsing(true))
            .set_override_option(
                "collection_interval_seconds",
                lookup("COLLECTION_INTERVAL_SECONDS"),
            )?
            .set_override_option("benchmark_start_time", lookup("BENCHMARK_START_TIME"))?
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid exporter configuration, using defaults");
            ExporterConfig::default()
        }))
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.collection_interval_seconds.max(1))
    }

    /// Parsed measurement window start, if configured and valid
    pub fn benchmark_start(&self) -> Option<DateTime<Utc>> {
        let raw = self.benchmark_start_time.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring invalid BENCHMARK_START_TIME");
                None
            }
        }
    }
}
