//! Sampling loop
//!
//! Captures the startup baseline, then runs one collection cycle per
//! interval. Cycles never overlap: the next sleep starts only after the
//! current cycle has finished.

use super::{ClusterSource, Sampler, SamplerState};
use crate::health::HealthRegistry;
use crate::observability::ExporterMetrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Pause between cycles (default: 10 seconds)
    pub interval: Duration,
    /// Upper bound on in-flight usage lookups per cycle
    pub max_concurrent_fetches: usize,
    /// Missed cycles before a series is dropped; 0 keeps series forever
    pub stale_after_cycles: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_concurrent_fetches: 4,
            stale_after_cycles: 0,
        }
    }
}

/// Periodic driver for a [`Sampler`]
pub struct SamplerLoop {
    sampler: Sampler,
    state: SamplerState,
    config: SamplerConfig,
}

impl SamplerLoop {
    pub fn new(sampler: Sampler, state: SamplerState, config: SamplerConfig) -> Self {
        Self {
            sampler,
            state,
            config,
        }
    }

    pub fn state(&self) -> &SamplerState {
        &self.state
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrent_fetches = self.config.max_concurrent_fetches,
            stale_after_cycles = self.config.stale_after_cycles,
            "Starting sampling loop"
        );

        self.sampler
            .metrics()
            .set_benchmark_start(self.state.started_at().timestamp_millis() as f64 / 1000.0);

        loop {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down sampling loop");
                    break;
                }
            }
        }
    }

    /// Capture the baseline if still missing, then collect
    pub async fn tick(&mut self) {
        if self.state.baseline().is_none() {
            if let Err(e) = self.sampler.capture_baseline(&mut self.state).await {
                warn!(error = %e, "Baseline capture failed, retrying next interval");
                return;
            }
        }

        // Failures are logged and counted inside the cycle
        let _ = self.sampler.collect_cycle(&mut self.state).await;
    }
}

/// Builder for creating the sampling loop
pub struct SamplerLoopBuilder {
    source: Option<Arc<dyn ClusterSource>>,
    metrics: Option<ExporterMetrics>,
    health: Option<HealthRegistry>,
    started_at: Option<DateTime<Utc>>,
    config: SamplerConfig,
}

impl SamplerLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            metrics: None,
            health: None,
            started_at: None,
            config: SamplerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn ClusterSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Start of the measurement window (default: now)
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.config.max_concurrent_fetches = limit;
        self
    }

    pub fn stale_after_cycles(mut self, cycles: u64) -> Self {
        self.config.stale_after_cycles = cycles;
        self
    }

    pub fn build(self) -> Result<SamplerLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Cluster source is required"))?;
        let metrics = self.metrics.unwrap_or_default();
        let health = self.health.unwrap_or_default();

        let sampler = Sampler::new(source, metrics, health, self.config.max_concurrent_fetches);
        let state = SamplerState::new(
            self.started_at.unwrap_or_else(Utc::now),
            self.config.stale_after_cycles,
        );

        Ok(SamplerLoop::new(sampler, state, self.config))
    }
}

impl Default for SamplerLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
