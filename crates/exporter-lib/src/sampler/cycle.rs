//! One sampling cycle and the state carried between cycles

use super::ClusterSource;
use crate::boot::{boot_duration_secs, first_container_started_at};
use crate::counts::{scaling_deltas, Baseline, FunctionCounts, FunctionKey};
use crate::error::SourceError;
use crate::health::{components, HealthRegistry};
use crate::models::{PodSnapshot, PodUsage};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::platform::{classify, Classification};
use crate::series::{Family, SeriesTracker};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// State owned by the sampling loop
#[derive(Debug)]
pub struct SamplerState {
    baseline: Option<Baseline>,
    started_at: DateTime<Utc>,
    cycle: u64,
    series: SeriesTracker,
}

impl SamplerState {
    /// `stale_after_cycles` of 0 keeps series forever
    pub fn new(started_at: DateTime<Utc>, stale_after_cycles: u64) -> Self {
        Self {
            baseline: None,
            started_at,
            cycle: 0,
            series: SeriesTracker::new(stale_after_cycles),
        }
    }

    /// State with a baseline already in place
    pub fn with_baseline(baseline: Baseline, stale_after_cycles: u64) -> Self {
        Self {
            started_at: baseline.captured_at(),
            baseline: Some(baseline),
            cycle: 0,
            series: SeriesTracker::new(stale_after_cycles),
        }
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of collection cycles attempted so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Outcome of a completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pods_seen: usize,
    pub pods_classified: usize,
    /// Pods whose usage lookup failed or returned nothing
    pub usage_degraded: usize,
    pub boot_published: usize,
    pub deltas_published: usize,
    pub series_expired: usize,
}

/// Runs baseline capture and collection cycles against a cluster source
pub struct Sampler {
    source: Arc<dyn ClusterSource>,
    metrics: ExporterMetrics,
    health: HealthRegistry,
    logger: StructuredLogger,
    max_concurrent_fetches: usize,
}

impl Sampler {
    pub fn new(
        source: Arc<dyn ClusterSource>,
        metrics: ExporterMetrics,
        health: HealthRegistry,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            source,
            metrics,
            health,
            logger: StructuredLogger::new(components::SAMPLER),
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Record the startup pod counts; a no-op once a baseline exists
    pub async fn capture_baseline(&self, state: &mut SamplerState) -> Result<(), SourceError> {
        if state.baseline.is_some() {
            return Ok(());
        }

        let pods = self.list_pods().await?;
        let baseline = Baseline::capture(&pods);

        self.logger
            .log_baseline_captured(baseline.counts().len(), pods.len());
        for (key, count) in baseline.counts().iter() {
            debug!(
                platform = %key.platform,
                function = %key.function,
                count = count,
                "Baseline pod count"
            );
        }

        state.baseline = Some(baseline);
        self.health.set_ready(true).await;
        Ok(())
    }

    /// Run one full collection cycle
    ///
    /// A failed pod listing skips the cycle without touching any gauge.
    /// Per-pod usage failures degrade that pod to zero usage only.
    pub async fn collect_cycle(
        &self,
        state: &mut SamplerState,
    ) -> Result<CycleReport, SourceError> {
        let start = Instant::now();
        state.cycle += 1;
        let cycle = state.cycle;

        let pods = match self.list_pods().await {
            Ok(pods) => pods,
            Err(e) => {
                self.metrics.inc_cycle("skipped");
                self.logger.log_cycle_skipped(cycle, &e.to_string());
                return Err(e);
            }
        };

        let classified: Vec<(&PodSnapshot, Classification)> = pods
            .iter()
            .filter_map(|pod| classify(&pod.labels).map(|c| (pod, c)))
            .collect();

        let mut counts = FunctionCounts::new();
        for (pod, c) in &classified {
            counts.record(FunctionKey::from(c), &pod.namespace);
        }

        // Collected up front so no borrowing closure is held across the await
        let fetches: Vec<_> = classified
            .iter()
            .map(|(pod, _)| self.fetch_usage(pod))
            .collect();

        // buffered() keeps results in input order
        let usages: Vec<(PodUsage, bool)> = stream::iter(fetches)
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        let mut report = CycleReport {
            pods_seen: pods.len(),
            pods_classified: classified.len(),
            ..Default::default()
        };
        let mut cluster_cpu = 0.0;
        let mut cluster_memory: u64 = 0;

        for ((pod, c), (usage, degraded)) in classified.iter().zip(usages) {
            let labels = [pod.namespace.as_str(), pod.name.as_str(), c.function.as_str()];

            if degraded {
                report.usage_degraded += 1;
            }

            // Zero means "no data yet", not "idle"
            if usage.cpu_millicores > 0.0 {
                self.publish(
                    &mut state.series,
                    cycle,
                    Family::CpuUsage,
                    &labels,
                    usage.cpu_millicores,
                );
                cluster_cpu += usage.cpu_millicores;
            }
            if usage.memory_bytes > 0 {
                self.publish(
                    &mut state.series,
                    cycle,
                    Family::MemoryUsage,
                    &labels,
                    usage.memory_bytes as f64,
                );
                cluster_memory = cluster_memory.saturating_add(usage.memory_bytes);
            }

            if let Some(boot) = boot_duration_secs(pod) {
                self.publish(&mut state.series, cycle, Family::BootDuration, &labels, boot);
                report.boot_published += 1;
            }
            if let Some(started_at) = first_container_started_at(pod) {
                let unix_secs = started_at.timestamp_millis() as f64 / 1000.0;
                self.publish(
                    &mut state.series,
                    cycle,
                    Family::ContainerStartedAt,
                    &labels,
                    unix_secs,
                );
            }
        }

        self.metrics.set_cluster_usage(cluster_cpu, cluster_memory);

        for (key, count) in counts.iter() {
            let labels = [key.platform.as_str(), key.function.as_str(), counts.namespace(key)];
            self.publish(&mut state.series, cycle, Family::PodCount, &labels, count as f64);
        }

        if let Some(baseline) = &state.baseline {
            for (key, delta) in scaling_deltas(&counts, baseline) {
                let labels = [key.platform.as_str(), key.function.as_str(), counts.namespace(&key)];
                self.publish(
                    &mut state.series,
                    cycle,
                    Family::ScaledDifference,
                    &labels,
                    delta as f64,
                );
                report.deltas_published += 1;
            }
        }

        for (family, labels) in state.series.expire(cycle) {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            self.metrics.remove(family, &labels);
            report.series_expired += 1;
        }

        let elapsed = start.elapsed();
        self.metrics.set_pods_classified(report.pods_classified as i64);
        self.metrics.observe_cycle_duration(elapsed.as_secs_f64());
        self.metrics.inc_cycle("completed");
        self.logger.log_cycle_completed(
            cycle,
            report.pods_classified,
            report.usage_degraded,
            elapsed.as_millis(),
        );

        Ok(report)
    }

    fn publish(
        &self,
        series: &mut SeriesTracker,
        cycle: u64,
        family: Family,
        labels: &[&str],
        value: f64,
    ) {
        self.metrics.set(family, labels, value);
        series.touch(family, labels, cycle);
    }

    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, SourceError> {
        match self.source.list_pods().await {
            Ok(pods) => {
                self.health.set_healthy(components::CLUSTER_API).await;
                Ok(pods)
            }
            Err(e) => {
                warn!(error = %e, "Failed to list pods");
                self.metrics.inc_error("list_pods");
                self.health
                    .set_degraded(components::CLUSTER_API, e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    /// Usage for one pod; the flag is set when the lookup degraded to zero
    async fn fetch_usage(&self, pod: &PodSnapshot) -> (PodUsage, bool) {
        let result = self
            .source
            .pod_usage(&pod.namespace, &pod.name)
            .await
            .and_then(|containers| {
                PodUsage::from_containers(&containers).map_err(SourceError::from)
            });

        match result {
            Ok(usage) => (usage, false),
            Err(e) if e.is_not_found() => {
                debug!(namespace = %pod.namespace, pod = %pod.name, "No metrics for pod yet");
                (PodUsage::default(), true)
            }
            Err(e) => {
                warn!(
                    namespace = %pod.namespace,
                    pod = %pod.name,
                    error = %e,
                    "Failed to read pod usage"
                );
                self.metrics.inc_error("pod_usage");
                (PodUsage::default(), true)
            }
        }
    }
}
