//! Observability infrastructure for the serverless exporter
//!
//! Provides:
//! - Prometheus gauge families for per-pod and per-function serverless metrics
//! - Self-metrics for the sampling loop (cycle latency, outcomes, errors)
//! - Structured JSON logging with tracing

use crate::series::Family;
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

const POD_LABELS: &[&str] = &["namespace", "pod", "function"];
const FUNCTION_LABELS: &[&str] = &["platform", "function", "namespace"];

struct ExporterMetricsInner {
    registry: Registry,

    boot_duration_seconds: GaugeVec,
    cpu_usage_millicores: GaugeVec,
    memory_usage_bytes: GaugeVec,
    container_started_at_seconds: GaugeVec,
    pod_count: GaugeVec,
    scaled_difference: GaugeVec,

    cluster_cpu_usage_millicores: Gauge,
    cluster_memory_usage_bytes: Gauge,
    benchmark_start_time_seconds: Gauge,

    cycle_duration_seconds: Histogram,
    cycles_total: IntCounterVec,
    errors_total: IntCounterVec,
    pods_classified: IntGauge,
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let vec = GaugeVec::new(Opts::new(name, help), labels).expect("valid gauge descriptor");
    registry
        .register(Box::new(vec.clone()))
        .expect("gauge registered once per registry");
    vec
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let g = Gauge::new(name, help).expect("valid gauge descriptor");
    registry
        .register(Box::new(g.clone()))
        .expect("gauge registered once per registry");
    g
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let vec = IntCounterVec::new(Opts::new(name, help), labels).expect("valid counter descriptor");
    registry
        .register(Box::new(vec.clone()))
        .expect("counter registered once per registry");
    vec
}

impl ExporterMetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let boot_duration_seconds = gauge_vec(
            &registry,
            "serverless_pod_boot_duration_seconds",
            "Pod boot time (first container started_at - pod start_time)",
            POD_LABELS,
        );
        let cpu_usage_millicores = gauge_vec(
            &registry,
            "serverless_pod_cpu_usage_millicores",
            "Pod CPU usage in millicores from the metrics API",
            POD_LABELS,
        );
        let memory_usage_bytes = gauge_vec(
            &registry,
            "serverless_pod_memory_usage_bytes",
            "Pod memory usage in bytes from the metrics API",
            POD_LABELS,
        );
        let container_started_at_seconds = gauge_vec(
            &registry,
            "serverless_pod_container_started_at_seconds",
            "Unix time at which the pod's first container entered the running state",
            POD_LABELS,
        );
        let pod_count = gauge_vec(
            &registry,
            "serverless_pod_count",
            "Number of live pods per platform and function",
            FUNCTION_LABELS,
        );
        let scaled_difference = gauge_vec(
            &registry,
            "serverless_pod_scaled_difference",
            "Pod count difference relative to the count captured at startup",
            FUNCTION_LABELS,
        );

        let cluster_cpu_usage_millicores = gauge(
            &registry,
            "kubernetes_cluster_cpu_usage_millicores",
            "CPU usage summed over all serverless pods in the last cycle",
        );
        let cluster_memory_usage_bytes = gauge(
            &registry,
            "kubernetes_cluster_memory_usage_bytes",
            "Memory usage summed over all serverless pods in the last cycle",
        );
        let benchmark_start_time_seconds = gauge(
            &registry,
            "serverless_benchmark_start_time_seconds",
            "Unix time the measurement window started",
        );

        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "serverless_exporter_cycle_duration_seconds",
                "Time spent in one sampling cycle",
            )
            .buckets(CYCLE_BUCKETS.to_vec()),
        )
        .expect("valid histogram descriptor");
        registry
            .register(Box::new(cycle_duration_seconds.clone()))
            .expect("histogram registered once per registry");

        let cycles_total = counter_vec(
            &registry,
            "serverless_exporter_cycles_total",
            "Sampling cycles by outcome",
            &["outcome"],
        );
        let errors_total = counter_vec(
            &registry,
            "serverless_exporter_errors_total",
            "Cluster API errors by kind",
            &["kind"],
        );

        let pods_classified = IntGauge::new(
            "serverless_exporter_pods_classified",
            "Pods attributed to a serverless function in the last cycle",
        )
        .expect("valid gauge descriptor");
        registry
            .register(Box::new(pods_classified.clone()))
            .expect("gauge registered once per registry");

        Self {
            registry,
            boot_duration_seconds,
            cpu_usage_millicores,
            memory_usage_bytes,
            container_started_at_seconds,
            pod_count,
            scaled_difference,
            cluster_cpu_usage_millicores,
            cluster_memory_usage_bytes,
            benchmark_start_time_seconds,
            cycle_duration_seconds,
            cycles_total,
            errors_total,
            pods_classified,
        }
    }
}

/// Metric families published by the exporter
///
/// Each instance owns its own registry. Clones share the same metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    inner: Arc<ExporterMetricsInner>,
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ExporterMetricsInner::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Render all families in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    fn family(&self, family: Family) -> &GaugeVec {
        match family {
            Family::BootDuration => &self.inner.boot_duration_seconds,
            Family::CpuUsage => &self.inner.cpu_usage_millicores,
            Family::MemoryUsage => &self.inner.memory_usage_bytes,
            Family::ContainerStartedAt => &self.inner.container_started_at_seconds,
            Family::PodCount => &self.inner.pod_count,
            Family::ScaledDifference => &self.inner.scaled_difference,
        }
    }

    /// Set one series of a labeled family
    pub fn set(&self, family: Family, labels: &[&str], value: f64) {
        self.family(family).with_label_values(labels).set(value);
    }

    /// Remove one series of a labeled family
    pub fn remove(&self, family: Family, labels: &[&str]) {
        // Already-absent series are not an error here
        let _ = self.family(family).remove_label_values(labels);
    }

    pub fn set_cluster_usage(&self, cpu_millicores: f64, memory_bytes: u64) {
        self.inner.cluster_cpu_usage_millicores.set(cpu_millicores);
        self.inner.cluster_memory_usage_bytes.set(memory_bytes as f64);
    }

    pub fn set_benchmark_start(&self, unix_secs: f64) {
        self.inner.benchmark_start_time_seconds.set(unix_secs);
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner.cycle_duration_seconds.observe(duration_secs);
    }

    pub fn inc_cycle(&self, outcome: &str) {
        self.inner.cycles_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_error(&self, kind: &str) {
        self.inner.errors_total.with_label_values(&[kind]).inc();
    }

    pub fn set_pods_classified(&self, count: i64) {
        self.inner.pods_classified.set(count);
    }
}

/// Structured logger for exporter lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16, interval_secs: u64) {
        info!(
            event = "exporter_started",
            component = %self.component,
            version = %version,
            port = port,
            interval_secs = interval_secs,
            "Serverless exporter started"
        );
    }

    pub fn log_baseline_captured(&self, functions: usize, pods: usize) {
        info!(
            event = "baseline_captured",
            component = %self.component,
            functions = functions,
            pods = pods,
            "Initial pod counts captured"
        );
    }

    pub fn log_cycle_completed(
        &self,
        cycle: u64,
        classified: usize,
        degraded: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "cycle_completed",
            component = %self.component,
            cycle = cycle,
            pods_classified = classified,
            usage_degraded = degraded,
            elapsed_ms = elapsed_ms,
            "Sampling cycle complete"
        );
    }

    pub fn log_cycle_skipped(&self, cycle: u64, reason: &str) {
        warn!(
            event = "cycle_skipped",
            component = %self.component,
            cycle = cycle,
            reason = %reason,
            "Sampling cycle skipped"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            component = %self.component,
            reason = %reason,
            "Serverless exporter shutting down"
        );
    }
}
