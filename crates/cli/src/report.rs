//! Consolidation of scraped exporter samples into per-function, per-pod and
//! cluster-wide views, and the Markdown benchmark report

use crate::exposition::Sample;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

const POD_COUNT: &str = "serverless_pod_count";
const SCALED_DIFFERENCE: &str = "serverless_pod_scaled_difference";
const BOOT_DURATION: &str = "serverless_pod_boot_duration_seconds";
const CPU_USAGE: &str = "serverless_pod_cpu_usage_millicores";
const MEMORY_USAGE: &str = "serverless_pod_memory_usage_bytes";
const CONTAINER_STARTED_AT: &str = "serverless_pod_container_started_at_seconds";
const CLUSTER_CPU: &str = "kubernetes_cluster_cpu_usage_millicores";
const CLUSTER_MEMORY: &str = "kubernetes_cluster_memory_usage_bytes";
const BENCHMARK_START: &str = "serverless_benchmark_start_time_seconds";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionEntry {
    pub platform: String,
    pub function: String,
    pub namespace: String,
    pub pods: i64,
    pub scaled_difference: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PodEntry {
    pub namespace: String,
    pub pod: String,
    pub function: String,
    pub boot_seconds: Option<f64>,
    pub cpu_millicores: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub started_at: Option<f64>,
}

/// Everything the exporter currently publishes
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExporterSnapshot {
    pub functions: Vec<FunctionEntry>,
    pub pods: Vec<PodEntry>,
    pub cluster_cpu_millicores: f64,
    pub cluster_memory_bytes: u64,
    pub benchmark_start: Option<f64>,
}

/// Cluster-wide figures for a measurement window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub functions: usize,
    pub pods: i64,
    pub scaled_pods_difference: i64,
    pub cluster_cpu_millicores: f64,
    pub cluster_memory_bytes: u64,
    pub benchmark_start: Option<f64>,
    /// Mean of (container started_at - window start) over pods started in the window
    pub avg_cold_start_seconds: Option<f64>,
    pub cold_starts: usize,
}

impl ExporterSnapshot {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut snapshot = ExporterSnapshot::default();
        let mut functions: BTreeMap<(String, String, String), FunctionEntry> = BTreeMap::new();
        let mut pods: BTreeMap<(String, String), PodEntry> = BTreeMap::new();

        for s in samples {
            match s.name.as_str() {
                POD_COUNT | SCALED_DIFFERENCE => {
                    let key = (
                        s.label("platform").to_string(),
                        s.label("function").to_string(),
                        s.label("namespace").to_string(),
                    );
                    let entry = functions.entry(key.clone()).or_insert_with(|| FunctionEntry {
                        platform: key.0,
                        function: key.1,
                        namespace: key.2,
                        pods: 0,
                        scaled_difference: None,
                    });
                    if s.name == POD_COUNT {
                        entry.pods = s.value as i64;
                    } else {
                        entry.scaled_difference = Some(s.value as i64);
                    }
                }
                BOOT_DURATION | CPU_USAGE | MEMORY_USAGE | CONTAINER_STARTED_AT => {
                    let key = (s.label("namespace").to_string(), s.label("pod").to_string());
                    let entry = pods.entry(key.clone()).or_insert_with(|| PodEntry {
                        namespace: key.0,
                        pod: key.1,
                        function: s.label("function").to_string(),
                        ..Default::default()
                    });
                    match s.name.as_str() {
                        BOOT_DURATION => entry.boot_seconds = Some(s.value),
                        CPU_USAGE => entry.cpu_millicores = Some(s.value),
                        MEMORY_USAGE => entry.memory_bytes = Some(s.value as u64),
                        _ => entry.started_at = Some(s.value),
                    }
                }
                CLUSTER_CPU => snapshot.cluster_cpu_millicores = s.value,
                CLUSTER_MEMORY => snapshot.cluster_memory_bytes = s.value as u64,
                BENCHMARK_START if s.value > 0.0 => snapshot.benchmark_start = Some(s.value),
                _ => {}
            }
        }

        snapshot.functions = functions.into_values().collect();
        snapshot.pods = pods.into_values().collect();
        snapshot
    }

    /// Pods belonging to one function
    pub fn pods_of<'a>(&'a self, function: &'a str) -> impl Iterator<Item = &'a PodEntry> {
        self.pods.iter().filter(move |p| p.function == function)
    }

    /// Summarize, measuring cold starts from `since` or the exporter's own
    /// window start
    pub fn summary(&self, since: Option<f64>) -> Summary {
        let start = since.or(self.benchmark_start);

        let cold_starts: Vec<f64> = match start {
            Some(start) => self
                .pods
                .iter()
                .filter_map(|p| p.started_at)
                .filter(|started| *started > start)
                .map(|started| started - start)
                .collect(),
            None => Vec::new(),
        };

        let avg_cold_start_seconds = if cold_starts.is_empty() {
            None
        } else {
            Some(cold_starts.iter().sum::<f64>() / cold_starts.len() as f64)
        };

        Summary {
            functions: self.functions.len(),
            pods: self.functions.iter().map(|f| f.pods).sum(),
            scaled_pods_difference: self
                .functions
                .iter()
                .filter_map(|f| f.scaled_difference)
                .sum(),
            cluster_cpu_millicores: self.cluster_cpu_millicores,
            cluster_memory_bytes: self.cluster_memory_bytes,
            benchmark_start: start,
            avg_cold_start_seconds,
            cold_starts: cold_starts.len(),
        }
    }
}

impl Summary {
    /// Render the orchestration section of the benchmark report
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# FaaSKubeBench Benchmark Report\n\n");
        md.push_str("## Orchestration Metrics (Kubernetes Exporter)\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("| :--- | :--- |\n");

        // Writing to a String cannot fail
        let _ = writeln!(md, "| Scaled Pods (Difference) | {} |", self.scaled_pods_difference);
        let _ = writeln!(
            md,
            "| CPU Usage (Cluster Total) | {} |",
            report_millicores(self.cluster_cpu_millicores)
        );
        let _ = writeln!(
            md,
            "| Memory Usage (Cluster Total) | {} |",
            report_bytes(self.cluster_memory_bytes)
        );
        let _ = writeln!(
            md,
            "| Average Startup Time | {} |",
            self.avg_cold_start_seconds
                .map(|s| format!("{:.3} s", s))
                .unwrap_or_else(|| "N/A".to_string())
        );
        let _ = writeln!(md, "| Cold Starts | {} |", self.cold_starts);

        md.push_str("\n## Notes\n\n");
        md.push_str(
            "**Average Startup Time** is the time from the benchmark start until a \
             function container reached `running`, averaged over pods started in the window.\n",
        );
        md
    }

    pub fn write_markdown(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_markdown())
            .with_context(|| format!("Failed to write report file {}", path.display()))
    }
}

fn report_millicores(millicores: f64) -> String {
    format!("{:.2} mCores", millicores)
}

/// Binary-prefixed size, e.g. `2.00 MiB`
fn report_bytes(bytes: u64) -> String {
    const UNIT: f64 = 1024.0;
    const PREFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

    let b = bytes as f64;
    if b < UNIT {
        return format!("{:.2} B", b);
    }

    let mut div = UNIT;
    let mut exp = 0;
    while b / div >= UNIT && exp < PREFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
    }
    format!("{:.2} {}B", b / div, PREFIXES[exp])
}
