//! Sampler tests against an in-memory cluster source

use super::*;
use crate::counts::{Baseline, FunctionCounts, FunctionKey};
use crate::error::SourceError;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{ContainerStatusSnapshot, ContainerUsage, PodSnapshot};
use crate::observability::ExporterMetrics;
use crate::platform::Platform;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
enum UsageReply {
    Containers(Vec<ContainerUsage>),
    NotFound,
    ApiError,
}

/// Cluster source whose pods and usage replies can be swapped between cycles
struct MockSource {
    pods: Mutex<Vec<PodSnapshot>>,
    usage: Mutex<HashMap<String, UsageReply>>,
    fail_list: AtomicBool,
    usage_calls: AtomicUsize,
}

impl MockSource {
    fn new(pods: Vec<PodSnapshot>) -> Self {
        Self {
            pods: Mutex::new(pods),
            usage: Mutex::new(HashMap::new()),
            fail_list: AtomicBool::new(false),
            usage_calls: AtomicUsize::new(0),
        }
    }

    fn set_pods(&self, pods: Vec<PodSnapshot>) {
        *self.pods.lock().unwrap() = pods;
    }

    fn reply(&self, pod: &str, reply: UsageReply) {
        self.usage.lock().unwrap().insert(pod.to_string(), reply);
    }
}

#[async_trait]
impl ClusterSource for MockSource {
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, SourceError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SourceError::Api("connection refused".to_string()));
        }
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn pod_usage(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Vec<ContainerUsage>, SourceError> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .usage
            .lock()
            .unwrap()
            .get(pod)
            .cloned()
            .unwrap_or(UsageReply::NotFound);

        match reply {
            UsageReply::Containers(c) => Ok(c),
            UsageReply::NotFound => Err(SourceError::NotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            }),
            UsageReply::ApiError => {
                Err(SourceError::Api("metrics backend unavailable".to_string()))
            }
        }
    }
}

fn pod(namespace: &str, name: &str, label: (&str, &str)) -> PodSnapshot {
    PodSnapshot {
        namespace: namespace.to_string(),
        name: name.to_string(),
        labels: [(label.0.to_string(), label.1.to_string())].into(),
        ..Default::default()
    }
}

fn openfaas(name: &str, function: &str) -> PodSnapshot {
    pod("openfaas-fn", name, ("faas_function", function))
}

fn sampler(
    source: &Arc<MockSource>,
    metrics: &ExporterMetrics,
    health: &HealthRegistry,
) -> Sampler {
    Sampler::new(source.clone(), metrics.clone(), health.clone(), 2)
}

/// Read one gauge series, `None` when it was never set
fn gauge_value(metrics: &ExporterMetrics, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    metrics
        .registry()
        .gather()
        .iter()
        .filter(|mf| mf.get_name() == name)
        .flat_map(|mf| mf.get_metric().iter())
        .find(|m| {
            labels.iter().all(|(k, v)| {
                m.get_label()
                    .iter()
                    .any(|lp| lp.get_name() == *k && lp.get_value() == *v)
            })
        })
        .map(|m| m.get_gauge().get_value())
}

fn counter_value(metrics: &ExporterMetrics, name: &str, label: (&str, &str)) -> f64 {
    metrics
        .registry()
        .gather()
        .iter()
        .filter(|mf| mf.get_name() == name)
        .flat_map(|mf| mf.get_metric().iter())
        .find(|m| {
            m.get_label()
                .iter()
                .any(|lp| lp.get_name() == label.0 && lp.get_value() == label.1)
        })
        .map(|m| m.get_counter().get_value())
        .unwrap_or(0.0)
}

fn series_count(metrics: &ExporterMetrics, name: &str) -> usize {
    metrics
        .registry()
        .gather()
        .iter()
        .filter(|mf| mf.get_name() == name)
        .map(|mf| mf.get_metric().len())
        .sum()
}

#[tokio::test]
async fn test_scaling_delta_relative_to_baseline() {
    let source = Arc::new(MockSource::new(vec![
        openfaas("bar-1", "bar"),
        openfaas("bar-2", "bar"),
    ]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    sampler.capture_baseline(&mut state).await.unwrap();
    assert_eq!(
        state.baseline().unwrap().get(&FunctionKey::new(Platform::OpenFaas, "bar")),
        Some(2)
    );

    source.set_pods(vec![
        openfaas("bar-1", "bar"),
        openfaas("bar-2", "bar"),
        openfaas("bar-3", "bar"),
        openfaas("bar-4", "bar"),
        openfaas("bar-5", "bar"),
        pod("fission-fn", "baz-1", ("fission-function-name", "baz")),
    ]);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.pods_classified, 6);
    assert_eq!(report.deltas_published, 1);

    let bar = [("platform", "openfaas"), ("function", "bar"), ("namespace", "openfaas-fn")];
    assert_eq!(gauge_value(&metrics, "serverless_pod_count", &bar), Some(5.0));
    assert_eq!(gauge_value(&metrics, "serverless_pod_scaled_difference", &bar), Some(3.0));

    let baz = [("platform", "fission"), ("function", "baz")];
    assert_eq!(gauge_value(&metrics, "serverless_pod_count", &baz), Some(1.0));
    assert_eq!(gauge_value(&metrics, "serverless_pod_scaled_difference", &baz), None);
}

#[tokio::test]
async fn test_baseline_is_never_recomputed() {
    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    sampler.capture_baseline(&mut state).await.unwrap();
    source.set_pods(vec![openfaas("bar-1", "bar"), openfaas("bar-2", "bar")]);
    sampler.capture_baseline(&mut state).await.unwrap();

    assert_eq!(
        state.baseline().unwrap().get(&FunctionKey::new(Platform::OpenFaas, "bar")),
        Some(1)
    );
    assert!(health.readiness().await.ready);
}

#[tokio::test]
async fn test_zero_usage_is_not_published() {
    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    source.reply(
        "bar-1",
        UsageReply::Containers(vec![ContainerUsage::new("bar", "0n", "0")]),
    );
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.pods_classified, 1);
    assert_eq!(series_count(&metrics, "serverless_pod_cpu_usage_millicores"), 0);
    assert_eq!(series_count(&metrics, "serverless_pod_memory_usage_bytes"), 0);
}

#[tokio::test]
async fn test_not_found_degrades_single_pod() {
    let source = Arc::new(MockSource::new(vec![
        openfaas("bar-1", "bar"),
        openfaas("bar-2", "bar"),
        openfaas("bar-3", "bar"),
    ]));
    source.reply("bar-1", UsageReply::NotFound);
    source.reply("bar-2", UsageReply::ApiError);
    source.reply(
        "bar-3",
        UsageReply::Containers(vec![
            ContainerUsage::new("bar", "250m", "2Mi"),
            ContainerUsage::new("sidecar", "500n", "1024Ki"),
        ]),
    );
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.usage_degraded, 2);
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 3);

    let bar3 = [("namespace", "openfaas-fn"), ("pod", "bar-3"), ("function", "bar")];
    let cpu = gauge_value(&metrics, "serverless_pod_cpu_usage_millicores", &bar3).unwrap();
    assert!((cpu - 250.0005).abs() < 1e-9);
    assert_eq!(
        gauge_value(&metrics, "serverless_pod_memory_usage_bytes", &bar3),
        Some((2 * 1024 * 1024 + 1024 * 1024) as f64)
    );
    assert_eq!(series_count(&metrics, "serverless_pod_cpu_usage_millicores"), 1);

    // Only the non-404 failure is counted
    assert_eq!(
        counter_value(&metrics, "serverless_exporter_errors_total", ("kind", "pod_usage")),
        1.0
    );
}

#[tokio::test]
async fn test_malformed_quantity_degrades_pod() {
    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    source.reply(
        "bar-1",
        UsageReply::Containers(vec![ContainerUsage::new("bar", "fast", "1Mi")]),
    );
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.usage_degraded, 1);
    assert_eq!(series_count(&metrics, "serverless_pod_memory_usage_bytes"), 0);
}

#[tokio::test]
async fn test_list_failure_skips_cycle() {
    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    source.fail_list.store(true, Ordering::SeqCst);
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    let result = sampler.collect_cycle(&mut state).await;
    assert!(result.is_err());
    assert_eq!(series_count(&metrics, "serverless_pod_count"), 0);
    assert_eq!(
        counter_value(&metrics, "serverless_exporter_cycles_total", ("outcome", "skipped")),
        1.0
    );

    let health_report = health.health().await;
    assert_eq!(
        health_report.components[components::CLUSTER_API].status,
        ComponentStatus::Degraded
    );

    source.fail_list.store(false, Ordering::SeqCst);
    sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    assert_eq!(state.cycle(), 2);
}

#[tokio::test]
async fn test_boot_duration_published() {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut booted = pod("default", "hello-1", ("serving.knative.dev/service", "hello"));
    booted.start_time = Some(t0);
    booted.container_statuses = vec![ContainerStatusSnapshot {
        name: "user-container".to_string(),
        running_started_at: Some(t0 + Duration::milliseconds(2500)),
    }];
    let mut pending = pod("default", "hello-2", ("serving.knative.dev/service", "hello"));
    pending.start_time = Some(t0);
    pending.container_statuses = vec![ContainerStatusSnapshot {
        name: "user-container".to_string(),
        running_started_at: None,
    }];

    let source = Arc::new(MockSource::new(vec![booted, pending]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.boot_published, 1);

    let labels = [("namespace", "default"), ("pod", "hello-1"), ("function", "hello")];
    assert_eq!(
        gauge_value(&metrics, "serverless_pod_boot_duration_seconds", &labels),
        Some(2.5)
    );
    assert_eq!(
        gauge_value(&metrics, "serverless_pod_container_started_at_seconds", &labels),
        Some((t0 + Duration::milliseconds(2500)).timestamp_millis() as f64 / 1000.0)
    );
    assert_eq!(
        gauge_value(
            &metrics,
            "serverless_pod_boot_duration_seconds",
            &[("pod", "hello-2")]
        ),
        None
    );
}

#[tokio::test]
async fn test_unclassified_pods_are_ignored() {
    let source = Arc::new(MockSource::new(vec![
        pod("kube-system", "coredns-1", ("k8s-app", "kube-dns")),
        openfaas("bar-1", "bar"),
    ]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.pods_seen, 2);
    assert_eq!(report.pods_classified, 1);
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(series_count(&metrics, "serverless_pod_count"), 1);
}

#[tokio::test]
async fn test_stale_series_expire_when_enabled() {
    let source = Arc::new(MockSource::new(vec![
        openfaas("bar-1", "bar"),
        pod("default", "hello-1", ("serving.knative.dev/service", "hello")),
    ]));
    source.reply("bar-1", UsageReply::Containers(vec![ContainerUsage::new("bar", "10m", "1Mi")]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 1);

    sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(series_count(&metrics, "serverless_pod_count"), 2);

    source.set_pods(vec![pod("default", "hello-1", ("serving.knative.dev/service", "hello"))]);
    let report = sampler.collect_cycle(&mut state).await.unwrap();

    assert_eq!(report.series_expired, 3);
    assert_eq!(series_count(&metrics, "serverless_pod_count"), 1);
    assert_eq!(series_count(&metrics, "serverless_pod_cpu_usage_millicores"), 0);
}

#[tokio::test]
async fn test_stale_series_kept_by_default() {
    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    sampler.collect_cycle(&mut state).await.unwrap();
    source.set_pods(Vec::new());
    let report = sampler.collect_cycle(&mut state).await.unwrap();

    assert_eq!(report.series_expired, 0);
    assert_eq!(series_count(&metrics, "serverless_pod_count"), 1);
}

#[tokio::test]
async fn test_cluster_totals() {
    let source = Arc::new(MockSource::new(vec![
        openfaas("bar-1", "bar"),
        openfaas("bar-2", "bar"),
    ]));
    source.reply("bar-1", UsageReply::Containers(vec![ContainerUsage::new("bar", "100m", "1Mi")]));
    source.reply("bar-2", UsageReply::Containers(vec![ContainerUsage::new("bar", "50m", "1Mi")]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);
    let mut state = SamplerState::new(Utc::now(), 0);

    sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(
        gauge_value(&metrics, "kubernetes_cluster_cpu_usage_millicores", &[]),
        Some(150.0)
    );
    assert_eq!(
        gauge_value(&metrics, "kubernetes_cluster_memory_usage_bytes", &[]),
        Some(2.0 * 1024.0 * 1024.0)
    );
}

/// Source with slow usage lookups that records how many overlap
struct SlowSource {
    pods: Vec<PodSnapshot>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ClusterSource for SlowSource {
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, SourceError> {
        Ok(self.pods.clone())
    }

    async fn pod_usage(
        &self,
        _namespace: &str,
        pod: &str,
    ) -> Result<Vec<ContainerUsage>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        // pod "p<i>" uses i + 1 millicores
        let index: u32 = pod.trim_start_matches('p').parse().unwrap();
        let cpu = format!("{}m", index + 1);
        Ok(vec![ContainerUsage::new("fn", &cpu, "1Ki")])
    }
}

#[tokio::test]
async fn test_usage_fetches_are_bounded_and_attributed() {
    let source = Arc::new(SlowSource {
        pods: (0..10).map(|i| openfaas(&format!("p{}", i), "bar")).collect(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let metrics = ExporterMetrics::new();
    let sampler = Sampler::new(source.clone(), metrics.clone(), HealthRegistry::new(), 3);
    let mut state = SamplerState::new(Utc::now(), 0);

    let report = sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(report.pods_classified, 10);
    assert_eq!(report.usage_degraded, 0);
    assert_eq!(source.peak.load(Ordering::SeqCst), 3);

    for i in 0..10 {
        let name = format!("p{}", i);
        let labels = [("pod", name.as_str())];
        assert_eq!(
            gauge_value(&metrics, "serverless_pod_cpu_usage_millicores", &labels),
            Some(f64::from(i + 1)),
            "usage attributed to the wrong pod"
        );
    }
    assert_eq!(
        gauge_value(&metrics, "kubernetes_cluster_cpu_usage_millicores", &[]),
        Some(55.0)
    );
}

#[tokio::test]
async fn test_serial_usage_fetches() {
    let source = Arc::new(SlowSource {
        pods: (0..4).map(|i| openfaas(&format!("p{}", i), "bar")).collect(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let sampler = Sampler::new(source.clone(), ExporterMetrics::new(), HealthRegistry::new(), 1);
    let mut state = SamplerState::new(Utc::now(), 0);

    sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(source.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_with_baseline_state() {
    let mut counts = FunctionCounts::new();
    counts.record(FunctionKey::new(Platform::OpenFaas, "bar"), "openfaas-fn");
    counts.record(FunctionKey::new(Platform::OpenFaas, "bar"), "openfaas-fn");
    let mut state = SamplerState::with_baseline(Baseline::from_counts(counts, Utc::now()), 0);

    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    let metrics = ExporterMetrics::new();
    let health = HealthRegistry::new();
    let sampler = sampler(&source, &metrics, &health);

    sampler.collect_cycle(&mut state).await.unwrap();
    assert_eq!(
        gauge_value(
            &metrics,
            "serverless_pod_scaled_difference",
            &[("function", "bar")]
        ),
        Some(-1.0)
    );
}

#[tokio::test]
async fn test_loop_retries_baseline_after_failure() {
    let source = Arc::new(MockSource::new(vec![openfaas("bar-1", "bar")]));
    source.fail_list.store(true, Ordering::SeqCst);
    let health = HealthRegistry::new();

    let mut sampler_loop = SamplerLoopBuilder::new()
        .source(source.clone())
        .health(health.clone())
        .max_concurrent_fetches(1)
        .build()
        .unwrap();

    sampler_loop.tick().await;
    assert!(sampler_loop.state().baseline().is_none());
    assert_eq!(sampler_loop.state().cycle(), 0);
    assert!(!health.readiness().await.ready);

    source.fail_list.store(false, Ordering::SeqCst);
    sampler_loop.tick().await;
    assert!(sampler_loop.state().baseline().is_some());
    assert_eq!(sampler_loop.state().cycle(), 1);
    assert!(health.readiness().await.ready);
}

#[test]
fn test_cycle_and_loop_futures_are_send() {
    fn assert_send<T: Send>(_: &T) {}

    let source = Arc::new(MockSource::new(Vec::new()));
    let sampler = sampler(&source, &ExporterMetrics::new(), &HealthRegistry::new());
    let mut state = SamplerState::new(Utc::now(), 0);
    assert_send(&sampler.collect_cycle(&mut state));

    let sampler_loop = SamplerLoopBuilder::new().source(source).build().unwrap();
    let (_tx, rx) = tokio::sync::broadcast::channel(1);
    assert_send(&sampler_loop.run(rx));
}

#[tokio::test]
async fn test_loop_stops_on_shutdown() {
    let source = Arc::new(MockSource::new(Vec::new()));
    let sampler_loop = SamplerLoopBuilder::new()
        .source(source)
        .interval(std::time::Duration::from_secs(3600))
        .build()
        .unwrap();

    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(sampler_loop.run(rx));
    tx.send(()).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}

#[test]
fn test_sampler_loop_builder_missing_source() {
    assert!(SamplerLoopBuilder::new().build().is_err());
}

#[test]
fn test_sampler_config_default() {
    let config = SamplerConfig::default();
    assert_eq!(config.interval, std::time::Duration::from_secs(10));
    assert_eq!(config.max_concurrent_fetches, 4);
    assert_eq!(config.stale_after_cycles, 0);
}
