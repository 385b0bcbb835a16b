//! Serverless Exporter - per-function metrics for serverless platforms
//!
//! This binary samples the cluster's pods on a fixed interval, attributes
//! them to Knative, OpenFaaS, OpenWhisk, and Fission functions, and exposes
//! boot time, resource usage, and scaling metrics for Prometheus.

use anyhow::Result;
use exporter_lib::{
    api,
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    sampler::{KubeSource, SamplerLoopBuilder},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit status when no cluster credentials can be resolved
const EXIT_NO_CREDENTIALS: i32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::ExporterConfig::load()?;

    let source = match KubeSource::connect().await {
        Ok(source) => source,
        Err(e) => {
            error!(
                error = %e,
                "Could not configure the Kubernetes client; \
                 run in a cluster or provide a kubeconfig"
            );
            eprintln!("Could not configure the Kubernetes client: {}", e);
            std::process::exit(EXIT_NO_CREDENTIALS);
        }
    };

    let logger = StructuredLogger::new("exporter");
    logger.log_startup(
        EXPORTER_VERSION,
        config.metrics_port,
        config.interval().as_secs(),
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::CLUSTER_API).await;

    let metrics = ExporterMetrics::new();

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_handle = tokio::spawn(api::serve(config.metrics_port, app_state));

    let mut builder = SamplerLoopBuilder::new()
        .source(Arc::new(source))
        .metrics(metrics)
        .health(health_registry.clone())
        .interval(config.interval())
        .max_concurrent_fetches(config.max_concurrent_fetches)
        .stale_after_cycles(config.stale_after_cycles);
    if let Some(start) = config.benchmark_start() {
        info!(benchmark_start = %start.to_rfc3339(), "Using configured measurement start");
        builder = builder.started_at(start);
    }
    let sampler_loop = builder.build()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let sampler_handle = tokio::spawn(sampler_loop.run(shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            // The listener only returns on failure
            match result {
                Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
                Err(e) => error!(error = %e, "Metrics server task panicked"),
                Ok(Ok(())) => {}
            }
            health_registry
                .set_unhealthy(components::SAMPLER, "metrics server stopped")
                .await;
            logger.log_shutdown("metrics server stopped");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = sampler_handle.await;
    info!("Shutting down");

    Ok(())
}
