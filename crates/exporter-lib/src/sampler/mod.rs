//! Cluster sampling
//!
//! The sampler lists pods, attributes them to serverless functions, looks up
//! their resource usage, and publishes the results as gauges. A baseline of
//! per-function pod counts is captured once before the first cycle so that
//! later cycles can report scaling relative to it.

mod cycle;
mod kube_source;
mod r#loop;

#[cfg(test)]
mod tests;

pub use cycle::{CycleReport, Sampler, SamplerState};
pub use kube_source::KubeSource;
pub use r#loop::{SamplerConfig, SamplerLoop, SamplerLoopBuilder};

use crate::error::SourceError;
use crate::models::{ContainerUsage, PodSnapshot};

pub use async_trait::async_trait;

/// Read access to the cluster and its metrics API
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List every pod in every namespace
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, SourceError>;

    /// Per-container usage for one pod
    async fn pod_usage(&self, namespace: &str, pod: &str)
        -> Result<Vec<ContainerUsage>, SourceError>;
}
