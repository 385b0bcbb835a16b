//! Core data models for the serverless exporter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time view of a pod, re-fetched every cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub start_time: Option<DateTime<Utc>>,
    pub container_statuses: Vec<ContainerStatusSnapshot>,
}

/// Status of a single container within a pod
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStatusSnapshot {
    pub name: String,
    /// Set only when the container is in the running state
    pub running_started_at: Option<DateTime<Utc>>,
}

/// Raw per-container usage as reported by the metrics API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUsage {
    #[serde(default)]
    pub name: String,
    pub usage: UsageQuantities,
}

/// Quantity strings in their original encodings (e.g. `"250m"`, `"64Mi"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageQuantities {
    pub cpu: String,
    pub memory: String,
}

impl ContainerUsage {
    pub fn new(name: impl Into<String>, cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: UsageQuantities {
                cpu: cpu.into(),
                memory: memory.into(),
            },
        }
    }
}

/// Usage of a pod summed across its containers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PodUsage {
    pub cpu_millicores: f64,
    pub memory_bytes: u64,
}
