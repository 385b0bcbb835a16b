//! Serverless function metrics exporter library
//!
//! This crate provides the core functionality for:
//! - Attributing pods to serverless functions by platform label
//! - Normalizing metrics API quantities to millicores and bytes
//! - Boot duration, pod count, and scaling delta computation
//! - The periodic sampling loop and its Kubernetes source
//! - Prometheus exposition, health checks, and structured logging

pub mod api;
pub mod boot;
pub mod counts;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod platform;
pub mod sampler;
pub mod series;
pub mod units;

pub use error::{QuantityError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use platform::{classify, Classification, Platform};
