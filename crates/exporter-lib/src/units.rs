//! Resource quantity normalization
//!
//! The metrics API reports CPU in nanocores (`n`) or millicores (`m`) and
//! memory in binary multiples (`Ki`, `Mi`, `Gi`) or raw bytes. Everything is
//! normalized to millicores and bytes.

use crate::error::QuantityError;
use crate::models::{ContainerUsage, PodUsage};

const NANOCORES_PER_MILLICORE: f64 = 1_000_000.0;

/// Parse a CPU quantity into millicores
///
/// A bare number is treated as nanocores.
pub fn parse_cpu_millicores(raw: &str) -> Result<f64, QuantityError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (digits, divisor) = if let Some(v) = raw.strip_suffix('n') {
        (v, NANOCORES_PER_MILLICORE)
    } else if let Some(v) = raw.strip_suffix('m') {
        (v, 1.0)
    } else {
        (raw, NANOCORES_PER_MILLICORE)
    };

    let value: f64 = digits.parse().map_err(|_| QuantityError::Invalid {
        resource: "cpu",
        value: raw.to_string(),
    })?;

    if !value.is_finite() || value < 0.0 {
        return Err(QuantityError::Invalid {
            resource: "cpu",
            value: raw.to_string(),
        });
    }

    Ok(value / divisor)
}

/// Parse a memory quantity into bytes
pub fn parse_memory_bytes(raw: &str) -> Result<u64, QuantityError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (digits, multiplier) = if let Some(v) = raw.strip_suffix("Ki") {
        (v, 1024u64)
    } else if let Some(v) = raw.strip_suffix("Mi") {
        (v, 1024 * 1024)
    } else if let Some(v) = raw.strip_suffix("Gi") {
        (v, 1024 * 1024 * 1024)
    } else {
        (raw, 1)
    };

    let invalid = || QuantityError::Invalid {
        resource: "memory",
        value: raw.to_string(),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}

impl PodUsage {
    /// Sum per-container usage into pod totals
    ///
    /// One malformed quantity fails the whole pod.
    pub fn from_containers(containers: &[ContainerUsage]) -> Result<Self, QuantityError> {
        containers
            .iter()
            .try_fold(PodUsage::default(), |acc, c| {
                Ok(PodUsage {
                    cpu_millicores: acc.cpu_millicores + parse_cpu_millicores(&c.usage.cpu)?,
                    memory_bytes: acc
                        .memory_bytes
                        .saturating_add(parse_memory_bytes(&c.usage.memory)?),
                })
            })
    }
}
