//! Per-function pod counts, the startup baseline, and scaling deltas

use crate::models::PodSnapshot;
use crate::platform::{classify, Classification, Platform};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Identifies a serverless function across the cluster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionKey {
    pub platform: Platform,
    pub function: String,
}

impl FunctionKey {
    pub fn new(platform: Platform, function: impl Into<String>) -> Self {
        Self {
            platform,
            function: function.into(),
        }
    }
}

impl From<&Classification> for FunctionKey {
    fn from(c: &Classification) -> Self {
        FunctionKey::new(c.platform, c.function.clone())
    }
}

/// Live pod tally for one cycle
#[derive(Debug, Clone, Default)]
pub struct FunctionCounts {
    counts: BTreeMap<FunctionKey, i64>,
    /// Namespace each function was first seen in this cycle
    namespaces: BTreeMap<FunctionKey, String>,
}

impl FunctionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally every classifiable pod in the listing
    pub fn tally<'a>(pods: impl IntoIterator<Item = &'a PodSnapshot>) -> Self {
        let mut counts = Self::new();
        for pod in pods {
            if let Some(c) = classify(&pod.labels) {
                counts.record(FunctionKey::from(&c), &pod.namespace);
            }
        }
        counts
    }

    pub fn record(&mut self, key: FunctionKey, namespace: &str) {
        self.namespaces
            .entry(key.clone())
            .or_insert_with(|| namespace.to_string());
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: &FunctionKey) -> Option<i64> {
        self.counts.get(key).copied()
    }

    pub fn namespace(&self, key: &FunctionKey) -> &str {
        self.namespaces.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FunctionKey, i64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Pod counts captured once at startup
#[derive(Debug, Clone)]
pub struct Baseline {
    counts: FunctionCounts,
    captured_at: DateTime<Utc>,
}

impl Baseline {
    pub fn capture<'a>(pods: impl IntoIterator<Item = &'a PodSnapshot>) -> Self {
        Self::from_counts(FunctionCounts::tally(pods), Utc::now())
    }

    pub fn from_counts(counts: FunctionCounts, captured_at: DateTime<Utc>) -> Self {
        Self {
            counts,
            captured_at,
        }
    }

    pub fn get(&self, key: &FunctionKey) -> Option<i64> {
        self.counts.get(key)
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn counts(&self) -> &FunctionCounts {
        &self.counts
    }
}

/// Current-minus-baseline for functions present in both
///
/// Functions that first appeared after the baseline was captured have no
/// zero point and are left out.
pub fn scaling_deltas(current: &FunctionCounts, baseline: &Baseline) -> Vec<(FunctionKey, i64)> {
    current
        .iter()
        .filter_map(|(key, count)| baseline.get(key).map(|base| (key.clone(), count - base)))
        .collect()
}
