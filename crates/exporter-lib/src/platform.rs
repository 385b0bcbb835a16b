//! Serverless platform detection from pod labels
//!
//! Each supported platform stamps its managed pods with a well-known label
//! whose value is the function name. A pod is attributed to the first
//! platform, in ascending identifier order, whose label key it carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported serverless platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Fission,
    Knative,
    OpenFaas,
    OpenWhisk,
}

impl Platform {
    /// All platforms in classification order (ascending identifier)
    pub const ALL: [Platform; 4] = [
        Platform::Fission,
        Platform::Knative,
        Platform::OpenFaas,
        Platform::OpenWhisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Fission => "fission",
            Platform::Knative => "knative",
            Platform::OpenFaas => "openfaas",
            Platform::OpenWhisk => "openwhisk",
        }
    }

    /// Pod label key that carries the function name for this platform
    pub fn label_key(&self) -> &'static str {
        match self {
            Platform::Fission => "fission-function-name",
            Platform::Knative => "serving.knative.dev/service",
            Platform::OpenFaas => "faas_function",
            Platform::OpenWhisk => "whisk-managed",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

/// A pod attributed to a serverless function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Classification {
    pub platform: Platform,
    pub function: String,
}

/// Attribute a pod to a platform and function using its labels
///
/// Returns `None` when no platform label is present, or when the first
/// matching label has an empty value.
pub fn classify(labels: &BTreeMap<String, String>) -> Option<Classification> {
    let (platform, function) = Platform::ALL
        .into_iter()
        .find_map(|p| labels.get(p.label_key()).map(|v| (p, v)))?;

    if function.is_empty() {
        return None;
    }

    Some(Classification {
        platform,
        function: function.clone(),
    })
}
