//! Error types for cluster access and quantity parsing

use thiserror::Error;

/// Failures reading from the cluster or the metrics API
#[derive(Debug, Error)]
pub enum SourceError {
    /// The metrics API has no record for this pod (yet)
    #[error("no metrics for pod {namespace}/{pod}")]
    NotFound { namespace: String, pod: String },

    #[error("cluster API error: {0}")]
    Api(String),

    #[error("failed to decode API response: {0}")]
    Decode(String),

    #[error("no usable cluster credentials: {0}")]
    Credentials(String),
}

impl SourceError {
    /// Not-found is expected while metrics lag pod creation
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }
}

/// Failure parsing a resource quantity string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid {resource} quantity: {value:?}")]
    Invalid {
        resource: &'static str,
        value: String,
    },
}

impl From<QuantityError> for SourceError {
    fn from(err: QuantityError) -> Self {
        SourceError::Decode(err.to_string())
    }
}
