//! Error types for reconciliation setup.

use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid pattern {name:?} for service {service_code}: {source}")]
    InvalidPattern {
        service_code: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("similarity threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f64),
}
