//! Error types for quota collection.

use std::time::Duration;

use thiserror::Error;

pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Failure reported by an upstream API implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ApiError(pub String);

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("role ARN is not valid: {0}")]
    InvalidRoleArn(String),

    #[error("{operation} failed in {region}: {source}")]
    Upstream {
        operation: &'static str,
        region: String,
        #[source]
        source: ApiError,
    },

    #[error("{operation} in {region} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        region: String,
        timeout: Duration,
    },

    #[error("region worker failed: {0}")]
    Worker(String),
}
