//! Error types for collection and exposition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// The wrapped producer failed.
    #[error("collector {collector}: {message}")]
    Produce { collector: String, message: String },

    /// A record cannot be expressed as a Prometheus descriptor.
    #[error("collector {collector}: invalid descriptor for {name}: {message}")]
    InvalidDesc {
        collector: String,
        name: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum GatherError {
    /// One or more collectors surfaced an invalid sample.
    #[error("{}", .0.join("\n"))]
    Collect(Vec<String>),

    #[error("encoding failed: {0}")]
    Encode(String),
}
