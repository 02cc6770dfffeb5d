//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for hybrid-store operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to parse an environment variable into the expected type.
    #[error("failed to parse env variable: {key} = '{value}'")]
    EnvParse { key: String, value: String },

    /// Caller supplied an argument that can never be valid (empty tenant id, bad path).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Embedding backend failed to produce a vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Mismatch between the produced vector and the collection schema.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Retrieval backend failure, tagged with the operation that failed.
    #[error("backend error during {op}: {message}")]
    Backend { op: &'static str, message: String },

    /// A payload could not be converted to or from the backend representation.
    #[error("payload error: {0}")]
    Payload(String),

    /// HTTP transport errors from embedding providers.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RetrievalError {
    /// Wraps any displayable backend error with the name of the failing operation.
    pub(crate) fn backend(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            message: err.to_string(),
        }
    }
}
