//! Error taxonomy for the retrieval and assembly pipeline.
//!
//! The split mirrors how failures propagate: configuration and completion
//! errors surface to the caller, while retrieval-source failures are
//! absorbed at the orchestrator and logged.

use thiserror::Error;

/// Errors produced by the RagSphere pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid static configuration (chunk sizing, vector dimensions,
    /// missing credentials). Fatal — never retried per request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A request that cannot be served regardless of backend state
    /// (e.g. an empty user message).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding model load or inference failure. The memoized model
    /// handle is cleared on load failure, so a fresh call retries.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// A single context source (vector index, web search, graph) is
    /// unreachable or erroring. Always degraded to "absent" for that
    /// source; never fails the overall query.
    #[error("{backend} unavailable: {reason}")]
    RetrievalUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// Post-response graph writes failed. Logged by the persistence
    /// worker; the response has already been delivered.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The completion provider failed — the one backend error that
    /// prevents producing any answer at all.
    #[error("completion provider error: {0}")]
    Completion(String),
}

impl RagError {
    /// Shorthand for a [`RagError::RetrievalUnavailable`] from any
    /// displayable cause.
    pub fn unavailable(backend: &'static str, cause: impl ToString) -> Self {
        RagError::RetrievalUnavailable {
            backend,
            reason: cause.to_string(),
        }
    }
}
