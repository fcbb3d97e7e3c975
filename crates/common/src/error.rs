//! Error taxonomy shared across the clip discovery pipeline

use thiserror::Error;

/// Pipeline errors, grouped by how callers are expected to react
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or empty input; stages return empty results instead of
    /// surfacing this upward.
    #[error("Invalid input: {0}")]
    Input(String),

    /// All embedding paths failed, including the deterministic fallback.
    /// Fatal to discovery.
    #[error("Embedding generation failed (model: {model_name}): {message}")]
    Embedding { model_name: String, message: String },

    /// Boundary detection failed beyond what the uniform-partition
    /// fallback can absorb.
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    /// Local LLM call failed (timeout, non-2xx, unparseable body).
    /// Never fatal; callers fall back to heuristics or keywords.
    #[error("LLM request failed ({operation}): {message}")]
    Llm { operation: String, message: String },

    /// Slot-acquire timeout or busy/locked shared resource; retried by
    /// the resource gate before surfacing.
    #[error("Transient resource error ({resource}): {message}")]
    TransientResource { resource: String, message: String },

    /// An invariant was violated while constructing a value. Fatal for
    /// the affected item only.
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether a retry has any chance of succeeding
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientResource { .. } => true,
            Self::Storage(message) => {
                let message = message.to_lowercase();
                [
                    "database is locked",
                    "disk i/o error",
                    "temporary failure",
                    "connection lost",
                    "timeout",
                    "busy",
                ]
                .iter()
                .any(|marker| message.contains(marker))
            }
            _ => false,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let locked = PipelineError::Storage("database is locked".to_string());
        assert!(locked.is_transient());

        let busy = PipelineError::Storage("SQLITE_BUSY: database busy".to_string());
        assert!(busy.is_transient());

        let schema = PipelineError::Storage("no such table: clips".to_string());
        assert!(!schema.is_transient());

        let validation = PipelineError::Validation {
            field: "start_ms".to_string(),
            message: "negative".to_string(),
        };
        assert!(!validation.is_transient());
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = PipelineError::Embedding {
            model_name: "all-MiniLM-L6-v2".to_string(),
            message: "session init failed".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("all-MiniLM-L6-v2"));
        assert!(rendered.contains("session init failed"));
    }
}
