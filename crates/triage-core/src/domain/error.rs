//! Engine-level error taxonomy.
//!
//! Only configuration problems and an unreachable tracking store abort a
//! request. Everything else degrades the report instead of failing it.

use triage_sources::SourceError;

/// Triage engine errors.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("lookup failed for item {item_id}: {source}")]
    LookupFailed {
        item_id: String,
        #[source]
        source: SourceError,
    },

    #[error("collaborator error: {0}")]
    Source(#[from] SourceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriageError {
    pub fn configuration(detail: impl Into<String>) -> Self {
        TriageError::Configuration(detail.into())
    }

    /// Whether this error must abort the request rather than degrade it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TriageError::Source(_))
    }
}

/// Result type for triage engine operations.
pub type TriageResult<T> = std::result::Result<T, TriageError>;
