//! Error types for triage-sources

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure signatures that collaborator backends use for rate limiting.
///
/// Matched case-insensitively against raw backend error text.
const THROTTLING_SIGNATURES: &[&str] = &[
    "throttlingexception",
    "throttled",
    "toomanyrequestsexception",
    "rate exceeded",
    "requestlimitexceeded",
    "provisionedthroughputexceededexception",
    "slowdown",
];

const TIMEOUT_SIGNATURES: &[&str] = &["timed out", "timeout", "deadline exceeded"];

/// The external collaborator a call was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    Lookup,
    DeploymentMetadata,
    WorkflowHistory,
    LogSearch,
    StatusScan,
}

impl ServiceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Lookup => "lookup",
            ServiceName::DeploymentMetadata => "deployment_metadata",
            ServiceName::WorkflowHistory => "workflow_history",
            ServiceName::LogSearch => "log_search",
            ServiceName::StatusScan => "status_scan",
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse kind of a [`SourceError`], safe to serialize into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Throttled,
    Unavailable,
    Malformed,
    Timeout,
    NotFound,
}

/// Errors returned by collaborator implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The backend rejected the call because of rate limiting
    #[error("{service} throttled the request: {detail}")]
    Throttled { service: ServiceName, detail: String },

    /// The backend could not be reached or refused the call
    #[error("{service} unavailable: {detail}")]
    Unavailable { service: ServiceName, detail: String },

    /// The backend answered with data that could not be parsed
    #[error("{service} returned malformed data: {detail}")]
    Malformed { service: ServiceName, detail: String },

    /// The call did not complete in time
    #[error("{service} call timed out")]
    Timeout { service: ServiceName },

    /// The addressed resource does not exist on the backend
    #[error("{service} has no record of {what}")]
    NotFound { service: ServiceName, what: String },
}

impl SourceError {
    /// Classify raw backend failure text at the collaborator boundary.
    ///
    /// Known throttling signatures become [`SourceError::Throttled`], timeout
    /// wording becomes [`SourceError::Timeout`], everything else is
    /// [`SourceError::Unavailable`].
    pub fn from_failure_text(service: ServiceName, text: impl Into<String>) -> Self {
        let detail = text.into();
        let lower = detail.to_lowercase();

        if THROTTLING_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            return SourceError::Throttled { service, detail };
        }
        if TIMEOUT_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            return SourceError::Timeout { service };
        }
        SourceError::Unavailable { service, detail }
    }

    pub fn malformed(service: ServiceName, detail: impl Into<String>) -> Self {
        SourceError::Malformed {
            service,
            detail: detail.into(),
        }
    }

    pub fn unavailable(service: ServiceName, detail: impl Into<String>) -> Self {
        SourceError::Unavailable {
            service,
            detail: detail.into(),
        }
    }

    /// The collaborator that produced this error.
    pub fn service(&self) -> ServiceName {
        match self {
            SourceError::Throttled { service, .. }
            | SourceError::Unavailable { service, .. }
            | SourceError::Malformed { service, .. }
            | SourceError::Timeout { service }
            | SourceError::NotFound { service, .. } => *service,
        }
    }

    pub fn kind(&self) -> SourceErrorKind {
        match self {
            SourceError::Throttled { .. } => SourceErrorKind::Throttled,
            SourceError::Unavailable { .. } => SourceErrorKind::Unavailable,
            SourceError::Malformed { .. } => SourceErrorKind::Malformed,
            SourceError::Timeout { .. } => SourceErrorKind::Timeout,
            SourceError::NotFound { .. } => SourceErrorKind::NotFound,
        }
    }

    /// Whether the caller may retry the same request later.
    ///
    /// Throttling and timeouts are transient; the engine never retries
    /// within one request, it only reports the flag.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            SourceErrorKind::Throttled | SourceErrorKind::Timeout
        )
    }
}
