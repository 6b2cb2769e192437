//! The triage report and its parts.
//!
//! A report is always produced, even for a failed request. Which optional
//! sections are present depends on the analysis mode and on which
//! collaborators answered.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_sources::{FailedItemRecord, ServiceName, SourceError, SourceErrorKind, TimeRange};

use super::context::ItemStatus;
use super::error::TriageResult;
use super::timeline::TimelineAnalysis;
use crate::namespace::NamespaceResolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    ItemSpecific,
    SystemWide,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::ItemSpecific => "item_specific",
            AnalysisMode::SystemWide => "system_wide",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the requested analysis the report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Complete,
    /// Some collaborator was unavailable or the deadline passed
    Partial,
    /// The request could not be analyzed at all
    Failed,
}

/// A collaborator call that failed without aborting the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedSource {
    pub service: ServiceName,
    /// Group, pattern or execution the failed call was about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub kind: SourceErrorKind,
    pub retryable: bool,
    pub detail: String,
}

impl DegradedSource {
    pub fn from_error(error: &SourceError, scope: Option<String>) -> Self {
        Self {
            service: error.service(),
            scope,
            kind: error.kind(),
            retryable: error.is_retryable(),
            detail: error.to_string(),
        }
    }
}

/// One retained log line as shown in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub timestamp: DateTime<Utc>,
    pub pattern: String,
    pub message: String,
}

/// Retained evidence of one source-group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceGroup {
    pub group: String,
    pub events: Vec<ReportEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub patterns: Vec<String>,
    pub groups_searched: usize,
    /// Hits returned by the backend before budgeting
    pub events_found: usize,
    pub events_retained: usize,
    pub duplicates_dropped: usize,
    pub groups: Vec<EvidenceGroup>,
}

/// Coarse error category used in system-wide reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Timeout,
    Access,
    Processing,
    System,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Access => "access",
            ErrorCategory::Processing => "processing",
            ErrorCategory::System => "system",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub count: usize,
    pub sample: String,
}

/// Final output of one triage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageReport {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    pub analysis_mode: AnalysisMode,
    /// Item identifier, or the raw query for system-wide analysis
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    pub outcome: ReportOutcome,
    pub analysis_summary: String,
    pub recommendations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timestamps: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceResolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<TimelineAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_failures_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_failures: Vec<FailedItemRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_categories: BTreeMap<ErrorCategory, CategorySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_estimate: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_sources: Vec<DegradedSource>,
    #[serde(default)]
    pub timed_out: bool,
}

impl TriageReport {
    /// Empty report shell; the assembler fills in the sections.
    pub fn new(
        request_id: impl Into<String>,
        mode: AnalysisMode,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            generated_at: Utc::now(),
            analysis_mode: mode,
            subject: subject.into(),
            status: None,
            outcome: ReportOutcome::Complete,
            analysis_summary: String::new(),
            recommendations: Vec::new(),
            execution_ref: None,
            completion_time: None,
            timestamps: BTreeMap::new(),
            namespace: None,
            time_window: None,
            timeline: None,
            evidence: None,
            recent_failures_count: None,
            recent_failures: Vec::new(),
            error_categories: BTreeMap::new(),
            error_estimate: None,
            degraded_sources: Vec::new(),
            timed_out: false,
        }
    }

    pub fn to_json_pretty(&self) -> TriageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> TriageResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_partial(&self) -> bool {
        self.outcome == ReportOutcome::Partial
    }
}
