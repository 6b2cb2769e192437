//! Condensed view of one workflow execution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_sources::{HistoryEntry, TimelineEventType};

/// History entries are kept as-is in the condensed timeline.
pub type TimelineEntry = HistoryEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    /// No history was available
    Unknown,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
            ExecutionStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first failed or timed-out entry of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePoint {
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    /// The entry's own sub-task, else the last step that ran before it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_subtask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<String>,
    pub status: ExecutionStatus,
    /// Trailing window of entries ending at the failure point
    pub entries: Vec<TimelineEntry>,
    /// Number of entries before the window was applied
    pub total_entries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_point: Option<FailurePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub summary: String,
}

impl TimelineAnalysis {
    /// Sentinel for an execution with no reference or no history.
    pub fn empty(execution_ref: Option<&str>) -> Self {
        Self {
            execution_ref: execution_ref.map(str::to_string),
            status: ExecutionStatus::Unknown,
            entries: Vec::new(),
            total_entries: 0,
            failure_point: None,
            last_successful_step: None,
            duration_seconds: None,
            summary: "No workflow history available".to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries == 0
    }
}
