//! Collaborator trait definitions for the triage engine
//!
//! These traits define the external stores the engine correlates:
//! - `LookupService`: tracking-store record for one work item
//! - `DeploymentMetadataService`: declared outputs of a deployment
//! - `WorkflowHistoryService`: ordered history of one workflow execution
//! - `LogSearchBackend`: source-group enumeration and bounded search
//! - `StatusScanService`: recently failed work items (system-wide mode)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Result type for collaborator calls
pub type SourceResult<T> = std::result::Result<T, SourceError>;

// ---------------------------------------------------------------------------
// TimeRange
// ---------------------------------------------------------------------------

/// Closed time interval used to bound searches and scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range; reversed bounds are swapped.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// The `hours` leading up to `end`.
    ///
    /// Saturates at the earliest representable instant.
    pub fn last_hours(end: DateTime<Utc>, hours: u32) -> Self {
        let start = end
            .checked_sub_signed(Duration::hours(i64::from(hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(start, end)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

// ---------------------------------------------------------------------------
// LookupService (tracking store)
// ---------------------------------------------------------------------------

/// One raw workflow event as carried in the tracking-store payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTimelineEvent {
    /// Backend event type, e.g. `LambdaFunctionSucceeded`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Structured output of the unit of work, as a JSON document string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl LookupTimelineEvent {
    pub fn new(event_type: impl Into<String>, output: Option<String>) -> Self {
        Self {
            event_type: event_type.into(),
            output,
        }
    }
}

/// Tracking-store answer for one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    pub found: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<String>,
    #[serde(default)]
    pub timeline_events: Vec<LookupTimelineEvent>,
    /// Named lifecycle timestamps (e.g. `WorkflowStartTime`, `CompletionTime`)
    #[serde(default)]
    pub timestamps: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LookupRecord {
    /// Record for an item the tracking store does not know.
    pub fn not_found() -> Self {
        Self {
            found: false,
            status: String::new(),
            execution_ref: None,
            timeline_events: Vec::new(),
            timestamps: BTreeMap::new(),
            error: None,
        }
    }

    /// Record for a known item with the given raw status.
    pub fn found(status: impl Into<String>) -> Self {
        Self {
            found: true,
            status: status.into(),
            ..Self::not_found()
        }
    }

    pub fn with_execution_ref(mut self, execution_ref: impl Into<String>) -> Self {
        self.execution_ref = Some(execution_ref.into());
        self
    }

    pub fn with_event(mut self, event: LookupTimelineEvent) -> Self {
        self.timeline_events.push(event);
        self
    }

    pub fn with_timestamp(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.timestamps.insert(name.into(), value.into());
        self
    }
}

/// Tracking-store lookup of a single work item.
///
/// Guarantees:
/// - An unknown item is `Ok` with `found = false`, never an error.
/// - Errors mean the store was unreachable or answered unparseable data.
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn lookup(&self, item_id: &str) -> SourceResult<LookupRecord>;
}

// ---------------------------------------------------------------------------
// DeploymentMetadataService
// ---------------------------------------------------------------------------

/// One declared output of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutput {
    pub key: String,
    pub value: String,
}

impl DeploymentOutput {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentDescription {
    pub exists: bool,
    #[serde(default)]
    pub outputs: Vec<DeploymentOutput>,
}

/// Deployment metadata (declared outputs) by deployment name.
#[async_trait]
pub trait DeploymentMetadataService: Send + Sync {
    async fn describe(&self, deployment: &str) -> SourceResult<DeploymentDescription>;
}

// ---------------------------------------------------------------------------
// WorkflowHistoryService
// ---------------------------------------------------------------------------

/// Closed set of workflow history event types the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    Started,
    Succeeded,
    Failed,
    TimedOut,
}

impl TimelineEventType {
    /// Map a backend event type name onto the closed set.
    ///
    /// Returns `None` for bookkeeping events the engine ignores.
    pub fn from_raw(raw: &str) -> Option<Self> {
        if raw.ends_with("TimedOut") {
            Some(TimelineEventType::TimedOut)
        } else if raw.ends_with("Failed") || raw.ends_with("Aborted") {
            Some(TimelineEventType::Failed)
        } else if raw.ends_with("Succeeded") || raw.ends_with("Exited") {
            Some(TimelineEventType::Succeeded)
        } else if raw.ends_with("Started")
            || raw.ends_with("Entered")
            || raw.ends_with("Scheduled")
        {
            Some(TimelineEventType::Started)
        } else {
            None
        }
    }

    /// Failed and timed-out entries are failure points.
    pub fn is_failure(self) -> bool {
        matches!(self, TimelineEventType::Failed | TimelineEventType::TimedOut)
    }
}

/// One entry of a workflow execution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn new(seq: u64, event_type: TimelineEventType) -> Self {
        Self {
            seq,
            event_type,
            subtask_ref: None,
            detail: None,
            timestamp: None,
        }
    }

    pub fn with_subtask(mut self, subtask_ref: impl Into<String>) -> Self {
        self.subtask_ref = Some(subtask_ref.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Execution history of one workflow run.
///
/// An unknown execution reference yields an empty history.
#[async_trait]
pub trait WorkflowHistoryService: Send + Sync {
    async fn get_timeline(&self, execution_ref: &str) -> SourceResult<Vec<HistoryEntry>>;
}

// ---------------------------------------------------------------------------
// LogSearchBackend
// ---------------------------------------------------------------------------

/// One log line returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub message: String,
    /// Source-group the line was found in
    pub group: String,
}

impl LogRecord {
    pub fn new(
        group: impl Into<String>,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms: timestamp.timestamp_millis(),
            message: message.into(),
            group: group.into(),
        }
    }

    /// Parsed timestamp; `None` when the backend sent an out-of-range value.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// Log-search backend organised into named source-groups.
#[async_trait]
pub trait LogSearchBackend: Send + Sync {
    /// Names of all source-groups whose name starts with `prefix`.
    async fn list_groups(&self, prefix: &str) -> SourceResult<Vec<String>>;

    /// Lines in `group` matching `pattern` inside `range`, oldest first,
    /// at most `max_results`.
    async fn search(
        &self,
        group: &str,
        pattern: &str,
        range: TimeRange,
        max_results: usize,
    ) -> SourceResult<Vec<LogRecord>>;
}

// ---------------------------------------------------------------------------
// StatusScanService
// ---------------------------------------------------------------------------

/// One recently failed work item from the tracking store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItemRecord {
    pub item_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scan of recently failed work items (system-wide mode only).
#[async_trait]
pub trait StatusScanService: Send + Sync {
    async fn scan_recent_failures(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> SourceResult<Vec<FailedItemRecord>>;
}
