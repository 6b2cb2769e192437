//! Resolved context of one work item.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_sources::TimeRange;

/// Processing status of a work item as recorded in the tracking store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Queued,
    Running,
    Completed,
    Failed,
    NotFound,
}

impl ItemStatus {
    /// Map a raw tracking-store status. Unrecognised non-empty values are
    /// treated as in-flight; an empty status has no mapping.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match raw.to_ascii_uppercase().as_str() {
            "COMPLETED" => ItemStatus::Completed,
            "FAILED" => ItemStatus::Failed,
            "QUEUED" => ItemStatus::Queued,
            "NOT_FOUND" => ItemStatus::NotFound,
            _ => ItemStatus::Running,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "QUEUED",
            ItemStatus::Running => "RUNNING",
            ItemStatus::Completed => "COMPLETED",
            ItemStatus::Failed => "FAILED",
            ItemStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed start/end of an item's processing. Either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl ProcessingWindow {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Search range for this window.
    ///
    /// A missing end is `now`; a missing start is `fallback_hours` before the
    /// end. With neither side known the range is the trailing lookback.
    pub fn to_range(&self, now: DateTime<Utc>, fallback_hours: u32) -> TimeRange {
        match (self.start, self.end) {
            (Some(start), Some(end)) => TimeRange::new(start, end),
            (Some(start), None) => TimeRange::new(start, now),
            (None, Some(end)) => TimeRange::last_hours(end, fallback_hours),
            (None, None) => TimeRange::last_hours(now, fallback_hours),
        }
    }
}

/// Everything known about a work item before evidence is collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemContext {
    pub item_id: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<String>,
    /// Correlation tokens of sub-tasks, first-seen order, deduplicated
    #[serde(default)]
    pub subtask_ids: Vec<String>,
    #[serde(default)]
    pub window: ProcessingWindow,
    /// Raw lifecycle timestamps carried through to the report
    #[serde(default)]
    pub timestamps: BTreeMap<String, String>,
}

impl WorkItemContext {
    pub fn not_found(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            status: ItemStatus::NotFound,
            execution_ref: None,
            subtask_ids: Vec::new(),
            window: ProcessingWindow::default(),
            timestamps: BTreeMap::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.status != ItemStatus::NotFound
    }

    /// Short name of the workflow execution (last `:` segment of its ref).
    pub fn execution_name(&self) -> Option<&str> {
        self.execution_ref.as_deref().map(execution_name)
    }
}

/// Last `:`-separated segment of an execution reference.
pub fn execution_name(execution_ref: &str) -> &str {
    execution_ref.rsplit(':').next().unwrap_or(execution_ref)
}
