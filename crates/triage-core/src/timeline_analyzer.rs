//! Condenses a workflow execution history around its failure point.

use std::sync::Arc;

use tracing::{debug, instrument};
use triage_sources::{HistoryEntry, SourceResult, TimelineEventType, WorkflowHistoryService};

use crate::budget::truncate_message;
use crate::domain::{ExecutionStatus, FailurePoint, TimelineAnalysis};

/// Limits applied to a condensed timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineLimits {
    pub max_entries: usize,
    pub max_error_len: usize,
}

fn derive_status(entries: &[HistoryEntry], failure: Option<&HistoryEntry>) -> ExecutionStatus {
    match failure.map(|f| f.event_type) {
        Some(TimelineEventType::TimedOut) => ExecutionStatus::TimedOut,
        Some(_) => ExecutionStatus::Failed,
        None => match entries.last().map(|e| e.event_type) {
            Some(TimelineEventType::Succeeded) => ExecutionStatus::Succeeded,
            Some(_) => ExecutionStatus::Running,
            None => ExecutionStatus::Unknown,
        },
    }
}

fn summarize(status: ExecutionStatus, failure: Option<&FailurePoint>) -> String {
    let mut summary = format!("Workflow execution {status}");
    if let Some(point) = failure {
        if let Some(step) = &point.failed_subtask {
            summary.push_str(&format!(" at step '{step}'"));
        }
        if let Some(error) = &point.error {
            summary.push_str(&format!(": {error}"));
        }
    }
    summary
}

/// Condense raw history entries. Pure; no collaborator calls.
pub fn analyze_entries(
    execution_ref: &str,
    mut entries: Vec<HistoryEntry>,
    limits: TimelineLimits,
) -> TimelineAnalysis {
    if entries.is_empty() {
        return TimelineAnalysis::empty(Some(execution_ref));
    }
    entries.sort_by_key(|e| e.seq);
    let total_entries = entries.len();

    let failure_idx = entries.iter().position(|e| e.event_type.is_failure());
    let before_failure = &entries[..failure_idx.unwrap_or(entries.len())];
    let last_successful_step = before_failure
        .iter()
        .rev()
        .filter(|e| !e.event_type.is_failure())
        .find_map(|e| e.subtask_ref.clone());

    let failure = failure_idx.map(|idx| &entries[idx]);
    let status = derive_status(&entries, failure);
    let failure_point = failure.map(|entry| FailurePoint {
        seq: entry.seq,
        event_type: entry.event_type,
        failed_subtask: entry
            .subtask_ref
            .clone()
            .or_else(|| last_successful_step.clone()),
        error: entry
            .detail
            .as_deref()
            .map(|d| truncate_message(d, limits.max_error_len)),
        timestamp: entry.timestamp,
    });

    let duration_seconds = match (
        entries.first().and_then(|e| e.timestamp),
        entries.last().and_then(|e| e.timestamp),
    ) {
        (Some(first), Some(last)) => Some((last - first).num_seconds()),
        _ => None,
    };

    let window_end = failure_idx.map(|idx| idx + 1).unwrap_or(total_entries);
    let window_start = window_end.saturating_sub(limits.max_entries);
    let retained: Vec<HistoryEntry> = entries[window_start..window_end]
        .iter()
        .cloned()
        .map(|mut entry| {
            entry.detail = entry
                .detail
                .map(|d| truncate_message(&d, limits.max_error_len));
            entry
        })
        .collect();

    let summary = summarize(status, failure_point.as_ref());
    TimelineAnalysis {
        execution_ref: Some(execution_ref.to_string()),
        status,
        entries: retained,
        total_entries,
        failure_point,
        last_successful_step,
        duration_seconds,
        summary,
    }
}

pub struct TimelineAnalyzer {
    history: Arc<dyn WorkflowHistoryService>,
    limits: TimelineLimits,
}

impl TimelineAnalyzer {
    pub fn new(history: Arc<dyn WorkflowHistoryService>, limits: TimelineLimits) -> Self {
        Self { history, limits }
    }

    /// Fetch and condense the history of `execution_ref`.
    ///
    /// No reference or an empty history yields the empty sentinel.
    #[instrument(skip(self))]
    pub async fn analyze(&self, execution_ref: Option<&str>) -> SourceResult<TimelineAnalysis> {
        let Some(execution_ref) = execution_ref else {
            return Ok(TimelineAnalysis::empty(None));
        };
        let entries = self.history.get_timeline(execution_ref).await?;
        debug!(entries = entries.len(), "workflow history fetched");
        Ok(analyze_entries(execution_ref, entries, self.limits))
    }
}
