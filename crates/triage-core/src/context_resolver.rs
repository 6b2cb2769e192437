//! Work-item context resolution from the tracking store.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, instrument, warn};
use triage_sources::{
    LookupRecord, LookupService, LookupTimelineEvent, ServiceName, SourceError, SourceResult,
};

use crate::domain::{ItemStatus, ProcessingWindow, WorkItemContext};

/// Raw lookup event types that carry a sub-task correlation token.
pub const SUBTASK_EVENT_TYPES: &[&str] = &[
    "LambdaFunctionSucceeded",
    "LambdaFunctionFailed",
    "LambdaFunctionTimedOut",
    "TaskSucceeded",
    "TaskFailed",
    "TaskTimedOut",
];

/// Key of the correlation token inside a sub-task's output document.
pub const CORRELATION_TOKEN_KEY: &str = "requestId";

pub const WINDOW_START_KEY: &str = "WorkflowStartTime";
pub const WINDOW_END_KEY: &str = "CompletionTime";

/// Parse a lifecycle timestamp. RFC 3339 first, then a naive UTC form.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn subtask_token(event: &LookupTimelineEvent) -> Option<String> {
    if !SUBTASK_EVENT_TYPES.contains(&event.event_type.as_str()) {
        return None;
    }
    let output = event.output.as_deref()?;
    match serde_json::from_str::<serde_json::Value>(output) {
        Ok(value) => value
            .get(CORRELATION_TOKEN_KEY)
            .and_then(|token| token.as_str())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string),
        Err(e) => {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "dropping malformed sub-task output"
            );
            None
        }
    }
}

/// Sub-task tokens in first-seen order, deduplicated, at most `cap`.
pub fn extract_subtask_ids(events: &[LookupTimelineEvent], cap: usize) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for token in events.iter().filter_map(subtask_token) {
        if ids.len() >= cap {
            break;
        }
        if !ids.contains(&token) {
            ids.push(token);
        }
    }
    ids
}

fn window_from(record: &LookupRecord) -> ProcessingWindow {
    let parse = |key: &str| record.timestamps.get(key).and_then(|raw| parse_timestamp(raw));
    ProcessingWindow {
        start: parse(WINDOW_START_KEY),
        end: parse(WINDOW_END_KEY),
    }
}

/// Build a context from a lookup answer.
pub fn context_from_record(
    item_id: &str,
    record: LookupRecord,
    max_subtask_ids: usize,
) -> SourceResult<WorkItemContext> {
    if !record.found {
        if let Some(error) = record.error {
            return Err(SourceError::from_failure_text(ServiceName::Lookup, error));
        }
        return Ok(WorkItemContext::not_found(item_id));
    }
    if let Some(error) = record.error {
        return Err(SourceError::malformed(ServiceName::Lookup, error));
    }
    let status = ItemStatus::from_raw(&record.status).ok_or_else(|| {
        SourceError::malformed(ServiceName::Lookup, "found record has an empty status")
    })?;

    let subtask_ids = extract_subtask_ids(&record.timeline_events, max_subtask_ids);
    let window = window_from(&record);
    let execution_ref = record
        .execution_ref
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    Ok(WorkItemContext {
        item_id: item_id.to_string(),
        status,
        execution_ref,
        subtask_ids,
        window,
        timestamps: record.timestamps,
    })
}

pub struct ContextResolver {
    lookup: Arc<dyn LookupService>,
    max_subtask_ids: usize,
}

impl ContextResolver {
    pub fn new(lookup: Arc<dyn LookupService>, max_subtask_ids: usize) -> Self {
        Self {
            lookup,
            max_subtask_ids,
        }
    }

    /// Resolve the context of `item_id`. An unknown item is not an error.
    #[instrument(skip(self))]
    pub async fn resolve(&self, item_id: &str) -> SourceResult<WorkItemContext> {
        let record = self.lookup.lookup(item_id).await.inspect_err(|e| {
            warn!(error = %e, "tracking-store lookup failed");
        })?;
        context_from_record(item_id, record, self.max_subtask_ids)
    }
}
