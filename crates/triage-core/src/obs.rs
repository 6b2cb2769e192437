//! Structured observability hooks for triage requests.
//!
//! This module provides:
//! - A request-scoped tracing span via [`request_span`]
//! - Emission functions for each state-machine transition of a request:
//!   classified, context resolved, namespace resolved, evidence collected,
//!   report assembled, plus degraded sources and deadline expiry
//!
//! Events are emitted at `info!` level, degradations at `warn!`. Filtering
//! and JSON output are configured by [`crate::telemetry::init_tracing`].

use tracing::{info, warn, Span};
use triage_sources::SourceError;

use crate::domain::{AnalysisMode, ItemStatus, ReportOutcome};
use crate::namespace::PrefixKind;

/// Request-scoped span carrying the request id and deployment.
///
/// # Example
///
/// ```ignore
/// async { /* every event below carries request_id and deployment */ }
///     .instrument(request_span("6f1c...", "idp-prod"))
///     .await;
/// ```
pub fn request_span(request_id: &str, deployment: &str) -> Span {
    tracing::info_span!(
        "triage.request",
        request_id = %request_id,
        deployment = %deployment
    )
}

/// Emit event: query classified.
pub fn emit_request_classified(mode: AnalysisMode, subject: Option<&str>) {
    info!(
        event = "request.classified",
        mode = %mode,
        subject = subject.unwrap_or(""),
    );
}

/// Emit event: work-item context resolved from the tracking store.
pub fn emit_context_resolved(
    item_id: &str,
    status: ItemStatus,
    subtask_ids: usize,
    has_execution: bool,
) {
    info!(
        event = "context.resolved",
        item_id = %item_id,
        status = %status,
        subtask_ids = subtask_ids,
        has_execution = has_execution,
    );
}

pub fn emit_namespace_resolved(deployment: &str, prefix: &str, kind: PrefixKind) {
    info!(
        event = "namespace.resolved",
        deployment = %deployment,
        prefix = %prefix,
        kind = ?kind,
    );
}

/// Emit event: one search failed; correlation continues without it.
pub fn emit_search_failed(group: &str, pattern: &str, error: &SourceError) {
    warn!(
        event = "search.failed",
        group = %group,
        pattern = %pattern,
        kind = ?error.kind(),
        retryable = error.is_retryable(),
        error = %error,
    );
}

/// Emit event: a collaborator other than log search was skipped.
pub fn emit_source_degraded(error: &SourceError, scope: Option<&str>) {
    warn!(
        event = "source.degraded",
        service = %error.service(),
        scope = scope.unwrap_or(""),
        kind = ?error.kind(),
        retryable = error.is_retryable(),
        error = %error,
    );
}

pub fn emit_evidence_collected(
    groups_searched: usize,
    events_found: usize,
    events_retained: usize,
    degraded: usize,
) {
    info!(
        event = "evidence.collected",
        groups_searched = groups_searched,
        events_found = events_found,
        events_retained = events_retained,
        degraded = degraded,
    );
}

/// Emit event: the request deadline passed during `stage`.
pub fn emit_deadline_exceeded(stage: &str) {
    warn!(event = "deadline.exceeded", stage = %stage);
}

/// Emit event: report assembled, with its serialized size in bytes.
pub fn emit_report_assembled(mode: AnalysisMode, outcome: ReportOutcome, report_bytes: usize) {
    info!(
        event = "report.assembled",
        mode = %mode,
        outcome = ?outcome,
        report_bytes = report_bytes,
    );
}
