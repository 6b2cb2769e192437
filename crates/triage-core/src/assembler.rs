//! Report assembly: summaries, recommendations and section layout.
//!
//! All text is produced from fixed templates so reports stay deterministic
//! for the same findings.

use std::collections::BTreeMap;

use triage_sources::TimeRange;

use crate::budget::BudgetedEvidence;
use crate::context_resolver::WINDOW_END_KEY;
use crate::correlator::CorrelationResult;
use crate::domain::{
    AnalysisMode, CategorySummary, DegradedSource, ErrorCategory, EvidenceSummary,
    ExecutionStatus, ItemStatus, ReportOutcome, TimelineAnalysis, TriageReport, WorkItemContext,
};
use crate::namespace::NamespaceResolution;
use crate::system_scan::RecentFailures;

const RETRY_LATER: &str =
    "Some evidence sources were throttled or timed out; retry the analysis later";
const NO_EVIDENCE: &str =
    "No matching error log events found; check the workflow timeline for the failure point";
const NARROW_RANGE: &str =
    "The analysis deadline was reached; retry with a narrower time range";

pub const NOT_FOUND_RECOMMENDATIONS: &[&str] = &[
    "Verify the item identifier, including any path prefix",
    "Confirm the item was submitted to this deployment",
    "Run a system-wide analysis to review recent failures",
];

pub const FAILED_RECOMMENDATIONS: &[&str] = &[
    "Check the deployment name and engine configuration",
    "Retry the analysis once the tracking store is reachable",
];

/// Everything gathered for one work item.
#[derive(Debug, Clone)]
pub struct ItemFindings {
    pub context: WorkItemContext,
    pub namespace: Option<NamespaceResolution>,
    pub time_window: Option<TimeRange>,
    pub timeline: Option<TimelineAnalysis>,
    pub evidence: Option<EvidenceSummary>,
    pub degraded: Vec<DegradedSource>,
    pub timed_out: bool,
}

/// Everything gathered for a system-wide request.
#[derive(Debug, Clone)]
pub struct SystemFindings {
    pub query: String,
    pub hours: u32,
    pub namespace: Option<NamespaceResolution>,
    pub time_window: TimeRange,
    pub recent_failures: Option<RecentFailures>,
    pub evidence: Option<EvidenceSummary>,
    pub categories: BTreeMap<ErrorCategory, CategorySummary>,
    /// Matching events before budgeting
    pub error_estimate: usize,
    pub degraded: Vec<DegradedSource>,
    pub timed_out: bool,
}

/// Evidence section from a correlation pass and its budgeted output.
pub fn evidence_summary(
    correlation: &CorrelationResult,
    budgeted: &BudgetedEvidence,
) -> EvidenceSummary {
    EvidenceSummary {
        patterns: correlation.patterns_searched.clone(),
        groups_searched: correlation.groups_searched(),
        events_found: correlation.events.len(),
        events_retained: budgeted.events.len(),
        duplicates_dropped: budgeted.duplicates_dropped,
        groups: budgeted.grouped(),
    }
}

fn outcome(degraded: &[DegradedSource], timed_out: bool) -> ReportOutcome {
    if timed_out || !degraded.is_empty() {
        ReportOutcome::Partial
    } else {
        ReportOutcome::Complete
    }
}

fn push_degradation_advice(recs: &mut Vec<String>, degraded: &[DegradedSource], timed_out: bool) {
    if degraded.iter().any(|d| d.retryable) {
        recs.push(RETRY_LATER.to_string());
    }
    if timed_out {
        recs.push(NARROW_RANGE.to_string());
    }
}

pub fn item_summary(
    context: &WorkItemContext,
    completion_time: Option<&str>,
    timeline: Option<&TimelineAnalysis>,
) -> String {
    let mut summary = format!("Item '{}' has status {}", context.item_id, context.status);
    if let Some(completed) = completion_time {
        summary.push_str(&format!(" at {completed}"));
    }
    if let Some(name) = context.execution_name() {
        summary.push_str(&format!(". Execution: {name}"));
    }
    if let Some(timeline) = timeline.filter(|t| !t.is_empty()) {
        summary.push_str(&format!(". Workflow: {}", timeline.summary));
    }
    summary
}

fn item_recommendations(findings: &ItemFindings) -> Vec<String> {
    let mut recs = Vec::new();
    if let Some(evidence) = &findings.evidence {
        if evidence.events_retained > 0 {
            recs.push("Review the retained error log events for failure details".to_string());
        } else {
            recs.push(NO_EVIDENCE.to_string());
        }
    }
    let workflow_failed = findings.timeline.as_ref().is_some_and(|t| {
        matches!(t.status, ExecutionStatus::Failed | ExecutionStatus::TimedOut)
    });
    if workflow_failed {
        recs.push("Analyze the workflow execution failure timeline".to_string());
    }
    if findings.context.status == ItemStatus::Failed {
        recs.push(format!(
            "Consider reprocessing item '{}'",
            findings.context.item_id
        ));
    }
    push_degradation_advice(&mut recs, &findings.degraded, findings.timed_out);
    if recs.is_empty() {
        recs.push("No issues detected; the item may have processed successfully".to_string());
    }
    recs
}

pub fn assemble_item_report(request_id: &str, findings: ItemFindings) -> TriageReport {
    let mut report = TriageReport::new(
        request_id,
        AnalysisMode::ItemSpecific,
        findings.context.item_id.clone(),
    );
    let completion_time = findings.context.timestamps.get(WINDOW_END_KEY).cloned();

    report.analysis_summary = item_summary(
        &findings.context,
        completion_time.as_deref(),
        findings.timeline.as_ref(),
    );
    report.recommendations = item_recommendations(&findings);
    report.outcome = outcome(&findings.degraded, findings.timed_out);
    report.status = Some(findings.context.status);
    report.execution_ref = findings.context.execution_ref;
    report.completion_time = completion_time;
    report.timestamps = findings.context.timestamps;
    report.namespace = findings.namespace;
    report.time_window = findings.time_window;
    report.timeline = findings.timeline;
    report.evidence = findings.evidence;
    report.degraded_sources = findings.degraded;
    report.timed_out = findings.timed_out;
    report
}

pub fn not_found_summary(item_id: &str) -> String {
    format!("Item '{item_id}' was not found in the tracking store")
}

pub fn assemble_not_found_report(request_id: &str, item_id: &str) -> TriageReport {
    let mut report = TriageReport::new(request_id, AnalysisMode::ItemSpecific, item_id);
    report.status = Some(ItemStatus::NotFound);
    report.analysis_summary = not_found_summary(item_id);
    report.recommendations = NOT_FOUND_RECOMMENDATIONS
        .iter()
        .map(|r| r.to_string())
        .collect();
    report
}

pub fn system_summary(
    hours: u32,
    error_estimate: usize,
    failed_items: usize,
    categories: &BTreeMap<ErrorCategory, CategorySummary>,
) -> String {
    if error_estimate == 0 && failed_items == 0 {
        return format!("No processing errors found in the last {hours} hours");
    }
    let mut parts = vec![format!(
        "Found {error_estimate} matching error events across {failed_items} failed items"
    )];
    parts.extend(
        categories
            .iter()
            .map(|(category, summary)| format!("{} {category} errors", summary.count)),
    );
    parts.join(". ")
}

fn system_recommendations(findings: &SystemFindings, failed_items: usize) -> Vec<String> {
    let mut recs = Vec::new();
    if findings.error_estimate > 0 {
        recs.push("Review the error log events for failure patterns".to_string());
    }
    if failed_items > 0 {
        recs.push("Monitor recent item processing failures".to_string());
        recs.push("Run an item-specific analysis for one of the recent failures".to_string());
    }
    push_degradation_advice(&mut recs, &findings.degraded, findings.timed_out);
    if recs.is_empty() {
        recs.push("System appears healthy".to_string());
    }
    recs
}

pub fn assemble_system_report(request_id: &str, findings: SystemFindings) -> TriageReport {
    let mut report =
        TriageReport::new(request_id, AnalysisMode::SystemWide, findings.query.clone());
    let failed_items = findings.recent_failures.as_ref().map_or(0, |f| f.count);

    report.analysis_summary = system_summary(
        findings.hours,
        findings.error_estimate,
        failed_items,
        &findings.categories,
    );
    report.recommendations = system_recommendations(&findings, failed_items);
    report.outcome = outcome(&findings.degraded, findings.timed_out);
    report.namespace = findings.namespace;
    report.time_window = Some(findings.time_window);
    report.evidence = findings.evidence;
    if let Some(failures) = findings.recent_failures {
        report.recent_failures_count = Some(failures.count);
        report.recent_failures = failures.sample;
    }
    report.error_categories = findings.categories;
    report.error_estimate = Some(findings.error_estimate);
    report.degraded_sources = findings.degraded;
    report.timed_out = findings.timed_out;
    report
}

pub fn failure_summary(reason: &str) -> String {
    format!("Analysis could not be completed: {reason}")
}

/// Report for a request that could not be analyzed at all.
pub fn assemble_failed_report(
    request_id: &str,
    mode: AnalysisMode,
    subject: &str,
    reason: &str,
) -> TriageReport {
    let mut report = TriageReport::new(request_id, mode, subject);
    report.outcome = ReportOutcome::Failed;
    report.analysis_summary = failure_summary(reason);
    report.recommendations = FAILED_RECOMMENDATIONS
        .iter()
        .map(|r| r.to_string())
        .collect();
    report
}
