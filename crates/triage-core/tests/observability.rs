//! Observability tests for the triage request lifecycle.
//!
//! Verify that every state-machine transition of a request is emitted as a
//! structured tracing event.

use std::sync::Arc;

use chrono::Utc;
use tracing_test::traced_test;
use triage_core::obs::{
    emit_context_resolved, emit_deadline_exceeded, emit_evidence_collected,
    emit_namespace_resolved, emit_report_assembled, emit_request_classified, emit_search_failed,
    request_span,
};
use triage_core::{
    AnalysisMode, Collaborators, EngineConfig, ItemStatus, PrefixKind, ReportOutcome,
    TriageEngine,
};
use triage_sources::fakes::{
    MemoryDeploymentMetadata, MemoryLogSearch, MemoryLookupService, MemoryStatusScan,
    MemoryWorkflowHistory,
};
use triage_sources::{DeploymentOutput, LogRecord, LookupRecord, ServiceName, SourceError};

#[traced_test]
#[test]
fn test_emit_request_classified_logs_mode() {
    emit_request_classified(AnalysisMode::ItemSpecific, Some("report.pdf"));
    assert!(logs_contain("request.classified"));
    assert!(logs_contain("item_specific"));
}

#[traced_test]
#[test]
fn test_emit_context_resolved_logs_status() {
    emit_context_resolved("report.pdf", ItemStatus::Failed, 2, true);
    assert!(logs_contain("context.resolved"));
    assert!(logs_contain("FAILED"));
}

#[traced_test]
#[test]
fn test_emit_namespace_resolved_logs_prefix() {
    emit_namespace_resolved("idp-prod", "/idp-prod-nested/lambda", PrefixKind::Pattern);
    assert!(logs_contain("/idp-prod-nested/lambda"));
}

#[traced_test]
#[test]
fn test_emit_search_failed_is_warning() {
    let error = SourceError::from_failure_text(ServiceName::LogSearch, "Rate exceeded");
    emit_search_failed("/g/a", "ERROR", &error);
    assert!(logs_contain("search.failed"));
    assert!(logs_contain("WARN"));
    assert!(logs_contain("retryable=true"));
}

#[traced_test]
#[test]
fn test_emit_evidence_and_report_events() {
    emit_evidence_collected(4, 12, 5, 1);
    emit_deadline_exceeded("evidence_search");
    emit_report_assembled(AnalysisMode::SystemWide, ReportOutcome::Partial, 2048);
    assert!(logs_contain("evidence.collected"));
    assert!(logs_contain("deadline.exceeded"));
    assert!(logs_contain("report_bytes=2048"));
}

#[traced_test]
#[test]
fn test_request_span_carries_request_id() {
    let span = request_span("req-span-1", "idp-prod");
    let _entered = span.enter();
    emit_request_classified(AnalysisMode::SystemWide, None);
    assert!(logs_contain("req-span-1"));
}

#[tokio::test]
#[traced_test]
async fn test_engine_emits_full_lifecycle() {
    let collaborators = Collaborators {
        lookup: Arc::new(
            MemoryLookupService::new().with_record("a.pdf", LookupRecord::found("FAILED")),
        ),
        deployments: Arc::new(
            MemoryDeploymentMetadata::new()
                .with_deployment("idp-dev", vec![DeploymentOutput::new("Other", "x")]),
        ),
        history: Arc::new(MemoryWorkflowHistory::new()),
        logs: Arc::new(MemoryLogSearch::new().with_record(LogRecord::new(
            "/aws/lambda/idp-dev/Ocr",
            Utc::now(),
            "[ERROR] a.pdf could not be opened",
        ))),
        status_scan: Arc::new(MemoryStatusScan::new()),
    };
    let engine = TriageEngine::new(collaborators, EngineConfig::default()).unwrap();

    let report = engine.analyze("idp-dev", "file: a.pdf", 1).await;
    assert_eq!(report.outcome, ReportOutcome::Complete);

    for event in [
        "request.classified",
        "context.resolved",
        "namespace.resolved",
        "evidence.collected",
        "report.assembled",
    ] {
        assert!(logs_contain(event), "missing {event}");
    }
    assert!(logs_contain(&report.request_id));
}
