//! Trait contract tests for the collaborator traits.
//!
//! These tests verify the behavioral contracts of the collaborator traits
//! using the in-memory fakes. Any conforming implementation must pass these.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use triage_sources::fakes::{
    EvidenceBundle, MemoryDeploymentMetadata, MemoryLogSearch, MemoryLookupService,
    MemoryStatusScan, MemoryWorkflowHistory,
};
use triage_sources::source_traits::*;
use triage_sources::{ServiceName, SourceError, SourceErrorKind};

// ===========================================================================
// LookupService
// ===========================================================================

#[tokio::test]
async fn lookup_unknown_item_is_not_found_not_error() {
    let svc = MemoryLookupService::new();
    let record = svc.lookup("missing.pdf").await.unwrap();

    assert!(!record.found);
    assert_eq!(svc.calls(), vec!["missing.pdf".to_string()]);
}

#[tokio::test]
async fn lookup_returns_registered_record() {
    let svc = MemoryLookupService::new().with_record(
        "report.pdf",
        LookupRecord::found("FAILED").with_execution_ref("arn:aws:states:x:exec123"),
    );
    let record = svc.lookup("report.pdf").await.unwrap();

    assert!(record.found);
    assert_eq!(record.status, "FAILED");
    assert_eq!(record.execution_ref.as_deref(), Some("arn:aws:states:x:exec123"));
}

#[tokio::test]
async fn lookup_failure_is_propagated() {
    let svc = MemoryLookupService::new()
        .failing(SourceError::unavailable(ServiceName::Lookup, "connection refused"));
    let err = svc.lookup("a.pdf").await.unwrap_err();

    assert_eq!(err.kind(), SourceErrorKind::Unavailable);
}

// ===========================================================================
// DeploymentMetadataService
// ===========================================================================

#[tokio::test]
async fn describe_unknown_deployment_does_not_exist() {
    let svc = MemoryDeploymentMetadata::new();
    let desc = svc.describe("nope").await.unwrap();

    assert!(!desc.exists);
    assert!(desc.outputs.is_empty());
}

#[tokio::test]
async fn describe_known_deployment_lists_outputs() {
    let svc = MemoryDeploymentMetadata::new().with_deployment(
        "idp-prod",
        vec![DeploymentOutput::new("StateMachineArn", "arn:sm")],
    );
    let desc = svc.describe("idp-prod").await.unwrap();

    assert!(desc.exists);
    assert_eq!(desc.outputs[0].key, "StateMachineArn");
}

// ===========================================================================
// WorkflowHistoryService
// ===========================================================================

#[tokio::test]
async fn unknown_execution_has_empty_history() {
    let svc = MemoryWorkflowHistory::new();
    assert!(svc.get_timeline("arn:none").await.unwrap().is_empty());
}

#[tokio::test]
async fn history_is_returned_verbatim() {
    let entries = vec![
        HistoryEntry::new(1, TimelineEventType::Started).with_subtask("OCRStep"),
        HistoryEntry::new(2, TimelineEventType::Failed).with_detail("boom"),
    ];
    let svc = MemoryWorkflowHistory::new().with_timeline("arn:exec", entries.clone());

    assert_eq!(svc.get_timeline("arn:exec").await.unwrap(), entries);
}

// ===========================================================================
// LogSearchBackend
// ===========================================================================

#[tokio::test]
async fn list_groups_filters_by_prefix_in_name_order() {
    let svc = MemoryLogSearch::new()
        .with_group("/stack/lambda/b")
        .with_group("/stack/lambda/a")
        .with_group("/other/lambda/c");

    let groups = svc.list_groups("/stack/lambda").await.unwrap();
    assert_eq!(groups, vec!["/stack/lambda/a", "/stack/lambda/b"]);
}

#[tokio::test]
async fn search_respects_range_pattern_and_limit() {
    let now = Utc::now();
    let group = "/stack/lambda/ocr";
    let svc = MemoryLogSearch::new()
        .with_record(LogRecord::new(group, now - Duration::minutes(3), "ERROR one"))
        .with_record(LogRecord::new(group, now - Duration::minutes(2), "ERROR two"))
        .with_record(LogRecord::new(group, now - Duration::minutes(1), "INFO three"))
        .with_record(LogRecord::new(group, now - Duration::hours(5), "ERROR ancient"));

    let range = TimeRange::last_hours(now, 1);
    let hits = svc.search(group, "ERROR", range, 1).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message, "ERROR one");
    assert_eq!(svc.searches().len(), 1);
}

#[tokio::test]
async fn failing_group_does_not_affect_other_groups() {
    let now = Utc::now();
    let svc = MemoryLogSearch::new()
        .with_record(LogRecord::new("/s/lambda/ok", now, "ERROR fine"))
        .with_failing_group(
            "/s/lambda/bad",
            SourceError::from_failure_text(ServiceName::LogSearch, "ThrottlingException"),
        );
    let range = TimeRange::last_hours(now, 1);

    let err = svc.search("/s/lambda/bad", "ERROR", range, 5).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(svc.search("/s/lambda/ok", "ERROR", range, 5).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn search_delay_is_observed() {
    let svc = MemoryLogSearch::new()
        .with_group("/s/lambda/slow")
        .with_delay(StdDuration::from_secs(30));
    let range = TimeRange::last_hours(Utc::now(), 1);

    let started = tokio::time::Instant::now();
    svc.search("/s/lambda/slow", "ERROR", range, 5).await.unwrap();
    assert!(started.elapsed() >= StdDuration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn group_delay_slows_only_that_group() {
    let svc = MemoryLogSearch::new()
        .with_group("/s/lambda/fast")
        .with_group("/s/lambda/slow")
        .with_group_delay("/s/lambda/slow", StdDuration::from_secs(600));
    let range = TimeRange::last_hours(Utc::now(), 1);

    let started = tokio::time::Instant::now();
    svc.search("/s/lambda/fast", "ERROR", range, 5).await.unwrap();
    assert!(started.elapsed() < StdDuration::from_secs(1));

    svc.search("/s/lambda/slow", "ERROR", range, 5).await.unwrap();
    assert!(started.elapsed() >= StdDuration::from_secs(600));
}

// ===========================================================================
// StatusScanService
// ===========================================================================

#[tokio::test]
async fn status_scan_honours_limit_and_records_range() {
    let failures: Vec<FailedItemRecord> = (0..5)
        .map(|i| FailedItemRecord {
            item_id: format!("doc-{i}.pdf"),
            status: "FAILED".to_string(),
            completion_time: None,
            error: None,
        })
        .collect();
    let svc = MemoryStatusScan::new().with_failures(failures);
    let range = TimeRange::last_hours(Utc::now(), 12);

    let hits = svc.scan_recent_failures(range, 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(svc.scans(), vec![(range, 3)]);
}

// ===========================================================================
// EvidenceBundle
// ===========================================================================

#[tokio::test]
async fn bundle_replays_through_fakes() {
    let json = r#"{
        "lookups": {"a.pdf": {"found": true, "status": "FAILED", "execution_ref": "arn:x:exec1"}},
        "deployments": {"idp": [{"key": "StateMachineArn", "value": "arn:sm"}]},
        "timelines": {"arn:x:exec1": [{"seq": 1, "type": "failed", "detail": "boom"}]},
        "log_groups": {"/idp/lambda/fn": [
            {"timestamp_ms": 1700000000000, "message": "ERROR boom", "group": "ignored"}
        ]},
        "recent_failures": [{"item_id": "b.pdf", "status": "FAILED"}]
    }"#;
    let fakes = EvidenceBundle::from_json(json).unwrap().into_fakes();

    assert!(fakes.lookup.lookup("a.pdf").await.unwrap().found);
    assert!(fakes.deployments.describe("idp").await.unwrap().exists);
    assert_eq!(fakes.history.get_timeline("arn:x:exec1").await.unwrap().len(), 1);
    assert_eq!(
        fakes.logs.list_groups("/idp/lambda").await.unwrap(),
        vec!["/idp/lambda/fn"]
    );
    let range = TimeRange::last_hours(Utc::now(), 1);
    assert_eq!(
        fakes
            .status_scan
            .scan_recent_failures(range, 10)
            .await
            .unwrap()
            .len(),
        1
    );
}
