//! Graceful degradation: failing collaborators shrink the report instead of
//! failing the request, and the deadline turns into a partial report.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use triage_core::{Collaborators, EngineConfig, ReportOutcome, TriageEngine, TriageError};
use triage_sources::fakes::{
    MemoryDeploymentMetadata, MemoryLogSearch, MemoryLookupService, MemoryStatusScan,
    MemoryWorkflowHistory,
};
use triage_sources::{
    DeploymentOutput, HistoryEntry, LogRecord, LogSearchBackend, LookupRecord, ServiceName,
    SourceError, SourceErrorKind, SourceResult, TimeRange, TimelineEventType,
};

const DEPLOYMENT: &str = "idp-prod";
const EXEC_REF: &str = "arn:aws:states:us-east-1:1:execution:idp-prod-Workflow:exec9";
const GOOD_GROUP: &str = "/idp-prod-nested/lambda/ClassificationFunction";
const BAD_GROUP: &str = "/idp-prod-nested/lambda/SummarizationFunction";

fn lookup() -> MemoryLookupService {
    MemoryLookupService::new().with_record(
        "claim.pdf",
        LookupRecord::found("FAILED").with_execution_ref(EXEC_REF),
    )
}

fn deployments() -> MemoryDeploymentMetadata {
    MemoryDeploymentMetadata::new().with_deployment(
        DEPLOYMENT,
        vec![DeploymentOutput::new(
            "StateMachineArn",
            "arn:aws:states:us-east-1:1:stateMachine:idp-prod-nested-DocumentProcessingWorkflow",
        )],
    )
}

fn history() -> MemoryWorkflowHistory {
    MemoryWorkflowHistory::new().with_timeline(
        EXEC_REF,
        vec![
            HistoryEntry::new(1, TimelineEventType::Started).with_subtask("Classify"),
            HistoryEntry::new(2, TimelineEventType::Failed)
                .with_subtask("Classify")
                .with_detail("ValidationException: unknown class"),
        ],
    )
}

fn logs() -> MemoryLogSearch {
    MemoryLogSearch::new().with_record(LogRecord::new(
        GOOD_GROUP,
        Utc::now() - Duration::minutes(5),
        "[ERROR] ValidationException: unknown class for claim.pdf",
    ))
}

struct Setup {
    lookup: MemoryLookupService,
    deployments: MemoryDeploymentMetadata,
    history: MemoryWorkflowHistory,
    logs: MemoryLogSearch,
    status_scan: MemoryStatusScan,
    config: EngineConfig,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            lookup: lookup(),
            deployments: deployments(),
            history: history(),
            logs: logs(),
            status_scan: MemoryStatusScan::new(),
            config: EngineConfig::default(),
        }
    }
}

impl Setup {
    fn engine(mut self) -> TriageEngine {
        let logs = Arc::new(std::mem::take(&mut self.logs));
        self.engine_with_logs(logs)
    }

    fn engine_with_logs(self, logs: Arc<dyn LogSearchBackend>) -> TriageEngine {
        let collaborators = Collaborators {
            lookup: Arc::new(self.lookup),
            deployments: Arc::new(self.deployments),
            history: Arc::new(self.history),
            logs,
            status_scan: Arc::new(self.status_scan),
        };
        TriageEngine::new(collaborators, self.config).unwrap()
    }
}

/// Log search whose backend crashes while searching one group.
struct CrashingGroupSearch {
    inner: MemoryLogSearch,
    crashing_group: &'static str,
}

#[async_trait]
impl LogSearchBackend for CrashingGroupSearch {
    async fn list_groups(&self, prefix: &str) -> SourceResult<Vec<String>> {
        self.inner.list_groups(prefix).await
    }

    async fn search(
        &self,
        group: &str,
        pattern: &str,
        range: TimeRange,
        max_results: usize,
    ) -> SourceResult<Vec<LogRecord>> {
        if group == self.crashing_group {
            panic!("search client crashed");
        }
        self.inner.search(group, pattern, range, max_results).await
    }
}

#[tokio::test]
async fn test_throttled_group_keeps_other_groups_evidence() {
    let engine = Setup {
        logs: logs().with_failing_group(
            BAD_GROUP,
            SourceError::from_failure_text(ServiceName::LogSearch, "ThrottlingException"),
        ),
        ..Setup::default()
    }
    .engine();

    let report = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReportOutcome::Partial);
    let evidence = report.evidence.as_ref().unwrap();
    assert_eq!(evidence.groups.len(), 1);
    assert_eq!(evidence.groups[0].group, GOOD_GROUP);

    let throttled: Vec<_> = report
        .degraded_sources
        .iter()
        .filter(|d| d.kind == SourceErrorKind::Throttled)
        .collect();
    assert!(!throttled.is_empty());
    assert!(throttled.iter().all(|d| d.retryable));
    assert!(throttled[0]
        .scope
        .as_deref()
        .is_some_and(|s| s.starts_with(BAD_GROUP)));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("retry the analysis later")));
}

#[tokio::test]
async fn test_unreachable_history_drops_timeline_only() {
    let engine = Setup {
        history: history().failing(SourceError::unavailable(
            ServiceName::WorkflowHistory,
            "connection reset",
        )),
        ..Setup::default()
    }
    .engine();

    let report = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReportOutcome::Partial);
    assert!(report.timeline.is_none());
    assert!(report.evidence.is_some());
    assert_eq!(report.degraded_sources.len(), 1);
    assert_eq!(report.degraded_sources[0].service, ServiceName::WorkflowHistory);
    assert_eq!(report.degraded_sources[0].scope.as_deref(), Some(EXEC_REF));
}

#[tokio::test]
async fn test_unreachable_metadata_skips_evidence() {
    let engine = Setup {
        deployments: deployments().failing(SourceError::unavailable(
            ServiceName::DeploymentMetadata,
            "endpoint unreachable",
        )),
        ..Setup::default()
    }
    .engine();

    let report = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReportOutcome::Partial);
    assert!(report.namespace.is_none());
    assert!(report.evidence.is_none());
    assert!(report.timeline.is_some());
}

#[tokio::test]
async fn test_failing_status_scan_degrades_system_report() {
    let engine = Setup {
        status_scan: MemoryStatusScan::new().failing(SourceError::from_failure_text(
            ServiceName::StatusScan,
            "ProvisionedThroughputExceededException",
        )),
        ..Setup::default()
    }
    .engine();

    let report = engine
        .try_analyze(DEPLOYMENT, "any errors today?", 24)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReportOutcome::Partial);
    assert_eq!(report.recent_failures_count, None);
    assert_eq!(report.degraded_sources[0].service, ServiceName::StatusScan);
    assert!(report.degraded_sources[0].retryable);
    // ERROR, Exception and ValidationException all match the one line
    assert_eq!(report.error_estimate, Some(3));
}

#[tokio::test]
async fn test_lookup_failure_aborts_item_request() {
    let engine = Setup {
        lookup: lookup().failing(SourceError::unavailable(ServiceName::Lookup, "table missing")),
        ..Setup::default()
    }
    .engine();

    let err = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::LookupFailed { ref item_id, .. } if item_id == "claim.pdf"));

    let report = engine.analyze(DEPLOYMENT, "document: claim.pdf", 24).await;
    assert_eq!(report.outcome, ReportOutcome::Failed);
    assert!(report.analysis_summary.contains("table missing"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_partial_report() {
    let engine = Setup {
        logs: logs().with_delay(std::time::Duration::from_secs(120)),
        config: EngineConfig {
            request_timeout_secs: 5,
            ..EngineConfig::default()
        },
        ..Setup::default()
    }
    .engine();

    let report = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap();

    assert!(report.timed_out);
    assert_eq!(report.outcome, ReportOutcome::Partial);
    assert!(report.timeline.is_some());
    let evidence = report.evidence.as_ref().unwrap();
    assert_eq!(evidence.events_retained, 0);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("narrower time range")));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_keeps_evidence_from_fast_groups() {
    let engine = Setup {
        logs: logs().with_group(BAD_GROUP).with_group_delay(
            BAD_GROUP,
            std::time::Duration::from_secs(600),
        ),
        config: EngineConfig {
            request_timeout_secs: 5,
            ..EngineConfig::default()
        },
        ..Setup::default()
    }
    .engine();

    let report = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap();

    assert!(report.timed_out);
    assert_eq!(report.outcome, ReportOutcome::Partial);
    let evidence = report.evidence.as_ref().unwrap();
    assert_eq!(evidence.events_retained, 1);
    assert_eq!(evidence.groups.len(), 1);
    assert_eq!(evidence.groups[0].group, GOOD_GROUP);
}

#[tokio::test]
async fn test_crashed_search_task_marks_report_partial() {
    let search = CrashingGroupSearch {
        inner: logs().with_group(BAD_GROUP),
        crashing_group: BAD_GROUP,
    };
    let engine = Setup::default().engine_with_logs(Arc::new(search));

    let report = engine
        .try_analyze(DEPLOYMENT, "document: claim.pdf", 24)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReportOutcome::Partial);
    assert!(!report.timed_out);
    let evidence = report.evidence.as_ref().unwrap();
    assert_eq!(evidence.groups.len(), 1);
    assert_eq!(evidence.groups[0].group, GOOD_GROUP);

    let crashed: Vec<_> = report
        .degraded_sources
        .iter()
        .filter(|d| d.scope.as_deref().is_some_and(|s| s.starts_with(BAD_GROUP)))
        .collect();
    assert!(!crashed.is_empty());
    assert!(crashed
        .iter()
        .all(|d| d.service == ServiceName::LogSearch && d.kind == SourceErrorKind::Unavailable));
}
