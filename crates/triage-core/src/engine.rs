//! Deadline-bounded triage engine.
//!
//! One request is one traversal of
//! `Classified -> ContextResolved | SystemScan -> NamespaceResolved ->
//! EvidenceCollected -> Budgeted -> Assembled`. Only configuration problems
//! and a failed tracking-store lookup in item mode abort a request; every
//! other failure shrinks the report and marks it partial.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::error::Elapsed;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn, Instrument};
use triage_sources::fakes::BundleFakes;
use triage_sources::{
    DeploymentMetadataService, LogSearchBackend, LookupService, ServiceName, SourceError,
    StatusScanService, TimeRange, WorkflowHistoryService,
};
use uuid::Uuid;

use crate::assembler::{
    assemble_failed_report, assemble_item_report, assemble_not_found_report,
    assemble_system_report, evidence_summary, ItemFindings, SystemFindings,
};
use crate::budget::{enforce_budget, truncate_message, BudgetedEvidence};
use crate::classifier::{classify_query, QueryIntent};
use crate::config::EngineConfig;
use crate::context_resolver::ContextResolver;
use crate::correlator::{item_patterns, CorrelationRequest, CorrelationResult, EvidenceCorrelator};
use crate::domain::{DegradedSource, EvidenceSummary, TriageError, TriageReport, TriageResult};
use crate::namespace::{NamespaceResolution, NamespaceResolver};
use crate::obs;
use crate::system_scan::{summarize_categories, SystemScanner};
use crate::timeline_analyzer::TimelineAnalyzer;

/// The external services one engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub lookup: Arc<dyn LookupService>,
    pub deployments: Arc<dyn DeploymentMetadataService>,
    pub history: Arc<dyn WorkflowHistoryService>,
    pub logs: Arc<dyn LogSearchBackend>,
    pub status_scan: Arc<dyn StatusScanService>,
}

impl From<BundleFakes> for Collaborators {
    fn from(fakes: BundleFakes) -> Self {
        Self {
            lookup: Arc::new(fakes.lookup),
            deployments: Arc::new(fakes.deployments),
            history: Arc::new(fakes.history),
            logs: Arc::new(fakes.logs),
            status_scan: Arc::new(fakes.status_scan),
        }
    }
}

/// Degraded sources and deadline expiry collected during one request.
#[derive(Debug, Default)]
struct Degradation {
    sources: Vec<DegradedSource>,
    timed_out: bool,
}

impl Degradation {
    fn source(&mut self, error: &SourceError, scope: Option<String>) {
        obs::emit_source_degraded(error, scope.as_deref());
        self.sources.push(DegradedSource::from_error(error, scope));
    }

    fn deadline(&mut self, stage: &str) {
        obs::emit_deadline_exceeded(stage);
        self.timed_out = true;
    }

    fn absorb(&mut self, correlation: &CorrelationResult) {
        self.sources.extend(correlation.degraded.iter().cloned());
        self.timed_out |= correlation.timed_out;
    }

    fn finish(mut self, max_detail_len: usize) -> (Vec<DegradedSource>, bool) {
        for source in &mut self.sources {
            source.detail = truncate_message(&source.detail, max_detail_len);
        }
        (self.sources, self.timed_out)
    }
}

pub struct TriageEngine {
    config: EngineConfig,
    contexts: ContextResolver,
    namespaces: NamespaceResolver,
    timelines: TimelineAnalyzer,
    correlator: EvidenceCorrelator,
    scanner: SystemScanner,
}

impl TriageEngine {
    /// Validate `config` and wire the components. The worker pool is shared
    /// by every request issued through this engine.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> TriageResult<Self> {
        config.validate()?;
        let pool = Arc::new(Semaphore::new(config.correlation.worker_pool_size));
        let budget = &config.budget;

        Ok(Self {
            contexts: ContextResolver::new(collaborators.lookup, budget.max_subtask_ids),
            namespaces: NamespaceResolver::new(
                collaborators.deployments,
                config.namespace.clone(),
            ),
            timelines: TimelineAnalyzer::new(collaborators.history, config.timeline_limits()),
            correlator: EvidenceCorrelator::new(collaborators.logs, pool, &config.correlation),
            scanner: SystemScanner::new(
                collaborators.status_scan,
                config.status_scan_limit,
                budget.max_recent_failures,
                budget.max_message_length,
            ),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze `query` against `deployment`. Never fails: an aborted request
    /// yields a report with outcome `failed` and the captured reason.
    pub async fn analyze(
        &self,
        deployment: &str,
        query: &str,
        time_range_hours: u32,
    ) -> TriageReport {
        let request_id = Uuid::new_v4().to_string();
        let span = obs::request_span(&request_id, deployment);
        async {
            match self.run(&request_id, deployment, query, time_range_hours).await {
                Ok(report) => report,
                Err(error) => {
                    warn!(error = %error, "analysis aborted");
                    let intent = classify_query(query);
                    let reason = truncate_message(
                        &error.to_string(),
                        self.config.budget.max_error_detail_length,
                    );
                    let report = assemble_failed_report(
                        &request_id,
                        intent.mode(),
                        intent.item_id().unwrap_or(query),
                        &reason,
                    );
                    emit_assembled(&report);
                    report
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Like [`TriageEngine::analyze`], but surfaces the errors that abort a
    /// request: configuration problems and item lookup failures.
    pub async fn try_analyze(
        &self,
        deployment: &str,
        query: &str,
        time_range_hours: u32,
    ) -> TriageResult<TriageReport> {
        let request_id = Uuid::new_v4().to_string();
        let span = obs::request_span(&request_id, deployment);
        self.run(&request_id, deployment, query, time_range_hours)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request_id: &str,
        deployment: &str,
        query: &str,
        time_range_hours: u32,
    ) -> TriageResult<TriageReport> {
        if deployment.trim().is_empty() {
            return Err(TriageError::configuration("deployment name is required"));
        }
        let deadline = Instant::now() + self.config.request_timeout();
        let hours = self.config.effective_hours(time_range_hours);

        let intent = classify_query(query);
        obs::emit_request_classified(intent.mode(), intent.item_id());

        let report = match intent {
            QueryIntent::ItemSpecific { item_id } => {
                self.analyze_item(request_id, deployment, &item_id, hours, deadline)
                    .await?
            }
            QueryIntent::SystemWide => {
                self.analyze_system(request_id, deployment, query, hours, deadline)
                    .await?
            }
        };
        emit_assembled(&report);
        Ok(report)
    }

    async fn analyze_item(
        &self,
        request_id: &str,
        deployment: &str,
        item_id: &str,
        hours: u32,
        deadline: Instant,
    ) -> TriageResult<TriageReport> {
        let context = match timeout_at(deadline, self.contexts.resolve(item_id)).await {
            Err(_) => {
                obs::emit_deadline_exceeded("context");
                return Err(TriageError::LookupFailed {
                    item_id: item_id.to_string(),
                    source: SourceError::Timeout {
                        service: ServiceName::Lookup,
                    },
                });
            }
            Ok(Err(source)) => {
                return Err(TriageError::LookupFailed {
                    item_id: item_id.to_string(),
                    source,
                })
            }
            Ok(Ok(context)) => context,
        };
        if !context.is_found() {
            info!(item_id = %item_id, "item not found in tracking store");
            return Ok(assemble_not_found_report(request_id, item_id));
        }
        obs::emit_context_resolved(
            item_id,
            context.status,
            context.subtask_ids.len(),
            context.execution_ref.is_some(),
        );

        let mut degradation = Degradation::default();
        let resolved = timeout_at(deadline, self.namespaces.resolve(deployment)).await;
        let namespace = settle_namespace(resolved, deployment, &mut degradation)?;

        let budget = &self.config.budget;
        let range = context.window.to_range(Utc::now(), hours);
        let patterns = item_patterns(
            &context,
            &self.config.correlation.primary_filter,
            budget.max_events_per_group,
        );

        let timeline_call = timeout_at(
            deadline,
            self.timelines.analyze(context.execution_ref.as_deref()),
        );
        let evidence_call = async {
            match &namespace {
                Some(ns) => {
                    let request = CorrelationRequest {
                        prefix: ns.prefix.clone(),
                        patterns,
                        range,
                        max_groups: budget.max_groups_searched,
                        global_cap: budget.max_total_events,
                        cap_to_remaining: false,
                    };
                    Some(self.correlator.correlate(request, deadline).await)
                }
                None => None,
            }
        };
        let (timeline, correlation) = tokio::join!(timeline_call, evidence_call);

        let timeline = match timeline {
            Err(_) => {
                degradation.deadline("timeline");
                None
            }
            Ok(Err(e)) => {
                degradation.source(&e, context.execution_ref.clone());
                None
            }
            Ok(Ok(timeline)) => Some(timeline),
        };
        let evidence = correlation.map(|c| self.budget_evidence(&c, &mut degradation).0);

        let (degraded, timed_out) = degradation.finish(budget.max_error_detail_length);
        Ok(assemble_item_report(
            request_id,
            ItemFindings {
                context,
                namespace,
                time_window: Some(range),
                timeline,
                evidence,
                degraded,
                timed_out,
            },
        ))
    }

    async fn analyze_system(
        &self,
        request_id: &str,
        deployment: &str,
        query: &str,
        hours: u32,
        deadline: Instant,
    ) -> TriageResult<TriageReport> {
        let range = TimeRange::last_hours(Utc::now(), hours);
        let (scanned, resolved) = tokio::join!(
            timeout_at(deadline, self.scanner.scan(range)),
            timeout_at(deadline, self.namespaces.resolve(deployment)),
        );

        let mut degradation = Degradation::default();
        let namespace = settle_namespace(resolved, deployment, &mut degradation)?;
        let recent_failures = match scanned {
            Err(_) => {
                degradation.deadline("status_scan");
                None
            }
            Ok(Err(e)) => {
                degradation.source(&e, None);
                None
            }
            Ok(Ok(failures)) => Some(failures),
        };

        let budget = &self.config.budget;
        let correlation = match &namespace {
            Some(ns) => {
                let request = CorrelationRequest {
                    prefix: ns.prefix.clone(),
                    patterns: self.config.correlation.system_search_patterns(),
                    range,
                    max_groups: self
                        .config
                        .correlation
                        .system_max_groups
                        .min(budget.max_groups_searched),
                    global_cap: budget.max_total_events,
                    cap_to_remaining: true,
                };
                Some(self.correlator.correlate(request, deadline).await)
            }
            None => None,
        };

        let (evidence, categories, error_estimate) = match correlation {
            Some(correlation) => {
                let (summary, budgeted) = self.budget_evidence(&correlation, &mut degradation);
                let categories = summarize_categories(&budgeted.events, budget.max_message_length);
                (Some(summary), categories, correlation.events.len())
            }
            None => (None, Default::default(), 0),
        };

        let (degraded, timed_out) = degradation.finish(budget.max_error_detail_length);
        Ok(assemble_system_report(
            request_id,
            SystemFindings {
                query: query.to_string(),
                hours,
                namespace,
                time_window: range,
                recent_failures,
                evidence,
                categories,
                error_estimate,
                degraded,
                timed_out,
            },
        ))
    }

    fn budget_evidence(
        &self,
        correlation: &CorrelationResult,
        degradation: &mut Degradation,
    ) -> (EvidenceSummary, BudgetedEvidence) {
        let budgeted = enforce_budget(correlation.events.clone(), &self.config.budget);
        let summary = evidence_summary(correlation, &budgeted);
        degradation.absorb(correlation);
        emit_collected(&summary, degradation.sources.len());
        (summary, budgeted)
    }
}

/// Unreachable metadata degrades the request; configuration errors abort it.
fn settle_namespace(
    resolved: Result<TriageResult<NamespaceResolution>, Elapsed>,
    deployment: &str,
    degradation: &mut Degradation,
) -> TriageResult<Option<NamespaceResolution>> {
    match resolved {
        Err(_) => {
            degradation.deadline("namespace");
            Ok(None)
        }
        Ok(Err(TriageError::Source(e))) => {
            degradation.source(&e, Some(deployment.to_string()));
            Ok(None)
        }
        Ok(Err(fatal)) => Err(fatal),
        Ok(Ok(namespace)) => {
            obs::emit_namespace_resolved(deployment, &namespace.prefix, namespace.kind);
            Ok(Some(namespace))
        }
    }
}

fn emit_collected(summary: &EvidenceSummary, degraded: usize) {
    obs::emit_evidence_collected(
        summary.groups_searched,
        summary.events_found,
        summary.events_retained,
        degraded,
    );
}

fn emit_assembled(report: &TriageReport) {
    let report_bytes = report.to_json().map_or(0, |json| json.len());
    obs::emit_report_assembled(report.analysis_mode, report.outcome, report_bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReportOutcome;
    use triage_sources::fakes::EvidenceBundle;

    fn engine(config: EngineConfig) -> TriageResult<TriageEngine> {
        let collaborators = Collaborators::from(EvidenceBundle::default().into_fakes());
        TriageEngine::new(collaborators, config)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig {
            request_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            engine(config),
            Err(TriageError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_deployment_is_configuration_error() {
        let engine = engine(EngineConfig::default()).unwrap();
        let err = engine.try_analyze("  ", "anything", 24).await.unwrap_err();
        assert!(matches!(err, TriageError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_analyze_turns_fatal_error_into_failed_report() {
        let engine = engine(EngineConfig::default()).unwrap();
        let report = engine.analyze("ghost", "recent errors", 24).await;
        assert_eq!(report.outcome, ReportOutcome::Failed);
        assert!(report
            .analysis_summary
            .starts_with("Analysis could not be completed: configuration error"));
    }
}
