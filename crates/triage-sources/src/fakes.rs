//! In-memory fakes for the collaborator traits
//!
//! Provides `MemoryLookupService`, `MemoryDeploymentMetadata`,
//! `MemoryWorkflowHistory`, `MemoryLogSearch` and `MemoryStatusScan`, which
//! satisfy the trait contracts without any external dependencies. Every fake
//! can be told to fail, and records the calls it received so tests can
//! assert what the engine asked for.
//!
//! [`EvidenceBundle`] is the serializable form of all five fakes together; it
//! is how captured collaborator answers are replayed offline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServiceName, SourceError};
use crate::source_traits::*;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// CloudWatch-style unquoted term filter: every whitespace-separated term of
/// `pattern` must occur in `message`. An empty pattern matches everything.
pub fn filter_matches(message: &str, pattern: &str) -> bool {
    pattern
        .split_whitespace()
        .all(|term| message.contains(term))
}

// ---------------------------------------------------------------------------
// MemoryLookupService
// ---------------------------------------------------------------------------

/// Tracking store backed by a `HashMap<item_id, LookupRecord>`.
///
/// Unknown items answer `LookupRecord::not_found()`.
#[derive(Debug, Default)]
pub struct MemoryLookupService {
    records: Mutex<HashMap<String, LookupRecord>>,
    failure: Mutex<Option<SourceError>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryLookupService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, item_id: impl Into<String>, record: LookupRecord) -> Self {
        locked(&self.records).insert(item_id.into(), record);
        self
    }

    /// Make every subsequent call fail with `error`.
    pub fn failing(self, error: SourceError) -> Self {
        *locked(&self.failure) = Some(error);
        self
    }

    /// Item ids looked up so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl LookupService for MemoryLookupService {
    async fn lookup(&self, item_id: &str) -> SourceResult<LookupRecord> {
        locked(&self.calls).push(item_id.to_string());
        if let Some(err) = locked(&self.failure).clone() {
            return Err(err);
        }
        Ok(locked(&self.records)
            .get(item_id)
            .cloned()
            .unwrap_or_else(LookupRecord::not_found))
    }
}

// ---------------------------------------------------------------------------
// MemoryDeploymentMetadata
// ---------------------------------------------------------------------------

/// Deployment metadata backed by a `HashMap<deployment, outputs>`.
///
/// Deployments that were never registered answer `exists = false`.
#[derive(Debug, Default)]
pub struct MemoryDeploymentMetadata {
    deployments: Mutex<HashMap<String, Vec<DeploymentOutput>>>,
    failure: Mutex<Option<SourceError>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryDeploymentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployment(
        self,
        deployment: impl Into<String>,
        outputs: Vec<DeploymentOutput>,
    ) -> Self {
        locked(&self.deployments).insert(deployment.into(), outputs);
        self
    }

    pub fn failing(self, error: SourceError) -> Self {
        *locked(&self.failure) = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl DeploymentMetadataService for MemoryDeploymentMetadata {
    async fn describe(&self, deployment: &str) -> SourceResult<DeploymentDescription> {
        locked(&self.calls).push(deployment.to_string());
        if let Some(err) = locked(&self.failure).clone() {
            return Err(err);
        }
        Ok(match locked(&self.deployments).get(deployment) {
            Some(outputs) => DeploymentDescription {
                exists: true,
                outputs: outputs.clone(),
            },
            None => DeploymentDescription::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryWorkflowHistory
// ---------------------------------------------------------------------------

/// Workflow history backed by a `HashMap<execution_ref, entries>`.
#[derive(Debug, Default)]
pub struct MemoryWorkflowHistory {
    timelines: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    failure: Mutex<Option<SourceError>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryWorkflowHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(
        self,
        execution_ref: impl Into<String>,
        entries: Vec<HistoryEntry>,
    ) -> Self {
        locked(&self.timelines).insert(execution_ref.into(), entries);
        self
    }

    pub fn failing(self, error: SourceError) -> Self {
        *locked(&self.failure) = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl WorkflowHistoryService for MemoryWorkflowHistory {
    async fn get_timeline(&self, execution_ref: &str) -> SourceResult<Vec<HistoryEntry>> {
        locked(&self.calls).push(execution_ref.to_string());
        if let Some(err) = locked(&self.failure).clone() {
            return Err(err);
        }
        Ok(locked(&self.timelines)
            .get(execution_ref)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryLogSearch
// ---------------------------------------------------------------------------

/// One recorded `search` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCall {
    pub group: String,
    pub pattern: String,
    pub range: TimeRange,
    pub max_results: usize,
}

/// Log backend backed by a `BTreeMap<group, records>`.
///
/// Individual groups can be marked as failing, and every search can be
/// slowed down by a fixed delay to exercise deadlines.
#[derive(Debug, Default)]
pub struct MemoryLogSearch {
    groups: Mutex<BTreeMap<String, Vec<LogRecord>>>,
    failing_groups: Mutex<HashMap<String, SourceError>>,
    list_failure: Mutex<Option<SourceError>>,
    delay: Mutex<Option<Duration>>,
    group_delays: Mutex<HashMap<String, Duration>>,
    searches: Mutex<Vec<SearchCall>>,
}

impl MemoryLogSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an (initially empty) group.
    pub fn with_group(self, group: impl Into<String>) -> Self {
        locked(&self.groups).entry(group.into()).or_default();
        self
    }

    /// Append a line to `group`, creating the group if needed.
    pub fn with_record(self, record: LogRecord) -> Self {
        locked(&self.groups)
            .entry(record.group.clone())
            .or_default()
            .push(record);
        self
    }

    pub fn with_failing_group(self, group: impl Into<String>, error: SourceError) -> Self {
        let group = group.into();
        locked(&self.groups).entry(group.clone()).or_default();
        locked(&self.failing_groups).insert(group, error);
        self
    }

    pub fn failing_list(self, error: SourceError) -> Self {
        *locked(&self.list_failure) = Some(error);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *locked(&self.delay) = Some(delay);
        self
    }

    /// Slow down searches of one group only; overrides [`Self::with_delay`].
    pub fn with_group_delay(self, group: impl Into<String>, delay: Duration) -> Self {
        locked(&self.group_delays).insert(group.into(), delay);
        self
    }

    /// Every search issued so far, in call order.
    pub fn searches(&self) -> Vec<SearchCall> {
        locked(&self.searches).clone()
    }
}

#[async_trait]
impl LogSearchBackend for MemoryLogSearch {
    async fn list_groups(&self, prefix: &str) -> SourceResult<Vec<String>> {
        if let Some(err) = locked(&self.list_failure).clone() {
            return Err(err);
        }
        Ok(locked(&self.groups)
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        group: &str,
        pattern: &str,
        range: TimeRange,
        max_results: usize,
    ) -> SourceResult<Vec<LogRecord>> {
        locked(&self.searches).push(SearchCall {
            group: group.to_string(),
            pattern: pattern.to_string(),
            range,
            max_results,
        });

        let delay = locked(&self.group_delays)
            .get(group)
            .copied()
            .or(*locked(&self.delay));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = locked(&self.failing_groups).get(group).cloned() {
            return Err(err);
        }

        let groups = locked(&self.groups);
        let records = groups.get(group).ok_or_else(|| SourceError::NotFound {
            service: ServiceName::LogSearch,
            what: format!("group {group}"),
        })?;

        let mut matched: Vec<LogRecord> = records
            .iter()
            .filter(|r| r.timestamp().map(|ts| range.contains(ts)).unwrap_or(true))
            .filter(|r| filter_matches(&r.message, pattern))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.timestamp_ms);
        matched.truncate(max_results);
        Ok(matched)
    }
}

// ---------------------------------------------------------------------------
// MemoryStatusScan
// ---------------------------------------------------------------------------

/// Status scan backed by a fixed list of failed items.
#[derive(Debug, Default)]
pub struct MemoryStatusScan {
    failures: Mutex<Vec<FailedItemRecord>>,
    failure: Mutex<Option<SourceError>>,
    scans: Mutex<Vec<(TimeRange, usize)>>,
}

impl MemoryStatusScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(self, failures: Vec<FailedItemRecord>) -> Self {
        locked(&self.failures).extend(failures);
        self
    }

    pub fn failing(self, error: SourceError) -> Self {
        *locked(&self.failure) = Some(error);
        self
    }

    /// `(range, limit)` of every scan issued so far.
    pub fn scans(&self) -> Vec<(TimeRange, usize)> {
        locked(&self.scans).clone()
    }
}

#[async_trait]
impl StatusScanService for MemoryStatusScan {
    async fn scan_recent_failures(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> SourceResult<Vec<FailedItemRecord>> {
        locked(&self.scans).push((range, limit));
        if let Some(err) = locked(&self.failure).clone() {
            return Err(err);
        }
        Ok(locked(&self.failures)
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// EvidenceBundle
// ---------------------------------------------------------------------------

/// Captured collaborator answers, replayable through the in-memory fakes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    /// Tracking-store records keyed by item id
    #[serde(default)]
    pub lookups: BTreeMap<String, LookupRecord>,
    /// Declared outputs keyed by deployment name
    #[serde(default)]
    pub deployments: BTreeMap<String, Vec<DeploymentOutput>>,
    /// Workflow histories keyed by execution reference
    #[serde(default)]
    pub timelines: BTreeMap<String, Vec<HistoryEntry>>,
    /// Log lines keyed by source-group name
    #[serde(default)]
    pub log_groups: BTreeMap<String, Vec<LogRecord>>,
    #[serde(default)]
    pub recent_failures: Vec<FailedItemRecord>,
}

/// The five fakes built from one [`EvidenceBundle`].
#[derive(Debug)]
pub struct BundleFakes {
    pub lookup: MemoryLookupService,
    pub deployments: MemoryDeploymentMetadata,
    pub history: MemoryWorkflowHistory,
    pub logs: MemoryLogSearch,
    pub status_scan: MemoryStatusScan,
}

impl EvidenceBundle {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn into_fakes(self) -> BundleFakes {
        debug!(
            lookups = self.lookups.len(),
            deployments = self.deployments.len(),
            timelines = self.timelines.len(),
            log_groups = self.log_groups.len(),
            recent_failures = self.recent_failures.len(),
            "replaying evidence bundle"
        );
        let lookup = self
            .lookups
            .into_iter()
            .fold(MemoryLookupService::new(), |svc, (id, record)| {
                svc.with_record(id, record)
            });
        let deployments = self.deployments.into_iter().fold(
            MemoryDeploymentMetadata::new(),
            |svc, (name, outputs)| svc.with_deployment(name, outputs),
        );
        let history = self
            .timelines
            .into_iter()
            .fold(MemoryWorkflowHistory::new(), |svc, (exec, entries)| {
                svc.with_timeline(exec, entries)
            });
        let logs = self
            .log_groups
            .into_iter()
            .fold(MemoryLogSearch::new(), |svc, (group, records)| {
                records
                    .into_iter()
                    .fold(svc.with_group(group.clone()), |svc, mut record| {
                        record.group = group.clone();
                        svc.with_record(record)
                    })
            });
        let status_scan = MemoryStatusScan::new().with_failures(self.recent_failures);

        BundleFakes {
            lookup,
            deployments,
            history,
            logs,
            status_scan,
        }
    }
}
