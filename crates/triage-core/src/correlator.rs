//! Evidence correlation across source-groups.
//!
//! [`EvidenceCorrelator`] runs a prioritized list of search patterns against
//! every source-group under a namespace prefix. Patterns are processed in
//! priority order, one wave per pattern; within a wave all groups are
//! searched concurrently through a shared worker pool. Results are merged in
//! group-name order so the output is deterministic regardless of completion
//! order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument, warn};
use triage_sources::{
    LogRecord, LogSearchBackend, ServiceName, SourceError, SourceResult, TimeRange,
};

use crate::domain::{
    DegradedSource, EvidenceEvent, PatternKind, SearchPattern, TriageError, TriageResult,
    WorkItemContext,
};
use crate::namespace::MIN_PREFIX_LEN;
use crate::obs;

/// A system-wide keyword and its per-group cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPattern {
    pub keyword: String,
    pub cap: usize,
}

impl KeywordPattern {
    pub fn new(keyword: impl Into<String>, cap: usize) -> Self {
        Self {
            keyword: keyword.into(),
            cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Concurrent searches allowed across all in-flight requests
    pub worker_pool_size: usize,
    pub primary_filter: String,
    /// Keywords for system-wide mode, strongest first
    pub system_patterns: Vec<KeywordPattern>,
    pub system_max_groups: usize,
    /// Line prefixes dropped from keyword searches
    pub noise_prefixes: Vec<String>,
    /// Over-fetch factor for keyword searches, compensating for noise
    pub noise_overfetch: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            primary_filter: "ERROR".to_string(),
            system_patterns: vec![
                KeywordPattern::new("ERROR", 5),
                KeywordPattern::new("Exception", 3),
                KeywordPattern::new("ValidationException", 2),
                KeywordPattern::new("Failed", 2),
                KeywordPattern::new("Timeout", 1),
            ],
            system_max_groups: 10,
            noise_prefixes: ["[INFO]", "INIT_START", "START", "END", "REPORT"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            noise_overfetch: 5,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> TriageResult<()> {
        if self.worker_pool_size == 0 {
            return Err(TriageError::configuration(
                "correlation.worker_pool_size must be greater than zero",
            ));
        }
        if self.primary_filter.trim().is_empty() {
            return Err(TriageError::configuration(
                "correlation.primary_filter must not be empty",
            ));
        }
        if self.system_patterns.is_empty() {
            return Err(TriageError::configuration(
                "correlation.system_patterns must not be empty",
            ));
        }
        if let Some(bad) = self
            .system_patterns
            .iter()
            .find(|p| p.keyword.trim().is_empty() || p.cap == 0)
        {
            return Err(TriageError::configuration(format!(
                "correlation.system_patterns entry '{}' needs a keyword and a non-zero cap",
                bad.keyword
            )));
        }
        if self.system_max_groups == 0 || self.noise_overfetch == 0 {
            return Err(TriageError::configuration(
                "correlation.system_max_groups and correlation.noise_overfetch must be non-zero",
            ));
        }
        Ok(())
    }

    pub fn system_search_patterns(&self) -> Vec<SearchPattern> {
        self.system_patterns
            .iter()
            .map(|p| SearchPattern::new(p.keyword.clone(), p.cap, PatternKind::Keyword))
            .collect()
    }
}

/// Search patterns for one work item, strongest first.
///
/// Primary filter, execution token, each sub-task token combined with the
/// primary filter, then the item id. Duplicate filters are dropped.
pub fn item_patterns(context: &WorkItemContext, primary: &str, cap: usize) -> Vec<SearchPattern> {
    let mut patterns = vec![SearchPattern::new(primary, cap, PatternKind::PrimaryFilter)];
    if let Some(token) = context.execution_name().filter(|t| !t.is_empty()) {
        patterns.push(SearchPattern::new(token, cap, PatternKind::ExecutionToken));
    }
    for id in &context.subtask_ids {
        patterns.push(SearchPattern::new(
            format!("{id} {primary}"),
            cap,
            PatternKind::SubTask,
        ));
    }
    patterns.push(SearchPattern::new(
        context.item_id.clone(),
        cap,
        PatternKind::ItemId,
    ));

    let mut seen: Vec<String> = Vec::new();
    patterns.retain(|p| {
        if seen.contains(&p.filter) {
            return false;
        }
        seen.push(p.filter.clone());
        true
    });
    patterns
}

/// Lines that start with a noise prefix followed by whitespace (or the end
/// of the line) carry no failure information.
pub fn is_noise(message: &str, prefixes: &[String]) -> bool {
    let line = message.trim_start();
    prefixes.iter().any(|prefix| {
        line.strip_prefix(prefix.as_str()).is_some_and(|rest| {
            prefix.ends_with(']') || rest.is_empty() || rest.starts_with(char::is_whitespace)
        })
    })
}

/// One correlation pass.
#[derive(Debug, Clone)]
pub struct CorrelationRequest {
    pub prefix: String,
    pub patterns: Vec<SearchPattern>,
    pub range: TimeRange,
    pub max_groups: usize,
    /// Stop issuing new waves once this many events were collected
    pub global_cap: usize,
    /// Shrink per-pattern caps to the remaining global budget
    pub cap_to_remaining: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationResult {
    /// Ranked by pattern priority, group name, timestamp
    pub events: Vec<EvidenceEvent>,
    pub groups: Vec<String>,
    pub patterns_searched: Vec<String>,
    pub degraded: Vec<DegradedSource>,
    pub malformed_dropped: usize,
    pub timed_out: bool,
}

impl CorrelationResult {
    pub fn groups_searched(&self) -> usize {
        self.groups.len()
    }
}

pub struct EvidenceCorrelator {
    backend: Arc<dyn LogSearchBackend>,
    pool: Arc<Semaphore>,
    noise_prefixes: Vec<String>,
    noise_overfetch: usize,
}

impl EvidenceCorrelator {
    pub fn new(
        backend: Arc<dyn LogSearchBackend>,
        pool: Arc<Semaphore>,
        config: &CorrelationConfig,
    ) -> Self {
        Self {
            backend,
            pool,
            noise_prefixes: config.noise_prefixes.clone(),
            noise_overfetch: config.noise_overfetch,
        }
    }

    /// Run every pattern against every group under the prefix until the
    /// global cap is reached or `deadline` passes.
    ///
    /// Failed searches are recorded as degraded sources; they never fail
    /// the correlation.
    #[instrument(
        skip(self, request, deadline),
        fields(prefix = %request.prefix, patterns = request.patterns.len())
    )]
    pub async fn correlate(
        &self,
        request: CorrelationRequest,
        deadline: Instant,
    ) -> CorrelationResult {
        let mut result = CorrelationResult::default();

        if request.prefix.chars().count() < MIN_PREFIX_LEN {
            warn!("namespace prefix too short to enumerate groups");
            return result;
        }

        let groups = match timeout_at(deadline, self.backend.list_groups(&request.prefix)).await {
            Err(_) => {
                obs::emit_deadline_exceeded("list_groups");
                result.timed_out = true;
                return result;
            }
            Ok(Err(e)) => {
                obs::emit_source_degraded(&e, Some(&request.prefix));
                result
                    .degraded
                    .push(DegradedSource::from_error(&e, Some(request.prefix.clone())));
                return result;
            }
            Ok(Ok(groups)) => groups,
        };
        let mut groups = groups;
        groups.sort();
        groups.dedup();
        groups.truncate(request.max_groups);
        result.groups = groups.clone();
        if groups.is_empty() {
            debug!("no source-groups under prefix");
            return result;
        }

        for (priority, pattern) in request.patterns.iter().enumerate() {
            let collected = result.events.len();
            if collected >= request.global_cap {
                debug!(collected, "global cap reached, skipping remaining patterns");
                break;
            }
            let cap = if request.cap_to_remaining {
                pattern.cap.min(request.global_cap - collected)
            } else {
                pattern.cap
            };
            if cap == 0 {
                continue;
            }
            result.patterns_searched.push(pattern.filter.clone());

            let wave = self
                .search_wave(&groups, pattern, cap, request.range, deadline)
                .await;

            for (group, outcome) in groups.iter().zip(wave.slots) {
                match outcome {
                    Some(Ok(records)) => {
                        let (kept, malformed) = self.keep_records(records, pattern, cap);
                        result.malformed_dropped += malformed;
                        result.events.extend(kept.into_iter().map(|(ts, message)| {
                            EvidenceEvent::new(ts, group.as_str(), pattern, priority, message)
                        }));
                    }
                    Some(Err(e)) => {
                        obs::emit_search_failed(group, &pattern.filter, &e);
                        result.degraded.push(DegradedSource::from_error(
                            &e,
                            Some(format!("{group} [{}]", pattern.filter)),
                        ));
                    }
                    None => {}
                }
            }

            if wave.timed_out {
                obs::emit_deadline_exceeded("evidence_search");
                result.timed_out = true;
                break;
            }
        }

        result.events.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
        result
    }

    /// Search all groups for one pattern. Slot `i` holds group `i`'s answer,
    /// or `None` if it did not finish before the deadline. A search task
    /// that panicked leaves an `Unavailable` error in its slot.
    async fn search_wave(
        &self,
        groups: &[String],
        pattern: &SearchPattern,
        cap: usize,
        range: TimeRange,
        deadline: Instant,
    ) -> Wave {
        let fetch_limit = if pattern.kind.is_keyword() {
            cap.saturating_mul(self.noise_overfetch)
        } else {
            cap
        };

        let mut join_set = JoinSet::new();
        for (idx, group) in groups.iter().cloned().enumerate() {
            let backend = Arc::clone(&self.backend);
            let pool = Arc::clone(&self.pool);
            let filter = pattern.filter.clone();
            join_set.spawn(async move {
                // A closed pool only happens at shutdown; search unthrottled.
                let _permit = pool.acquire_owned().await.ok();
                let outcome = backend.search(&group, &filter, range, fetch_limit).await;
                (idx, outcome)
            });
        }

        let mut wave = Wave {
            slots: (0..groups.len()).map(|_| None).collect(),
            timed_out: false,
        };
        loop {
            match timeout_at(deadline, join_set.join_next()).await {
                Err(_) => {
                    join_set.abort_all();
                    wave.timed_out = true;
                    break;
                }
                Ok(None) => break,
                Ok(Some(Ok((idx, outcome)))) => wave.slots[idx] = Some(outcome),
                Ok(Some(Err(e))) => warn!(error = %e, "search task join error"),
            }
        }
        if !wave.timed_out {
            // every task has joined; an empty slot is a task that panicked
            for slot in wave.slots.iter_mut().filter(|slot| slot.is_none()) {
                *slot = Some(Err(SourceError::unavailable(
                    ServiceName::LogSearch,
                    "search task aborted",
                )));
            }
        }
        wave
    }

    /// Drop noise and malformed records, then keep the first `cap`.
    /// Also returns how many records were malformed.
    fn keep_records(
        &self,
        records: Vec<LogRecord>,
        pattern: &SearchPattern,
        cap: usize,
    ) -> (Vec<(DateTime<Utc>, String)>, usize) {
        let mut kept = Vec::new();
        let mut malformed = 0;
        for record in records {
            if kept.len() >= cap {
                break;
            }
            let Some(ts) = record.timestamp() else {
                malformed += 1;
                continue;
            };
            if record.message.trim().is_empty() {
                malformed += 1;
                continue;
            }
            if pattern.kind.is_keyword() && is_noise(&record.message, &self.noise_prefixes) {
                continue;
            }
            kept.push((ts, record.message));
        }
        (kept, malformed)
    }
}

struct Wave {
    slots: Vec<Option<SourceResult<Vec<LogRecord>>>>,
    timed_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemStatus;

    fn context() -> WorkItemContext {
        WorkItemContext {
            subtask_ids: vec!["req-1".to_string(), "req-2".to_string()],
            execution_ref: Some("arn:aws:states:x:execution:sm:exec123".to_string()),
            status: ItemStatus::Failed,
            ..WorkItemContext::not_found("report.pdf")
        }
    }

    #[test]
    fn test_item_patterns_priority_order() {
        let filters: Vec<String> = item_patterns(&context(), "ERROR", 5)
            .into_iter()
            .map(|p| p.filter)
            .collect();
        assert_eq!(
            filters,
            vec!["ERROR", "exec123", "req-1 ERROR", "req-2 ERROR", "report.pdf"]
        );
    }

    #[test]
    fn test_item_patterns_without_execution() {
        let ctx = WorkItemContext {
            status: ItemStatus::Queued,
            ..WorkItemContext::not_found("a.pdf")
        };
        let patterns = item_patterns(&ctx, "ERROR", 5);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[1].kind, PatternKind::ItemId);
    }

    #[test]
    fn test_noise_detection() {
        let prefixes = CorrelationConfig::default().noise_prefixes;
        assert!(is_noise("[INFO] all good", &prefixes));
        assert!(is_noise("START RequestId: abc Version: $LATEST", &prefixes));
        assert!(is_noise("  REPORT RequestId: abc Duration: 10 ms", &prefixes));
        assert!(is_noise("END", &prefixes));
        assert!(!is_noise("ENDPOINT ERROR unreachable", &prefixes));
        assert!(!is_noise("[ERROR] boom", &prefixes));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CorrelationConfig::default();
        assert!(config.validate().is_ok());
        let caps: Vec<usize> = config.system_patterns.iter().map(|p| p.cap).collect();
        assert_eq!(caps, vec![5, 3, 2, 2, 1]);
    }

    #[test]
    fn test_validate_rejects_zero_pool_and_empty_patterns() {
        let zero_pool = CorrelationConfig {
            worker_pool_size: 0,
            ..CorrelationConfig::default()
        };
        assert!(zero_pool.validate().is_err());

        let no_patterns = CorrelationConfig {
            system_patterns: Vec::new(),
            ..CorrelationConfig::default()
        };
        assert!(no_patterns.validate().is_err());
    }
}
