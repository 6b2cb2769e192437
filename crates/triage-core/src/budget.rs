//! Context budget enforcement.
//!
//! Evidence is compressed in four steps, each a prefix or filter over the
//! previous step's output:
//!
//! 1. per source-group cap on raw hits
//! 2. message truncation with [`TRUNCATION_MARKER`]
//! 3. deduplication by normalized signature (first occurrence wins)
//! 4. report caps on groups, events per group, and total events
//!
//! Because every step only keeps a prefix or drops elements, enforcing the
//! same policy on an already-budgeted list returns it unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{EvidenceEvent, EvidenceGroup, ReportEvent, TriageError, TriageResult};

/// Appended to every truncated message.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Size limits applied to everything that ends up in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    /// Maximum characters of one log message, marker included
    pub max_message_length: usize,
    /// Raw hits kept per source-group across all patterns
    pub max_events_per_group: usize,
    pub max_groups_searched: usize,
    pub max_total_events: usize,
    pub max_report_groups: usize,
    pub max_report_events_per_group: usize,
    pub max_subtask_ids: usize,
    pub max_timeline_entries: usize,
    pub max_error_detail_length: usize,
    pub max_recent_failures: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            max_message_length: 400,
            max_events_per_group: 5,
            max_groups_searched: 20,
            max_total_events: 20,
            max_report_groups: 5,
            max_report_events_per_group: 3,
            max_subtask_ids: 10,
            max_timeline_entries: 3,
            max_error_detail_length: 400,
            max_recent_failures: 3,
        }
    }
}

impl BudgetPolicy {
    pub fn validate(&self) -> TriageResult<()> {
        let limits = [
            ("max_message_length", self.max_message_length),
            ("max_events_per_group", self.max_events_per_group),
            ("max_groups_searched", self.max_groups_searched),
            ("max_total_events", self.max_total_events),
            ("max_report_groups", self.max_report_groups),
            ("max_report_events_per_group", self.max_report_events_per_group),
            ("max_timeline_entries", self.max_timeline_entries),
            ("max_error_detail_length", self.max_error_detail_length),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(TriageError::configuration(format!(
                "budget.{name} must be greater than zero"
            )));
        }
        let marker_len = TRUNCATION_MARKER.chars().count();
        if self.max_message_length <= marker_len {
            return Err(TriageError::configuration(format!(
                "budget.max_message_length must exceed the truncation marker ({marker_len} chars)"
            )));
        }
        Ok(())
    }
}

/// Cut `message` to at most `max_len` characters, marker included.
///
/// Counts characters, not bytes, so multi-byte text is never split.
pub fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    let keep = max_len.saturating_sub(marker_len);
    let mut out: String = message.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

static TIMESTAMP_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?").ok()
});

static REQUEST_ID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)request\s?id:?\s*[0-9a-f-]+").ok());

static UUID_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").ok()
});

fn replace_volatile(text: String, re: &Option<Regex>, with: &str) -> String {
    match re {
        Some(re) => re.replace_all(&text, with).into_owned(),
        None => text,
    }
}

/// Message with volatile parts (timestamps, request ids, uuids) removed and
/// whitespace collapsed. Lines differing only in those parts normalize equal.
pub fn normalize_message(message: &str) -> String {
    let stripped = replace_volatile(message.to_string(), &TIMESTAMP_RE, "");
    let stripped = replace_volatile(stripped, &REQUEST_ID_RE, "RequestId");
    let stripped = replace_volatile(stripped, &UUID_RE, "<id>");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short content hash of a normalized message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceSignature(String);

impl EvidenceSignature {
    pub fn of(message: &str) -> Self {
        let digest = Sha256::digest(normalize_message(message).as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(16);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Evidence after budgeting, with what each step removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetedEvidence {
    pub events: Vec<EvidenceEvent>,
    pub messages_truncated: usize,
    pub duplicates_dropped: usize,
    /// Events dropped by the group and report caps
    pub events_capped: usize,
}

impl BudgetedEvidence {
    /// Group retained events by source-group in order of first appearance.
    pub fn grouped(&self) -> Vec<EvidenceGroup> {
        let mut groups: Vec<EvidenceGroup> = Vec::new();
        for event in &self.events {
            let entry = ReportEvent {
                timestamp: event.timestamp,
                pattern: event.pattern.clone(),
                message: event.message.clone(),
            };
            match groups.iter_mut().find(|g| g.group == event.group) {
                Some(group) => group.events.push(entry),
                None => groups.push(EvidenceGroup {
                    group: event.group.clone(),
                    events: vec![entry],
                }),
            }
        }
        groups
    }
}

/// Keep the first `cap` events of every group, preserving order.
fn cap_per_group(events: Vec<EvidenceEvent>, cap: usize) -> Vec<EvidenceEvent> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    events
        .into_iter()
        .filter(|event| {
            let count = seen.entry(event.group.clone()).or_insert(0);
            *count += 1;
            *count <= cap
        })
        .collect()
}

/// Apply the budget to ranked evidence. Input order is preserved.
pub fn enforce_budget(events: Vec<EvidenceEvent>, policy: &BudgetPolicy) -> BudgetedEvidence {
    let input_len = events.len();

    // 1. raw per-group cap
    let events = cap_per_group(events, policy.max_events_per_group);

    // 2. truncation
    let mut messages_truncated = 0;
    let events: Vec<EvidenceEvent> = events
        .into_iter()
        .map(|mut event| {
            let cut = truncate_message(&event.message, policy.max_message_length);
            if cut != event.message {
                messages_truncated += 1;
                event.message = cut;
            }
            event
        })
        .collect();

    // 3. dedupe
    let before_dedupe = events.len();
    let mut signatures: HashSet<EvidenceSignature> = HashSet::new();
    let events: Vec<EvidenceEvent> = events
        .into_iter()
        .filter(|event| signatures.insert(EvidenceSignature::of(&event.message)))
        .collect();
    let duplicates_dropped = before_dedupe - events.len();

    // 4. report caps
    let mut kept_groups: Vec<String> = Vec::new();
    let events: Vec<EvidenceEvent> = events
        .into_iter()
        .filter(|event| {
            if kept_groups.contains(&event.group) {
                return true;
            }
            if kept_groups.len() < policy.max_report_groups {
                kept_groups.push(event.group.clone());
                return true;
            }
            false
        })
        .collect();
    let mut events = cap_per_group(events, policy.max_report_events_per_group);
    events.truncate(policy.max_total_events);

    let events_capped = input_len - duplicates_dropped - events.len();
    BudgetedEvidence {
        events,
        messages_truncated,
        duplicates_dropped,
        events_capped,
    }
}
