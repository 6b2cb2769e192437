//! Search patterns and the evidence events they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a search pattern came from. Ordering of patterns, not of kinds,
/// decides priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Generic error filter applied to every group
    PrimaryFilter,
    /// Short name of the workflow execution
    ExecutionToken,
    /// Sub-task correlation token combined with the primary filter
    SubTask,
    /// The item identifier itself
    ItemId,
    /// Weighted system-wide keyword
    Keyword,
}

impl PatternKind {
    /// Keyword searches are broad and need noise filtering.
    pub fn is_keyword(self) -> bool {
        matches!(self, PatternKind::PrimaryFilter | PatternKind::Keyword)
    }
}

/// One filter to run against every source-group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPattern {
    pub filter: String,
    /// Maximum hits kept per source-group for this pattern
    pub cap: usize,
    pub kind: PatternKind,
}

impl SearchPattern {
    pub fn new(filter: impl Into<String>, cap: usize, kind: PatternKind) -> Self {
        Self {
            filter: filter.into(),
            cap,
            kind,
        }
    }
}

/// A single log line retained as evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEvent {
    pub timestamp: DateTime<Utc>,
    pub group: String,
    /// Filter that produced the hit
    pub pattern: String,
    /// Position of the pattern in the search order; lower is stronger
    #[serde(default)]
    pub priority: usize,
    pub message: String,
}

impl EvidenceEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        group: impl Into<String>,
        pattern: &SearchPattern,
        priority: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            group: group.into(),
            pattern: pattern.filter.clone(),
            priority,
            message: message.into(),
        }
    }

    /// Deterministic ranking key: pattern priority, group name, time.
    pub fn rank_key(&self) -> (usize, &str, DateTime<Utc>) {
        (self.priority, self.group.as_str(), self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_kinds() {
        assert!(PatternKind::PrimaryFilter.is_keyword());
        assert!(PatternKind::Keyword.is_keyword());
        assert!(!PatternKind::SubTask.is_keyword());
        assert!(!PatternKind::ItemId.is_keyword());
    }

    #[test]
    fn test_rank_key_orders_by_priority_first() {
        let now = Utc::now();
        let strong = SearchPattern::new("ERROR", 5, PatternKind::PrimaryFilter);
        let weak = SearchPattern::new("a.pdf", 5, PatternKind::ItemId);
        let a = EvidenceEvent::new(now, "/z/lambda/x", &strong, 0, "ERROR x");
        let b = EvidenceEvent::new(now, "/a/lambda/y", &weak, 3, "a.pdf y");
        assert!(a.rank_key() < b.rank_key());
    }
}
