//! Query classification: item-specific or system-wide analysis.
//!
//! A query is item-specific only when it carries an anchored identifier,
//! i.e. one of the keywords `document:`, `file:` or `ObjectKey:` followed by
//! a non-whitespace token. A bare filename mentioned in prose is not enough.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::AnalysisMode;

/// Anchor keywords in match priority order.
pub const ANCHOR_KEYWORDS: &[&str] = &["document", "file", "ObjectKey"];

static ANCHOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ANCHOR_KEYWORDS
        .iter()
        .filter_map(|keyword| {
            Regex::new(&format!(r"(?i)\b{}:\s*(\S+)", regex::escape(keyword))).ok()
        })
        .collect()
});

/// Result of classifying a free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryIntent {
    ItemSpecific { item_id: String },
    SystemWide,
}

impl QueryIntent {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            QueryIntent::ItemSpecific { .. } => AnalysisMode::ItemSpecific,
            QueryIntent::SystemWide => AnalysisMode::SystemWide,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            QueryIntent::ItemSpecific { item_id } => Some(item_id),
            QueryIntent::SystemWide => None,
        }
    }
}

/// Classify a query. The first anchor keyword that matches wins and its
/// captured token, verbatim, is the item identifier.
pub fn classify_query(query: &str) -> QueryIntent {
    ANCHOR_PATTERNS
        .iter()
        .find_map(|re| re.captures(query))
        .and_then(|caps| caps.get(1))
        .map(|m| QueryIntent::ItemSpecific {
            item_id: m.as_str().to_string(),
        })
        .unwrap_or(QueryIntent::SystemWide)
}
