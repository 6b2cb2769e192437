//! System-wide scan of recent failures and error categorisation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};
use triage_sources::{FailedItemRecord, SourceResult, StatusScanService, TimeRange};

use crate::budget::truncate_message;
use crate::domain::{CategorySummary, ErrorCategory, EvidenceEvent};

pub const FAILED_STATUS: &str = "FAILED";

/// Recently failed items found by a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentFailures {
    pub count: usize,
    /// Leading records kept for the report
    pub sample: Vec<FailedItemRecord>,
}

pub struct SystemScanner {
    status_scan: Arc<dyn StatusScanService>,
    scan_limit: usize,
    max_sample: usize,
    max_error_len: usize,
}

impl SystemScanner {
    pub fn new(
        status_scan: Arc<dyn StatusScanService>,
        scan_limit: usize,
        max_sample: usize,
        max_error_len: usize,
    ) -> Self {
        Self {
            status_scan,
            scan_limit,
            max_sample,
            max_error_len,
        }
    }

    /// Failed items inside `range`; records with another status are ignored.
    #[instrument(skip(self))]
    pub async fn scan(&self, range: TimeRange) -> SourceResult<RecentFailures> {
        let records = self
            .status_scan
            .scan_recent_failures(range, self.scan_limit)
            .await?;
        let failed: Vec<FailedItemRecord> = records
            .into_iter()
            .filter(|r| r.status.eq_ignore_ascii_case(FAILED_STATUS))
            .collect();
        debug!(failed = failed.len(), "status scan complete");

        let sample = failed
            .iter()
            .take(self.max_sample)
            .cloned()
            .map(|mut record| {
                record.error = record
                    .error
                    .map(|e| truncate_message(&e, self.max_error_len));
                record
            })
            .collect();
        Ok(RecentFailures {
            count: failed.len(),
            sample,
        })
    }
}

/// Category of a log line, by keyword. First match wins.
pub fn categorize(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();
    if message.contains("validation") || message.contains("invalid") {
        ErrorCategory::Validation
    } else if message.contains("timeout") || message.contains("timed out") {
        ErrorCategory::Timeout
    } else if message.contains("access") || message.contains("denied") {
        ErrorCategory::Access
    } else if message.contains("exception") || message.contains("error") {
        ErrorCategory::Processing
    } else {
        ErrorCategory::System
    }
}

/// Count events per category, keeping the first message of each as sample.
pub fn summarize_categories(
    events: &[EvidenceEvent],
    max_sample_len: usize,
) -> BTreeMap<ErrorCategory, CategorySummary> {
    let mut categories: BTreeMap<ErrorCategory, CategorySummary> = BTreeMap::new();
    for event in events {
        categories
            .entry(categorize(&event.message))
            .and_modify(|summary| summary.count += 1)
            .or_insert_with(|| CategorySummary {
                count: 1,
                sample: truncate_message(&event.message, max_sample_len),
            });
    }
    categories
}
