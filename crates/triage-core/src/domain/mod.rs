//! Domain types shared by the triage components.

pub mod context;
pub mod error;
pub mod evidence;
pub mod report;
pub mod timeline;

pub use context::{execution_name, ItemStatus, ProcessingWindow, WorkItemContext};
pub use error::{TriageError, TriageResult};
pub use evidence::{EvidenceEvent, PatternKind, SearchPattern};
pub use report::{
    AnalysisMode, CategorySummary, DegradedSource, ErrorCategory, EvidenceGroup, EvidenceSummary,
    ReportEvent, ReportOutcome, TriageReport,
};
pub use timeline::{ExecutionStatus, FailurePoint, TimelineAnalysis, TimelineEntry};
