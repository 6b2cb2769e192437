//! Triage Core Library
//!
//! Failure-correlation and triage engine. Given a work-item reference or a
//! free-text query, [`TriageEngine`] pulls evidence from the tracking store,
//! the workflow history service and the log-search backend, fuses it, and
//! compresses it into a bounded [`TriageReport`].

pub mod assembler;
pub mod budget;
pub mod classifier;
pub mod config;
pub mod context_resolver;
pub mod correlator;
pub mod domain;
pub mod engine;
pub mod namespace;
pub mod obs;
pub mod system_scan;
pub mod telemetry;
pub mod timeline_analyzer;

pub use domain::{
    AnalysisMode, CategorySummary, DegradedSource, ErrorCategory, EvidenceEvent, EvidenceGroup,
    EvidenceSummary, ExecutionStatus, FailurePoint, ItemStatus, PatternKind, ProcessingWindow,
    ReportEvent, ReportOutcome, SearchPattern, TimelineAnalysis, TimelineEntry, TriageError,
    TriageReport, TriageResult, WorkItemContext,
};

pub use budget::{enforce_budget, BudgetPolicy, BudgetedEvidence, TRUNCATION_MARKER};
pub use classifier::{classify_query, QueryIntent};
pub use config::EngineConfig;
pub use context_resolver::ContextResolver;
pub use correlator::{CorrelationConfig, CorrelationRequest, EvidenceCorrelator, KeywordPattern};
pub use engine::{Collaborators, TriageEngine};
pub use namespace::{NamespaceConvention, NamespaceResolution, NamespaceResolver, PrefixKind};
pub use system_scan::{RecentFailures, SystemScanner};
pub use timeline_analyzer::{TimelineAnalyzer, TimelineLimits};
