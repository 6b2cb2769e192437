//! Triage-Sources: collaborator boundary for the triage engine
//!
//! The engine never talks to a tracking store, workflow engine or log
//! backend directly. It consumes the async traits defined here, so any
//! backend (cloud SDK adapters, recorded bundles, test doubles) can be
//! plugged in behind an `Arc<dyn ...>`.
//!
//! ## Key Components
//!
//! - `source_traits`: the five collaborator traits and their wire records
//! - `SourceError`: closed failure taxonomy, including a `Throttled` variant
//! - `fakes`: in-memory implementations and the replayable `EvidenceBundle`

mod error;
pub mod fakes;
pub mod source_traits;

pub use error::{ServiceName, SourceError, SourceErrorKind};
pub use source_traits::{
    DeploymentDescription, DeploymentMetadataService, DeploymentOutput, FailedItemRecord,
    HistoryEntry, LogRecord, LogSearchBackend, LookupRecord, LookupService, LookupTimelineEvent,
    SourceResult, StatusScanService, TimeRange, TimelineEventType, WorkflowHistoryService,
};
