//! High-level SDK for Strata.
//!
//! [`Repository`] is the single entry point for applications embedding the
//! engine: it ties the commit graph, branch registry, merge engine and
//! pull request / issue workflows together behind one lock, journals every
//! mutation, and reports to the telemetry and notification collaborators
//! supplied in [`RepositoryOptions`].
//!
//! # Modules
//!
//! - [`config`]: `.strata/config.toml`
//! - [`journal`]: journal records and replay
//! - [`repository`]: the facade and its operations
//! - [`error`]: [`EngineError`] and its [`ErrorKind`] taxonomy

pub mod config;
pub mod error;
pub mod journal;
pub mod repository;

pub use config::{JournalConfig, RepositoryConfig};
pub use error::{EngineError, ErrorKind, Result};
pub use journal::{Batch, JournalRecord};
pub use repository::{
    BranchInfo, BranchRequest, MergeOptions, MergeOutcome, MergedPullRequest, PullRequestDraft,
    Repository, RepositoryOptions, StartedWork, VerifyReport, STRATA_DIR,
};

// Re-export key types
pub use strata_dag::{Commit, CommitKind};
pub use strata_diff::CommitDiff;
pub use strata_fabric::{
    EngineEvent, EventBus, EventFilter, EventKind, MetricsRecorder, NotificationSink, Subject,
    SyncMode, Telemetry, TracingTelemetry,
};
pub use strata_merge::{Conflict, ConflictReport, MergeStrategy};
pub use strata_refs::{Branch, BranchFilter, BranchKind, BranchStatus};
pub use strata_store::{EntitySet, EntityStore, InMemoryEntityStore};
pub use strata_types::{
    ActorId, BranchId, ChangeSet, CommitId, Entity, EntityChange, EntityEdit, EntityId, EntityKind,
    EntityPayload, FieldType, FieldValue,
};
pub use strata_workflow::{
    Issue, IssueFilter, IssueKind, IssueStatus, NewIssue, PrFilter, PrKind, PrStatus, Priority,
    PullRequest, ReportedVia,
};
