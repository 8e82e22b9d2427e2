//! The engine-level error type and its mapping onto error kinds.

use std::path::PathBuf;

use thiserror::Error;

use strata_dag::GraphError;
use strata_diff::DiffError;
use strata_fabric::FabricError;
use strata_merge::{ConflictReport, MergeError};
use strata_refs::RefError;
use strata_store::StoreError;
use strata_types::{EntityId, TypeError};
use strata_workflow::WorkflowError;

/// The coarse category of a failure, which decides how callers react.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A branch, commit, pull request, issue or entity does not exist.
    NotFound,
    /// A merge found conflicting field edits.
    Conflict,
    /// The request breaks a rule of the repository.
    InvariantViolation,
    /// A branch moved while the operation was in flight.
    ConcurrentModification,
    /// Durable storage failed or is inconsistent.
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::ConcurrentModification => "concurrent_modification",
            Self::StorageFailure => "storage_failure",
        }
    }

    /// Process exit code used by the command line.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound => 2,
            Self::Conflict => 3,
            Self::InvariantViolation => 4,
            Self::ConcurrentModification => 5,
            Self::StorageFailure => 6,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no strata repository at {0}")]
    NotInitialized(PathBuf),

    #[error("a strata repository already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("entity {id} not found on branch {branch}")]
    EntityNotFound { branch: String, id: EntityId },

    /// An issue link points at a missing entity or one of the wrong kind.
    #[error("{field} link {id} is not valid: {reason}")]
    InvalidLink {
        field: &'static str,
        id: EntityId,
        reason: String,
    },

    #[error("nothing to commit")]
    EmptyCommit,

    #[error("force merging is disabled for this repository")]
    ForceMergeDisabled,

    /// The merge could not be completed; the report lists every conflict.
    #[error("{0}")]
    Conflict(ConflictReport),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("journal entry {entry} could not be replayed: {reason}")]
    Replay { entry: usize, reason: String },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("repository state lock poisoned")]
    Poisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Field(#[from] TypeError),

    #[error(transparent)]
    Entity(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Branch(#[from] RefError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Journal(#[from] FabricError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized(_) | Self::EntityNotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::AlreadyInitialized(_)
            | Self::InvalidLink { .. }
            | Self::EmptyCommit
            | Self::ForceMergeDisabled
            | Self::Field(_) => ErrorKind::InvariantViolation,
            Self::Config(_)
            | Self::Replay { .. }
            | Self::Integrity(_)
            | Self::Poisoned
            | Self::Io(_)
            | Self::Journal(_) => ErrorKind::StorageFailure,
            Self::Entity(e) => store_kind(e),
            Self::Graph(e) => graph_kind(e),
            Self::Branch(e) => ref_kind(e),
            Self::Diff(e) => diff_kind(e),
            Self::Merge(e) => merge_kind(e),
            Self::Workflow(e) => workflow_kind(e),
        }
    }

    /// The conflict report, if this is a merge conflict.
    pub fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            Self::Conflict(report) => Some(report),
            _ => None,
        }
    }
}

fn store_kind(e: &StoreError) -> ErrorKind {
    match e {
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::Unavailable { .. } => ErrorKind::StorageFailure,
        _ => ErrorKind::InvariantViolation,
    }
}

fn graph_kind(e: &GraphError) -> ErrorKind {
    match e {
        GraphError::NotFound(_) | GraphError::InvalidRevision { .. } => ErrorKind::NotFound,
        GraphError::DanglingParent { .. }
        | GraphError::IdMismatch { .. }
        | GraphError::Serialization(_) => ErrorKind::StorageFailure,
        GraphError::Snapshot(inner) => store_kind(inner),
        _ => ErrorKind::InvariantViolation,
    }
}

fn ref_kind(e: &RefError) -> ErrorKind {
    match e {
        RefError::NotFound { .. } => ErrorKind::NotFound,
        RefError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
        RefError::Graph(inner) => graph_kind(inner),
        _ => ErrorKind::InvariantViolation,
    }
}

fn diff_kind(e: &DiffError) -> ErrorKind {
    match e {
        DiffError::Graph(inner) => graph_kind(inner),
        _ => ErrorKind::InvariantViolation,
    }
}

fn merge_kind(e: &MergeError) -> ErrorKind {
    match e {
        MergeError::Graph(inner) => graph_kind(inner),
        MergeError::Diff(inner) => diff_kind(inner),
        _ => ErrorKind::InvariantViolation,
    }
}

fn workflow_kind(e: &WorkflowError) -> ErrorKind {
    match e {
        WorkflowError::PullRequestNotFound(_) | WorkflowError::IssueNotFound(_) => {
            ErrorKind::NotFound
        }
        _ => ErrorKind::InvariantViolation,
    }
}

/// Convenience alias used throughout the SDK.
pub type Result<T> = std::result::Result<T, EngineError>;
