//! Error types for the commit graph.

use strata_store::StoreError;
use strata_types::{CommitId, RepositoryId};

/// Errors that can occur during commit graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A referenced commit was not found in the graph.
    #[error("commit not found: {0:?}")]
    NotFound(CommitId),

    /// A new commit names a parent that is not in this graph.
    #[error("unknown parent: {0:?}")]
    UnknownParent(CommitId),

    /// A stored commit's parent edge is broken.
    #[error("dangling parent reference: commit {commit:?} references missing parent {parent:?}")]
    DanglingParent {
        /// The commit containing the bad reference.
        commit: CommitId,
        /// The missing parent.
        parent: CommitId,
    },

    /// The same parent is listed twice.
    #[error("commit lists parent {0:?} more than once")]
    DuplicateParent(CommitId),

    /// The commit belongs to another repository.
    #[error("commit belongs to repository {found}, not {expected}")]
    ForeignRepository {
        expected: RepositoryId,
        found: RepositoryId,
    },

    /// A commit with identical content already exists.
    #[error("duplicate commit: {0:?}")]
    DuplicateCommit(CommitId),

    /// The stored id does not match the commit's content.
    #[error("commit id {claimed:?} does not match content hash {computed:?}")]
    IdMismatch {
        claimed: CommitId,
        computed: CommitId,
    },

    /// The two commits share no history.
    #[error("no common ancestor between {a:?} and {b:?}")]
    NoCommonAncestor { a: CommitId, b: CommitId },

    /// A revision string could not be resolved to a single commit.
    #[error("invalid revision {revision:?}: {reason}")]
    InvalidRevision { revision: String, reason: String },

    /// A snapshot or delta could not be applied.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] StoreError),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
