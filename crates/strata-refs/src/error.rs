//! Error types for branch operations.

use thiserror::Error;

use strata_dag::GraphError;
use strata_types::CommitId;

/// Errors that can occur during branch operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// No branch with this name or id.
    #[error("branch not found: {name}")]
    NotFound { name: String },

    /// A live branch with this name already exists.
    #[error("branch already exists: {name}")]
    DuplicateBranchName { name: String },

    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// Protected and default branches cannot be deleted.
    #[error("branch {name} is protected")]
    ProtectedBranch { name: String },

    /// The branch is the caller's current working context.
    #[error("branch {name} is checked out")]
    ActiveCheckout { name: String },

    /// The branch was merged or archived and no longer moves.
    #[error("branch {name} is retired")]
    Retired { name: String },

    /// The new tip does not descend from the current tip.
    #[error("cannot move {name} from {from:?} to {to:?}: not a descendant")]
    NonLinearAdvance {
        name: String,
        from: CommitId,
        to: CommitId,
    },

    /// The tip moved since the caller read it.
    #[error("branch {name} moved: expected tip {expected:?}, found {actual:?}")]
    ConcurrentModification {
        name: String,
        expected: CommitId,
        actual: CommitId,
    },

    /// A second default branch was requested.
    #[error("repository already has default branch {name}")]
    DefaultExists { name: String },

    /// The commit graph rejected a lookup.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience type alias for branch operations.
pub type Result<T> = std::result::Result<T, RefError>;
