//! Error types for the merge crate.

use strata_dag::GraphError;
use strata_diff::DiffError;
use strata_types::TypeError;

/// Errors that prevent a merge from being planned.
///
/// Field conflicts are not errors; they are part of a successful plan.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("cannot merge branch {name} into itself")]
    SameBranch { name: String },

    /// A merged field value was rejected by its entity.
    #[error(transparent)]
    Field(#[from] TypeError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
