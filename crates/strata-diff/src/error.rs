//! Error types for the diff crate.

use strata_dag::GraphError;
use strata_types::{EntityId, EntityKind};

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The same id names entities of different kinds in the two states.
    #[error("entity {id} changed kind from {old} to {new}")]
    KindChanged {
        id: EntityId,
        old: EntityKind,
        new: EntityKind,
    },

    /// Commit lookup, merge-base or replay failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
