use strata_types::{BranchId, EntityId, EntityKind, TypeError};

/// Errors from entity set and entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entity was not found.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// An entity with this id already exists in the set.
    #[error("entity already exists: {0}")]
    AlreadyExists(EntityId),

    /// A change set does not match the state it is applied to.
    #[error("change for {id} does not apply: {reason}")]
    ChangeMismatch { id: EntityId, reason: String },

    /// An entity's parent is missing or of a kind it cannot be contained in.
    #[error("{kind} {id} cannot be contained in {parent}: {reason}")]
    Containment {
        id: EntityId,
        kind: EntityKind,
        parent: EntityId,
        reason: String,
    },

    /// Removing an entity would orphan its children.
    #[error("entity {id} still contains {children} child entities")]
    HasChildren { id: EntityId, children: usize },

    /// A field edit was rejected by the entity model.
    #[error(transparent)]
    Field(#[from] TypeError),

    /// The cache backend failed (lock poisoned, I/O, ...).
    #[error("entity cache for branch {branch} unavailable: {reason}")]
    Unavailable { branch: BranchId, reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
