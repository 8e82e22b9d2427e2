use strata_types::{BranchId, CommitId, Entity, EntityId};

use crate::entity_set::EntitySet;
use crate::error::StoreResult;

/// Branch-scoped cache of materialized entities.
///
/// The store is derived state: it can always be rebuilt by materializing a
/// branch tip from the commit graph. Implementations must satisfy:
/// - `get_entity` returns the entity as of the last snapshot put for that
///   branch, or `None` if the branch has no snapshot or lacks the entity.
/// - `put_snapshot` replaces everything cached for the branch atomically
///   from the reader's point of view.
/// - Failures never affect the commit graph or branch registry; callers
///   treat them as cache misses.
pub trait EntityStore: Send + Sync {
    /// Read one entity of a branch.
    fn get_entity(&self, branch: &BranchId, id: &EntityId) -> StoreResult<Option<Entity>>;

    /// Replace the cached state of a branch with the state at `commit`.
    fn put_snapshot(&self, branch: &BranchId, commit: &CommitId, entities: &EntitySet)
        -> StoreResult<()>;

    /// The commit whose state is cached for a branch, if any.
    fn cached_commit(&self, branch: &BranchId) -> StoreResult<Option<CommitId>>;

    /// Drop everything cached for a branch.
    fn evict(&self, branch: &BranchId) -> StoreResult<()>;
}
