use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use strata_types::{BranchId, CommitId, Entity, EntityId};

use crate::entity_set::EntitySet;
use crate::error::{StoreError, StoreResult};
use crate::traits::EntityStore;

#[derive(Default)]
struct CacheState {
    entities: HashMap<(BranchId, EntityId), Entity>,
    snapshots: HashMap<BranchId, CommitId>,
}

/// In-memory, HashMap-based entity cache keyed by `(branch, entity)`.
///
/// Intended for tests, the CLI and embedding. All entries live behind a
/// single `RwLock` so a snapshot replacement is never observed half-done.
#[derive(Default)]
pub struct InMemoryEntityStore {
    state: RwLock<CacheState>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached `(branch, entity)` entries.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(branch: &BranchId) -> StoreError {
    StoreError::Unavailable {
        branch: *branch,
        reason: "lock poisoned".into(),
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get_entity(&self, branch: &BranchId, id: &EntityId) -> StoreResult<Option<Entity>> {
        let state = self.state.read().map_err(|_| poisoned(branch))?;
        Ok(state.entities.get(&(*branch, *id)).cloned())
    }

    fn put_snapshot(
        &self,
        branch: &BranchId,
        commit: &CommitId,
        entities: &EntitySet,
    ) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned(branch))?;
        state.entities.retain(|(b, _), _| b != branch);
        for entity in entities {
            state.entities.insert((*branch, entity.id), entity.clone());
        }
        state.snapshots.insert(*branch, *commit);
        debug!(branch = %branch.short_id(), commit = %commit.short_hex(), entities = entities.len(), "cached branch snapshot");
        Ok(())
    }

    fn cached_commit(&self, branch: &BranchId) -> StoreResult<Option<CommitId>> {
        let state = self.state.read().map_err(|_| poisoned(branch))?;
        Ok(state.snapshots.get(branch).copied())
    }

    fn evict(&self, branch: &BranchId) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned(branch))?;
        state.entities.retain(|(b, _), _| b != branch);
        state.snapshots.remove(branch);
        Ok(())
    }
}
