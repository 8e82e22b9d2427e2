//! A materialized building state: every live entity at one commit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use strata_types::{ChangeSet, Entity, EntityChange, EntityEdit, EntityId, EntityKind, PARENT_FIELD};

use crate::error::{StoreError, StoreResult};

/// All entities of one state, keyed and iterated by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities of one kind, in id order.
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind() == kind)
    }

    /// Direct children of an entity.
    pub fn children_of<'a>(&'a self, id: &'a EntityId) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .values()
            .filter(move |e| e.parent.as_ref() == Some(id))
    }

    /// Insert or replace an entity without containment checks.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.id, entity)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    // ---------------------------------------------------------------
    // Change application
    // ---------------------------------------------------------------

    /// Apply a change set produced against this state.
    ///
    /// Every change must match the current state exactly: added entities
    /// must be absent, removed and modified entities present, and each
    /// modified field must currently hold the delta's `old` value. On error
    /// the set may be partially updated; callers apply to a scratch copy.
    pub fn apply(&mut self, changes: &ChangeSet) -> StoreResult<()> {
        for change in changes {
            match change {
                EntityChange::Added(entity) => {
                    if self.entities.contains_key(&entity.id) {
                        return Err(StoreError::ChangeMismatch {
                            id: entity.id,
                            reason: "added entity already exists".into(),
                        });
                    }
                    self.entities.insert(entity.id, entity.clone());
                }
                EntityChange::Removed(entity) => {
                    if self.entities.remove(&entity.id).is_none() {
                        return Err(StoreError::ChangeMismatch {
                            id: entity.id,
                            reason: "removed entity does not exist".into(),
                        });
                    }
                }
                EntityChange::Modified { id, kind, fields } => {
                    let entity = self.entities.get_mut(id).ok_or_else(|| {
                        StoreError::ChangeMismatch {
                            id: *id,
                            reason: "modified entity does not exist".into(),
                        }
                    })?;
                    if entity.kind() != *kind {
                        return Err(StoreError::ChangeMismatch {
                            id: *id,
                            reason: format!("expected a {kind}, found a {}", entity.kind()),
                        });
                    }
                    for delta in fields {
                        let current = entity.field(&delta.field);
                        if current.as_ref() != Some(&delta.old) {
                            return Err(StoreError::ChangeMismatch {
                                id: *id,
                                reason: format!("field {:?} no longer holds its old value", delta.field),
                            });
                        }
                        entity.set_field(&delta.field, delta.new.clone())?;
                    }
                }
            }
        }
        debug!(changes = changes.len(), entities = self.len(), "applied change set");
        Ok(())
    }

    /// Apply a caller edit, enforcing the containment hierarchy.
    pub fn apply_edit(&mut self, edit: &EntityEdit) -> StoreResult<()> {
        match edit {
            EntityEdit::Add(entity) => {
                if self.entities.contains_key(&entity.id) {
                    return Err(StoreError::AlreadyExists(entity.id));
                }
                entity.check_values()?;
                self.check_parent(entity)?;
                self.entities.insert(entity.id, entity.clone());
            }
            EntityEdit::Set { id, field, value } => {
                let mut updated = self
                    .entities
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::NotFound(*id))?;
                updated.set_field(field, value.clone())?;
                if field == PARENT_FIELD {
                    self.check_parent(&updated)?;
                }
                self.entities.insert(*id, updated);
            }
            EntityEdit::Remove(id) => {
                if !self.entities.contains_key(id) {
                    return Err(StoreError::NotFound(*id));
                }
                let children = self.children_of(id).count();
                if children > 0 {
                    return Err(StoreError::HasChildren { id: *id, children });
                }
                self.entities.remove(id);
            }
        }
        Ok(())
    }

    /// Check that an entity's parent exists here and is an allowed container.
    pub fn check_parent(&self, entity: &Entity) -> StoreResult<()> {
        let kind = entity.kind();
        let allowed = kind.allowed_parents();
        match entity.parent {
            None if allowed.is_empty() => Ok(()),
            None => Err(StoreError::Containment {
                id: entity.id,
                kind,
                parent: entity.id,
                reason: format!("a {kind} must be contained in another entity"),
            }),
            Some(parent_id) => {
                let parent = self.entities.get(&parent_id).ok_or_else(|| StoreError::Containment {
                    id: entity.id,
                    kind,
                    parent: parent_id,
                    reason: "parent does not exist".into(),
                })?;
                if parent_id == entity.id || !allowed.contains(&parent.kind()) {
                    return Err(StoreError::Containment {
                        id: entity.id,
                        kind,
                        parent: parent_id,
                        reason: format!("a {kind} cannot be placed in a {}", parent.kind()),
                    });
                }
                Ok(())
            }
        }
    }

    /// Check the containment hierarchy of every entity.
    pub fn validate(&self) -> StoreResult<()> {
        self.entities.values().try_for_each(|e| self.check_parent(e))
    }
}

impl FromIterator<Entity> for EntitySet {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self {
            entities: iter.into_iter().map(|e| (e.id, e)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a Entity;
    type IntoIter = std::collections::btree_map::Values<'a, EntityId, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.values()
    }
}
