//! Sparse, field-level change sets.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};
use crate::field::FieldValue;
use crate::ids::EntityId;

/// A single field that differs between two versions of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub old: FieldValue,
    pub new: FieldValue,
}

impl FieldDelta {
    pub fn new(field: impl Into<String>, old: FieldValue, new: FieldValue) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }
}

/// The change to one entity between two states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityChange {
    /// The entity exists only in the newer state.
    Added(Entity),
    /// The entity exists only in the older state.
    Removed(Entity),
    /// The entity exists in both; only the differing fields are listed.
    Modified {
        id: EntityId,
        kind: EntityKind,
        fields: Vec<FieldDelta>,
    },
}

impl EntityChange {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Added(e) | Self::Removed(e) => e.id,
            Self::Modified { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Added(e) | Self::Removed(e) => e.kind(),
            Self::Modified { kind, .. } => *kind,
        }
    }

    /// Short label used in listings: `added`, `removed` or `modified`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Removed(_) => "removed",
            Self::Modified { .. } => "modified",
        }
    }
}

/// An ordered set of entity changes, sorted by entity id.
///
/// Unchanged entities are never listed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<EntityChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a change set, sorting the changes by entity id.
    pub fn from_changes(mut changes: Vec<EntityChange>) -> Self {
        changes.sort_by_key(EntityChange::id);
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityChange> {
        self.changes.iter()
    }

    pub fn changes(&self) -> &[EntityChange] {
        &self.changes
    }

    /// The change recorded for an entity, if any.
    pub fn get(&self, id: &EntityId) -> Option<&EntityChange> {
        self.changes
            .binary_search_by_key(id, EntityChange::id)
            .ok()
            .map(|idx| &self.changes[idx])
    }

    pub fn additions(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, EntityChange::Added(_)))
            .count()
    }

    pub fn removals(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, EntityChange::Removed(_)))
            .count()
    }

    pub fn modifications(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, EntityChange::Modified { .. }))
            .count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = EntityChange;
    type IntoIter = std::vec::IntoIter<EntityChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a EntityChange;
    type IntoIter = std::slice::Iter<'a, EntityChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A caller-level edit to apply on top of a branch tip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityEdit {
    Add(Entity),
    Set {
        id: EntityId,
        field: String,
        value: FieldValue,
    },
    Remove(EntityId),
}
