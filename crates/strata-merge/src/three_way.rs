//! Three-way merge of entity states.
//!
//! Both sides are diffed against the common base. Entities touched by only
//! one side take that side's change. Entities touched by both are resolved
//! field by field:
//!
//! | source \ target | added | modified | removed |
//! |---|---|---|---|
//! | added | equal fields merge, others conflict | n/a | n/a |
//! | modified | n/a | disjoint or equal fields merge | conflict per source field |
//! | removed | n/a | conflict per target field | merged |
//!
//! A field changed on both sides merges only when both new values are equal.
//! There is no last-writer-wins fallback.

use std::collections::BTreeSet;

use tracing::debug;

use strata_diff::{diff_entities, diff_sets};
use strata_store::EntitySet;
use strata_types::{Entity, EntityChange, EntityId, FieldDelta, FieldValue, PARENT_FIELD};

use crate::conflict::{Conflict, ConflictKind};
use crate::error::MergeResult;

/// Outcome of merging two states.
#[derive(Clone, Debug, PartialEq)]
pub enum ThreeWay {
    Clean(EntitySet),
    /// Sorted by entity, then field.
    Conflicted(Vec<Conflict>),
}

impl ThreeWay {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }
}

/// Merge the changes `source` made since `base` into `target`.
pub fn three_way(base: &EntitySet, source: &EntitySet, target: &EntitySet) -> MergeResult<ThreeWay> {
    let source_changes = diff_sets(base, source)?;
    let target_changes = diff_sets(base, target)?;

    let mut merged = target.clone();
    let mut conflicts = Vec::new();
    let mut shared = 0usize;

    for change in &source_changes {
        let id = change.id();
        match target_changes.get(&id) {
            None => apply_one_sided(&mut merged, change)?,
            Some(theirs) => {
                shared += 1;
                resolve_shared(&mut merged, change, theirs, &mut conflicts)?;
            }
        }
    }

    // Containment can break even when every field merged cleanly, e.g. a
    // room added under a floor the other side removed.
    if conflicts.is_empty() {
        let touched: BTreeSet<EntityId> = source_changes
            .iter()
            .chain(target_changes.iter())
            .map(EntityChange::id)
            .collect();
        for id in &touched {
            let Some(entity) = merged.get(id) else { continue };
            if merged.check_parent(entity).is_err() {
                conflicts.push(Conflict {
                    entity: *id,
                    field: PARENT_FIELD.into(),
                    kind: ConflictKind::MissingParent,
                    source: source.get(id).map(parent_value),
                    target: target.get(id).map(parent_value),
                });
            }
        }
    }

    debug!(
        source_changes = source_changes.len(),
        target_changes = target_changes.len(),
        shared,
        conflicts = conflicts.len(),
        "three-way merge"
    );

    if conflicts.is_empty() {
        Ok(ThreeWay::Clean(merged))
    } else {
        conflicts.sort_by(|a, b| a.entity.cmp(&b.entity).then_with(|| a.field.cmp(&b.field)));
        Ok(ThreeWay::Conflicted(conflicts))
    }
}

fn parent_value(entity: &Entity) -> FieldValue {
    entity
        .parent
        .map(FieldValue::Reference)
        .unwrap_or(FieldValue::Null)
}

/// Apply a source change to an entity the target left untouched.
fn apply_one_sided(merged: &mut EntitySet, change: &EntityChange) -> MergeResult<()> {
    match change {
        EntityChange::Added(entity) => {
            merged.insert(entity.clone());
        }
        EntityChange::Removed(entity) => {
            merged.remove(&entity.id);
        }
        EntityChange::Modified { id, fields, .. } => {
            if let Some(mut entity) = merged.get(id).cloned() {
                set_fields(&mut entity, fields)?;
                merged.insert(entity);
            }
        }
    }
    Ok(())
}

fn set_fields(entity: &mut Entity, fields: &[FieldDelta]) -> MergeResult<()> {
    for delta in fields {
        entity.set_field(&delta.field, delta.new.clone())?;
    }
    Ok(())
}

fn resolve_shared(
    merged: &mut EntitySet,
    ours: &EntityChange,
    theirs: &EntityChange,
    conflicts: &mut Vec<Conflict>,
) -> MergeResult<()> {
    match (ours, theirs) {
        (EntityChange::Added(mine), EntityChange::Added(other)) => {
            if mine == other {
                return Ok(());
            }
            for delta in diff_entities(other, mine)? {
                conflicts.push(Conflict::field(mine.id, delta.field, delta.new, delta.old));
            }
        }
        (EntityChange::Removed(_), EntityChange::Removed(_)) => {}
        (EntityChange::Removed(_), EntityChange::Modified { id, fields, .. }) => {
            for delta in fields {
                conflicts.push(Conflict {
                    entity: *id,
                    field: delta.field.clone(),
                    kind: ConflictKind::RemovedInSource,
                    source: None,
                    target: Some(delta.new.clone()),
                });
            }
        }
        (EntityChange::Modified { id, fields, .. }, EntityChange::Removed(_)) => {
            for delta in fields {
                conflicts.push(Conflict {
                    entity: *id,
                    field: delta.field.clone(),
                    kind: ConflictKind::RemovedInTarget,
                    source: Some(delta.new.clone()),
                    target: None,
                });
            }
        }
        (
            EntityChange::Modified { id, fields: mine, .. },
            EntityChange::Modified { fields: other, .. },
        ) => {
            let mut clean = Vec::new();
            for delta in mine {
                match other.iter().find(|d| d.field == delta.field) {
                    None => clean.push(delta.clone()),
                    Some(their) if their.new == delta.new => {}
                    Some(their) => conflicts.push(Conflict::field(
                        *id,
                        delta.field.clone(),
                        delta.new.clone(),
                        their.new.clone(),
                    )),
                }
            }
            if let Some(mut entity) = merged.get(id).cloned() {
                set_fields(&mut entity, &clean)?;
                merged.insert(entity);
            }
        }
        // Both sides diff against the same base, so an id cannot be added
        // on one side and modified or removed on the other.
        (mine, other) => {
            conflicts.push(Conflict {
                entity: mine.id(),
                field: "*".into(),
                kind: ConflictKind::Field,
                source: None,
                target: None,
            });
            debug!(entity = %mine.id(), ours = mine.label(), theirs = other.label(), "inconsistent change pair");
        }
    }
    Ok(())
}
