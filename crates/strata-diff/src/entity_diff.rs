//! Field-level comparison of entities and entity sets.
//!
//! Fields are compared by typed value, never by their rendered text, so
//! `1.50` and `1.5` are the same number. The free-form metadata map is one
//! field and changes as a whole.

use std::collections::BTreeSet;

use strata_store::EntitySet;
use strata_types::{ChangeSet, Entity, EntityChange, EntityId, FieldDelta};

use crate::error::{DiffError, DiffResult};

/// The fields that differ between two versions of the same entity, in
/// field declaration order. Empty if the versions are equal.
pub fn diff_entities(old: &Entity, new: &Entity) -> DiffResult<Vec<FieldDelta>> {
    if old.kind() != new.kind() {
        return Err(DiffError::KindChanged {
            id: new.id,
            old: old.kind(),
            new: new.kind(),
        });
    }
    let deltas = old
        .fields()
        .into_iter()
        .zip(new.fields())
        .filter(|((_, before), (_, after))| before != after)
        .map(|((field, before), (_, after))| FieldDelta::new(field, before, after))
        .collect();
    Ok(deltas)
}

/// Compare one entity id between two states.
pub fn diff_entity(
    id: &EntityId,
    old: Option<&Entity>,
    new: Option<&Entity>,
) -> DiffResult<Option<EntityChange>> {
    let change = match (old, new) {
        (None, None) => None,
        (None, Some(added)) => Some(EntityChange::Added(added.clone())),
        (Some(removed), None) => Some(EntityChange::Removed(removed.clone())),
        (Some(before), Some(after)) => {
            let fields = diff_entities(before, after)?;
            if fields.is_empty() {
                None
            } else {
                Some(EntityChange::Modified {
                    id: *id,
                    kind: after.kind(),
                    fields,
                })
            }
        }
    };
    Ok(change)
}

/// The change set that turns `old` into `new`.
///
/// Applying the result to `old` with [`EntitySet::apply`] yields `new`.
pub fn diff_sets(old: &EntitySet, new: &EntitySet) -> DiffResult<ChangeSet> {
    let ids: BTreeSet<&EntityId> = old.ids().chain(new.ids()).collect();
    diff_over(ids, old, new)
}

/// Like [`diff_sets`], restricted to the given ids.
pub fn diff_over<'a, I>(ids: I, old: &EntitySet, new: &EntitySet) -> DiffResult<ChangeSet>
where
    I: IntoIterator<Item = &'a EntityId>,
{
    let mut changes = Vec::new();
    for id in ids {
        if let Some(change) = diff_entity(id, old.get(id), new.get(id))? {
            changes.push(change);
        }
    }
    Ok(ChangeSet::from_changes(changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_types::{
        Building, Equipment, EntityKind, EntityPayload, FieldValue, Floor, Room,
    };

    fn room(status: &str) -> Entity {
        Entity::new(EntityPayload::Room(Room {
            name: "204".into(),
            status: status.into(),
            ..Room::default()
        }))
    }

    #[test]
    fn equal_entities_have_no_deltas() {
        let r = room("available");
        assert!(diff_entities(&r, &r.clone()).unwrap().is_empty());
    }

    #[test]
    fn only_changed_fields_are_listed() {
        let before = room("available");
        let mut after = before.clone();
        after
            .set_field("status", FieldValue::Text("temp-closed".into()))
            .unwrap();
        after.set_field("area_sqm", FieldValue::Number(32.5)).unwrap();

        let deltas = diff_entities(&before, &after).unwrap();
        let names: Vec<_> = deltas.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(names, vec!["status", "area_sqm"]);
        assert_eq!(deltas[0].old, FieldValue::Text("available".into()));
        assert_eq!(deltas[1].old, FieldValue::Null);
    }

    #[test]
    fn numbers_compare_by_value() {
        let mut a = room("available");
        a.set_field("area_sqm", FieldValue::parse(strata_types::FieldType::Number, "1.50").unwrap())
            .unwrap();
        let mut b = a.clone();
        b.set_field("area_sqm", FieldValue::parse(strata_types::FieldType::Number, "1.5").unwrap())
            .unwrap();
        assert!(diff_entities(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn metadata_changes_as_one_field() {
        let before = room("available").with_metadata("tenant", "acme");
        let after = before
            .clone()
            .with_metadata("tenant", "globex")
            .with_metadata("floor_finish", "carpet");
        let deltas = diff_entities(&before, &after).unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field, "metadata");
    }

    #[test]
    fn kind_change_is_an_error() {
        let r = room("available");
        let imposter = Entity::with_id(r.id, EntityPayload::Equipment(Equipment::default()));
        assert!(matches!(
            diff_entities(&r, &imposter),
            Err(DiffError::KindChanged { old: EntityKind::Room, .. })
        ));
    }

    #[test]
    fn set_diff_is_sparse_and_sorted() {
        let b = Entity::new(EntityPayload::Building(Building {
            name: "HQ".into(),
            ..Building::default()
        }));
        let f = Entity::new(EntityPayload::Floor(Floor {
            name: "L1".into(),
            level: 1,
            elevation_m: None,
        }))
        .with_parent(b.id);
        let old: EntitySet = [b.clone(), f.clone()].into_iter().collect();

        let mut renamed = b.clone();
        renamed.set_field("name", FieldValue::Text("Head Office".into())).unwrap();
        let extra = room("available").with_parent(f.id);
        let new: EntitySet = [renamed, f.clone(), extra.clone()].into_iter().collect();

        let changes = diff_sets(&old, &new).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.additions(), 1);
        assert_eq!(changes.modifications(), 1);
        assert!(changes.get(&f.id).is_none());
        let ids: Vec<_> = changes.iter().map(|c| c.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    fn arb_room() -> impl Strategy<Value = Room> {
        (
            "[a-z]{1,6}",
            prop::option::of("[0-9]{3}"),
            prop::sample::select(vec!["available", "occupied", "temp-closed"]),
            prop::option::of("[a-z ]{0,12}"),
            prop::option::of(0i64..500),
            prop::option::of(1.0f64..2000.0),
        )
            .prop_map(|(name, number, status, description, occupancy, area_sqm)| Room {
                name,
                number,
                status: status.to_string(),
                description,
                area_sqm,
                occupancy,
            })
    }

    proptest! {
        #[test]
        fn applying_a_diff_reproduces_the_new_state(
            before in prop::collection::vec(arb_room(), 0..6),
            after in prop::collection::vec(arb_room(), 0..6),
            keep in prop::collection::vec(any::<bool>(), 6),
        ) {
            // Rooms in `after` reuse the ids of `before` where `keep` says so,
            // giving a mix of additions, removals and modifications.
            let ids: Vec<EntityId> = (0..6).map(|_| EntityId::new()).collect();
            let old: EntitySet = before
                .into_iter()
                .enumerate()
                .map(|(i, r)| Entity::with_id(ids[i], EntityPayload::Room(r)))
                .collect();
            let new: EntitySet = after
                .into_iter()
                .enumerate()
                .map(|(i, r)| {
                    let id = if keep[i] { ids[i] } else { EntityId::new() };
                    Entity::with_id(id, EntityPayload::Room(r))
                })
                .collect();

            let changes = diff_sets(&old, &new).unwrap();
            let mut replayed = old.clone();
            replayed.apply(&changes).unwrap();
            prop_assert_eq!(replayed, new);
        }
    }
}
