//! Planning merge commits between branches.
//!
//! Planning is read-only: it computes the merge base, merges the two states
//! and prepares (but does not insert) the resulting commit. The caller
//! journals the commit, inserts it and advances the target tip against the
//! tip recorded in the plan.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use strata_dag::{Commit, CommitDraft, CommitGraph, CommitKind};
use strata_diff::diff_sets;
use strata_refs::Branch;
use strata_types::{ActorId, CommitId, Timestamp};

use crate::conflict::ConflictReport;
use crate::error::{MergeError, MergeResult};
use crate::three_way::{three_way, ThreeWay};

/// How a clean merge lands on the target branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeStrategy {
    /// Two parents: the target tip, then the source tip.
    #[default]
    Merge,
    /// One parent, the target tip. The source commits are provenance only.
    Squash,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Squash => "squash",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" | "merge-commit" => Ok(Self::Merge),
            "squash" => Ok(Self::Squash),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

/// A merge ready to be committed.
#[derive(Clone, Debug)]
pub struct PreparedMerge {
    pub commit: Commit,
    pub base: CommitId,
    /// The target tip the commit was planned against.
    pub expected_tip: CommitId,
    /// Number of entities the merge changes on the target.
    pub changed: usize,
}

/// Result of planning a merge.
#[derive(Clone, Debug)]
pub enum MergePlan {
    Ready(PreparedMerge),
    /// The source tip is already contained in the target; nothing to do.
    UpToDate { tip: CommitId },
    Conflicted(ConflictReport),
}

/// Plans merges over a commit graph.
#[derive(Clone, Copy)]
pub struct MergeEngine<'g> {
    graph: &'g CommitGraph,
}

impl<'g> MergeEngine<'g> {
    pub fn new(graph: &'g CommitGraph) -> Self {
        Self { graph }
    }

    /// Plan merging `source` into `target`.
    ///
    /// `message` defaults to a description of the merge.
    pub fn plan(
        &self,
        source: &Branch,
        target: &Branch,
        strategy: MergeStrategy,
        author: ActorId,
        message: Option<&str>,
        now: Timestamp,
    ) -> MergeResult<MergePlan> {
        if source.id == target.id {
            return Err(MergeError::SameBranch {
                name: source.name.clone(),
            });
        }

        let base = self.graph.merge_base(&target.tip, &source.tip)?;
        if base == source.tip {
            debug!(source = %source.name, target = %target.name, "already up to date");
            return Ok(MergePlan::UpToDate { tip: target.tip });
        }

        let base_state = self.graph.materialize(&base)?;
        let source_state = self.graph.materialize(&source.tip)?;
        let target_state = self.graph.materialize(&target.tip)?;

        let merged = match three_way(&base_state, &source_state, &target_state)? {
            ThreeWay::Clean(merged) => merged,
            ThreeWay::Conflicted(conflicts) => {
                debug!(
                    source = %source.name,
                    target = %target.name,
                    conflicts = conflicts.len(),
                    "merge conflicted"
                );
                return Ok(MergePlan::Conflicted(ConflictReport {
                    base,
                    source_tip: source.tip,
                    target_tip: target.tip,
                    conflicts,
                }));
            }
        };

        let changes = diff_sets(&target_state, &merged)?;
        let changed = changes.len();
        let draft = match strategy {
            MergeStrategy::Merge => {
                let message = message.map(str::to_owned).unwrap_or_else(|| {
                    format!("Merge branch '{}' into {}", source.name, target.name)
                });
                CommitDraft::new(author, message, changes)
                    .with_parents(vec![target.tip, source.tip])
                    .with_kind(CommitKind::Merge { source: source.id })
            }
            MergeStrategy::Squash => {
                let squashed = self.graph.only_in(&source.tip, &target.tip)?;
                let message = message.map(str::to_owned).unwrap_or_else(|| {
                    format!(
                        "Squash branch '{}' into {} ({} commits)",
                        source.name,
                        target.name,
                        squashed.len()
                    )
                });
                CommitDraft::new(author, message, changes)
                    .with_parent(target.tip)
                    .with_kind(CommitKind::Squash {
                        source: source.id,
                        squashed,
                    })
            }
        };

        let commit = self.graph.prepare(draft.with_timestamp(now))?;
        debug!(
            source = %source.name,
            target = %target.name,
            %strategy,
            commit = %commit.id.short_hex(),
            changed,
            "planned merge"
        );
        Ok(MergePlan::Ready(PreparedMerge {
            commit,
            base,
            expected_tip: target.tip,
            changed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_refs::{BranchRegistry, NewBranch};
    use strata_store::EntitySet;
    use strata_types::{
        Building, ChangeSet, Entity, EntityChange, EntityId, EntityPayload, FieldDelta,
        FieldValue, Floor, RepositoryId, Room,
    };

    struct Repo {
        graph: CommitGraph,
        branches: BranchRegistry,
        main: Branch,
        feature: Branch,
        room: EntityId,
    }

    fn actor() -> ActorId {
        ActorId::from("dana")
    }

    fn repo() -> Repo {
        let building = Entity::new(EntityPayload::Building(Building {
            name: "HQ".into(),
            ..Building::default()
        }));
        let floor = Entity::new(EntityPayload::Floor(Floor {
            name: "L1".into(),
            level: 1,
            elevation_m: None,
        }))
        .with_parent(building.id);
        let room = Entity::new(EntityPayload::Room(Room {
            name: "R".into(),
            status: "operational".into(),
            ..Room::default()
        }))
        .with_parent(floor.id);
        let state: EntitySet = [building, floor, room.clone()].into_iter().collect();

        let mut graph = CommitGraph::new(RepositoryId::new());
        let c0 = graph.commit(CommitDraft::root(actor(), "c0", state)).unwrap();
        let mut branches = BranchRegistry::new();
        let main = branches
            .create(NewBranch::new("main", c0, actor()).default_branch(), &graph, Utc::now())
            .unwrap();
        let feature = branches
            .create(NewBranch::new("contractor/x", c0, actor()), &graph, Utc::now())
            .unwrap();
        Repo {
            graph,
            branches,
            main,
            feature,
            room: room.id,
        }
    }

    /// Commit a single room field change on `branch` and advance it.
    fn edit(repo: &mut Repo, on_feature: bool, field: &str, old: FieldValue, new: FieldValue) {
        let branch = if on_feature { repo.feature.id } else { repo.main.id };
        let tip = repo.branches.get(&branch).unwrap().tip;
        let changes = ChangeSet::from_changes(vec![EntityChange::Modified {
            id: repo.room,
            kind: strata_types::EntityKind::Room,
            fields: vec![FieldDelta::new(field, old, new)],
        }]);
        let id = repo
            .graph
            .commit(CommitDraft::new(actor(), field, changes).with_parent(tip))
            .unwrap();
        let commit = repo.graph.resolve(&id).unwrap().clone();
        repo.branches
            .advance_tip(&branch, &tip, &commit, &repo.graph, Utc::now())
            .unwrap();
    }

    fn current(repo: &Repo, id: &strata_types::BranchId) -> Branch {
        repo.branches.get(id).unwrap().clone()
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.into())
    }

    #[test]
    fn disjoint_edits_produce_a_two_parent_merge() {
        let mut repo = repo();
        edit(&mut repo, true, "status", text("operational"), text("temp-closed"));
        edit(&mut repo, false, "description", FieldValue::Null, text("renovated"));

        let source = current(&repo, &repo.feature.id);
        let target = current(&repo, &repo.main.id);
        let plan = MergeEngine::new(&repo.graph)
            .plan(&source, &target, MergeStrategy::Merge, actor(), None, Utc::now())
            .unwrap();
        let MergePlan::Ready(prepared) = plan else {
            panic!("expected a clean plan");
        };
        assert_eq!(prepared.commit.parents, vec![target.tip, source.tip]);
        assert!(prepared.commit.is_merge());
        assert_eq!(prepared.expected_tip, target.tip);
        assert!(prepared.commit.message.contains("contractor/x"));

        // Planning does not touch the graph.
        assert!(!repo.graph.contains(&prepared.commit.id));
        let id = repo.graph.insert(prepared.commit).unwrap();
        let state = repo.graph.materialize(&id).unwrap();
        let room = state.get(&repo.room).unwrap();
        assert_eq!(room.field("status"), Some(text("temp-closed")));
        assert_eq!(room.field("description"), Some(text("renovated")));
    }

    #[test]
    fn conflicting_edits_produce_a_report() {
        let mut repo = repo();
        edit(&mut repo, true, "status", text("operational"), text("temp-closed"));
        edit(&mut repo, false, "status", text("operational"), text("decommissioned"));

        let source = current(&repo, &repo.feature.id);
        let target = current(&repo, &repo.main.id);
        let before = repo.graph.len();
        let plan = MergeEngine::new(&repo.graph)
            .plan(&source, &target, MergeStrategy::Merge, actor(), None, Utc::now())
            .unwrap();
        let MergePlan::Conflicted(report) = plan else {
            panic!("expected conflicts");
        };
        assert_eq!(report.len(), 1);
        assert_eq!(report.conflicts[0].entity, repo.room);
        assert_eq!(report.conflicts[0].field, "status");
        assert_eq!(report.target_tip, target.tip);
        assert_eq!(repo.graph.len(), before);
    }

    #[test]
    fn squash_has_one_parent_and_records_provenance() {
        let mut repo = repo();
        edit(&mut repo, true, "status", text("operational"), text("temp-closed"));
        edit(&mut repo, true, "name", text("R"), text("Room R"));

        let source = current(&repo, &repo.feature.id);
        let target = current(&repo, &repo.main.id);
        let plan = MergeEngine::new(&repo.graph)
            .plan(&source, &target, MergeStrategy::Squash, actor(), Some("land x"), Utc::now())
            .unwrap();
        let MergePlan::Ready(prepared) = plan else {
            panic!("expected a clean plan");
        };
        assert_eq!(prepared.commit.parents, vec![target.tip]);
        assert_eq!(prepared.commit.message, "land x");
        match &prepared.commit.kind {
            CommitKind::Squash { source: from, squashed } => {
                assert_eq!(*from, source.id);
                assert_eq!(squashed.len(), 2);
                assert_eq!(squashed[0], source.tip);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(prepared.changed, 1);
    }

    #[test]
    fn merged_source_is_up_to_date() {
        let repo = repo();
        let plan = MergeEngine::new(&repo.graph)
            .plan(&repo.feature, &repo.main, MergeStrategy::Merge, actor(), None, Utc::now())
            .unwrap();
        assert!(matches!(plan, MergePlan::UpToDate { tip } if tip == repo.main.tip));
    }

    #[test]
    fn self_merge_is_rejected() {
        let repo = repo();
        let err = MergeEngine::new(&repo.graph)
            .plan(&repo.main, &repo.main, MergeStrategy::Merge, actor(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, MergeError::SameBranch { .. }));
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("squash".parse::<MergeStrategy>().unwrap(), MergeStrategy::Squash);
        assert_eq!("merge-commit".parse::<MergeStrategy>().unwrap(), MergeStrategy::Merge);
        assert!("rebase".parse::<MergeStrategy>().is_err());
    }
}
