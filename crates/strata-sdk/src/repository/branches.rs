//! Branch operations and the shared merge loop.

use chrono::Utc;
use tracing::{debug, info};

use strata_dag::Commit;
use strata_fabric::{EventKind, Subject};
use strata_merge::{MergeEngine, MergePlan, MergeStrategy};
use strata_refs::{Branch, BranchFilter, BranchKind, BranchStatus, NewBranch, RefError, TipUpdate};
use strata_types::{ActorId, BranchId, CommitId, Timestamp};

use super::Repository;
use crate::error::{EngineError, Result};
use crate::journal::{Batch, JournalRecord, RepoState};

/// Parameters for [`Repository::create_branch`].
#[derive(Clone, Debug)]
pub struct BranchRequest {
    pub name: String,
    /// Revision to fork from. Defaults to the tip of the default branch.
    pub from: Option<String>,
    pub kind: BranchKind,
    pub description: Option<String>,
    pub protected: bool,
}

impl BranchRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: None,
            kind: BranchKind::Feature,
            description: None,
            protected: false,
        }
    }

    pub fn from(mut self, revision: impl Into<String>) -> Self {
        self.from = Some(revision.into());
        self
    }

    pub fn kind(mut self, kind: BranchKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }
}

/// A branch together with its position relative to the default branch.
#[derive(Clone, Debug)]
pub struct BranchInfo {
    pub branch: Branch,
    pub default_branch: String,
    /// Commits on this branch that the default branch lacks.
    pub ahead: usize,
    pub behind: usize,
}

/// What a completed merge did to the target branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The new target tip, or the unchanged tip when already up to date.
    pub commit: CommitId,
    pub base: Option<CommitId>,
    /// Entities changed on the target.
    pub changed: usize,
    pub up_to_date: bool,
    /// Planning attempts, counting the first.
    pub attempts: u32,
}

impl Repository {
    /// Create a branch. The new tip is a copy of the base revision's id, not
    /// a live alias of another branch.
    pub fn create_branch(&self, request: BranchRequest, actor: ActorId) -> Result<Branch> {
        self.observe("create_branch", || {
            let branch = {
                let mut state = self.write()?;
                let base = match &request.from {
                    Some(rev) => self.resolve_rev(&state, rev)?,
                    None => state.branches.find(&self.config.default_branch)?.tip,
                };
                let mut new = NewBranch::new(&request.name, base, actor)
                    .kind(request.kind)
                    .protected(request.protected || self.config.is_protected(&request.name));
                if let Some(description) = &request.description {
                    new = new.description(description);
                }
                let branch = state.branches.prepare_create(new, &state.graph, Utc::now())?;
                self.commit_batch(&mut state, vec![JournalRecord::BranchCreated(branch.clone())])?;
                branch
            };
            info!(branch = %branch.name, tip = %branch.tip.short_hex(), "created branch");
            self.refresh_cache(&branch.id);
            Ok(branch)
        })
    }

    /// Compare-and-swap the tip of `name` from `expected` to `to`.
    ///
    /// `to` must descend from `expected`, or be a merge commit whose first
    /// parent is `expected`.
    pub fn advance_branch(
        &self,
        name: &str,
        expected: &CommitId,
        to: &str,
        actor: ActorId,
    ) -> Result<TipUpdate> {
        self.observe("advance_tip", || {
            let now = Utc::now();
            let update = {
                let mut state = self.write()?;
                let branch = state.branches.find(name)?.clone();
                let target = self.resolve_rev(&state, to)?;
                let commit = state.graph.resolve(&target)?.clone();
                state
                    .branches
                    .check_advance(&branch.id, expected, &commit, &state.graph)?;
                let update = TipUpdate {
                    branch: branch.id,
                    from: *expected,
                    to: commit.id,
                    at: now,
                };
                if update.from != update.to {
                    self.commit_batch(&mut state, vec![JournalRecord::TipAdvanced(update.clone())])?;
                }
                update
            };
            if update.from != update.to {
                self.refresh_cache(&update.branch);
                self.publish(vec![self.event(
                    EventKind::BranchTipAdvanced,
                    Subject::Branch(update.branch),
                    actor,
                    now,
                )]);
            }
            Ok(update)
        })
    }

    pub fn list_branches(&self, filter: &BranchFilter) -> Result<Vec<Branch>> {
        self.observe("branch_list", || {
            let state = self.read()?;
            Ok(state.branches.list(filter).into_iter().cloned().collect())
        })
    }

    /// An active branch by name, with ahead/behind counts against the default branch.
    pub fn branch_info(&self, name: &str) -> Result<BranchInfo> {
        self.observe("branch_show", || {
            let state = self.read()?;
            let branch = state.branches.find(name)?.clone();
            let default = state.branches.find(&self.config.default_branch)?;
            let (ahead, behind) = state.graph.ahead_behind(&branch.tip, &default.tip)?;
            Ok(BranchInfo {
                branch,
                default_branch: default.name.clone(),
                ahead,
                behind,
            })
        })
    }

    /// Retire a branch as archived. Its name becomes free for reuse.
    pub fn delete_branch(&self, name: &str, actor: ActorId) -> Result<Branch> {
        self.observe("delete_branch", || {
            let now = Utc::now();
            let retired = {
                let mut state = self.write()?;
                let id = state.branches.find(name)?.id;
                let checked_out = self.checked_out(&state)?;
                state.branches.check_delete(&id, checked_out.as_ref())?;
                self.commit_batch(
                    &mut state,
                    vec![JournalRecord::BranchRetired {
                        id,
                        status: BranchStatus::Archived,
                        at: now,
                    }],
                )?;
                state.branches.get(&id)?.clone()
            };
            info!(branch = name, by = %actor, "deleted branch");
            self.evict_cache(&retired.id);
            Ok(retired)
        })
    }

    /// Merge `source` into `target` outside any pull request.
    pub fn merge_branches(
        &self,
        source: &str,
        target: &str,
        strategy: MergeStrategy,
        actor: ActorId,
        message: Option<&str>,
    ) -> Result<MergeOutcome> {
        self.observe("merge", || {
            let (source_id, target_id) = {
                let state = self.read()?;
                (state.branches.find(source)?.id, state.branches.find(target)?.id)
            };
            let outcome = self.land_merge(
                source_id,
                target_id,
                strategy,
                &actor,
                message,
                |_, _, _| Ok(Batch::new()),
            )?;
            info!(
                source,
                target,
                commit = %outcome.commit.short_hex(),
                up_to_date = outcome.up_to_date,
                "merged branches"
            );
            Ok(outcome)
        })
    }

    /// Plan a merge under the read lock, then land it under the write lock.
    ///
    /// If the target moved in between, the merge is planned again, up to the
    /// configured number of attempts. `finish` adds records to the merge's
    /// journal batch; it sees the state before the merge is applied.
    pub(super) fn land_merge<F>(
        &self,
        source: BranchId,
        target: BranchId,
        strategy: MergeStrategy,
        author: &ActorId,
        message: Option<&str>,
        finish: F,
    ) -> Result<MergeOutcome>
    where
        F: FnMut(&RepoState, &MergeOutcome, Timestamp) -> Result<Batch>,
    {
        self.land_merge_with(source, target, strategy, author, message, finish, |_| Ok(()))
    }

    /// [`Self::land_merge`] with `planned` called after each plan, with no
    /// lock held, before the landing is attempted.
    #[allow(clippy::too_many_arguments)]
    fn land_merge_with<F, H>(
        &self,
        source: BranchId,
        target: BranchId,
        strategy: MergeStrategy,
        author: &ActorId,
        message: Option<&str>,
        mut finish: F,
        mut planned: H,
    ) -> Result<MergeOutcome>
    where
        F: FnMut(&RepoState, &MergeOutcome, Timestamp) -> Result<Batch>,
        H: FnMut(u32) -> Result<()>,
    {
        let max_attempts = self.config.merge_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Utc::now();
            let (plan, planned_tip) = {
                let state = self.read()?;
                let source = state.branches.active(&source)?;
                let target = state.branches.active(&target)?;
                let plan = MergeEngine::new(&state.graph).plan(
                    source,
                    target,
                    strategy,
                    author.clone(),
                    message,
                    now,
                )?;
                (plan, target.tip)
            };

            let (outcome, commit) = match plan {
                MergePlan::Conflicted(report) => return Err(EngineError::Conflict(report)),
                MergePlan::UpToDate { tip } => (
                    MergeOutcome {
                        commit: tip,
                        base: None,
                        changed: 0,
                        up_to_date: true,
                        attempts: attempt,
                    },
                    None,
                ),
                MergePlan::Ready(prepared) => (
                    MergeOutcome {
                        commit: prepared.commit.id,
                        base: Some(prepared.base),
                        changed: prepared.changed,
                        up_to_date: false,
                        attempts: attempt,
                    },
                    Some(prepared.commit),
                ),
            };

            planned(attempt)?;

            let mut state = self.write()?;
            match self.check_landing(&*state, &target, &planned_tip, commit.as_ref()) {
                Err(RefError::ConcurrentModification { name, .. }) if attempt < max_attempts => {
                    debug!(branch = %name, attempt, "target moved during merge, planning again");
                    continue;
                }
                other => other?,
            }

            let mut batch = Batch::new();
            if let Some(commit) = commit {
                batch.push(JournalRecord::CommitAppended(commit));
                batch.push(JournalRecord::TipAdvanced(TipUpdate {
                    branch: target,
                    from: planned_tip,
                    to: outcome.commit,
                    at: now,
                }));
            }
            batch.extend(finish(&*state, &outcome, now)?);
            self.commit_batch(&mut state, batch)?;
            drop(state);

            if !outcome.up_to_date {
                self.refresh_cache(&target);
                self.publish(vec![self.event(
                    EventKind::BranchTipAdvanced,
                    Subject::Branch(target),
                    author.clone(),
                    now,
                )]);
            }
            return Ok(outcome);
        }
    }

    fn check_landing(
        &self,
        state: &RepoState,
        target: &BranchId,
        planned_tip: &CommitId,
        commit: Option<&Commit>,
    ) -> std::result::Result<(), RefError> {
        match commit {
            Some(commit) => state
                .branches
                .check_advance(target, planned_tip, commit, &state.graph),
            None => {
                let branch = state.branches.active(target)?;
                if branch.tip != *planned_tip {
                    return Err(RefError::ConcurrentModification {
                        name: branch.name.clone(),
                        expected: *planned_tip,
                        actual: branch.tip,
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{dana, repo, seed, set};
    use super::*;
    use crate::{ErrorKind, RepositoryConfig, RepositoryOptions};
    use strata_types::{EntityEdit, EntityId, FieldValue};

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.into())
    }

    #[test]
    fn branch_forks_from_default_tip() {
        let repo = repo();
        seed(&repo);
        let main_tip = repo.resolve_commit("main").unwrap().id;
        let branch = repo
            .create_branch(
                BranchRequest::new("contractor/x").kind(BranchKind::Contractor),
                dana(),
            )
            .unwrap();
        assert_eq!(branch.tip, main_tip);
        assert_eq!(branch.kind, BranchKind::Contractor);

        let err = repo
            .create_branch(BranchRequest::new("contractor/x"), dana())
            .unwrap_err();
        assert!(matches!(err, EngineError::Branch(RefError::DuplicateBranchName { .. })));
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn disjoint_field_edits_merge_cleanly() {
        let repo = repo();
        let room = seed(&repo);
        repo.create_branch(BranchRequest::new("contractor/x"), dana())
            .unwrap();
        repo.commit_edits(
            "contractor/x",
            dana(),
            "close lobby",
            &[set(room, "status", text("temp-closed"))],
        )
        .unwrap();
        repo.commit_edits(
            "main",
            dana(),
            "describe lobby",
            &[set(room, "description", text("renovated"))],
        )
        .unwrap();

        let outcome = repo
            .merge_branches("contractor/x", "main", MergeStrategy::Merge, dana(), None)
            .unwrap();
        assert!(!outcome.up_to_date);
        assert_eq!(outcome.attempts, 1);
        let merged = repo.get_entity("main", &room).unwrap();
        assert_eq!(merged.field("status"), Some(text("temp-closed")));
        assert_eq!(merged.field("description"), Some(text("renovated")));
        assert_eq!(repo.resolve_commit("main").unwrap().parents.len(), 2);

        let again = repo
            .merge_branches("contractor/x", "main", MergeStrategy::Merge, dana(), None)
            .unwrap();
        assert!(again.up_to_date);
        assert_eq!(again.commit, outcome.commit);
    }

    /// Two branches editing different fields of the lobby.
    fn two_contractors(repo: &Repository) -> EntityId {
        let room = seed(repo);
        for (name, field, value) in [
            ("contractor/a", "status", "temp-closed"),
            ("contractor/b", "description", "new carpet"),
        ] {
            repo.create_branch(BranchRequest::new(name), dana()).unwrap();
            repo.commit_edits(name, dana(), name, &[set(room, field, text(value))])
                .unwrap();
        }
        room
    }

    fn merge_into_main(repo: &Repository, source: &str) -> Result<MergeOutcome> {
        repo.merge_branches(source, "main", MergeStrategy::Merge, dana(), None)
    }

    #[test]
    fn merge_replans_when_target_moves() {
        let repo = repo();
        let room = two_contractors(&repo);
        let ids = |name: &str| {
            let state = repo.read().unwrap();
            state.branches.find(name).unwrap().id
        };
        let (source, target) = (ids("contractor/a"), ids("main"));

        let mut moved = None;
        let outcome = repo
            .land_merge_with(
                source,
                target,
                MergeStrategy::Merge,
                &dana(),
                None,
                |_, _, _| Ok(Batch::new()),
                |attempt| {
                    if attempt == 1 {
                        moved = Some(merge_into_main(&repo, "contractor/b")?.commit);
                    }
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(outcome.attempts, 2);

        // The second landing is stacked on the first, not on the stale tip.
        let tip = repo.resolve_commit("main").unwrap();
        assert_eq!(tip.id, outcome.commit);
        assert_eq!(Some(tip.parents[0]), moved);
        let lobby = repo.get_entity("main", &room).unwrap();
        assert_eq!(lobby.field("status"), Some(text("temp-closed")));
        assert_eq!(lobby.field("description"), Some(text("new carpet")));
    }

    #[test]
    fn merge_gives_up_after_configured_attempts() {
        let config = RepositoryConfig {
            max_merge_retries: 0,
            ..RepositoryConfig::named("test")
        };
        let repo = Repository::in_memory(config, RepositoryOptions::default()).unwrap();
        let room = two_contractors(&repo);
        let (source, target) = {
            let state = repo.read().unwrap();
            (
                state.branches.find("contractor/a").unwrap().id,
                state.branches.find("main").unwrap().id,
            )
        };
        let err = repo
            .land_merge_with(
                source,
                target,
                MergeStrategy::Merge,
                &dana(),
                None,
                |_, _, _| Ok(Batch::new()),
                |_| merge_into_main(&repo, "contractor/b").map(|_| ()),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);

        // Only the interleaved merge landed.
        let tip = repo.resolve_commit("main").unwrap();
        assert_eq!(tip.message, "Merge branch 'contractor/b' into main");
        assert_eq!(
            repo.get_entity("main", &room).unwrap().field("status"),
            Some(text("operational"))
        );
    }

    #[test]
    fn concurrent_merges_land_linearly() {
        let repo = repo();
        let room = two_contractors(&repo);
        let start = repo.resolve_commit("main").unwrap().id;

        let (a, b) = std::thread::scope(|scope| {
            let a = scope.spawn(|| merge_into_main(&repo, "contractor/a"));
            let b = scope.spawn(|| merge_into_main(&repo, "contractor/b"));
            (a.join().unwrap().unwrap(), b.join().unwrap().unwrap())
        });

        // Whichever landed second sits on top of the first.
        let (first, second) = if repo.resolve_commit("main").unwrap().id == b.commit {
            (a, b)
        } else {
            (b, a)
        };
        let tip = repo.resolve_commit("main").unwrap();
        assert_eq!(tip.id, second.commit);
        assert_eq!(tip.parents[0], first.commit);
        assert_eq!(repo.resolve_commit(&first.commit.to_hex()).unwrap().parents[0], start);
        let lobby = repo.get_entity("main", &room).unwrap();
        assert_eq!(lobby.field("status"), Some(text("temp-closed")));
        assert_eq!(lobby.field("description"), Some(text("new carpet")));
    }

    #[test]
    fn conflicting_edits_leave_target_untouched() {
        let repo = repo();
        let room = seed(&repo);
        repo.create_branch(BranchRequest::new("contractor/x"), dana())
            .unwrap();
        repo.commit_edits(
            "contractor/x",
            dana(),
            "close",
            &[set(room, "status", text("temp-closed"))],
        )
        .unwrap();
        repo.commit_edits("main", dana(), "retire", &[set(room, "status", text("decommissioned"))])
            .unwrap();
        let before = repo.resolve_commit("main").unwrap().id;

        let err = repo
            .merge_branches("contractor/x", "main", MergeStrategy::Merge, dana(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let report = err.conflicts().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.conflicts[0].entity, room);
        assert_eq!(report.conflicts[0].field, "status");
        assert_eq!(repo.resolve_commit("main").unwrap().id, before);
    }

    #[test]
    fn squash_merge_has_one_parent() {
        let repo = repo();
        let room = seed(&repo);
        repo.create_branch(BranchRequest::new("feature/area"), dana())
            .unwrap();
        for area in [40.0, 42.5] {
            repo.commit_edits(
                "feature/area",
                dana(),
                "area",
                &[set(room, "area_sqm", FieldValue::Number(area))],
            )
            .unwrap();
        }
        let outcome = repo
            .merge_branches("feature/area", "main", MergeStrategy::Squash, dana(), Some("Squash area"))
            .unwrap();
        let tip = repo.resolve_commit("main").unwrap();
        assert_eq!(tip.id, outcome.commit);
        assert_eq!(tip.parents.len(), 1);
        assert_eq!(tip.message, "Squash area");
        assert_eq!(
            repo.get_entity("main", &room).unwrap().field("area_sqm"),
            Some(FieldValue::Number(42.5))
        );
    }

    #[test]
    fn advance_requires_expected_tip_and_descent() {
        let repo = repo();
        let room = seed(&repo);
        let c0 = repo.resolve_commit("main").unwrap().id;
        repo.create_branch(BranchRequest::new("feature/a"), dana())
            .unwrap();
        let c1 = repo
            .commit_edits("feature/a", dana(), "a", &[set(room, "occupancy", FieldValue::Integer(5))])
            .unwrap();

        let err = repo
            .advance_branch("main", &c1.id, &c1.id.to_hex(), dana())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);

        let update = repo.advance_branch("main", &c0, "feature/a", dana()).unwrap();
        assert_eq!(update.to, c1.id);
        assert_eq!(repo.resolve_commit("main").unwrap().id, c1.id);

        let err = repo
            .advance_branch("main", &c1.id, &c0.to_hex(), dana())
            .unwrap_err();
        assert!(matches!(err, EngineError::Branch(RefError::NonLinearAdvance { .. })));

        let same = repo.advance_branch("main", &c1.id, "main", dana()).unwrap();
        assert_eq!(same.from, same.to);
    }

    #[test]
    fn branch_info_counts_ahead_and_behind() {
        let repo = repo();
        let room = seed(&repo);
        repo.create_branch(BranchRequest::new("feature/a"), dana())
            .unwrap();
        repo.commit_edits("feature/a", dana(), "a", &[set(room, "number", text("101"))])
            .unwrap();
        repo.commit_edits("main", dana(), "m", &[set(room, "occupancy", FieldValue::Integer(9))])
            .unwrap();
        repo.commit_edits("main", dana(), "m2", &[set(room, "occupancy", FieldValue::Integer(10))])
            .unwrap();
        let info = repo.branch_info("feature/a").unwrap();
        assert_eq!((info.ahead, info.behind), (1, 2));
        assert_eq!(info.default_branch, "main");
    }

    #[test]
    fn deleting_retires_and_frees_the_name() {
        let repo = repo();
        seed(&repo);
        let err = repo.delete_branch("main", dana()).unwrap_err();
        assert!(matches!(err, EngineError::Branch(RefError::ProtectedBranch { .. })));

        let first = repo
            .create_branch(BranchRequest::new("feature/tmp"), dana())
            .unwrap();
        repo.switch("feature/tmp").unwrap();
        let err = repo.delete_branch("feature/tmp", dana()).unwrap_err();
        assert!(matches!(err, EngineError::Branch(RefError::ActiveCheckout { .. })));
        repo.switch("main").unwrap();

        let retired = repo.delete_branch("feature/tmp", dana()).unwrap();
        assert_eq!(retired.status, BranchStatus::Archived);
        assert!(retired.retired_at.is_some());
        assert!(repo.list_branches(&BranchFilter::default()).unwrap().iter().all(|b| b.id != first.id));
        let archived = repo
            .list_branches(&BranchFilter {
                status: Some(BranchStatus::Archived),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(archived.len(), 1);

        let second = repo
            .create_branch(BranchRequest::new("feature/tmp"), dana())
            .unwrap();
        assert_ne!(second.id, first.id);
        let err = repo
            .commit_edits("nope", dana(), "x", &[EntityEdit::Remove(EntityId::new())])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn configured_protected_branches() {
        let mut config = crate::RepositoryConfig::named("hq");
        config.protected_branches.push("release/2026".into());
        let repo = Repository::in_memory(config, Default::default()).unwrap();
        let branch = repo
            .create_branch(BranchRequest::new("release/2026").kind(BranchKind::Release), dana())
            .unwrap();
        assert!(branch.protected);
        assert!(repo.delete_branch("release/2026", dana()).is_err());
    }
}
