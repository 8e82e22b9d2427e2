//! The [`Repository`] facade.
//!
//! A repository owns the commit graph, the branch registry and the
//! pull request / issue board behind a single `RwLock`. Every mutating
//! operation follows the same sequence under the write lock:
//!
//! 1. validate against the current state without changing it
//! 2. describe the change as a batch of [`JournalRecord`]s
//! 3. append the batch to the journal (on-disk repositories only)
//! 4. apply the batch to the in-memory state
//!
//! Notifications and entity-cache refreshes happen after the lock is
//! released and can never fail the operation.

mod branches;
mod issues;
mod pulls;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use strata_dag::{Commit, CommitDraft};
use strata_diff::{diff_sets, CommitDiff, DiffEngine};
use strata_fabric::{
    EngineEvent, EventKind, NotificationSink, NullSink, Outcome, Subject, Telemetry,
    TracingTelemetry, WriteAheadLog,
};
use strata_refs::{BranchFilter, BranchStatus, NewBranch, TipUpdate};
use strata_store::{EntitySet, EntityStore, InMemoryEntityStore};
use strata_types::{
    ActorId, BranchId, ChangeSet, CommitId, Entity, EntityEdit, EntityId, EntityKind,
    RepositoryId, Timestamp,
};

use crate::config::RepositoryConfig;
use crate::error::{EngineError, Result};
use crate::journal::{Batch, JournalRecord, RepoState};

pub use branches::{BranchInfo, BranchRequest, MergeOutcome};
pub use issues::StartedWork;
pub use pulls::{MergeOptions, MergedPullRequest, PullRequestDraft};

/// Directory holding a repository's durable state.
pub const STRATA_DIR: &str = ".strata";
const CONFIG_FILE: &str = "config.toml";
const JOURNAL_FILE: &str = "journal.wal";
const HEAD_FILE: &str = "HEAD";

/// Collaborators handed to a repository when it is opened.
#[derive(Clone)]
pub struct RepositoryOptions {
    pub entity_store: Arc<dyn EntityStore>,
    pub telemetry: Arc<dyn Telemetry>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            entity_store: Arc::new(InMemoryEntityStore::new()),
            telemetry: Arc::new(TracingTelemetry),
            notifications: Arc::new(NullSink),
        }
    }
}

impl RepositoryOptions {
    pub fn with_entity_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entity_store = store;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }
}

/// Result of [`Repository::verify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    pub commits: usize,
    pub branches: usize,
    pub retired_branches: usize,
    pub pull_requests: usize,
    pub issues: usize,
    /// `None` for in-memory repositories.
    pub journal_bytes: Option<u64>,
    pub journal_entries: Option<u64>,
}

/// A building-model repository.
pub struct Repository {
    id: RepositoryId,
    root: Option<PathBuf>,
    config: RepositoryConfig,
    state: RwLock<RepoState>,
    /// Name of the caller's current branch.
    head: Mutex<String>,
    journal: Option<WriteAheadLog>,
    entities: Arc<dyn EntityStore>,
    telemetry: Arc<dyn Telemetry>,
    notifications: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("root", &self.root)
            .finish()
    }
}

impl Repository {
    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Create a repository under `root/.strata` with an empty default branch.
    pub fn init(root: &Path, config: RepositoryConfig, options: RepositoryOptions) -> Result<Self> {
        config.validate()?;
        let dir = root.join(STRATA_DIR);
        let journal_path = dir.join(JOURNAL_FILE);
        if journal_path.exists() {
            return Err(EngineError::AlreadyInitialized(root.to_path_buf()));
        }
        fs::create_dir_all(&dir)?;
        config.save(&dir.join(CONFIG_FILE))?;
        let journal = WriteAheadLog::open(&journal_path, config.journal.sync)?;

        let repo = Self::bootstrap(Some(root.to_path_buf()), config, Some(journal), options)?;
        repo.write_head()?;
        info!(path = %root.display(), name = %repo.config.name, "initialized repository");
        Ok(repo)
    }

    /// Open an existing repository and replay its journal.
    pub fn open(root: &Path, options: RepositoryOptions) -> Result<Self> {
        let dir = root.join(STRATA_DIR);
        let journal_path = dir.join(JOURNAL_FILE);
        if !journal_path.exists() {
            return Err(EngineError::NotInitialized(root.to_path_buf()));
        }
        let config = match RepositoryConfig::load(&dir.join(CONFIG_FILE))? {
            Some(config) => config,
            None => RepositoryConfig::named(dir_name(root)),
        };
        let journal = WriteAheadLog::open(&journal_path, config.journal.sync)?;
        let batches: Vec<Batch> = journal.recover()?;

        let id = match batches.first().and_then(|batch| batch.first()) {
            Some(JournalRecord::RepositoryInitialized { id, .. }) => *id,
            _ => {
                return Err(EngineError::Replay {
                    entry: 0,
                    reason: "journal does not start with a repository initialization".into(),
                })
            }
        };

        let mut state = RepoState::new(id, config.checkpoint_interval);
        for (entry, batch) in batches.iter().enumerate() {
            if entry > 0
                && batch
                    .iter()
                    .any(|r| matches!(r, JournalRecord::RepositoryInitialized { .. }))
            {
                return Err(EngineError::Replay {
                    entry,
                    reason: "repository initialized twice".into(),
                });
            }
            state.apply_all(batch).map_err(|e| EngineError::Replay {
                entry,
                reason: e.to_string(),
            })?;
        }

        let head = match fs::read_to_string(dir.join(HEAD_FILE)) {
            Ok(name) if state.branches.find(name.trim()).is_ok() => name.trim().to_string(),
            _ => config.default_branch.clone(),
        };
        let active: Vec<BranchId> = state
            .branches
            .list(&BranchFilter::default())
            .iter()
            .map(|b| b.id)
            .collect();

        info!(
            path = %root.display(),
            entries = batches.len(),
            commits = state.graph.len(),
            branches = state.branches.len(),
            "opened repository"
        );
        let repo = Self {
            id,
            root: Some(root.to_path_buf()),
            config,
            state: RwLock::new(state),
            head: Mutex::new(head),
            journal: Some(journal),
            entities: options.entity_store,
            telemetry: options.telemetry,
            notifications: options.notifications,
        };
        for branch in &active {
            repo.refresh_cache(branch);
        }
        Ok(repo)
    }

    /// A repository that lives only in memory. Nothing is journaled.
    pub fn in_memory(config: RepositoryConfig, options: RepositoryOptions) -> Result<Self> {
        config.validate()?;
        Self::bootstrap(None, config, None, options)
    }

    fn bootstrap(
        root: Option<PathBuf>,
        config: RepositoryConfig,
        journal: Option<WriteAheadLog>,
        options: RepositoryOptions,
    ) -> Result<Self> {
        let id = RepositoryId::new();
        let now = Utc::now();
        let mut state = RepoState::new(id, config.checkpoint_interval);

        // The state is not shared yet, so it can be built before the journal
        // write; a failed write drops it.
        let root_commit = state.graph.prepare(
            CommitDraft::root(ActorId::system(), "Initialize repository", EntitySet::new())
                .with_timestamp(now),
        )?;
        state.graph.insert(root_commit.clone())?;
        let main = state.branches.prepare_create(
            NewBranch::new(&config.default_branch, root_commit.id, ActorId::system())
                .default_branch()
                .description("Default branch"),
            &state.graph,
            now,
        )?;
        let batch = vec![
            JournalRecord::RepositoryInitialized {
                id,
                name: config.name.clone(),
                default_branch: config.default_branch.clone(),
            },
            JournalRecord::CommitAppended(root_commit),
            JournalRecord::BranchCreated(main.clone()),
        ];
        if let Some(journal) = &journal {
            journal.append(&batch)?;
        }
        state.apply(&batch[2])?;

        let repo = Self {
            id,
            root,
            head: Mutex::new(config.default_branch.clone()),
            config,
            state: RwLock::new(state),
            journal,
            entities: options.entity_store,
            telemetry: options.telemetry,
            notifications: options.notifications,
        };
        repo.refresh_cache(&main.id);
        Ok(repo)
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn id(&self) -> RepositoryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Working directory of an on-disk repository.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The caller's current branch.
    pub fn current_branch(&self) -> Result<String> {
        Ok(self.head.lock().map_err(|_| EngineError::Poisoned)?.clone())
    }

    /// Make `branch` the current branch.
    pub fn switch(&self, branch: &str) -> Result<()> {
        self.read()?.branches.find(branch)?;
        *self.head.lock().map_err(|_| EngineError::Poisoned)? = branch.to_string();
        self.write_head()?;
        debug!(branch, "switched branch");
        Ok(())
    }

    // ---------------------------------------------------------------
    // History
    // ---------------------------------------------------------------

    /// Resolve a branch name, `HEAD`, or a full or abbreviated commit id.
    pub fn resolve_commit(&self, revision: &str) -> Result<Commit> {
        self.observe("resolve", || {
            let state = self.read()?;
            let id = self.resolve_rev(&state, revision)?;
            Ok(state.graph.resolve(&id)?.clone())
        })
    }

    /// Commits reachable from `revision`, newest first.
    pub fn log(&self, revision: &str, limit: Option<usize>) -> Result<Vec<Commit>> {
        self.observe("log", || {
            let state = self.read()?;
            let tip = self.resolve_rev(&state, revision)?;
            Ok(state
                .graph
                .ancestors(&tip)?
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect())
        })
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Result<CommitId> {
        self.observe("merge_base", || {
            let state = self.read()?;
            let a = self.resolve_rev(&state, a)?;
            let b = self.resolve_rev(&state, b)?;
            Ok(state.graph.merge_base(&a, &b)?)
        })
    }

    /// Changes on `b` since it diverged from `a`.
    pub fn diff(&self, a: &str, b: &str) -> Result<CommitDiff> {
        self.observe("diff", || {
            let state = self.read()?;
            let a = self.resolve_rev(&state, a)?;
            let b = self.resolve_rev(&state, b)?;
            Ok(DiffEngine::new(&state.graph).diff(&a, &b)?)
        })
    }

    /// Direct comparison of the states at `a` and `b`.
    pub fn compare(&self, a: &str, b: &str) -> Result<CommitDiff> {
        self.observe("compare", || {
            let state = self.read()?;
            let a = self.resolve_rev(&state, a)?;
            let b = self.resolve_rev(&state, b)?;
            Ok(DiffEngine::new(&state.graph).compare(&a, &b)?)
        })
    }

    /// Every entity at `revision`.
    pub fn materialize(&self, revision: &str) -> Result<EntitySet> {
        self.observe("materialize", || {
            let state = self.read()?;
            let id = self.resolve_rev(&state, revision)?;
            Ok(state.graph.materialize(&id)?)
        })
    }

    // ---------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------

    /// One entity at the tip of `branch`, served from the entity cache when
    /// it is current.
    pub fn get_entity(&self, branch: &str, id: &EntityId) -> Result<Entity> {
        self.observe("get_entity", || {
            let (branch_id, tip) = {
                let state = self.read()?;
                let b = state.branches.find(branch)?;
                (b.id, b.tip)
            };
            let not_found = || EngineError::EntityNotFound {
                branch: branch.to_string(),
                id: *id,
            };

            match self.entities.cached_commit(&branch_id) {
                Ok(Some(cached)) if cached == tip => match self.entities.get_entity(&branch_id, id) {
                    Ok(Some(entity)) => return Ok(entity),
                    Ok(None) => return Err(not_found()),
                    Err(e) => warn!(branch, error = %e, "entity cache read failed"),
                },
                Ok(_) => {}
                Err(e) => warn!(branch, error = %e, "entity cache read failed"),
            }

            let state = self.read()?;
            state
                .graph
                .materialize(&tip)?
                .get(id)
                .cloned()
                .ok_or_else(not_found)
        })
    }

    /// Entities at the tip of `branch`, optionally of one kind.
    pub fn list_entities(&self, branch: &str, kind: Option<EntityKind>) -> Result<Vec<Entity>> {
        self.observe("list_entities", || {
            let state = self.read()?;
            let tip = state.branches.find(branch)?.tip;
            let entities = state.graph.materialize(&tip)?;
            Ok(entities
                .iter()
                .filter(|e| kind.map_or(true, |k| e.kind() == k))
                .cloned()
                .collect())
        })
    }

    // ---------------------------------------------------------------
    // Commits
    // ---------------------------------------------------------------

    /// Commit a change set on top of `branch`.
    ///
    /// The change set must apply to the tip exactly and leave the
    /// containment hierarchy valid.
    pub fn commit_changes(
        &self,
        branch: &str,
        author: ActorId,
        message: &str,
        changes: &ChangeSet,
    ) -> Result<Commit> {
        self.observe("commit", || {
            self.commit_with(branch, author, message, |entities| {
                entities.apply(changes)?;
                entities.validate()?;
                Ok(())
            })
        })
    }

    /// Apply edits to the tip of `branch` and commit the resulting delta.
    pub fn commit_edits(
        &self,
        branch: &str,
        author: ActorId,
        message: &str,
        edits: &[EntityEdit],
    ) -> Result<Commit> {
        self.observe("commit", || {
            self.commit_with(branch, author, message, |entities| {
                edits.iter().try_for_each(|edit| entities.apply_edit(edit))?;
                Ok(())
            })
        })
    }

    fn commit_with<F>(&self, branch: &str, author: ActorId, message: &str, edit: F) -> Result<Commit>
    where
        F: FnOnce(&mut EntitySet) -> Result<()>,
    {
        let now = Utc::now();
        let (commit, branch_id) = {
            let mut state = self.write()?;
            let target = state.branches.find(branch)?.clone();
            let before = state.graph.materialize(&target.tip)?;
            let mut after = before.clone();
            edit(&mut after)?;

            let changes = diff_sets(&before, &after)?;
            if changes.is_empty() {
                return Err(EngineError::EmptyCommit);
            }
            let commit = state.graph.prepare(
                CommitDraft::new(author.clone(), message, changes)
                    .with_parent(target.tip)
                    .with_timestamp(now),
            )?;
            state
                .branches
                .check_advance(&target.id, &target.tip, &commit, &state.graph)?;
            let update = TipUpdate {
                branch: target.id,
                from: target.tip,
                to: commit.id,
                at: now,
            };
            self.commit_batch(
                &mut state,
                vec![
                    JournalRecord::CommitAppended(commit.clone()),
                    JournalRecord::TipAdvanced(update),
                ],
            )?;
            (commit, target.id)
        };

        info!(branch, commit = %commit.id.short_hex(), author = %author, "committed");
        self.refresh_cache(&branch_id);
        self.publish(vec![self.event(
            EventKind::BranchTipAdvanced,
            Subject::Branch(branch_id),
            author,
            now,
        )]);
        Ok(commit)
    }

    // ---------------------------------------------------------------
    // Integrity
    // ---------------------------------------------------------------

    /// Check every commit id and parent link, every branch tip, every
    /// workflow link and the containment hierarchy at each active tip.
    pub fn verify(&self) -> Result<VerifyReport> {
        self.observe("verify", || {
            let state = self.read()?;
            state.graph.validate()?;

            let mut report = VerifyReport {
                commits: state.graph.len(),
                branches: 0,
                retired_branches: 0,
                pull_requests: state.board.pull_count(),
                issues: state.board.issue_count(),
                journal_bytes: None,
                journal_entries: None,
            };

            for status in [BranchStatus::Active, BranchStatus::Merged, BranchStatus::Archived] {
                let filter = BranchFilter {
                    status: Some(status),
                    ..BranchFilter::default()
                };
                for branch in state.branches.list(&filter) {
                    if !state.graph.contains(&branch.tip) {
                        return Err(EngineError::Integrity(format!(
                            "branch {} points at missing commit {}",
                            branch.name,
                            branch.tip.short_hex()
                        )));
                    }
                    if status == BranchStatus::Active {
                        report.branches += 1;
                        state
                            .graph
                            .materialize(&branch.tip)?
                            .validate()
                            .map_err(|e| {
                                EngineError::Integrity(format!("branch {}: {e}", branch.name))
                            })?;
                    } else {
                        report.retired_branches += 1;
                    }
                }
            }

            for pr in state.board.pulls(&Default::default()) {
                for branch in [&pr.source, &pr.target] {
                    state.branches.get(branch).map_err(|_| {
                        EngineError::Integrity(format!(
                            "pull request #{} references unknown branch {branch}",
                            pr.number
                        ))
                    })?;
                }
                if let Some(commit) = &pr.merge_commit {
                    if !state.graph.contains(commit) {
                        return Err(EngineError::Integrity(format!(
                            "pull request #{} merged as missing commit {}",
                            pr.number,
                            commit.short_hex()
                        )));
                    }
                }
            }

            for issue in state.board.issues(&Default::default()) {
                let branch_ok = issue.branch.map_or(true, |b| state.branches.get(&b).is_ok());
                let pr_ok = issue
                    .pull_request
                    .map_or(true, |n| state.board.pull(n).is_ok());
                if !branch_ok || !pr_ok {
                    return Err(EngineError::Integrity(format!(
                        "issue #{} links to a missing branch or pull request",
                        issue.number
                    )));
                }
            }

            if let Some(journal) = &self.journal {
                report.journal_bytes = Some(journal.size()?);
                report.journal_entries = Some(journal.entry_count()?);
            }
            info!(commits = report.commits, branches = report.branches, "repository verified");
            Ok(report)
        })
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn read(&self) -> Result<RwLockReadGuard<'_, RepoState>> {
        self.state.read().map_err(|_| EngineError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RepoState>> {
        self.state.write().map_err(|_| EngineError::Poisoned)
    }

    /// Journal a batch, then apply it. Nothing changes if the journal write fails.
    fn commit_batch(&self, state: &mut RepoState, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(journal) = &self.journal {
            journal.append(&batch)?;
        }
        state.apply_all(&batch)
    }

    fn resolve_rev(&self, state: &RepoState, revision: &str) -> Result<CommitId> {
        let revision = revision.trim();
        if revision == "HEAD" {
            let head = self.current_branch()?;
            return Ok(state.branches.find(&head)?.tip);
        }
        if let Ok(branch) = state.branches.find(revision) {
            return Ok(branch.tip);
        }
        Ok(state.graph.resolve_prefix(revision)?)
    }

    fn default_branch_id(&self, state: &RepoState) -> Result<BranchId> {
        Ok(state.branches.find(&self.config.default_branch)?.id)
    }

    fn checked_out(&self, state: &RepoState) -> Result<Option<BranchId>> {
        let head = self.current_branch()?;
        Ok(state.branches.find(&head).ok().map(|b| b.id))
    }

    fn write_head(&self) -> Result<()> {
        if let Some(root) = &self.root {
            let head = self.current_branch()?;
            fs::write(root.join(STRATA_DIR).join(HEAD_FILE), format!("{head}\n"))?;
        }
        Ok(())
    }

    fn observe<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = f();
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failure(e.kind().as_str()),
        };
        self.telemetry.observe(operation, started.elapsed(), outcome);
        result
    }

    fn event(&self, kind: EventKind, subject: Subject, actor: ActorId, at: Timestamp) -> EngineEvent {
        EngineEvent::new(kind, self.id, subject, actor, at)
    }

    fn publish(&self, events: Vec<EngineEvent>) {
        for event in &events {
            self.notifications.publish(event);
        }
    }

    /// Re-cache the tip of `branch`. Failures only cost a cache miss later.
    fn refresh_cache(&self, branch: &BranchId) {
        let snapshot = || -> Result<(CommitId, EntitySet)> {
            let state = self.read()?;
            let tip = state.branches.active(branch)?.tip;
            Ok((tip, state.graph.materialize(&tip)?))
        };
        let result = snapshot().and_then(|(tip, entities)| {
            self.entities
                .put_snapshot(branch, &tip, &entities)
                .map_err(EngineError::from)
        });
        if let Err(e) = result {
            warn!(branch = %branch.short_id(), error = %e, "entity cache refresh failed");
        }
    }

    fn evict_cache(&self, branch: &BranchId) {
        if let Err(e) = self.entities.evict(branch) {
            warn!(branch = %branch.short_id(), error = %e, "entity cache eviction failed");
        }
    }
}

fn dir_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "strata".to_string())
}
