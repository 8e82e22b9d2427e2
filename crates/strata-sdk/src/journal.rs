//! Journal records and the in-memory state they rebuild.
//!
//! Every mutating repository operation appends exactly one journal entry: a
//! batch of [`JournalRecord`]s. The batch is written before any in-memory
//! change, and the in-memory change is made by applying the same records
//! that replay applies on open, so the two can never disagree.

use serde::{Deserialize, Serialize};

use strata_dag::{Commit, CommitGraph};
use strata_refs::{Branch, BranchRegistry, BranchStatus, TipUpdate};
use strata_types::{BranchId, RepositoryId, Timestamp};
use strata_workflow::{Issue, PullRequest, WorkBoard};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Always the first record of a journal.
    RepositoryInitialized {
        id: RepositoryId,
        name: String,
        default_branch: String,
    },
    CommitAppended(Commit),
    BranchCreated(Branch),
    TipAdvanced(TipUpdate),
    BranchRetired {
        id: BranchId,
        status: BranchStatus,
        at: Timestamp,
    },
    PullRequestSaved(PullRequest),
    IssueSaved(Issue),
}

impl JournalRecord {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RepositoryInitialized { .. } => "repository-initialized",
            Self::CommitAppended(_) => "commit-appended",
            Self::BranchCreated(_) => "branch-created",
            Self::TipAdvanced(_) => "tip-advanced",
            Self::BranchRetired { .. } => "branch-retired",
            Self::PullRequestSaved(_) => "pull-request-saved",
            Self::IssueSaved(_) => "issue-saved",
        }
    }
}

/// One journal entry.
pub type Batch = Vec<JournalRecord>;

/// Everything a repository knows, guarded by one lock in the facade.
#[derive(Debug)]
pub struct RepoState {
    pub graph: CommitGraph,
    pub branches: BranchRegistry,
    pub board: WorkBoard,
}

impl RepoState {
    pub fn new(repository: RepositoryId, checkpoint_interval: u32) -> Self {
        Self {
            graph: CommitGraph::new(repository).with_checkpoint_interval(checkpoint_interval),
            branches: BranchRegistry::new(),
            board: WorkBoard::new(),
        }
    }

    /// Apply one record. Callers validate records before journaling them, so
    /// a failure here means the journal and the state disagree.
    pub fn apply(&mut self, record: &JournalRecord) -> Result<()> {
        match record {
            JournalRecord::RepositoryInitialized { .. } => {}
            JournalRecord::CommitAppended(commit) => {
                self.graph.insert(commit.clone())?;
            }
            JournalRecord::BranchCreated(branch) => self.branches.insert(branch.clone())?,
            JournalRecord::TipAdvanced(update) => self.branches.apply_tip(update)?,
            JournalRecord::BranchRetired { id, status, at } => {
                self.branches.retire(id, *status, *at)?;
            }
            JournalRecord::PullRequestSaved(pr) => self.board.save_pull(pr.clone()),
            JournalRecord::IssueSaved(issue) => self.board.save_issue(issue.clone()),
        }
        Ok(())
    }

    pub fn apply_all(&mut self, records: &[JournalRecord]) -> Result<()> {
        records.iter().try_for_each(|record| self.apply(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_dag::CommitDraft;
    use strata_refs::NewBranch;
    use strata_store::EntitySet;
    use strata_types::ActorId;

    #[test]
    fn replaying_records_rebuilds_state() {
        let repo = RepositoryId::new();
        let mut source = RepoState::new(repo, 32);
        let root = source
            .graph
            .prepare(CommitDraft::root(ActorId::system(), "init", EntitySet::new()))
            .unwrap();
        source.graph.insert(root.clone()).unwrap();
        let main = source
            .branches
            .prepare_create(
                NewBranch::new("main", root.id, ActorId::system()).default_branch(),
                &source.graph,
                Utc::now(),
            )
            .unwrap();

        let batch: Batch = vec![
            JournalRecord::RepositoryInitialized {
                id: repo,
                name: "hq".into(),
                default_branch: "main".into(),
            },
            JournalRecord::CommitAppended(root.clone()),
            JournalRecord::BranchCreated(main.clone()),
        ];
        let bytes = bincode::serialize(&batch).unwrap();
        let decoded: Batch = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, batch);

        let mut replica = RepoState::new(repo, 32);
        replica.apply_all(&decoded).unwrap();
        assert!(replica.graph.contains(&root.id));
        assert_eq!(replica.branches.find("main").unwrap().tip, root.id);
        assert_eq!(decoded[2].label(), "branch-created");
    }

    #[test]
    fn retiring_an_unknown_branch_fails() {
        let mut state = RepoState::new(RepositoryId::new(), 32);
        let result = state.apply(&JournalRecord::BranchRetired {
            id: BranchId::new(),
            status: BranchStatus::Archived,
            at: Utc::now(),
        });
        assert!(result.is_err());
    }
}
