//! Commit records and their content addressing.

use serde::{Deserialize, Serialize};

use strata_store::EntitySet;
use strata_types::{ActorId, BranchId, ChangeSet, CommitId, RepositoryId, Timestamp};

use crate::error::{GraphError, GraphResult};

/// The state carried by a commit.
///
/// Root commits and periodic checkpoints carry the full entity set; all
/// other commits carry the change set relative to their first parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Snapshot {
    Full(EntitySet),
    Delta(ChangeSet),
}

impl Snapshot {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

/// How a commit came to be.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitKind {
    /// An ordinary edit on a single line of work.
    Standard,
    /// A two-parent merge of `source` into the first parent's branch.
    Merge { source: BranchId },
    /// A single-parent squash of `source`'s unmerged commits. The squashed
    /// commits are provenance only, never parents.
    Squash {
        source: BranchId,
        squashed: Vec<CommitId>,
    },
}

/// An immutable commit.
///
/// Parents are held by id; the graph owns every commit and ids are the
/// only links between them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub repository: RepositoryId,
    /// Ordered parents: none for the root, one normally, two for merges.
    pub parents: Vec<CommitId>,
    pub author: ActorId,
    pub timestamp: Timestamp,
    pub message: String,
    pub kind: CommitKind,
    pub snapshot: Snapshot,
}

/// The hashed portion of a commit: everything except the id itself.
#[derive(Serialize)]
struct CommitContent<'a> {
    repository: &'a RepositoryId,
    parents: &'a [CommitId],
    author: &'a ActorId,
    timestamp: &'a Timestamp,
    message: &'a str,
    kind: &'a CommitKind,
    snapshot: &'a Snapshot,
}

impl Commit {
    /// Hash the commit's content into its id.
    pub fn compute_id(&self) -> GraphResult<CommitId> {
        let content = CommitContent {
            repository: &self.repository,
            parents: &self.parents,
            author: &self.author,
            timestamp: &self.timestamp,
            message: &self.message,
            kind: &self.kind,
            snapshot: &self.snapshot,
        };
        let bytes =
            bincode::serialize(&content).map_err(|e| GraphError::Serialization(e.to_string()))?;
        Ok(CommitId::from_content(&bytes))
    }

    /// Returns `true` if the stored id matches the content.
    pub fn verify_id(&self) -> GraphResult<bool> {
        Ok(self.compute_id()? == self.id)
    }

    pub fn first_parent(&self) -> Option<&CommitId> {
        self.parents.first()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        matches!(self.kind, CommitKind::Merge { .. })
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A commit request, before the graph assigns an id.
#[derive(Clone, Debug)]
pub struct CommitDraft {
    pub parents: Vec<CommitId>,
    pub author: ActorId,
    pub message: String,
    pub kind: CommitKind,
    pub snapshot: Snapshot,
    pub timestamp: Option<Timestamp>,
}

impl CommitDraft {
    /// A standard commit carrying `changes` relative to its first parent.
    pub fn new(author: ActorId, message: impl Into<String>, changes: ChangeSet) -> Self {
        Self {
            parents: Vec::new(),
            author,
            message: message.into(),
            kind: CommitKind::Standard,
            snapshot: Snapshot::Delta(changes),
            timestamp: None,
        }
    }

    /// A root commit carrying a full state.
    pub fn root(author: ActorId, message: impl Into<String>, entities: EntitySet) -> Self {
        Self {
            parents: Vec::new(),
            author,
            message: message.into(),
            kind: CommitKind::Standard,
            snapshot: Snapshot::Full(entities),
            timestamp: None,
        }
    }

    pub fn with_parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn with_kind(mut self, kind: CommitKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
