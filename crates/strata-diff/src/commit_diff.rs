//! Diffs between commits.
//!
//! [`DiffEngine::diff`] is the merge-base ("three-dot") diff: what `b`
//! changed since it diverged from `a`. [`DiffEngine::compare`] is the
//! direct ("two-dot") diff of the two states.

use std::collections::BTreeSet;

use tracing::debug;

use strata_dag::CommitGraph;
use strata_types::{ChangeSet, CommitId, EntityId};

use crate::entity_diff::{diff_over, diff_sets};
use crate::error::DiffResult;

/// A change set together with the commits it was computed from.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitDiff {
    pub from: CommitId,
    pub to: CommitId,
    /// The state the changes are relative to: the merge base for
    /// [`DiffEngine::diff`], `from` itself for [`DiffEngine::compare`].
    pub base: CommitId,
    pub changes: ChangeSet,
}

impl CommitDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Computes change sets over a commit graph.
#[derive(Clone, Copy)]
pub struct DiffEngine<'g> {
    graph: &'g CommitGraph,
}

impl<'g> DiffEngine<'g> {
    pub fn new(graph: &'g CommitGraph) -> Self {
        Self { graph }
    }

    /// Changes on `b` since its merge base with `a`.
    ///
    /// Every entity present in `a` or `b` is compared between the merge base
    /// and `b`. When `a` is an ancestor of `b` this is exactly the change set
    /// that turns `a` into `b`.
    pub fn diff(&self, a: &CommitId, b: &CommitId) -> DiffResult<CommitDiff> {
        let base = self.graph.merge_base(a, b)?;
        let base_state = self.graph.materialize(&base)?;
        let a_state = if base == *a {
            base_state.clone()
        } else {
            self.graph.materialize(a)?
        };
        let b_state = self.graph.materialize(b)?;

        let ids: BTreeSet<&EntityId> = a_state.ids().chain(b_state.ids()).collect();
        let changes = diff_over(ids, &base_state, &b_state)?;
        debug!(
            from = %a.short_hex(),
            to = %b.short_hex(),
            base = %base.short_hex(),
            changes = changes.len(),
            "computed diff"
        );
        Ok(CommitDiff {
            from: *a,
            to: *b,
            base,
            changes,
        })
    }

    /// Direct comparison of the states at `a` and `b`.
    pub fn compare(&self, a: &CommitId, b: &CommitId) -> DiffResult<CommitDiff> {
        let a_state = self.graph.materialize(a)?;
        let b_state = self.graph.materialize(b)?;
        let changes = diff_sets(&a_state, &b_state)?;
        Ok(CommitDiff {
            from: *a,
            to: *b,
            base: *a,
            changes,
        })
    }
}
