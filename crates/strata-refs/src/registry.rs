//! The branch registry: name → tip mapping for one repository.
//!
//! The registry holds no lock of its own. The repository facade guards it
//! together with the commit graph, and tip movement is a compare-and-swap
//! against the tip the caller planned from: [`BranchRegistry::advance_tip`]
//! fails with [`RefError::ConcurrentModification`] when the branch moved.
//!
//! Every mutation is split into a read-only `check_*`/`prepare_*` step and an
//! infallible-by-construction apply step, so callers can journal the change
//! between the two.

use std::collections::HashMap;

use tracing::debug;

use strata_dag::{Commit, CommitGraph};
use strata_types::{BranchId, CommitId, Timestamp};

use crate::branch::{Branch, BranchFilter, BranchStatus, NewBranch, TipUpdate};
use crate::error::{RefError, Result};
use crate::names::validate_branch_name;

/// Active and retired branches of one repository.
#[derive(Debug, Default)]
pub struct BranchRegistry {
    live: HashMap<BranchId, Branch>,
    by_name: HashMap<String, BranchId>,
    retired: HashMap<BranchId, Branch>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active branches.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// Any branch by id, active or retired.
    pub fn get(&self, id: &BranchId) -> Result<&Branch> {
        self.live
            .get(id)
            .or_else(|| self.retired.get(id))
            .ok_or_else(|| RefError::NotFound {
                name: id.to_string(),
            })
    }

    /// An active branch by id.
    pub fn active(&self, id: &BranchId) -> Result<&Branch> {
        match self.live.get(id) {
            Some(branch) => Ok(branch),
            None => match self.retired.get(id) {
                Some(branch) => Err(RefError::Retired {
                    name: branch.name.clone(),
                }),
                None => Err(RefError::NotFound {
                    name: id.to_string(),
                }),
            },
        }
    }

    /// An active branch by name.
    pub fn find(&self, name: &str) -> Result<&Branch> {
        self.by_name
            .get(name)
            .and_then(|id| self.live.get(id))
            .ok_or_else(|| RefError::NotFound { name: name.into() })
    }

    pub fn default_branch(&self) -> Option<&Branch> {
        self.live.values().find(|b| b.is_default)
    }

    /// Branches matching `filter`, sorted by name.
    pub fn list(&self, filter: &BranchFilter) -> Vec<&Branch> {
        let mut branches: Vec<&Branch> = self
            .live
            .values()
            .chain(self.retired.values())
            .filter(|b| filter.matches(b))
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        branches
    }

    // ---------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------

    /// Validate a creation request and build the branch record.
    pub fn prepare_create(
        &self,
        request: NewBranch,
        graph: &CommitGraph,
        now: Timestamp,
    ) -> Result<Branch> {
        validate_branch_name(&request.name)?;
        if self.by_name.contains_key(&request.name) {
            return Err(RefError::DuplicateBranchName { name: request.name });
        }
        if request.is_default {
            if let Some(existing) = self.default_branch() {
                return Err(RefError::DefaultExists {
                    name: existing.name.clone(),
                });
            }
        }
        graph.resolve(&request.base)?;

        Ok(Branch {
            id: BranchId::new(),
            name: request.name,
            tip: request.base,
            kind: request.kind,
            status: BranchStatus::Active,
            protected: request.protected || request.is_default,
            is_default: request.is_default,
            description: request.description,
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
            retired_at: None,
        })
    }

    /// Register a prepared (or replayed) active branch.
    pub fn insert(&mut self, branch: Branch) -> Result<()> {
        if self.by_name.contains_key(&branch.name) {
            return Err(RefError::DuplicateBranchName { name: branch.name });
        }
        debug!(branch = %branch.name, tip = %branch.tip.short_hex(), "created branch");
        self.by_name.insert(branch.name.clone(), branch.id);
        self.live.insert(branch.id, branch);
        Ok(())
    }

    /// Create a branch in one step.
    pub fn create(
        &mut self,
        request: NewBranch,
        graph: &CommitGraph,
        now: Timestamp,
    ) -> Result<Branch> {
        let branch = self.prepare_create(request, graph, now)?;
        self.insert(branch.clone())?;
        Ok(branch)
    }

    /// Drop a branch without leaving a retired record.
    ///
    /// Only for compensating a creation that never became durable.
    pub fn discard(&mut self, id: &BranchId) -> Option<Branch> {
        let branch = self.live.remove(id)?;
        self.by_name.remove(&branch.name);
        debug!(branch = %branch.name, "discarded branch");
        Some(branch)
    }

    // ---------------------------------------------------------------
    // Tip movement
    // ---------------------------------------------------------------

    /// Check that `candidate` may become the tip of `id`, given that the
    /// caller planned against `expected`.
    ///
    /// Accepted when the tip still equals `expected` and either `candidate`
    /// descends from it through one of its parents, or `candidate` is a merge
    /// commit whose first parent is `expected`. Re-pointing to the current
    /// tip is a no-op and always accepted.
    pub fn check_advance(
        &self,
        id: &BranchId,
        expected: &CommitId,
        candidate: &Commit,
        graph: &CommitGraph,
    ) -> Result<()> {
        let branch = self.active(id)?;
        if branch.tip != *expected {
            return Err(RefError::ConcurrentModification {
                name: branch.name.clone(),
                expected: *expected,
                actual: branch.tip,
            });
        }
        if candidate.id == branch.tip {
            return Ok(());
        }
        if candidate.is_merge() && candidate.first_parent() == Some(&branch.tip) {
            return Ok(());
        }
        for parent in &candidate.parents {
            if graph.is_ancestor(&branch.tip, parent)? {
                return Ok(());
            }
        }
        Err(RefError::NonLinearAdvance {
            name: branch.name.clone(),
            from: branch.tip,
            to: candidate.id,
        })
    }

    /// Move the tip after [`check_advance`](Self::check_advance) has passed.
    ///
    /// `candidate` must already be in the graph.
    pub fn advance_tip(
        &mut self,
        id: &BranchId,
        expected: &CommitId,
        candidate: &Commit,
        graph: &CommitGraph,
        now: Timestamp,
    ) -> Result<TipUpdate> {
        self.check_advance(id, expected, candidate, graph)?;
        graph.resolve(&candidate.id)?;
        let update = TipUpdate {
            branch: *id,
            from: *expected,
            to: candidate.id,
            at: now,
        };
        self.apply_tip(&update)?;
        Ok(update)
    }

    /// Apply a recorded tip movement without ancestry checks (journal replay).
    pub fn apply_tip(&mut self, update: &TipUpdate) -> Result<()> {
        let branch = self.live.get_mut(&update.branch).ok_or_else(|| RefError::NotFound {
            name: update.branch.to_string(),
        })?;
        branch.tip = update.to;
        branch.updated_at = update.at;
        debug!(
            branch = %branch.name,
            from = %update.from.short_hex(),
            to = %update.to.short_hex(),
            "advanced tip"
        );
        Ok(())
    }

    // ---------------------------------------------------------------
    // Retirement
    // ---------------------------------------------------------------

    /// Check that `id` may be deleted by a caller whose current branch is
    /// `checked_out`.
    pub fn check_delete(&self, id: &BranchId, checked_out: Option<&BranchId>) -> Result<()> {
        let branch = self.active(id)?;
        if branch.is_guarded() {
            return Err(RefError::ProtectedBranch {
                name: branch.name.clone(),
            });
        }
        if checked_out == Some(id) {
            return Err(RefError::ActiveCheckout {
                name: branch.name.clone(),
            });
        }
        Ok(())
    }

    /// Move an active branch to the retired set; its name becomes free.
    pub fn retire(
        &mut self,
        id: &BranchId,
        status: BranchStatus,
        now: Timestamp,
    ) -> Result<Branch> {
        let mut branch = self.live.remove(id).ok_or_else(|| RefError::NotFound {
            name: id.to_string(),
        })?;
        self.by_name.remove(&branch.name);
        branch.status = if status.is_retired() {
            status
        } else {
            BranchStatus::Archived
        };
        branch.retired_at = Some(now);
        debug!(branch = %branch.name, status = %branch.status, "retired branch");
        self.retired.insert(branch.id, branch.clone());
        Ok(branch)
    }

    /// Delete a branch: check, then retire it as archived.
    pub fn delete(
        &mut self,
        id: &BranchId,
        checked_out: Option<&BranchId>,
        now: Timestamp,
    ) -> Result<Branch> {
        self.check_delete(id, checked_out)?;
        self.retire(id, BranchStatus::Archived, now)
    }
}
