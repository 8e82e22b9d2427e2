//! Pull request operations.

use chrono::Utc;
use tracing::{info, warn};

use strata_fabric::{EventKind, Subject};
use strata_merge::MergeStrategy;
use strata_refs::BranchStatus;
use strata_types::{ActorId, Timestamp};
use strata_workflow::{NewPullRequest, PrFilter, PrKind, Priority, PullRequest};

use super::{MergeOutcome, Repository};
use crate::error::{EngineError, Result};
use crate::journal::JournalRecord;

/// Parameters for [`Repository::create_pull_request`]. Branches are named.
#[derive(Clone, Debug)]
pub struct PullRequestDraft {
    pub title: String,
    pub source: String,
    /// Defaults to the repository's default branch.
    pub target: Option<String>,
    pub description: Option<String>,
    pub priority: Priority,
    pub kind: PrKind,
    pub reviewers: Vec<ActorId>,
    pub labels: Vec<String>,
}

impl PullRequestDraft {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            target: None,
            description: None,
            priority: Priority::default(),
            kind: PrKind::default(),
            reviewers: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn kind(mut self, kind: PrKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn reviewers(mut self, reviewers: Vec<ActorId>) -> Self {
        self.reviewers = reviewers;
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

/// How to merge a pull request.
#[derive(Clone, Debug)]
pub struct MergeOptions {
    pub strategy: MergeStrategy,
    /// Merge an `open` request without the required approvals.
    pub force: bool,
    /// Retire the source branch as `merged` afterwards.
    pub delete_source: bool,
    pub message: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::Merge,
            force: false,
            delete_source: true,
            message: None,
        }
    }
}

/// Result of [`Repository::merge_pull_request`].
#[derive(Clone, Debug)]
pub struct MergedPullRequest {
    pub pull_request: PullRequest,
    pub outcome: MergeOutcome,
    /// Whether the source branch was retired.
    pub source_retired: bool,
}

impl Repository {
    pub fn create_pull_request(&self, draft: PullRequestDraft, author: ActorId) -> Result<PullRequest> {
        self.observe("pr_create", || {
            let pr = {
                let mut state = self.write()?;
                let source = state.branches.find(&draft.source)?.id;
                let target = match &draft.target {
                    Some(name) => state.branches.find(name)?.id,
                    None => self.default_branch_id(&state)?,
                };
                state.board.check_no_open_pull(&source, &target)?;

                let mut request = NewPullRequest::new(&draft.title, source, target, author)
                    .priority(draft.priority)
                    .kind(draft.kind)
                    .reviewers(draft.reviewers.clone())
                    .labels(draft.labels.clone());
                if let Some(description) = &draft.description {
                    request = request.description(description);
                }
                let pr = PullRequest::open(state.board.next_pull_number(), request, Utc::now())?;
                self.commit_batch(&mut state, vec![JournalRecord::PullRequestSaved(pr.clone())])?;
                pr
            };
            info!(number = pr.number, source = %draft.source, author = %pr.author, "opened pull request");
            Ok(pr)
        })
    }

    /// Record an approval. Approving twice as the same reviewer is a no-op.
    pub fn approve_pull_request(
        &self,
        number: u64,
        reviewer: ActorId,
        comment: Option<String>,
    ) -> Result<PullRequest> {
        self.observe("pr_approve", || {
            let required = self.config.required_approvals;
            let mut recorded = false;
            let pr = self.update_pull(number, |pr, now| {
                recorded = !pr.has_approved(&reviewer);
                pr.approve(reviewer.clone(), comment, required, now)?;
                Ok(())
            })?;
            if recorded {
                info!(number, reviewer = %reviewer, status = %pr.status, "approved pull request");
                self.publish(vec![self.event(
                    EventKind::PullRequestApproved,
                    Subject::PullRequest(number),
                    reviewer,
                    pr.updated_at,
                )]);
            }
            Ok(pr)
        })
    }

    /// Merge the source branch into the target and mark the request merged,
    /// as one journal entry.
    ///
    /// On conflict the request keeps its status and the error carries the
    /// conflict report.
    pub fn merge_pull_request(
        &self,
        number: u64,
        actor: ActorId,
        options: MergeOptions,
    ) -> Result<MergedPullRequest> {
        self.observe("pr_merge", || {
            let required = self.config.required_approvals;
            let (source, target) = {
                let state = self.read()?;
                let pr = state.board.pull(number)?;
                let forced = pr.check_mergeable(options.force, required)?;
                if forced {
                    if !self.config.allow_force_merge {
                        return Err(EngineError::ForceMergeDisabled);
                    }
                    warn!(
                        number,
                        by = %actor,
                        approvals = pr.approvals.len(),
                        required,
                        "force merging pull request without required approvals"
                    );
                }
                (pr.source, pr.target)
            };

            let mut merged = None;
            let mut source_retired = false;
            let outcome = self.land_merge(
                source,
                target,
                options.strategy,
                &actor,
                options.message.as_deref(),
                |state, outcome, now| {
                    let mut pr = state.board.pull(number)?.clone();
                    let forced = pr.check_mergeable(options.force, required)?;
                    pr.mark_merged(actor.clone(), outcome.commit, options.strategy, forced, now)?;
                    let mut batch = vec![JournalRecord::PullRequestSaved(pr.clone())];

                    source_retired = false;
                    if options.delete_source {
                        let checked_out = self.checked_out(state)?;
                        match state.branches.check_delete(&pr.source, checked_out.as_ref()) {
                            Ok(()) => {
                                batch.push(JournalRecord::BranchRetired {
                                    id: pr.source,
                                    status: BranchStatus::Merged,
                                    at: now,
                                });
                                source_retired = true;
                            }
                            Err(e) => warn!(number, error = %e, "keeping source branch"),
                        }
                    }
                    merged = Some(pr);
                    Ok(batch)
                },
            )?;

            let pull_request = merged.ok_or_else(|| {
                EngineError::Integrity(format!("pull request #{number} was not recorded as merged"))
            })?;
            if source_retired {
                self.evict_cache(&source);
            }
            info!(
                number,
                commit = %outcome.commit.short_hex(),
                forced = pull_request.force_merged,
                source_retired,
                "merged pull request"
            );
            self.publish(vec![self.event(
                EventKind::PullRequestMerged,
                Subject::PullRequest(number),
                actor,
                pull_request.merged_at.unwrap_or_else(Utc::now),
            )]);
            Ok(MergedPullRequest {
                pull_request,
                outcome,
                source_retired,
            })
        })
    }

    /// Close without merging. Branches and commits are untouched.
    pub fn close_pull_request(
        &self,
        number: u64,
        actor: ActorId,
        reason: Option<String>,
    ) -> Result<PullRequest> {
        self.observe("pr_close", || {
            let pr = self.update_pull(number, |pr, now| Ok(pr.close(actor.clone(), reason, now)?))?;
            info!(number, by = %actor, "closed pull request");
            self.publish(vec![self.event(
                EventKind::PullRequestClosed,
                Subject::PullRequest(number),
                actor,
                pr.updated_at,
            )]);
            Ok(pr)
        })
    }

    pub fn comment_pull_request(&self, number: u64, author: ActorId, body: &str) -> Result<PullRequest> {
        self.observe("pr_comment", || {
            self.update_pull(number, |pr, now| Ok(pr.comment(author, body, now)?))
        })
    }

    pub fn pull_request(&self, number: u64) -> Result<PullRequest> {
        self.observe("pr_show", || Ok(self.read()?.board.pull(number)?.clone()))
    }

    /// Matching pull requests, newest first.
    pub fn list_pull_requests(&self, filter: &PrFilter) -> Result<Vec<PullRequest>> {
        self.observe("pr_list", || {
            let state = self.read()?;
            Ok(state.board.pulls(filter).into_iter().cloned().collect())
        })
    }

    /// Apply `f` to a copy of the request and journal it if it changed.
    fn update_pull<F>(&self, number: u64, f: F) -> Result<PullRequest>
    where
        F: FnOnce(&mut PullRequest, Timestamp) -> Result<()>,
    {
        let mut state = self.write()?;
        let current = state.board.pull(number)?;
        let mut pr = current.clone();
        f(&mut pr, Utc::now())?;
        if &pr != current {
            self.commit_batch(&mut state, vec![JournalRecord::PullRequestSaved(pr.clone())])?;
        }
        Ok(pr)
    }
}
