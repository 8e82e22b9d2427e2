//! Per-repository storage and numbering of pull requests and issues.

use std::collections::BTreeMap;

use strata_types::{ActorId, BranchId};

use crate::error::{Result, WorkflowError};
use crate::issue::{Issue, IssueKind, IssueStatus};
use crate::priority::Priority;
use crate::pull_request::{PrStatus, PullRequest};

/// Criteria for listing pull requests. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct PrFilter {
    pub status: Option<PrStatus>,
    pub author: Option<ActorId>,
    pub reviewer: Option<ActorId>,
    pub priority: Option<Priority>,
    /// Matches either the source or the target branch.
    pub branch: Option<BranchId>,
}

impl PrFilter {
    pub fn matches(&self, pr: &PullRequest) -> bool {
        self.status.map_or(true, |s| pr.status == s)
            && self.author.as_ref().map_or(true, |a| &pr.author == a)
            && self
                .reviewer
                .as_ref()
                .map_or(true, |r| pr.reviewers.contains(r))
            && self.priority.map_or(true, |p| pr.priority == p)
            && self
                .branch
                .map_or(true, |b| pr.source == b || pr.target == b)
    }
}

/// Criteria for listing issues. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub assignee: Option<ActorId>,
    pub reporter: Option<ActorId>,
    pub priority: Option<Priority>,
    pub kind: Option<IssueKind>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        self.status.map_or(true, |s| issue.status == s)
            && self
                .assignee
                .as_ref()
                .map_or(true, |a| issue.assignee.as_ref() == Some(a))
            && self.reporter.as_ref().map_or(true, |r| &issue.reporter == r)
            && self.priority.map_or(true, |p| issue.priority == p)
            && self.kind.map_or(true, |k| issue.kind == k)
    }
}

/// Pull requests and issues of one repository, keyed by number.
///
/// Numbers start at 1 and are never reused.
#[derive(Clone, Debug, Default)]
pub struct WorkBoard {
    pulls: BTreeMap<u64, PullRequest>,
    issues: BTreeMap<u64, Issue>,
    last_pull: u64,
    last_issue: u64,
}

impl WorkBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_pull_number(&self) -> u64 {
        self.last_pull + 1
    }

    pub fn next_issue_number(&self) -> u64 {
        self.last_issue + 1
    }

    pub fn pull(&self, number: u64) -> Result<&PullRequest> {
        self.pulls
            .get(&number)
            .ok_or(WorkflowError::PullRequestNotFound(number))
    }

    pub fn issue(&self, number: u64) -> Result<&Issue> {
        self.issues
            .get(&number)
            .ok_or(WorkflowError::IssueNotFound(number))
    }

    /// Insert or replace a pull request.
    pub fn save_pull(&mut self, pr: PullRequest) {
        self.last_pull = self.last_pull.max(pr.number);
        self.pulls.insert(pr.number, pr);
    }

    /// Insert or replace an issue.
    pub fn save_issue(&mut self, issue: Issue) {
        self.last_issue = self.last_issue.max(issue.number);
        self.issues.insert(issue.number, issue);
    }

    /// Fail if a non-terminal pull request already covers `source` → `target`.
    pub fn check_no_open_pull(&self, source: &BranchId, target: &BranchId) -> Result<()> {
        match self
            .pulls
            .values()
            .find(|pr| !pr.status.is_terminal() && &pr.source == source && &pr.target == target)
        {
            Some(existing) => Err(WorkflowError::DuplicatePullRequest {
                existing: existing.number,
            }),
            None => Ok(()),
        }
    }

    /// Matching pull requests, newest first.
    pub fn pulls(&self, filter: &PrFilter) -> Vec<&PullRequest> {
        self.pulls.values().rev().filter(|pr| filter.matches(pr)).collect()
    }

    /// Matching issues, newest first.
    pub fn issues(&self, filter: &IssueFilter) -> Vec<&Issue> {
        self.issues
            .values()
            .rev()
            .filter(|issue| filter.matches(issue))
            .collect()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.len()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}
