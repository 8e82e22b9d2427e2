//! The pull request state machine.
//!
//! ```text
//! open ──approve*──▶ approved ──merge──▶ merged
//!   │                   │
//!   └──────close────────┴──────▶ closed
//! ```
//!
//! `merge` from `open` is only possible when forced, and a forced merge is
//! recorded on the request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use strata_merge::MergeStrategy;
use strata_types::{ActorId, BranchId, CommitId, Timestamp};

use crate::error::{Result, WorkflowError};
use crate::priority::Priority;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    #[default]
    Open,
    Approved,
    Merged,
    Closed,
}

impl PrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Approved => "approved",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "approved" => Ok(Self::Approved),
            "merged" => Ok(Self::Merged),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown pull request status: {other}")),
        }
    }
}

/// What kind of work a pull request carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrKind {
    #[default]
    WorkOrder,
    ContractorWork,
    IssueFix,
}

impl PrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkOrder => "work_order",
            Self::ContractorWork => "contractor_work",
            Self::IssueFix => "issue_fix",
        }
    }
}

impl fmt::Display for PrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "work_order" => Ok(Self::WorkOrder),
            "contractor_work" | "contractor" => Ok(Self::ContractorWork),
            "issue_fix" => Ok(Self::IssueFix),
            other => Err(format!("unknown pull request type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub reviewer: ActorId,
    pub comment: Option<String>,
    pub at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: ActorId,
    pub body: String,
    pub at: Timestamp,
}

/// A request to open a pull request.
#[derive(Clone, Debug)]
pub struct NewPullRequest {
    pub title: String,
    pub description: Option<String>,
    pub source: BranchId,
    pub target: BranchId,
    pub author: ActorId,
    pub priority: Priority,
    pub kind: PrKind,
    pub labels: Vec<String>,
    pub reviewers: Vec<ActorId>,
    pub issue: Option<u64>,
}

impl NewPullRequest {
    pub fn new(title: impl Into<String>, source: BranchId, target: BranchId, author: ActorId) -> Self {
        Self {
            title: title.into(),
            description: None,
            source,
            target,
            author,
            priority: Priority::default(),
            kind: PrKind::default(),
            labels: Vec::new(),
            reviewers: Vec::new(),
            issue: None,
        }
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

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn reviewers(mut self, reviewers: Vec<ActorId>) -> Self {
        self.reviewers = reviewers;
        self
    }

    pub fn for_issue(mut self, issue: u64) -> Self {
        self.issue = Some(issue);
        self.kind = PrKind::IssueFix;
        self
    }
}

/// A reviewable proposal to merge one branch into another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub description: Option<String>,
    pub source: BranchId,
    pub target: BranchId,
    pub author: ActorId,
    pub status: PrStatus,
    pub priority: Priority,
    pub kind: PrKind,
    pub labels: Vec<String>,
    pub reviewers: Vec<ActorId>,
    pub approvals: Vec<Approval>,
    pub comments: Vec<Comment>,
    pub issue: Option<u64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub strategy: Option<MergeStrategy>,
    pub merged_at: Option<Timestamp>,
    pub merged_by: Option<ActorId>,
    pub merge_commit: Option<CommitId>,
    /// Merged from `open` without the required approvals.
    pub force_merged: bool,
    pub closed_at: Option<Timestamp>,
    pub closed_by: Option<ActorId>,
    pub close_reason: Option<String>,
}

impl PullRequest {
    /// Open a pull request with the given number.
    pub fn open(number: u64, request: NewPullRequest, now: Timestamp) -> Result<Self> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(WorkflowError::Validation("pull request title must not be empty".into()));
        }
        if request.source == request.target {
            return Err(WorkflowError::Validation(
                "source and target branches must differ".into(),
            ));
        }
        Ok(Self {
            number,
            title: title.to_string(),
            description: request.description,
            source: request.source,
            target: request.target,
            author: request.author,
            status: PrStatus::Open,
            priority: request.priority,
            kind: request.kind,
            labels: request.labels,
            reviewers: request.reviewers,
            approvals: Vec::new(),
            comments: Vec::new(),
            issue: request.issue,
            created_at: now,
            updated_at: now,
            strategy: None,
            merged_at: None,
            merged_by: None,
            merge_commit: None,
            force_merged: false,
            closed_at: None,
            closed_by: None,
            close_reason: None,
        })
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            subject: format!("pull request #{}", self.number),
            from: self.status.as_str(),
            action,
        }
    }

    pub fn has_approved(&self, reviewer: &ActorId) -> bool {
        self.approvals.iter().any(|a| &a.reviewer == reviewer)
    }

    /// Record an approval. Returns `true` if this approval moved the
    /// request to `approved`.
    ///
    /// Approving twice as the same reviewer changes nothing.
    pub fn approve(
        &mut self,
        reviewer: ActorId,
        comment: Option<String>,
        required: u32,
        now: Timestamp,
    ) -> Result<bool> {
        if self.status.is_terminal() {
            return Err(self.invalid("approve"));
        }
        if !self.has_approved(&reviewer) {
            if !self.reviewers.contains(&reviewer) {
                self.reviewers.push(reviewer.clone());
            }
            self.approvals.push(Approval {
                reviewer,
                comment,
                at: now,
            });
            self.updated_at = now;
        }
        if self.status == PrStatus::Open && self.approvals.len() >= required.max(1) as usize {
            self.status = PrStatus::Approved;
            self.updated_at = now;
            return Ok(true);
        }
        Ok(false)
    }

    /// Check that the request may be merged. Returns `true` if the merge
    /// bypasses review.
    pub fn check_mergeable(&self, force: bool, required: u32) -> Result<bool> {
        match self.status {
            PrStatus::Approved => Ok(false),
            PrStatus::Open if force => Ok(true),
            PrStatus::Open => Err(WorkflowError::NotApproved {
                number: self.number,
                approvals: self.approvals.len(),
                required,
            }),
            PrStatus::Merged | PrStatus::Closed => Err(self.invalid("merge")),
        }
    }

    pub fn mark_merged(
        &mut self,
        by: ActorId,
        commit: CommitId,
        strategy: MergeStrategy,
        forced: bool,
        now: Timestamp,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid("merge"));
        }
        self.status = PrStatus::Merged;
        self.merged_by = Some(by);
        self.merged_at = Some(now);
        self.merge_commit = Some(commit);
        self.strategy = Some(strategy);
        self.force_merged = forced;
        self.updated_at = now;
        Ok(())
    }

    pub fn close(&mut self, by: ActorId, reason: Option<String>, now: Timestamp) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid("close"));
        }
        self.status = PrStatus::Closed;
        self.closed_by = Some(by);
        self.closed_at = Some(now);
        self.close_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    /// Append a review comment. Allowed in every status.
    pub fn comment(&mut self, author: ActorId, body: impl Into<String>, now: Timestamp) -> Result<()> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(WorkflowError::Validation("comment must not be empty".into()));
        }
        self.comments.push(Comment {
            author,
            body,
            at: now,
        });
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pr() -> PullRequest {
        let request = NewPullRequest::new(
            "HVAC upgrade floor 3",
            BranchId::new(),
            BranchId::new(),
            ActorId::from("dana"),
        )
        .priority(Priority::High);
        PullRequest::open(1, request, Utc::now()).unwrap()
    }

    #[test]
    fn opens_in_open_state() {
        let pr = pr();
        assert_eq!(pr.status, PrStatus::Open);
        assert_eq!(pr.priority, Priority::High);
        assert!(pr.approvals.is_empty());
    }

    #[test]
    fn rejects_same_branch_and_blank_title() {
        let branch = BranchId::new();
        let same = NewPullRequest::new("x", branch, branch, ActorId::from("dana"));
        assert!(matches!(
            PullRequest::open(1, same, Utc::now()),
            Err(WorkflowError::Validation(_))
        ));
        let blank = NewPullRequest::new("  ", BranchId::new(), BranchId::new(), ActorId::from("dana"));
        assert!(PullRequest::open(1, blank, Utc::now()).is_err());
    }

    #[test]
    fn single_approval_approves_by_default() {
        let mut pr = pr();
        assert!(pr.approve(ActorId::from("eli"), None, 1, Utc::now()).unwrap());
        assert_eq!(pr.status, PrStatus::Approved);
        assert_eq!(pr.reviewers, vec![ActorId::from("eli")]);
    }

    #[test]
    fn reapproval_is_idempotent() {
        let mut pr = pr();
        assert!(!pr.approve(ActorId::from("eli"), None, 2, Utc::now()).unwrap());
        assert!(!pr.approve(ActorId::from("eli"), Some("again".into()), 2, Utc::now()).unwrap());
        assert_eq!(pr.approvals.len(), 1);
        assert_eq!(pr.status, PrStatus::Open);
        assert!(pr.approve(ActorId::from("fay"), None, 2, Utc::now()).unwrap());
        assert_eq!(pr.status, PrStatus::Approved);
        // Approving an approved request is accepted and changes nothing.
        assert!(!pr.approve(ActorId::from("fay"), None, 2, Utc::now()).unwrap());
    }

    #[test]
    fn merge_requires_approval_unless_forced() {
        let mut pr = pr();
        assert!(matches!(
            pr.check_mergeable(false, 1),
            Err(WorkflowError::NotApproved { approvals: 0, required: 1, .. })
        ));
        assert!(pr.check_mergeable(true, 1).unwrap());
        pr.approve(ActorId::from("eli"), None, 1, Utc::now()).unwrap();
        assert!(!pr.check_mergeable(false, 1).unwrap());

        pr.mark_merged(
            ActorId::from("eli"),
            CommitId::from_hash([7; 32]),
            MergeStrategy::Squash,
            false,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(pr.status, PrStatus::Merged);
        assert_eq!(pr.strategy, Some(MergeStrategy::Squash));
        assert!(pr.merged_at.is_some());
        assert!(pr.check_mergeable(true, 1).is_err());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut pr = pr();
        pr.close(ActorId::from("dana"), Some("superseded".into()), Utc::now())
            .unwrap();
        assert_eq!(pr.status, PrStatus::Closed);
        let err = pr.approve(ActorId::from("eli"), None, 1, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition {
                subject: "pull request #1".into(),
                from: "closed",
                action: "approve",
            }
        );
        assert!(pr.close(ActorId::from("dana"), None, Utc::now()).is_err());
        assert!(pr
            .mark_merged(
                ActorId::from("dana"),
                CommitId::from_hash([1; 32]),
                MergeStrategy::Merge,
                true,
                Utc::now()
            )
            .is_err());
    }

    #[test]
    fn comments_allowed_in_any_state() {
        let mut pr = pr();
        pr.comment(ActorId::from("eli"), "check damper sizes", Utc::now())
            .unwrap();
        pr.close(ActorId::from("dana"), None, Utc::now()).unwrap();
        pr.comment(ActorId::from("eli"), "closing note", Utc::now()).unwrap();
        assert_eq!(pr.comments.len(), 2);
        assert!(pr.comment(ActorId::from("eli"), " ", Utc::now()).is_err());
    }

    #[test]
    fn kinds_and_statuses_parse() {
        assert_eq!("contractor-work".parse::<PrKind>().unwrap(), PrKind::ContractorWork);
        assert_eq!("Approved".parse::<PrStatus>().unwrap(), PrStatus::Approved);
        assert!("draft".parse::<PrStatus>().is_err());
    }
}
