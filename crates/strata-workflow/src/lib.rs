//! Pull request and issue workflows for Strata.
//!
//! Both are plain state machines over serializable records. They never touch
//! the commit graph or branch registry themselves; the repository facade
//! performs the graph side effects (merging, creating branches) and then
//! applies the transition.
//!
//! # Key Types
//!
//! - [`PullRequest`] with [`PrStatus`]: `open → approved → merged`, or `closed`
//! - [`Issue`] with [`IssueStatus`]: `open → in_progress → resolved → closed`
//! - [`WorkBoard`]: numbering, lookup and filtered listing
//! - [`AutoAssignRule`]: assignment of new issues by type or equipment category

pub mod board;
pub mod error;
pub mod issue;
pub mod priority;
pub mod pull_request;

pub use board::{IssueFilter, PrFilter, WorkBoard};
pub use error::{Result, WorkflowError};
pub use issue::{
    pick_assignee, AutoAssignRule, Issue, IssueKind, IssueLinks, IssueStatus, NewIssue,
    ReportedVia,
};
pub use priority::Priority;
pub use pull_request::{Approval, Comment, NewPullRequest, PrKind, PrStatus, PullRequest};
