//! Error types for workflow transitions.

use thiserror::Error;

/// Errors raised by pull request and issue state machines.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// The action is not allowed from the record's current status.
    #[error("cannot {action} {subject}: it is {from}")]
    InvalidTransition {
        subject: String,
        from: &'static str,
        action: &'static str,
    },

    /// Merging without enough approvals and without forcing.
    #[error("pull request #{number} has {approvals} of {required} required approvals")]
    NotApproved {
        number: u64,
        approvals: usize,
        required: u32,
    },

    #[error("pull request #{0} not found")]
    PullRequestNotFound(u64),

    #[error("issue #{0} not found")]
    IssueNotFound(u64),

    /// An open pull request already covers the same source and target.
    #[error("pull request #{existing} is already open for these branches")]
    DuplicatePullRequest { existing: u64 },

    /// Malformed input, such as an empty title.
    #[error("{0}")]
    Validation(String),
}

/// Convenience type alias for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
