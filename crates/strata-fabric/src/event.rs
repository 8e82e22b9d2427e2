use serde::{Deserialize, Serialize};

use strata_types::{ActorId, BranchId, RepositoryId, Timestamp};

/// Classification of engine events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PullRequestApproved,
    PullRequestMerged,
    PullRequestClosed,
    IssueAutoAssigned,
    IssueStarted,
    IssueResolved,
    IssueClosed,
    /// A branch tip moved to a new commit.
    BranchTipAdvanced,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequestApproved => "PullRequestApproved",
            Self::PullRequestMerged => "PullRequestMerged",
            Self::PullRequestClosed => "PullRequestClosed",
            Self::IssueAutoAssigned => "IssueAutoAssigned",
            Self::IssueStarted => "IssueStarted",
            Self::IssueResolved => "IssueResolved",
            Self::IssueClosed => "IssueClosed",
            Self::BranchTipAdvanced => "BranchTipAdvanced",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record an event is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    PullRequest(u64),
    Issue(u64),
    Branch(BranchId),
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PullRequest(n) => write!(f, "pr#{n}"),
            Self::Issue(n) => write!(f, "issue#{n}"),
            Self::Branch(id) => write!(f, "branch:{}", id.short_id()),
        }
    }
}

/// A structured notification emitted after a state change has been made
/// durable. Delivery and formatting belong to the subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub kind: EventKind,
    pub repository: RepositoryId,
    pub subject: Subject,
    pub actor: ActorId,
    pub timestamp: Timestamp,
}

impl EngineEvent {
    pub fn new(
        kind: EventKind,
        repository: RepositoryId,
        subject: Subject,
        actor: ActorId,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            kind,
            repository,
            subject,
            actor,
            timestamp,
        }
    }
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} by {}", self.kind, self.subject, self.actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn display_names_subject_and_actor() {
        let event = EngineEvent::new(
            EventKind::PullRequestMerged,
            RepositoryId::new(),
            Subject::PullRequest(7),
            ActorId::from("dana"),
            Utc::now(),
        );
        assert_eq!(event.to_string(), "PullRequestMerged pr#7 by dana");
        assert_eq!(Subject::Issue(3).to_string(), "issue#3");
    }

    #[test]
    fn events_survive_bincode() {
        let event = EngineEvent::new(
            EventKind::BranchTipAdvanced,
            RepositoryId::new(),
            Subject::Branch(BranchId::new()),
            ActorId::system(),
            Utc::now(),
        );
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: EngineEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
