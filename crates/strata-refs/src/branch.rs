//! Branch records and the requests that create them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use strata_types::{ActorId, BranchId, CommitId, Timestamp};

/// What a branch is used for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchKind {
    /// The repository's default line of history.
    Main,
    #[default]
    Feature,
    Bugfix,
    Release,
    /// Work delivered by an outside contractor.
    Contractor,
    /// Created by starting work on an issue.
    Issue,
}

impl BranchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Release => "release",
            Self::Contractor => "contractor",
            Self::Issue => "issue",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "feature" => Ok(Self::Feature),
            "bugfix" | "fix" => Ok(Self::Bugfix),
            "release" => Ok(Self::Release),
            "contractor" => Ok(Self::Contractor),
            "issue" => Ok(Self::Issue),
            other => Err(format!("unknown branch type: {other}")),
        }
    }
}

/// Lifecycle of a branch. Only active branches move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchStatus {
    #[default]
    Active,
    /// Retired after its work landed through a pull request.
    Merged,
    /// Retired by deletion.
    Archived,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Merged => "merged",
            Self::Archived => "archived",
        }
    }

    pub fn is_retired(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "merged" => Ok(Self::Merged),
            "archived" | "deleted" => Ok(Self::Archived),
            other => Err(format!("unknown branch status: {other}")),
        }
    }
}

/// A named, movable pointer to a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub tip: CommitId,
    pub kind: BranchKind,
    pub status: BranchStatus,
    pub protected: bool,
    pub is_default: bool,
    pub description: Option<String>,
    pub created_by: ActorId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub retired_at: Option<Timestamp>,
}

impl Branch {
    /// Protected and default branches can never be deleted.
    pub fn is_guarded(&self) -> bool {
        self.protected || self.is_default
    }

    pub fn is_active(&self) -> bool {
        self.status == BranchStatus::Active
    }
}

/// A request to create a branch at an existing commit.
#[derive(Clone, Debug)]
pub struct NewBranch {
    pub name: String,
    pub base: CommitId,
    pub kind: BranchKind,
    pub description: Option<String>,
    pub protected: bool,
    pub is_default: bool,
    pub created_by: ActorId,
}

impl NewBranch {
    pub fn new(name: impl Into<String>, base: CommitId, created_by: ActorId) -> Self {
        Self {
            name: name.into(),
            base,
            kind: BranchKind::default(),
            description: None,
            protected: false,
            is_default: false,
            created_by,
        }
    }

    pub fn kind(mut self, kind: BranchKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// Marks the branch as the repository default. Implies protection.
    pub fn default_branch(mut self) -> Self {
        self.is_default = true;
        self.protected = true;
        self.kind = BranchKind::Main;
        self
    }
}

/// A tip movement, as recorded in the journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipUpdate {
    pub branch: BranchId,
    pub from: CommitId,
    pub to: CommitId,
    pub at: Timestamp,
}

/// Criteria for listing branches. Empty criteria list every active branch.
#[derive(Clone, Debug, Default)]
pub struct BranchFilter {
    /// Exact status. `None` means active branches only.
    pub status: Option<BranchStatus>,
    pub kind: Option<BranchKind>,
    pub created_by: Option<ActorId>,
    pub name_prefix: Option<String>,
}

impl BranchFilter {
    pub fn matches(&self, branch: &Branch) -> bool {
        let status = self.status.unwrap_or(BranchStatus::Active);
        branch.status == status
            && self.kind.map_or(true, |k| branch.kind == k)
            && self
                .created_by
                .as_ref()
                .map_or(true, |actor| &branch.created_by == actor)
            && self
                .name_prefix
                .as_deref()
                .map_or(true, |prefix| branch.name.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn branch(name: &str, kind: BranchKind) -> Branch {
        let now = Utc::now();
        Branch {
            id: BranchId::new(),
            name: name.into(),
            tip: CommitId::from_hash([1; 32]),
            kind,
            status: BranchStatus::Active,
            protected: false,
            is_default: false,
            description: None,
            created_by: ActorId::from("dana"),
            created_at: now,
            updated_at: now,
            retired_at: None,
        }
    }

    #[test]
    fn kinds_and_statuses_parse() {
        assert_eq!("Contractor".parse::<BranchKind>().unwrap(), BranchKind::Contractor);
        assert_eq!("fix".parse::<BranchKind>().unwrap(), BranchKind::Bugfix);
        assert!("tag".parse::<BranchKind>().is_err());
        assert_eq!("deleted".parse::<BranchStatus>().unwrap(), BranchStatus::Archived);
        assert!(BranchStatus::Merged.is_retired());
        assert!(!BranchStatus::Active.is_retired());
    }

    #[test]
    fn default_request_is_guarded() {
        let req = NewBranch::new("main", CommitId::from_hash([0; 32]), ActorId::system())
            .default_branch();
        assert!(req.protected && req.is_default);
        assert_eq!(req.kind, BranchKind::Main);
    }

    #[test]
    fn filter_defaults_to_active() {
        let mut b = branch("feature/hvac", BranchKind::Feature);
        assert!(BranchFilter::default().matches(&b));
        b.status = BranchStatus::Archived;
        assert!(!BranchFilter::default().matches(&b));
        let archived = BranchFilter {
            status: Some(BranchStatus::Archived),
            ..Default::default()
        };
        assert!(archived.matches(&b));
    }

    #[test]
    fn filter_combines_criteria() {
        let b = branch("contractor/acme", BranchKind::Contractor);
        let filter = BranchFilter {
            kind: Some(BranchKind::Contractor),
            created_by: Some(ActorId::from("dana")),
            name_prefix: Some("contractor/".into()),
            ..Default::default()
        };
        assert!(filter.matches(&b));
        let other_author = BranchFilter {
            created_by: Some(ActorId::from("eli")),
            ..Default::default()
        };
        assert!(!other_author.matches(&b));
    }
}
