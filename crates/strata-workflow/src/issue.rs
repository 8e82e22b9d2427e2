//! The issue state machine.
//!
//! ```text
//! open ──start──▶ in_progress ──resolve──▶ resolved ──close──▶ closed
//!   │                  │
//!   └──────close───────┴──────────────────────────────────────▶ closed
//! ```
//!
//! Starting work links a branch and a pull request; both links are set by
//! the same transition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use strata_types::{ActorId, BranchId, EntityId, Timestamp};

use crate::error::{Result, WorkflowError};
use crate::priority::Priority;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "started" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown issue status: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    #[default]
    Problem,
    Maintenance,
    Safety,
    Emergency,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::Maintenance => "maintenance",
            Self::Safety => "safety",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "problem" => Ok(Self::Problem),
            "maintenance" => Ok(Self::Maintenance),
            "safety" => Ok(Self::Safety),
            "emergency" => Ok(Self::Emergency),
            other => Err(format!("unknown issue type: {other}")),
        }
    }
}

/// Channel an issue was reported through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedVia {
    #[default]
    Cli,
    MobileAr,
    MobileApp,
    Api,
}

impl ReportedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::MobileAr => "mobile_ar",
            Self::MobileApp => "mobile_app",
            Self::Api => "api",
        }
    }
}

impl FromStr for ReportedVia {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "cli" => Ok(Self::Cli),
            "mobile_ar" | "ar" => Ok(Self::MobileAr),
            "mobile_app" | "mobile" => Ok(Self::MobileApp),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown report channel: {other}")),
        }
    }
}

/// Entities an issue is about. Each link is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLinks {
    pub room: Option<EntityId>,
    pub equipment: Option<EntityId>,
    pub control_point: Option<EntityId>,
}

impl IssueLinks {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, EntityId)> + '_ {
        [
            ("room", self.room),
            ("equipment", self.equipment),
            ("control_point", self.control_point),
        ]
        .into_iter()
        .filter_map(|(name, id)| id.map(|id| (name, id)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// A request to file an issue.
#[derive(Clone, Debug)]
pub struct NewIssue {
    pub title: String,
    pub body: Option<String>,
    pub kind: IssueKind,
    pub priority: Priority,
    pub reporter: ActorId,
    pub assignee: Option<ActorId>,
    pub links: IssueLinks,
    pub reported_via: ReportedVia,
}

impl NewIssue {
    pub fn new(title: impl Into<String>, reporter: ActorId) -> Self {
        Self {
            title: title.into(),
            body: None,
            kind: IssueKind::default(),
            priority: Priority::default(),
            reporter,
            assignee: None,
            links: IssueLinks::default(),
            reported_via: ReportedVia::default(),
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn kind(mut self, kind: IssueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn assignee(mut self, assignee: ActorId) -> Self {
        self.assignee = Some(assignee);
        self
    }

    pub fn room(mut self, room: EntityId) -> Self {
        self.links.room = Some(room);
        self
    }

    pub fn equipment(mut self, equipment: EntityId) -> Self {
        self.links.equipment = Some(equipment);
        self
    }

    pub fn control_point(mut self, point: EntityId) -> Self {
        self.links.control_point = Some(point);
        self
    }

    pub fn reported_via(mut self, via: ReportedVia) -> Self {
        self.reported_via = via;
        self
    }
}

/// A tracked unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub kind: IssueKind,
    pub priority: Priority,
    pub status: IssueStatus,
    pub reporter: ActorId,
    pub assignee: Option<ActorId>,
    pub auto_assigned: bool,
    pub links: IssueLinks,
    pub reported_via: ReportedVia,
    pub branch: Option<BranchId>,
    pub pull_request: Option<u64>,
    pub resolution: Option<String>,
    pub resolved_by: Option<ActorId>,
    pub close_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
}

impl Issue {
    pub fn open(number: u64, request: NewIssue, now: Timestamp) -> Result<Self> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(WorkflowError::Validation("issue title must not be empty".into()));
        }
        Ok(Self {
            number,
            title: title.to_string(),
            body: request.body,
            kind: request.kind,
            priority: request.priority,
            status: IssueStatus::Open,
            reporter: request.reporter,
            assignee: request.assignee,
            auto_assigned: false,
            links: request.links,
            reported_via: request.reported_via,
            branch: None,
            pull_request: None,
            resolution: None,
            resolved_by: None,
            close_reason: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            resolved_at: None,
            closed_at: None,
        })
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            subject: format!("issue #{}", self.number),
            from: self.status.as_str(),
            action,
        }
    }

    /// Assign by rule. Never overrides an explicit assignee.
    pub fn auto_assign(&mut self, assignee: ActorId) -> bool {
        if self.assignee.is_some() {
            return false;
        }
        self.assignee = Some(assignee);
        self.auto_assigned = true;
        true
    }

    /// Check that work can start, before any branch is created.
    pub fn check_start(&self) -> Result<()> {
        match self.status {
            IssueStatus::Open => Ok(()),
            _ => Err(self.invalid("start work on")),
        }
    }

    /// Move to `in_progress`, linking the branch and pull request together.
    pub fn start(
        &mut self,
        worker: ActorId,
        branch: BranchId,
        pull_request: u64,
        now: Timestamp,
    ) -> Result<()> {
        self.check_start()?;
        self.status = IssueStatus::InProgress;
        self.branch = Some(branch);
        self.pull_request = Some(pull_request);
        if self.assignee.is_none() {
            self.assignee = Some(worker);
        }
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn resolve(&mut self, by: ActorId, notes: impl Into<String>, now: Timestamp) -> Result<()> {
        if self.status != IssueStatus::InProgress {
            return Err(self.invalid("resolve"));
        }
        self.status = IssueStatus::Resolved;
        self.resolution = Some(notes.into());
        self.resolved_by = Some(by);
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn close(&mut self, reason: Option<String>, now: Timestamp) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid("close"));
        }
        self.status = IssueStatus::Closed;
        self.close_reason = reason;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

/// Assigns new issues matching an issue type and/or the category of the
/// linked equipment. A rule without criteria matches every issue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAssignRule {
    #[serde(default)]
    pub issue_type: Option<IssueKind>,
    #[serde(default)]
    pub equipment_category: Option<String>,
    pub assignee: ActorId,
}

impl AutoAssignRule {
    pub fn matches(&self, kind: IssueKind, equipment_category: Option<&str>) -> bool {
        let kind_ok = self.issue_type.map_or(true, |k| k == kind);
        let category_ok = match (&self.equipment_category, equipment_category) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        };
        kind_ok && category_ok
    }
}

/// The assignee of the first matching rule.
pub fn pick_assignee<'a>(
    rules: &'a [AutoAssignRule],
    kind: IssueKind,
    equipment_category: Option<&str>,
) -> Option<&'a ActorId> {
    rules
        .iter()
        .find(|rule| rule.matches(kind, equipment_category))
        .map(|rule| &rule.assignee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn issue() -> Issue {
        let request = NewIssue::new("Leak above room 204", ActorId::from("dana"))
            .kind(IssueKind::Maintenance)
            .room(EntityId::new());
        Issue::open(1, request, Utc::now()).unwrap()
    }

    #[test]
    fn full_lifecycle_visits_each_state() {
        let mut issue = issue();
        let mut seen = vec![issue.status];
        issue
            .start(ActorId::from("eli"), BranchId::new(), 4, Utc::now())
            .unwrap();
        seen.push(issue.status);
        issue.resolve(ActorId::from("eli"), "patched pipe", Utc::now()).unwrap();
        seen.push(issue.status);
        issue.close(None, Utc::now()).unwrap();
        seen.push(issue.status);
        assert_eq!(
            seen,
            vec![
                IssueStatus::Open,
                IssueStatus::InProgress,
                IssueStatus::Resolved,
                IssueStatus::Closed
            ]
        );
        assert_eq!(issue.pull_request, Some(4));
        assert_eq!(issue.assignee, Some(ActorId::from("eli")));
        assert_eq!(issue.resolution.as_deref(), Some("patched pipe"));
    }

    #[test]
    fn start_only_from_open() {
        let mut issue = issue();
        issue
            .start(ActorId::from("eli"), BranchId::new(), 1, Utc::now())
            .unwrap();
        assert!(matches!(
            issue.start(ActorId::from("eli"), BranchId::new(), 2, Utc::now()),
            Err(WorkflowError::InvalidTransition { from: "in_progress", .. })
        ));
        assert_eq!(issue.pull_request, Some(1));
    }

    #[test]
    fn resolve_requires_in_progress() {
        let mut issue = issue();
        assert!(issue.resolve(ActorId::from("eli"), "n/a", Utc::now()).is_err());
        assert_eq!(issue.status, IssueStatus::Open);
    }

    #[test]
    fn close_from_any_non_terminal_state() {
        let mut open = issue();
        open.close(Some("duplicate".into()), Utc::now()).unwrap();
        assert!(open.close(None, Utc::now()).is_err());

        let mut started = issue();
        started
            .start(ActorId::from("eli"), BranchId::new(), 1, Utc::now())
            .unwrap();
        started.close(None, Utc::now()).unwrap();
        assert_eq!(started.status, IssueStatus::Closed);
    }

    #[test]
    fn auto_assign_respects_explicit_assignee() {
        let mut issue = issue();
        assert!(issue.auto_assign(ActorId::from("hvac-team")));
        assert!(issue.auto_assigned);
        assert!(!issue.auto_assign(ActorId::from("someone-else")));
        assert_eq!(issue.assignee, Some(ActorId::from("hvac-team")));
    }

    #[test]
    fn rules_match_type_and_category() {
        let rules = vec![
            AutoAssignRule {
                issue_type: Some(IssueKind::Safety),
                equipment_category: None,
                assignee: ActorId::from("safety-officer"),
            },
            AutoAssignRule {
                issue_type: None,
                equipment_category: Some("HVAC".into()),
                assignee: ActorId::from("hvac-team"),
            },
        ];
        assert_eq!(
            pick_assignee(&rules, IssueKind::Safety, Some("hvac")),
            Some(&ActorId::from("safety-officer"))
        );
        assert_eq!(
            pick_assignee(&rules, IssueKind::Problem, Some("hvac")),
            Some(&ActorId::from("hvac-team"))
        );
        assert_eq!(pick_assignee(&rules, IssueKind::Problem, None), None);
    }

    #[test]
    fn rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            auto_assign: Vec<AutoAssignRule>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [[auto_assign]]
            issue_type = "emergency"
            assignee = "on-call"

            [[auto_assign]]
            equipment_category = "electrical"
            assignee = "sparky"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.auto_assign.len(), 2);
        assert_eq!(parsed.auto_assign[0].issue_type, Some(IssueKind::Emergency));
        assert_eq!(parsed.auto_assign[1].assignee, ActorId::from("sparky"));
    }

    #[test]
    fn links_iterate_in_order() {
        let room = EntityId::new();
        let point = EntityId::new();
        let links = IssueLinks {
            room: Some(room),
            equipment: None,
            control_point: Some(point),
        };
        let listed: Vec<_> = links.iter().collect();
        assert_eq!(listed, vec![("room", room), ("control_point", point)]);
        assert!(IssueLinks::default().is_empty());
    }
}
