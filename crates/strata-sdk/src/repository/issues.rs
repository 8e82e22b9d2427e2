//! Issue operations, including the start-work compound operation.

use chrono::Utc;
use tracing::info;

use strata_fabric::{EventKind, Subject};
use strata_refs::{issue_branch_name, Branch, BranchKind, NewBranch};
use strata_store::EntitySet;
use strata_types::{ActorId, EntityKind, EntityPayload, Timestamp};
use strata_workflow::{pick_assignee, Issue, IssueFilter, IssueLinks, NewIssue, NewPullRequest, PullRequest};

use super::Repository;
use crate::error::{EngineError, Result};
use crate::journal::JournalRecord;

/// Everything [`Repository::start_work`] created.
#[derive(Clone, Debug)]
pub struct StartedWork {
    pub issue: Issue,
    pub branch: Branch,
    pub pull_request: PullRequest,
}

impl Repository {
    /// Open an issue. Entity links are checked against the default branch,
    /// and auto-assignment rules run when no assignee was given.
    pub fn create_issue(&self, request: NewIssue) -> Result<Issue> {
        self.observe("issue_create", || {
            let now = Utc::now();
            let issue = {
                let mut state = self.write()?;
                let tip = state.branches.find(&self.config.default_branch)?.tip;
                let entities = state.graph.materialize(&tip)?;
                check_links(&entities, &request.links)?;
                let category = equipment_category(&entities, &request.links);

                let mut issue = Issue::open(state.board.next_issue_number(), request, now)?;
                if let Some(assignee) =
                    pick_assignee(&self.config.auto_assign, issue.kind, category.as_deref())
                {
                    issue.auto_assign(assignee.clone());
                }
                self.commit_batch(&mut state, vec![JournalRecord::IssueSaved(issue.clone())])?;
                issue
            };

            info!(number = issue.number, kind = %issue.kind, reporter = %issue.reporter, "opened issue");
            if issue.auto_assigned {
                if let Some(assignee) = &issue.assignee {
                    info!(number = issue.number, assignee = %assignee, "auto-assigned issue");
                    self.publish(vec![self.event(
                        EventKind::IssueAutoAssigned,
                        Subject::Issue(issue.number),
                        assignee.clone(),
                        now,
                    )]);
                }
            }
            Ok(issue)
        })
    }

    /// Create the issue's work branch from the default tip and a pull request
    /// back into the default branch, and move the issue to `in_progress`.
    ///
    /// All three records are validated first and journaled as one entry, so
    /// either all of them exist afterwards or none do.
    pub fn start_work(&self, number: u64, worker: ActorId) -> Result<StartedWork> {
        self.observe("issue_start", || {
            let now = Utc::now();
            let started = {
                let mut state = self.write()?;
                let mut issue = state.board.issue(number)?.clone();
                issue.check_start()?;
                let default = state.branches.find(&self.config.default_branch)?.clone();

                let branch = state.branches.prepare_create(
                    NewBranch::new(issue_branch_name(number, &issue.title), default.tip, worker.clone())
                        .kind(BranchKind::Issue)
                        .description(format!("Work on issue #{number}")),
                    &state.graph,
                    now,
                )?;
                let pull_request = PullRequest::open(
                    state.board.next_pull_number(),
                    NewPullRequest::new(
                        format!("Fix #{number}: {}", issue.title),
                        branch.id,
                        default.id,
                        worker.clone(),
                    )
                    .for_issue(number)
                    .priority(issue.priority)
                    .description(format!("Resolves issue #{number}")),
                    now,
                )?;
                issue.start(worker.clone(), branch.id, pull_request.number, now)?;

                self.commit_batch(
                    &mut state,
                    vec![
                        JournalRecord::BranchCreated(branch.clone()),
                        JournalRecord::PullRequestSaved(pull_request.clone()),
                        JournalRecord::IssueSaved(issue.clone()),
                    ],
                )?;
                StartedWork {
                    issue,
                    branch,
                    pull_request,
                }
            };

            info!(
                number,
                branch = %started.branch.name,
                pull_request = started.pull_request.number,
                worker = %worker,
                "started work on issue"
            );
            self.refresh_cache(&started.branch.id);
            self.publish(vec![self.event(
                EventKind::IssueStarted,
                Subject::Issue(number),
                worker,
                now,
            )]);
            Ok(started)
        })
    }

    /// Mark the work done. The pull request is not merged.
    pub fn resolve_issue(&self, number: u64, by: ActorId, notes: &str) -> Result<Issue> {
        self.observe("issue_resolve", || {
            let issue = self.update_issue(number, |issue, now| Ok(issue.resolve(by.clone(), notes, now)?))?;
            info!(number, by = %by, "resolved issue");
            self.publish(vec![self.event(
                EventKind::IssueResolved,
                Subject::Issue(number),
                by,
                issue.updated_at,
            )]);
            Ok(issue)
        })
    }

    pub fn close_issue(&self, number: u64, actor: ActorId, reason: Option<String>) -> Result<Issue> {
        self.observe("issue_close", || {
            let issue = self.update_issue(number, |issue, now| Ok(issue.close(reason, now)?))?;
            info!(number, by = %actor, "closed issue");
            self.publish(vec![self.event(
                EventKind::IssueClosed,
                Subject::Issue(number),
                actor,
                issue.updated_at,
            )]);
            Ok(issue)
        })
    }

    pub fn issue(&self, number: u64) -> Result<Issue> {
        self.observe("issue_show", || Ok(self.read()?.board.issue(number)?.clone()))
    }

    /// Matching issues, newest first.
    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.observe("issue_list", || {
            let state = self.read()?;
            Ok(state.board.issues(filter).into_iter().cloned().collect())
        })
    }

    fn update_issue<F>(&self, number: u64, f: F) -> Result<Issue>
    where
        F: FnOnce(&mut Issue, Timestamp) -> Result<()>,
    {
        let mut state = self.write()?;
        let mut issue = state.board.issue(number)?.clone();
        f(&mut issue, Utc::now())?;
        self.commit_batch(&mut state, vec![JournalRecord::IssueSaved(issue.clone())])?;
        Ok(issue)
    }
}

fn check_links(entities: &EntitySet, links: &IssueLinks) -> Result<()> {
    for (field, id) in links.iter() {
        let expected = match field {
            "room" => EntityKind::Room,
            "equipment" => EntityKind::Equipment,
            _ => EntityKind::ControlPoint,
        };
        let entity = entities.get(&id).ok_or_else(|| EngineError::InvalidLink {
            field,
            id,
            reason: "no such entity on the default branch".into(),
        })?;
        if entity.kind() != expected {
            return Err(EngineError::InvalidLink {
                field,
                id,
                reason: format!("expected {expected}, found {}", entity.kind()),
            });
        }
    }
    Ok(())
}

/// Category of the linked equipment, or of the equipment owning the linked point.
fn equipment_category(entities: &EntitySet, links: &IssueLinks) -> Option<String> {
    let equipment = links.equipment.or_else(|| {
        links
            .control_point
            .and_then(|point| entities.get(&point))
            .and_then(|point| point.parent)
    })?;
    match &entities.get(&equipment)?.payload {
        EntityPayload::Equipment(eq) => Some(eq.category.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::{dana, repo, seed};
    use super::super::{BranchRequest, RepositoryOptions};
    use super::*;
    use crate::{ErrorKind, RepositoryConfig};
    use strata_fabric::{EventBus, EventFilter};
    use strata_refs::RefError;
    use strata_types::{ControlPoint, EntityEdit, EntityId, Equipment, Entity};
    use strata_workflow::{AutoAssignRule, IssueKind, IssueStatus, PrFilter, PrStatus};

    fn reporter() -> ActorId {
        ActorId::from("front-desk")
    }

    /// Adds an HVAC unit with one point to the seeded room.
    fn add_hvac(repo: &Repository, room: EntityId) -> (EntityId, EntityId) {
        let ahu = Entity::new(EntityPayload::Equipment(Equipment {
            name: "AHU-1".into(),
            category: "HVAC".into(),
            ..Default::default()
        }))
        .with_parent(room);
        let point = Entity::new(EntityPayload::ControlPoint(ControlPoint {
            name: "Supply temp".into(),
            ..Default::default()
        }))
        .with_parent(ahu.id);
        let ids = (ahu.id, point.id);
        repo.commit_edits(
            "main",
            dana(),
            "Add AHU",
            &[EntityEdit::Add(ahu), EntityEdit::Add(point)],
        )
        .unwrap();
        ids
    }

    #[test]
    fn lifecycle_visits_every_state_once() {
        let repo = repo();
        let room = seed(&repo);
        let issue = repo
            .create_issue(NewIssue::new("Lobby door sticks", reporter()).room(room))
            .unwrap();
        let mut seen = vec![issue.status];

        let started = repo.start_work(issue.number, dana()).unwrap();
        seen.push(started.issue.status);
        assert_eq!(started.branch.name, "issue/1-lobby-door-sticks");
        assert_eq!(started.branch.kind, BranchKind::Issue);
        assert_eq!(started.pull_request.issue, Some(1));
        assert_eq!(started.pull_request.title, "Fix #1: Lobby door sticks");
        assert_eq!(started.issue.branch, Some(started.branch.id));
        assert_eq!(started.issue.pull_request, Some(started.pull_request.number));
        assert_eq!(started.issue.assignee, Some(dana()));

        seen.push(repo.resolve_issue(1, dana(), "hinge replaced").unwrap().status);
        seen.push(repo.close_issue(1, dana(), None).unwrap().status);
        assert_eq!(
            seen,
            vec![
                IssueStatus::Open,
                IssueStatus::InProgress,
                IssueStatus::Resolved,
                IssueStatus::Closed
            ]
        );

        let prs = repo.list_pull_requests(&PrFilter::default()).unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].status, PrStatus::Open);
        let issue_branches = repo
            .list_branches(&strata_refs::BranchFilter {
                kind: Some(BranchKind::Issue),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(issue_branches.len(), 1);
    }

    #[test]
    fn start_work_is_all_or_nothing() {
        let repo = repo();
        seed(&repo);
        repo.create_issue(NewIssue::new("Leak", reporter())).unwrap();
        // Occupy the branch name the issue would use.
        repo.create_branch(BranchRequest::new("issue/1-leak"), dana())
            .unwrap();

        let err = repo.start_work(1, dana()).unwrap_err();
        assert!(matches!(err, EngineError::Branch(RefError::DuplicateBranchName { .. })));
        let issue = repo.issue(1).unwrap();
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.branch.is_none());
        assert!(issue.pull_request.is_none());
        assert!(repo.list_pull_requests(&PrFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn invalid_transitions() {
        let repo = repo();
        seed(&repo);
        repo.create_issue(NewIssue::new("Noise", reporter())).unwrap();
        let err = repo.resolve_issue(1, dana(), "n/a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        repo.start_work(1, dana()).unwrap();
        assert!(repo.start_work(1, dana()).is_err());
        repo.close_issue(1, dana(), Some("duplicate".into())).unwrap();
        assert!(repo.close_issue(1, dana(), None).is_err());
        assert_eq!(repo.issue(7).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn links_are_checked_against_the_default_branch() {
        let repo = repo();
        let room = seed(&repo);
        let err = repo
            .create_issue(NewIssue::new("Ghost", reporter()).room(EntityId::new()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLink { field: "room", .. }));

        let err = repo
            .create_issue(NewIssue::new("Wrong kind", reporter()).equipment(room))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLink { field: "equipment", .. }));
        assert!(repo.list_issues(&IssueFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn auto_assignment_by_category_and_type() {
        let mut config = RepositoryConfig::default();
        config.auto_assign = vec![
            AutoAssignRule {
                issue_type: Some(IssueKind::Safety),
                equipment_category: None,
                assignee: ActorId::from("safety-team"),
            },
            AutoAssignRule {
                issue_type: None,
                equipment_category: Some("hvac".into()),
                assignee: ActorId::from("hvac-crew"),
            },
        ];
        let bus = Arc::new(EventBus::new());
        let mut events = bus.subscribe(EventFilter::kinds([EventKind::IssueAutoAssigned]));
        let repo = Repository::in_memory(config, RepositoryOptions::default().with_notifications(bus.clone()))
            .unwrap();
        let room = seed(&repo);
        let (_, point) = add_hvac(&repo, room);

        let hvac = repo
            .create_issue(NewIssue::new("Too warm", reporter()).control_point(point))
            .unwrap();
        assert!(hvac.auto_assigned);
        assert_eq!(hvac.assignee, Some(ActorId::from("hvac-crew")));
        let event = events.try_recv().unwrap();
        assert_eq!(event.actor, ActorId::from("hvac-crew"));
        assert_eq!(event.subject, Subject::Issue(hvac.number));

        let safety = repo
            .create_issue(NewIssue::new("Loose rail", reporter()).kind(IssueKind::Safety))
            .unwrap();
        assert_eq!(safety.assignee, Some(ActorId::from("safety-team")));

        let explicit = repo
            .create_issue(
                NewIssue::new("Smoke", reporter())
                    .kind(IssueKind::Safety)
                    .assignee(dana()),
            )
            .unwrap();
        assert!(!explicit.auto_assigned);
        assert_eq!(explicit.assignee, Some(dana()));

        let mine = repo
            .list_issues(&IssueFilter {
                assignee: Some(ActorId::from("hvac-crew")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[test]
    fn started_issue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = Repository::init(dir.path(), RepositoryConfig::named("hq"), RepositoryOptions::default())
                .unwrap();
            seed(&repo);
            repo.create_issue(NewIssue::new("Leak", reporter())).unwrap();
            repo.start_work(1, dana()).unwrap();
        }
        let repo = Repository::open(dir.path(), RepositoryOptions::default()).unwrap();
        let issue = repo.issue(1).unwrap();
        assert_eq!(issue.status, IssueStatus::InProgress);
        let pr = repo.pull_request(issue.pull_request.unwrap()).unwrap();
        assert_eq!(pr.issue, Some(1));
        assert!(repo.branch_info("issue/1-leak").is_ok());
        let report = repo.verify().unwrap();
        assert_eq!(report.issues, 1);
        assert_eq!(report.pull_requests, 1);
    }
}
