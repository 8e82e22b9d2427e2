use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;

use strata_sdk::{
    ActorId, Branch, BranchFilter, BranchRequest, Entity, EntityEdit, EntityKind, EntityPayload,
    FieldValue, IssueFilter, MergeOptions, MergeStrategy, NewIssue, PrFilter, PullRequest,
    PullRequestDraft, Repository, RepositoryConfig, RepositoryOptions,
};

use crate::cli::*;
use crate::render;

const USER_ENV: &str = "STRATA_USER";

/// An opened repository plus the per-invocation settings.
struct Session {
    repo: Repository,
    actor: ActorId,
    json: bool,
}

impl Session {
    /// Print `value` as JSON, or run `text` for the human format.
    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }

    fn branch_or_current(&self, branch: Option<String>) -> anyhow::Result<String> {
        match branch {
            Some(branch) => Ok(branch),
            None => Ok(self.repo.current_branch()?),
        }
    }

    fn all_branches(&self) -> anyhow::Result<Vec<Branch>> {
        let mut branches = Vec::new();
        for status in [
            strata_sdk::BranchStatus::Active,
            strata_sdk::BranchStatus::Merged,
            strata_sdk::BranchStatus::Archived,
        ] {
            branches.extend(self.repo.list_branches(&BranchFilter {
                status: Some(status),
                ..BranchFilter::default()
            })?);
        }
        Ok(branches)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let root = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let actor = resolve_actor(cli.user);
    let json = matches!(cli.format, OutputFormat::Json);

    let open = || -> anyhow::Result<Session> {
        Ok(Session {
            repo: Repository::open(&root, RepositoryOptions::default())?,
            actor: actor.clone(),
            json,
        })
    };
    match cli.command {
        Command::Init(args) => cmd_init(&root, args, json),
        command => dispatch(&open()?, command),
    }
}

fn dispatch(session: &Session, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init(_) => bail!("repository already initialized"),
        Command::Entity(cmd) => cmd_entity(session, cmd),
        Command::Log(args) => cmd_log(session, args),
        Command::Diff(args) => cmd_diff(session, args),
        Command::Branch(cmd) => cmd_branch(session, cmd),
        Command::Switch(args) => cmd_switch(session, args),
        Command::Merge(args) => cmd_merge(session, args),
        Command::Pr(cmd) => cmd_pr(session, cmd),
        Command::Issue(cmd) => cmd_issue(session, cmd),
        Command::Verify(_) => cmd_verify(session),
    }
}

/// `--user`, then `$STRATA_USER`, then the system user.
fn resolve_actor(flag: Option<String>) -> ActorId {
    flag.or_else(|| std::env::var(USER_ENV).ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .map(ActorId::new)
        .unwrap_or_else(ActorId::system)
}

fn cmd_init(root: &Path, args: InitArgs, json: bool) -> anyhow::Result<()> {
    let path: PathBuf = match args.path {
        Some(path) => root.join(path),
        None => root.to_path_buf(),
    };
    std::fs::create_dir_all(&path)?;
    let name = args.name.unwrap_or_else(|| {
        path.canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "strata".into())
    });
    let config = RepositoryConfig {
        name,
        default_branch: args.default_branch,
        ..RepositoryConfig::default()
    };
    let repo = Repository::init(&path, config, RepositoryOptions::default())?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "id": repo.id().to_string(),
                "name": repo.name(),
                "path": path.display().to_string(),
                "default_branch": repo.config().default_branch,
            }))?
        );
    } else {
        println!(
            "{} Initialized Strata repository in {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
        println!("  Repository: {} ({})", repo.name().bold(), repo.id().to_string().cyan());
        println!("  Branch: {}", repo.config().default_branch.yellow());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

fn cmd_entity(s: &Session, cmd: EntityCommand) -> anyhow::Result<()> {
    match cmd {
        EntityCommand::Add(args) => {
            let branch = s.branch_or_current(args.branch)?;
            let mut entity = Entity::new(EntityPayload::empty(args.kind));
            entity.set_field("name", FieldValue::Text(args.name.clone()))?;
            if let Some(parent) = args.parent {
                entity = entity.with_parent(parent);
            }
            for assignment in &args.fields {
                let (field, value) = parse_assignment(args.kind, assignment)?;
                entity.set_field(&field, value)?;
            }
            let message = args
                .message
                .unwrap_or_else(|| format!("Add {} {}", args.kind.as_str(), args.name));
            let id = entity.id;
            let commit = s
                .repo
                .commit_edits(&branch, s.actor.clone(), &message, &[EntityEdit::Add(entity)])?;
            s.emit(&json!({ "id": id, "commit": commit.id.to_hex() }), || {
                println!("[{} {}] {}", branch.yellow(), commit.id.short_hex(), message);
                println!("  added {} {}", args.kind.as_str(), id.to_string().cyan());
            })
        }
        EntityCommand::Set(args) => {
            let branch = s.branch_or_current(args.branch)?;
            let current = s.repo.get_entity(&branch, &args.id)?;
            let mut edits = Vec::with_capacity(args.fields.len());
            for assignment in &args.fields {
                let (field, value) = parse_assignment(current.kind(), assignment)?;
                edits.push(EntityEdit::Set {
                    id: args.id,
                    field,
                    value,
                });
            }
            let message = args.message.unwrap_or_else(|| {
                format!("Update {} {}", current.kind().as_str(), current.name())
            });
            let commit = s.repo.commit_edits(&branch, s.actor.clone(), &message, &edits)?;
            s.emit(&commit, || {
                println!("[{} {}] {}", branch.yellow(), commit.id.short_hex(), message);
            })
        }
        EntityCommand::Rm(args) => {
            let branch = s.branch_or_current(args.branch)?;
            let current = s.repo.get_entity(&branch, &args.id)?;
            let message = args.message.unwrap_or_else(|| {
                format!("Remove {} {}", current.kind().as_str(), current.name())
            });
            let commit = s.repo.commit_edits(
                &branch,
                s.actor.clone(),
                &message,
                &[EntityEdit::Remove(args.id)],
            )?;
            s.emit(&commit, || {
                println!("[{} {}] {}", branch.yellow(), commit.id.short_hex(), message);
            })
        }
        EntityCommand::Show(args) => {
            let branch = s.branch_or_current(args.branch)?;
            let entity = s.repo.get_entity(&branch, &args.id)?;
            s.emit(&entity, || render::entity(&entity))
        }
        EntityCommand::List(args) => {
            let branch = s.branch_or_current(args.branch)?;
            let entities = s.repo.list_entities(&branch, args.kind)?;
            s.emit(&entities, || {
                if entities.is_empty() {
                    println!("No entities on {}.", branch.yellow());
                }
                for entity in &entities {
                    render::entity_line(entity);
                }
            })
        }
    }
}

/// Split `field=value` and parse the value as the field's declared type.
fn parse_assignment(kind: EntityKind, assignment: &str) -> anyhow::Result<(String, FieldValue)> {
    let (field, raw) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FIELD=VALUE, got {assignment:?}"))?;
    let field = field.trim();
    let spec = kind
        .field(field)
        .ok_or_else(|| anyhow!("{} has no field {field:?}", kind.as_str()))?;
    Ok((field.to_string(), FieldValue::parse(spec.ty, raw)?))
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

fn cmd_log(s: &Session, args: LogArgs) -> anyhow::Result<()> {
    let revision = args.revision.unwrap_or_else(|| "HEAD".into());
    let commits = s.repo.log(&revision, Some(args.limit))?;
    s.emit(&commits, || {
        for commit in &commits {
            if args.oneline {
                render::commit_line(commit);
            } else {
                render::commit(commit);
            }
        }
    })
}

fn cmd_diff(s: &Session, args: DiffArgs) -> anyhow::Result<()> {
    let to = args.to.unwrap_or_else(|| "HEAD".into());
    let diff = if args.direct {
        s.repo.compare(&args.from, &to)?
    } else {
        s.repo.diff(&args.from, &to)?
    };
    s.emit(
        &json!({
            "from": diff.from.to_hex(),
            "to": diff.to.to_hex(),
            "base": diff.base.to_hex(),
            "changes": diff.changes,
        }),
        || {
            if !args.direct && diff.base != diff.from {
                println!("{} {}", "merge base".dimmed(), diff.base.short_hex().dimmed());
            }
            render::changes(&diff.changes);
        },
    )
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

fn cmd_branch(s: &Session, cmd: BranchCommand) -> anyhow::Result<()> {
    match cmd {
        BranchCommand::Create(args) => {
            let mut request = BranchRequest::new(&args.name)
                .kind(args.kind)
                .protected(args.protected);
            if let Some(from) = args.from {
                request = request.from(from);
            }
            if let Some(description) = args.description {
                request = request.description(description);
            }
            let branch = s.repo.create_branch(request, s.actor.clone())?;
            s.emit(&branch, || {
                println!(
                    "Created branch {} at {}",
                    branch.name.yellow(),
                    branch.tip.short_hex()
                );
            })
        }
        BranchCommand::List(args) => {
            let filter = BranchFilter {
                status: args.status,
                kind: args.kind,
                created_by: None,
                name_prefix: args.prefix,
            };
            let branches = s.repo.list_branches(&filter)?;
            let current = s.repo.current_branch()?;
            s.emit(&branches, || {
                for branch in &branches {
                    if branch.name == current && branch.is_active() {
                        println!("* {}", branch.name.green().bold());
                    } else {
                        println!("  {}", branch.name);
                    }
                }
            })
        }
        BranchCommand::Show { name } => {
            let info = s.repo.branch_info(&name)?;
            let branch = &info.branch;
            s.emit(
                &json!({
                    "branch": branch,
                    "default_branch": info.default_branch,
                    "ahead": info.ahead,
                    "behind": info.behind,
                }),
                || {
                    println!("{} [{}]", branch.name.yellow().bold(), branch.kind.as_str());
                    println!("  tip:     {}", branch.tip.short_hex());
                    println!("  status:  {}", branch.status.as_str());
                    if branch.protected {
                        println!("  protected");
                    }
                    println!("  created: {} by {}", branch.created_at.format("%Y-%m-%d %H:%M"), branch.created_by);
                    if let Some(description) = &branch.description {
                        println!("  {description}");
                    }
                    if branch.name != info.default_branch {
                        println!(
                            "  {} ahead, {} behind {}",
                            info.ahead,
                            info.behind,
                            info.default_branch.yellow()
                        );
                    }
                },
            )
        }
        BranchCommand::Delete { name } => {
            let branch = s.repo.delete_branch(&name, s.actor.clone())?;
            s.emit(&branch, || {
                println!("Deleted branch {} (was {})", name.yellow(), branch.tip.short_hex());
            })
        }
    }
}

fn cmd_switch(s: &Session, args: SwitchArgs) -> anyhow::Result<()> {
    if args.create {
        s.repo
            .create_branch(BranchRequest::new(&args.branch).from("HEAD"), s.actor.clone())?;
    }
    s.repo.switch(&args.branch)?;
    s.emit(&json!({ "branch": args.branch }), || {
        if args.create {
            println!("Switched to a new branch {}", args.branch.yellow().bold());
        } else {
            println!("Switched to branch {}", args.branch.yellow().bold());
        }
    })
}

fn cmd_merge(s: &Session, args: MergeArgs) -> anyhow::Result<()> {
    let target = s.branch_or_current(args.into)?;
    let outcome = s.repo.merge_branches(
        &args.branch,
        &target,
        args.strategy,
        s.actor.clone(),
        args.message.as_deref(),
    )?;
    s.emit(
        &json!({
            "commit": outcome.commit.to_hex(),
            "up_to_date": outcome.up_to_date,
            "changed": outcome.changed,
            "attempts": outcome.attempts,
        }),
        || {
            if outcome.up_to_date {
                println!("Already up to date.");
            } else {
                println!(
                    "{} Merged {} into {} ({}, {} entities changed)",
                    "✓".green(),
                    args.branch.yellow(),
                    target.yellow(),
                    outcome.commit.short_hex(),
                    outcome.changed
                );
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

fn show_pull(s: &Session, pr: &PullRequest) -> anyhow::Result<()> {
    let branches = s.all_branches()?;
    let source = render::branch_name(&branches, &pr.source);
    let target = render::branch_name(&branches, &pr.target);
    s.emit(pr, || render::pull_request(pr, &source, &target))
}

fn cmd_pr(s: &Session, cmd: PrCommand) -> anyhow::Result<()> {
    match cmd {
        PrCommand::Create(args) => {
            let source = s.branch_or_current(args.source)?;
            let mut draft = PullRequestDraft::new(&args.title, source)
                .priority(args.priority)
                .reviewers(args.reviewers.into_iter().map(ActorId::new).collect())
                .labels(args.labels);
            if let Some(target) = args.target {
                draft = draft.target(target);
            }
            if let Some(description) = args.description {
                draft = draft.description(description);
            }
            let pr = s.repo.create_pull_request(draft, s.actor.clone())?;
            s.emit(&pr, || {
                println!("Opened pull request {} {}", format!("#{}", pr.number).yellow(), pr.title);
            })
        }
        PrCommand::List(args) => {
            let filter = PrFilter {
                status: args.status,
                author: args.author.map(ActorId::new),
                reviewer: args.reviewer.map(ActorId::new),
                priority: args.priority,
                branch: None,
            };
            let pulls = s.repo.list_pull_requests(&filter)?;
            s.emit(&pulls, || {
                if pulls.is_empty() {
                    println!("No pull requests.");
                }
                for pr in &pulls {
                    render::pull_request_line(pr);
                }
            })
        }
        PrCommand::Show { number } => show_pull(s, &s.repo.pull_request(number)?),
        PrCommand::Approve { number, comment } => {
            let pr = s.repo.approve_pull_request(number, s.actor.clone(), comment)?;
            s.emit(&pr, || {
                println!(
                    "{} Approved #{} ({} of {} approvals, now {})",
                    "✓".green(),
                    number,
                    pr.approvals.len(),
                    s.repo.config().required_approvals,
                    pr.status.as_str()
                );
            })
        }
        PrCommand::Merge(args) => {
            let options = MergeOptions {
                strategy: if args.squash {
                    MergeStrategy::Squash
                } else {
                    MergeStrategy::Merge
                },
                force: args.force,
                delete_source: !args.no_delete,
                message: args.message,
            };
            let merged = s.repo.merge_pull_request(args.number, s.actor.clone(), options)?;
            let pr = &merged.pull_request;
            s.emit(pr, || {
                println!(
                    "{} Merged #{} as {}",
                    "✓".green().bold(),
                    pr.number,
                    merged.outcome.commit.short_hex()
                );
                if pr.force_merged {
                    println!("  {}", "merged without required approvals".yellow());
                }
                if merged.source_retired {
                    println!("  source branch retired");
                }
            })
        }
        PrCommand::Close { number, reason } => {
            let pr = s.repo.close_pull_request(number, s.actor.clone(), reason)?;
            s.emit(&pr, || println!("Closed pull request #{number}"))
        }
        PrCommand::Comment { number, body } => {
            let pr = s.repo.comment_pull_request(number, s.actor.clone(), &body)?;
            s.emit(&pr, || println!("Commented on #{number}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

fn cmd_issue(s: &Session, cmd: IssueCommand) -> anyhow::Result<()> {
    match cmd {
        IssueCommand::Create(args) => {
            let mut request = NewIssue::new(&args.title, s.actor.clone())
                .kind(args.kind)
                .priority(args.priority);
            if let Some(body) = args.body {
                request = request.body(body);
            }
            if let Some(assignee) = args.assignee {
                request = request.assignee(ActorId::new(assignee));
            }
            if let Some(room) = args.room {
                request = request.room(room);
            }
            if let Some(equipment) = args.equipment {
                request = request.equipment(equipment);
            }
            if let Some(point) = args.control_point {
                request = request.control_point(point);
            }
            let issue = s.repo.create_issue(request)?;
            s.emit(&issue, || {
                println!("Opened issue {} {}", format!("#{}", issue.number).yellow(), issue.title);
                if let (true, Some(assignee)) = (issue.auto_assigned, &issue.assignee) {
                    println!("  auto-assigned to {assignee}");
                }
            })
        }
        IssueCommand::List(args) => {
            let filter = IssueFilter {
                status: args.status,
                assignee: args.assignee.map(ActorId::new),
                reporter: None,
                priority: args.priority,
                kind: args.kind,
            };
            let issues = s.repo.list_issues(&filter)?;
            s.emit(&issues, || {
                if issues.is_empty() {
                    println!("No issues.");
                }
                for issue in &issues {
                    render::issue_line(issue);
                }
            })
        }
        IssueCommand::Show { number } => {
            let issue = s.repo.issue(number)?;
            s.emit(&issue, || render::issue(&issue))
        }
        IssueCommand::Start { number } => {
            let started = s.repo.start_work(number, s.actor.clone())?;
            s.emit(
                &json!({
                    "issue": started.issue,
                    "branch": started.branch,
                    "pull_request": started.pull_request,
                }),
                || {
                    println!("{} Started work on #{number}", "✓".green().bold());
                    println!("  branch: {}", started.branch.name.yellow());
                    println!("  pull request: #{}", started.pull_request.number);
                },
            )
        }
        IssueCommand::Resolve { number, notes } => {
            let issue = s.repo.resolve_issue(number, s.actor.clone(), &notes)?;
            s.emit(&issue, || println!("Resolved issue #{number}"))
        }
        IssueCommand::Close { number, reason } => {
            let issue = s.repo.close_issue(number, s.actor.clone(), reason)?;
            s.emit(&issue, || println!("Closed issue #{number}"))
        }
    }
}

fn cmd_verify(s: &Session) -> anyhow::Result<()> {
    let report = s.repo.verify()?;
    s.emit(
        &json!({
            "commits": report.commits,
            "branches": report.branches,
            "retired_branches": report.retired_branches,
            "pull_requests": report.pull_requests,
            "issues": report.issues,
            "journal_bytes": report.journal_bytes,
            "journal_entries": report.journal_entries,
        }),
        || {
            println!("{} Repository integrity verified", "✓".green().bold());
            println!("  Commits: {}", report.commits.to_string().bold());
            println!(
                "  Branches: {} active, {} retired",
                report.branches, report.retired_branches
            );
            println!(
                "  Pull requests: {}, issues: {}",
                report.pull_requests, report.issues
            );
            if let (Some(bytes), Some(entries)) = (report.journal_bytes, report.journal_entries) {
                println!("  Journal: {entries} entries, {bytes} bytes");
            }
        },
    )
}
