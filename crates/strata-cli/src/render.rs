//! Human-readable output.

use colored::Colorize;

use strata_sdk::{
    Branch, BranchId, ChangeSet, Commit, ConflictReport, Entity, EntityChange, FieldValue, Issue,
    PullRequest,
};

/// Name of a branch by id, or its short id if unknown.
pub fn branch_name(branches: &[Branch], id: &BranchId) -> String {
    branches
        .iter()
        .find(|b| &b.id == id)
        .map(|b| b.name.clone())
        .unwrap_or_else(|| id.short_id())
}

pub fn commit(commit: &Commit) {
    println!("{} {}", "commit".yellow(), commit.id.to_hex().yellow());
    if commit.is_merge() {
        let parents: Vec<String> = commit.parents.iter().map(|p| p.short_hex()).collect();
        println!("Merge:  {}", parents.join(" "));
    }
    println!("Author: {}", commit.author);
    println!("Date:   {}", commit.timestamp.format("%Y-%m-%d %H:%M:%S %Z"));
    println!();
    for line in commit.message.lines() {
        println!("    {line}");
    }
    println!();
}

pub fn commit_line(commit: &Commit) {
    println!("{} {}", commit.id.short_hex().yellow(), commit.summary());
}

pub fn changes(changes: &ChangeSet) {
    if changes.is_empty() {
        println!("No changes.");
        return;
    }
    for change in changes.iter() {
        match change {
            EntityChange::Added(entity) => {
                println!(
                    "{} {} {} ({})",
                    "+".green().bold(),
                    entity.kind().as_str(),
                    entity.name().bold(),
                    entity.id.short_id().dimmed()
                );
            }
            EntityChange::Removed(entity) => {
                println!(
                    "{} {} {} ({})",
                    "-".red().bold(),
                    entity.kind().as_str(),
                    entity.name().bold(),
                    entity.id.short_id().dimmed()
                );
            }
            EntityChange::Modified { id, kind, fields } => {
                println!("{} {} {}", "~".yellow().bold(), kind.as_str(), id.short_id());
                for delta in fields {
                    println!(
                        "    {}: {} {} {}",
                        delta.field,
                        delta.old.to_string().red(),
                        "->".dimmed(),
                        delta.new.to_string().green()
                    );
                }
            }
        }
    }
    println!(
        "{} added, {} modified, {} removed",
        changes.additions(),
        changes.modifications(),
        changes.removals()
    );
}

pub fn entity(entity: &Entity) {
    println!("{} {}", entity.kind().as_str().cyan(), entity.name().bold());
    println!("  {:<14} {}", "id", entity.id);
    if let Some(parent) = &entity.parent {
        println!("  {:<14} {}", "parent", parent);
    }
    for (field, value) in entity.fields() {
        if field == "name" || matches!(value, FieldValue::Null) {
            continue;
        }
        println!("  {field:<14} {value}");
    }
}

pub fn entity_line(entity: &Entity) {
    println!(
        "{}  {:<14} {}",
        entity.id.short_id().dimmed(),
        entity.kind().as_str(),
        entity.name()
    );
}

pub fn pull_request(pr: &PullRequest, source: &str, target: &str) {
    println!(
        "{} {} [{}]",
        format!("#{}", pr.number).yellow().bold(),
        pr.title.bold(),
        pr.status.as_str()
    );
    println!("  {} -> {}", source.green(), target.green());
    println!("  author:    {}", pr.author);
    println!("  priority:  {}", pr.priority.as_str());
    if !pr.reviewers.is_empty() {
        let reviewers: Vec<String> = pr
            .reviewers
            .iter()
            .map(|r| {
                if pr.has_approved(r) {
                    format!("{r} (approved)")
                } else {
                    format!("{r} (pending)")
                }
            })
            .collect();
        println!("  reviewers: {}", reviewers.join(", "));
    }
    if let Some(issue) = pr.issue {
        println!("  issue:     #{issue}");
    }
    if let Some(commit) = &pr.merge_commit {
        let forced = if pr.force_merged { " (forced)" } else { "" };
        println!("  merged as: {}{forced}", commit.short_hex());
    }
    if let Some(description) = &pr.description {
        println!();
        println!("  {description}");
    }
    for comment in &pr.comments {
        println!();
        println!("  {} {}", comment.author.to_string().bold(), comment.at.format("%Y-%m-%d %H:%M").to_string().dimmed());
        println!("    {}", comment.body);
    }
}

pub fn pull_request_line(pr: &PullRequest) {
    println!(
        "{:>5}  {:<9} {:<8} {}",
        format!("#{}", pr.number).yellow(),
        pr.status.as_str(),
        pr.priority.as_str(),
        pr.title
    );
}

pub fn issue(issue: &Issue) {
    println!(
        "{} {} [{}]",
        format!("#{}", issue.number).yellow().bold(),
        issue.title.bold(),
        issue.status.as_str()
    );
    println!("  kind:      {}", issue.kind.as_str());
    println!("  priority:  {}", issue.priority.as_str());
    println!("  reporter:  {}", issue.reporter);
    if let Some(assignee) = &issue.assignee {
        let auto = if issue.auto_assigned { " (auto)" } else { "" };
        println!("  assignee:  {assignee}{auto}");
    }
    for (field, id) in issue.links.iter() {
        println!("  {:<10} {}", format!("{field}:"), id);
    }
    if let Some(pr) = issue.pull_request {
        println!("  pull:      #{pr}");
    }
    if let Some(body) = &issue.body {
        println!();
        println!("  {body}");
    }
    if let Some(resolution) = &issue.resolution {
        println!("  resolution: {resolution}");
    }
}

pub fn issue_line(issue: &Issue) {
    let assignee = issue
        .assignee
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "{:>5}  {:<12} {:<8} {:<14} {}",
        format!("#{}", issue.number).yellow(),
        issue.status.as_str(),
        issue.priority.as_str(),
        assignee,
        issue.title
    );
}

/// Conflicts as one line per `{entity, field, source, target}`.
pub fn conflicts(report: &ConflictReport) {
    eprintln!("{report}");
    for conflict in &report.conflicts {
        eprintln!(
            "  {} {}: source={} target={}",
            conflict.entity.to_string().bold(),
            conflict.field.yellow(),
            side(&conflict.source),
            side(&conflict.target)
        );
    }
}

fn side(value: &Option<FieldValue>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<removed>".into())
}
