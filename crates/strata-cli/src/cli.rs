use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use strata_sdk::{
    BranchKind, BranchStatus, EntityId, EntityKind, IssueKind, IssueStatus, MergeStrategy,
    PrStatus, Priority,
};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: version control for building models",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Acting user (defaults to $STRATA_USER, then the system user)
    #[arg(long, global = true)]
    pub user: Option<String>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new repository
    Init(InitArgs),
    /// Manage entities on a branch
    #[command(subcommand)]
    Entity(EntityCommand),
    /// Show commit history
    Log(LogArgs),
    /// Show changes between two revisions
    Diff(DiffArgs),
    /// List, create, show or delete branches
    #[command(subcommand)]
    Branch(BranchCommand),
    /// Switch the current branch
    Switch(SwitchArgs),
    /// Merge a branch into the current branch
    Merge(MergeArgs),
    /// Work with pull requests
    #[command(subcommand)]
    Pr(PrCommand),
    /// Work with issues
    #[command(subcommand)]
    Issue(IssueCommand),
    /// Check repository integrity
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
    /// Repository display name (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "main")]
    pub default_branch: String,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum EntityCommand {
    /// Add an entity and commit it
    Add(EntityAddArgs),
    /// Set fields on an entity and commit
    Set(EntitySetArgs),
    /// Remove an entity and commit
    Rm(EntityRmArgs),
    /// Show one entity
    Show(EntityShowArgs),
    /// List entities
    List(EntityListArgs),
}

#[derive(Args)]
pub struct EntityAddArgs {
    pub kind: EntityKind,
    pub name: String,
    #[arg(long)]
    pub parent: Option<EntityId>,
    /// Field assignment, `field=value`
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub fields: Vec<String>,
    #[arg(short, long)]
    pub message: Option<String>,
    /// Branch to commit on (defaults to the current branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct EntitySetArgs {
    pub id: EntityId,
    /// Field assignments, `field=value`
    #[arg(required = true, value_name = "FIELD=VALUE")]
    pub fields: Vec<String>,
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct EntityRmArgs {
    pub id: EntityId,
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct EntityShowArgs {
    pub id: EntityId,
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct EntityListArgs {
    #[arg(long)]
    pub kind: Option<EntityKind>,
    #[arg(short, long)]
    pub branch: Option<String>,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct LogArgs {
    /// Branch or commit (defaults to HEAD)
    pub revision: Option<String>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    pub from: String,
    /// Defaults to HEAD
    pub to: Option<String>,
    /// Compare the two states directly instead of from their merge base
    #[arg(long)]
    pub direct: bool,
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum BranchCommand {
    /// Create a branch
    Create(BranchCreateArgs),
    /// List branches
    List(BranchListArgs),
    /// Show a branch and its position relative to the default branch
    Show { name: String },
    /// Retire a branch
    Delete { name: String },
}

#[derive(Args)]
pub struct BranchCreateArgs {
    pub name: String,
    /// Revision to fork from (defaults to the default branch)
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long, default_value = "feature")]
    pub kind: BranchKind,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long)]
    pub protected: bool,
}

#[derive(Args)]
pub struct BranchListArgs {
    #[arg(long)]
    pub status: Option<BranchStatus>,
    #[arg(long)]
    pub kind: Option<BranchKind>,
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args)]
pub struct SwitchArgs {
    pub branch: String,
    /// Create the branch first
    #[arg(short = 'c', long)]
    pub create: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    pub branch: String,
    /// Target branch (defaults to the current branch)
    #[arg(long)]
    pub into: Option<String>,
    #[arg(long, default_value = "merge")]
    pub strategy: MergeStrategy,
    #[arg(short, long)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum PrCommand {
    /// Open a pull request
    Create(PrCreateArgs),
    /// List pull requests
    List(PrListArgs),
    /// Show one pull request
    Show { number: u64 },
    /// Approve a pull request
    Approve {
        number: u64,
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Merge a pull request
    Merge(PrMergeArgs),
    /// Close a pull request without merging
    Close {
        number: u64,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Comment on a pull request
    Comment { number: u64, body: String },
}

#[derive(Args)]
pub struct PrCreateArgs {
    pub title: String,
    /// Source branch (defaults to the current branch)
    #[arg(long)]
    pub source: Option<String>,
    /// Target branch (defaults to the default branch)
    #[arg(long)]
    pub target: Option<String>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long, default_value = "medium")]
    pub priority: Priority,
    #[arg(long = "reviewer")]
    pub reviewers: Vec<String>,
    #[arg(long = "label")]
    pub labels: Vec<String>,
}

#[derive(Args)]
pub struct PrListArgs {
    #[arg(long)]
    pub status: Option<PrStatus>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub reviewer: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
}

#[derive(Args)]
pub struct PrMergeArgs {
    pub number: u64,
    #[arg(long)]
    pub squash: bool,
    /// Merge without the required approvals
    #[arg(long)]
    pub force: bool,
    /// Keep the source branch
    #[arg(long)]
    pub no_delete: bool,
    #[arg(short, long)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum IssueCommand {
    /// Open an issue
    Create(IssueCreateArgs),
    /// List issues
    List(IssueListArgs),
    /// Show one issue
    Show { number: u64 },
    /// Create the issue's branch and pull request and start work
    Start { number: u64 },
    /// Mark an issue resolved
    Resolve {
        number: u64,
        #[arg(short, long)]
        notes: String,
    },
    /// Close an issue
    Close {
        number: u64,
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Args)]
pub struct IssueCreateArgs {
    pub title: String,
    #[arg(short, long)]
    pub body: Option<String>,
    #[arg(long, default_value = "problem")]
    pub kind: IssueKind,
    #[arg(long, default_value = "medium")]
    pub priority: Priority,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub room: Option<EntityId>,
    #[arg(long)]
    pub equipment: Option<EntityId>,
    #[arg(long)]
    pub control_point: Option<EntityId>,
}

#[derive(Args)]
pub struct IssueListArgs {
    #[arg(long)]
    pub status: Option<IssueStatus>,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub kind: Option<IssueKind>,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["strata", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init(_)));
    }

    #[test]
    fn parse_init_with_name() {
        let cli = Cli::try_parse_from(["strata", "init", "--name", "hq", "/tmp/hq"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.name, Some("hq".into()));
            assert_eq!(args.path, Some(PathBuf::from("/tmp/hq")));
            assert_eq!(args.default_branch, "main");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_entity_add() {
        let parent = EntityId::new();
        let cli = Cli::try_parse_from([
            "strata",
            "entity",
            "add",
            "room",
            "Lobby",
            "--parent",
            &parent.to_string(),
            "--set",
            "status=operational",
            "--set",
            "area_sqm=42.5",
        ])
        .unwrap();
        if let Command::Entity(EntityCommand::Add(args)) = cli.command {
            assert_eq!(args.kind, EntityKind::Room);
            assert_eq!(args.parent, Some(parent));
            assert_eq!(args.fields, vec!["status=operational", "area_sqm=42.5"]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_entity_set_requires_fields() {
        let id = EntityId::new().to_string();
        assert!(Cli::try_parse_from(["strata", "entity", "set", &id]).is_err());
        assert!(Cli::try_parse_from(["strata", "entity", "set", &id, "status=closed"]).is_ok());
    }

    #[test]
    fn parse_log_oneline() {
        let cli = Cli::try_parse_from(["strata", "log", "--oneline", "-n", "5", "main"]).unwrap();
        if let Command::Log(args) = cli.command {
            assert!(args.oneline);
            assert_eq!(args.limit, 5);
            assert_eq!(args.revision, Some("main".into()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_diff_direct() {
        let cli = Cli::try_parse_from(["strata", "diff", "--direct", "main", "contractor/x"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert!(args.direct);
            assert_eq!(args.from, "main");
            assert_eq!(args.to, Some("contractor/x".into()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_branch_create() {
        let cli = Cli::try_parse_from([
            "strata", "branch", "create", "contractor/acme", "--kind", "contractor",
        ])
        .unwrap();
        if let Command::Branch(BranchCommand::Create(args)) = cli.command {
            assert_eq!(args.name, "contractor/acme");
            assert_eq!(args.kind, BranchKind::Contractor);
            assert!(!args.protected);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_branch_list_by_status() {
        let cli = Cli::try_parse_from(["strata", "branch", "list", "--status", "merged"]).unwrap();
        if let Command::Branch(BranchCommand::List(args)) = cli.command {
            assert_eq!(args.status, Some(BranchStatus::Merged));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_branch_delete() {
        let cli = Cli::try_parse_from(["strata", "branch", "delete", "old"]).unwrap();
        assert!(matches!(cli.command, Command::Branch(BranchCommand::Delete { name }) if name == "old"));
    }

    #[test]
    fn parse_switch_create() {
        let cli = Cli::try_parse_from(["strata", "switch", "-c", "feature/x"]).unwrap();
        if let Command::Switch(args) = cli.command {
            assert!(args.create);
            assert_eq!(args.branch, "feature/x");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_merge_squash() {
        let cli = Cli::try_parse_from(["strata", "merge", "feature/x", "--strategy", "squash"]).unwrap();
        if let Command::Merge(args) = cli.command {
            assert_eq!(args.strategy, MergeStrategy::Squash);
            assert!(args.into.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_pr_merge_flags() {
        let cli = Cli::try_parse_from(["strata", "pr", "merge", "3", "--squash", "--force", "--no-delete"])
            .unwrap();
        if let Command::Pr(PrCommand::Merge(args)) = cli.command {
            assert_eq!(args.number, 3);
            assert!(args.squash && args.force && args.no_delete);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_pr_create() {
        let cli = Cli::try_parse_from([
            "strata", "pr", "create", "Lobby refit", "--reviewer", "eli", "--reviewer", "fay",
            "--priority", "high",
        ])
        .unwrap();
        if let Command::Pr(PrCommand::Create(args)) = cli.command {
            assert_eq!(args.reviewers, vec!["eli", "fay"]);
            assert_eq!(args.priority, Priority::High);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_issue_create() {
        let room = EntityId::new();
        let cli = Cli::try_parse_from([
            "strata",
            "issue",
            "create",
            "Door sticks",
            "--kind",
            "maintenance",
            "--room",
            &room.to_string(),
        ])
        .unwrap();
        if let Command::Issue(IssueCommand::Create(args)) = cli.command {
            assert_eq!(args.kind, IssueKind::Maintenance);
            assert_eq!(args.room, Some(room));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_issue_resolve_requires_notes() {
        assert!(Cli::try_parse_from(["strata", "issue", "resolve", "1"]).is_err());
        assert!(Cli::try_parse_from(["strata", "issue", "resolve", "1", "-n", "fixed"]).is_ok());
    }

    #[test]
    fn parse_globals() {
        let cli = Cli::try_parse_from([
            "strata", "--verbose", "--format", "json", "-C", "/srv/hq", "--user", "dana", "verify",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.dir, Some(PathBuf::from("/srv/hq")));
        assert_eq!(cli.user, Some("dana".into()));
    }
}
