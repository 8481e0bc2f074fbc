//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Overrides;
use crate::sync::{SyncDirection, SyncMode, SyncRequest};

pub mod commands;

/// Output format.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON (same as --json)
    Json,
}

/// mdxsync - sync MDX/Markdown git history into a versioned content database
#[derive(Parser, Debug)]
#[command(name = "mdxsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Local database path (env: MDXSYNC_DB, default: ~/.mdxsync/data/mdxsync.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Remote database base URL (overrides --db)
    #[arg(long, global = true, env = "MDXSYNC_DB_URL")]
    pub db_url: Option<String>,

    /// Bearer token for the remote database
    #[arg(long, global = true, env = "MDXSYNC_DB_TOKEN", hide_env_values = true)]
    pub db_token: Option<String>,

    /// Actor name for the audit trail
    #[arg(long, global = true, env = "MDXSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Per-command git timeout in seconds
    #[arg(long, global = true, env = "MDXSYNC_GIT_TIMEOUT_SECS")]
    pub git_timeout: Option<u64>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (text, json)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Configuration overrides carried by global flags.
    #[must_use]
    pub fn overrides(&self, git_token: Option<String>) -> Overrides {
        Overrides {
            db: self.db.clone(),
            db_url: self.db_url.clone(),
            db_token: self.db_token.clone(),
            actor: self.actor.clone(),
            git_token,
            git_timeout_secs: self.git_timeout,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync a repository's history into the database
    Sync(SyncArgs),

    /// List files changed on both sides since the last sync
    Conflicts(RepoArgs),

    /// Show the stored checkpoint for a repository
    Status {
        /// Local path, clone URL or `org/repo`
        repo: String,

        /// Branch (default: main)
        #[arg(short, long, default_value = "main")]
        branch: String,
    },
}

/// Repository selection shared by `sync` and `conflicts`.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Local path, clone URL or `org/repo`
    pub repo: String,

    /// Branch to sync (default: the repository's current branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Glob of paths to include (repeatable)
    #[arg(short, long = "include")]
    pub include: Vec<String>,

    /// Glob of paths to exclude (repeatable)
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Namespace for entity URLs (default: derived from the repository)
    #[arg(long)]
    pub ns: Option<String>,

    /// Target commit (default: branch tip)
    #[arg(long)]
    pub to: Option<String>,

    /// Reusable clone directory for remote repositories
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Access token for private repositories
    #[arg(long, env = "MDXSYNC_GIT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Sync direction
    #[arg(long, default_value = "git-to-db")]
    pub direction: SyncDirection,

    /// Sync mode (incremental, full)
    #[arg(short, long, default_value = "incremental")]
    pub mode: SyncMode,

    /// Start after this commit (overrides the checkpoint)
    #[arg(long)]
    pub from: Option<String>,

    /// Preview without writing to the database
    #[arg(long)]
    pub dry_run: bool,

    /// Write every change even if the database already matches
    #[arg(long)]
    pub force: bool,

    /// Shallow clone depth
    #[arg(long)]
    pub depth: Option<u32>,
}

impl RepoArgs {
    /// Request with the repository selection applied.
    #[must_use]
    pub fn to_request(&self, actor: &str, git_token: Option<String>) -> SyncRequest {
        SyncRequest {
            branch: self.branch.clone(),
            to_commit: self.to.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            ns: self.ns.clone(),
            actor: Some(actor.to_string()),
            work_dir: self.work_dir.clone(),
            token: git_token,
            ..SyncRequest::new(self.repo.clone())
        }
    }
}

impl SyncArgs {
    #[must_use]
    pub fn to_request(&self, actor: &str, git_token: Option<String>, verbose: bool) -> SyncRequest {
        SyncRequest {
            direction: self.direction,
            mode: self.mode,
            from_commit: self.from.clone(),
            dry_run: self.dry_run,
            force: self.force,
            depth: self.depth,
            verbose,
            ..self.repo.to_request(actor, git_token)
        }
    }
}
