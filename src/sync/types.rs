//! Request, result and checkpoint types for sync runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::{Commit, FileStatus};
use crate::parser::Operation;

/// Which way content flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    #[default]
    GitToDb,
    DbToGit,
    Bidirectional,
}

impl SyncDirection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GitToDb => "git-to-db",
            Self::DbToGit => "db-to-git",
            Self::Bidirectional => "bidirectional",
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git-to-db" => Ok(Self::GitToDb),
            "db-to-git" => Ok(Self::DbToGit),
            "bidirectional" => Ok(Self::Bidirectional),
            _ => Err(format!("Unknown sync direction: {s}")),
        }
    }
}

/// Range selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Resume from the stored checkpoint.
    #[default]
    Incremental,
    /// Replay the whole history up to the target.
    Full,
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(Self::Incremental),
            "full" => Ok(Self::Full),
            _ => Err(format!("Unknown sync mode: {s}")),
        }
    }
}

/// One sync invocation.
///
/// `repo` is a local path, a clone URL, or `org/repo` shorthand.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub repo: String,
    pub branch: Option<String>,
    pub direction: SyncDirection,
    pub mode: SyncMode,
    pub from_commit: Option<String>,
    pub to_commit: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub ns: Option<String>,
    pub actor: Option<String>,
    pub dry_run: bool,
    /// Write every change even when the database already holds the final state.
    pub force: bool,
    pub depth: Option<u32>,
    pub work_dir: Option<PathBuf>,
    pub token: Option<String>,
    pub verbose: bool,
}

impl SyncRequest {
    #[must_use]
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }
}

/// Outcome of applying one staged change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedFile {
    pub path: String,
    pub commit: String,
    pub change: FileStatus,
    #[serde(rename = "type")]
    pub thing_type: String,
    pub id: Option<String>,
    pub operation: Operation,
    /// Version written (or that would be written in a dry run).
    pub version: Option<u64>,
    pub synced: bool,
    /// The database already held this state; nothing was written.
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub commits: usize,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_renamed: usize,
    pub things_created: usize,
    pub things_updated: usize,
    pub things_deleted: usize,
    pub things_unchanged: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

impl SyncStats {
    /// Count a file change by its git status.
    pub fn record_change(&mut self, status: FileStatus) {
        match status {
            FileStatus::Added | FileStatus::Copied => self.files_added += 1,
            FileStatus::Modified => self.files_modified += 1,
            FileStatus::Deleted => self.files_deleted += 1,
            FileStatus::Renamed => self.files_renamed += 1,
        }
    }

    /// Total files seen across all commits.
    #[must_use]
    pub fn files(&self) -> usize {
        self.files_added + self.files_modified + self.files_deleted + self.files_renamed
    }

    /// Total thing writes (excluding unchanged).
    #[must_use]
    pub fn things_written(&self) -> usize {
        self.things_created + self.things_updated + self.things_deleted
    }

    /// Same counters ignoring wall-clock duration.
    #[must_use]
    pub fn same_counts(&self, other: &Self) -> bool {
        Self {
            duration_ms: 0,
            ..self.clone()
        } == Self {
            duration_ms: 0,
            ..other.clone()
        }
    }
}

/// A per-commit or per-file failure collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl SyncError {
    #[must_use]
    pub fn commit(commit: &str, message: impl Into<String>) -> Self {
        Self {
            commit: Some(commit.to_string()),
            path: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn file(commit: &str, path: &str, message: impl Into<String>) -> Self {
        Self {
            commit: Some(commit.to_string()),
            path: Some(path.to_string()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.commit, &self.path) {
            (Some(c), Some(p)) => write!(f, "{} {p}: {}", short(c), self.message),
            (Some(c), None) => write!(f, "{}: {}", short(c), self.message),
            (None, Some(p)) => write!(f, "{p}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

/// Checkpoint: the last commit synced for a `(repo, branch)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub repo: String,
    pub ns: String,
    pub branch: String,
    pub last_commit: String,
    pub last_sync_at: DateTime<Utc>,
    pub total_files: u64,
    pub total_commits: u64,
}

/// Everything one invocation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub commits: Vec<Commit>,
    pub files: Vec<SyncedFile>,
    pub errors: Vec<SyncError>,
    pub stats: SyncStats,
    pub state: SyncState,
    pub dry_run: bool,
}

/// Kinds of divergence between git and the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    BothModified,
    DeleteModify,
    ModifyDelete,
    TypeMismatch,
}

/// Suggested resolution for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Merge,
    KeepGit,
    KeepDb,
}

/// Git's side of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSide {
    pub commit: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

/// The database's side of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSide {
    pub version: u64,
    pub hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub path: String,
    pub url: String,
    pub git: GitSide,
    pub db: DbSide,
    pub suggestion: Resolution,
}

/// Downstream processing stages of a synced thing.
///
/// The engine only records state; rendering, embedding and indexing run
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Staged,
    Rendered,
    Embedded,
    Indexed,
}

impl PipelineStage {
    pub const ALL: [Self; 4] = [Self::Staged, Self::Rendered, Self::Embedded, Self::Indexed];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Rendered => "rendered",
            Self::Embedded => "embedded",
            Self::Indexed => "indexed",
        }
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("Unknown pipeline stage: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Unknown stage status: {s}")),
        }
    }
}
