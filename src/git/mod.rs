//! Repository access.
//!
//! Everything the sync engine knows about git comes through the
//! [`GitAccessor`] trait. The production implementation ([`CliGit`]) shells
//! out to the `git` binary and parses its porcelain output; tests can swap in
//! a scripted double that returns canned commits and diffs.
//!
//! # Submodules
//!
//! - [`cli`] - `git` subprocess runner with timeouts and a fixed locale
//! - [`parse`] - parsers for log / name-status / numstat output
//! - [`namespace`] - remote URL normalization into a namespace

pub mod cli;
pub mod namespace;
pub mod parse;

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use cli::CliGit;
pub use namespace::{derive_namespace, resolve_clone_url, with_token};

/// A single commit, oldest-first when returned in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub parents: Vec<String>,
}

impl Commit {
    /// First parent, or `None` for a root commit (or the boundary of a shallow clone).
    #[must_use]
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// How a file changed between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

impl FileStatus {
    /// Map a `git diff --name-status` code (`A`, `M`, `R100`, ...).
    ///
    /// Unrecognized codes (`T`, `U`, `X`) are treated as modifications.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('A') => Self::Added,
            Some('D') => Self::Deleted,
            Some('R') => Self::Renamed,
            Some('C') => Self::Copied,
            _ => Self::Modified,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file touched between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    pub status: FileStatus,
    pub additions: u64,
    pub deletions: u64,
    pub binary: bool,
}

impl FileChange {
    /// A text change with no line counts, handy for scripted diffs.
    #[must_use]
    pub fn new(path: &str, status: FileStatus) -> Self {
        Self {
            path: path.to_string(),
            previous_path: None,
            status,
            additions: 0,
            deletions: 0,
            binary: false,
        }
    }
}

/// Aggregate line counts for a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub files_changed: usize,
    pub additions: u64,
    pub deletions: u64,
}

/// Changes between two commit references.
///
/// An empty `from_commit` means "the empty tree", i.e. every file at
/// `to_commit` shows up as added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub from_commit: String,
    pub to_commit: String,
    pub files: Vec<FileChange>,
    pub patch: String,
    pub stats: DiffStats,
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub path: PathBuf,
    pub remote_url: Option<String>,
    pub current_branch: String,
    pub head: String,
    pub is_bare: bool,
    pub is_dirty: bool,
    pub ns: String,
}

/// Options for [`GitAccessor::clone_repo`].
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub branch: Option<String>,
    pub depth: Option<u32>,
    pub single_branch: bool,
    pub token: Option<String>,
}

/// Git operations needed by the sync engine.
///
/// All methods take the working directory explicitly so one accessor can
/// serve any number of repositories.
pub trait GitAccessor: Send + Sync {
    /// Whether `path` is inside a git repository. Never fails.
    fn is_repo(&self, path: &Path) -> impl Future<Output = bool> + Send;

    /// Remote, branch, HEAD and derived namespace for a repository.
    fn repo_info(&self, path: &Path) -> impl Future<Output = Result<RepoInfo>> + Send;

    /// Resolve a single reference to its commit.
    fn commit(&self, path: &Path, reference: &str) -> impl Future<Output = Result<Commit>> + Send;

    /// Commits in `(from, to]`, oldest first. Empty `from` means all history up to `to`.
    fn commits(
        &self,
        path: &Path,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<Vec<Commit>>> + Send;

    /// File-level diff between two references. Empty `from` diffs against the empty tree.
    fn diff(&self, path: &Path, from: &str, to: &str) -> impl Future<Output = Result<Diff>> + Send;

    /// Content of `file` at `reference`; `Error::FileNotFound` if absent there.
    fn file_content(
        &self,
        path: &Path,
        file: &str,
        reference: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Paths (relative to the repository root) at `reference`, optionally glob-filtered.
    fn list_files(
        &self,
        path: &Path,
        reference: &str,
        pattern: Option<&str>,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Clone `url` into `dest`.
    fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch from `origin`, optionally a single branch.
    fn fetch(&self, path: &Path, branch: Option<&str>) -> impl Future<Output = Result<()>> + Send;

    /// Check out `reference` in the working tree.
    fn checkout(&self, path: &Path, reference: &str) -> impl Future<Output = Result<()>> + Send;
}
