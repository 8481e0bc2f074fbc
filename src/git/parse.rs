//! Parsers for `git` porcelain output.
//!
//! All list-style commands are run with `-z` so paths never need unquoting.
//! Commit logs use ASCII unit/record separators (`%x1f` / `%x1e`) for the
//! same reason.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::git::{Commit, DiffStats, FileChange, FileStatus};

/// `--format` string understood by [`parse_log`].
pub const LOG_FORMAT: &str = "--format=%H%x1f%h%x1f%s%x1f%an%x1f%ae%x1f%aI%x1f%P%x1e";

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// Parse `git log` output produced with [`LOG_FORMAT`].
///
/// # Errors
///
/// Returns an error if a record has the wrong number of fields or an
/// unparseable author date.
pub fn parse_log(output: &str) -> Result<Vec<Commit>> {
    let mut commits = Vec::new();

    for record in output.split(RECORD_SEP) {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = record.split(FIELD_SEP).collect();
        if fields.len() != 7 {
            return Err(Error::Other(format!(
                "unexpected git log record with {} fields",
                fields.len()
            )));
        }

        let timestamp = DateTime::parse_from_rfc3339(fields[5].trim())
            .map_err(|e| Error::Other(format!("bad commit date '{}': {e}", fields[5])))?
            .with_timezone(&Utc);

        commits.push(Commit {
            hash: fields[0].to_string(),
            short_hash: fields[1].to_string(),
            message: fields[2].to_string(),
            author_name: fields[3].to_string(),
            author_email: fields[4].to_string(),
            timestamp,
            parents: fields[6].split_whitespace().map(String::from).collect(),
        });
    }

    Ok(commits)
}

/// One entry of `git diff --name-status -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameStatus {
    pub status: FileStatus,
    pub path: String,
    pub previous_path: Option<String>,
}

/// Parse `git diff --name-status -z` output.
#[must_use]
pub fn parse_name_status(output: &str) -> Vec<NameStatus> {
    let mut entries = Vec::new();
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());

    while let Some(code) = tokens.next() {
        let status = FileStatus::from_code(code.trim());
        let Some(first) = tokens.next() else { break };

        let entry = if matches!(status, FileStatus::Renamed | FileStatus::Copied) {
            let Some(second) = tokens.next() else { break };
            NameStatus {
                status,
                path: second.to_string(),
                previous_path: Some(first.to_string()),
            }
        } else {
            NameStatus {
                status,
                path: first.to_string(),
                previous_path: None,
            }
        };
        entries.push(entry);
    }

    entries
}

/// Parse `git diff --numstat -z` output into `path -> (additions, deletions)`.
///
/// Binary files report `-` for both counts, which becomes zero. Renames are
/// keyed by their new path.
#[must_use]
pub fn parse_numstat(output: &str) -> HashMap<String, (u64, u64)> {
    let mut counts = HashMap::new();
    let mut tokens = output.split('\0');

    while let Some(token) = tokens.next() {
        let token = token.trim_start_matches('\n');
        if token.is_empty() {
            continue;
        }

        let mut parts = token.splitn(3, '\t');
        let additions = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let deletions = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let path = parts.next().unwrap_or_default();

        let key = if path.is_empty() {
            // Rename/copy: old and new path follow as separate tokens.
            let _old = tokens.next();
            tokens.next().unwrap_or_default().to_string()
        } else {
            path.to_string()
        };

        if !key.is_empty() {
            counts.insert(key, (additions, deletions));
        }
    }

    counts
}

/// Join a name-status listing with numstat counts, preserving name-status order.
#[must_use]
pub fn correlate(entries: Vec<NameStatus>, counts: &HashMap<String, (u64, u64)>) -> Vec<FileChange> {
    entries
        .into_iter()
        .map(|entry| {
            let (additions, deletions) = counts.get(&entry.path).copied().unwrap_or((0, 0));
            FileChange {
                path: entry.path,
                previous_path: entry.previous_path,
                status: entry.status,
                additions,
                deletions,
                binary: additions == 0 && deletions == 0,
            }
        })
        .collect()
}

/// Sum line counts over a file list.
#[must_use]
pub fn diff_stats(files: &[FileChange]) -> DiffStats {
    DiffStats {
        files_changed: files.len(),
        additions: files.iter().map(|f| f.additions).sum(),
        deletions: files.iter().map(|f| f.deletions).sum(),
    }
}
