//! Conflict detection between git and the database.
//!
//! A conflict is a file changed in git since the last checkpoint whose
//! database entity was also written after that checkpoint. Detection is
//! read-only.

use tracing::{debug, warn};

use crate::error::Result;
use crate::git::{FileStatus, GitAccessor};
use crate::parser::hash::has_changed;
use crate::parser::staged::{is_content_file, resolve_identity};
use crate::parser::{PathFilter, extract_frontmatter, hash_content, thing_url};
use crate::provider::{DatabaseProvider, EntitySnapshot};
use crate::sync::engine::SyncEngine;
use crate::sync::types::{
    ConflictType, DbSide, GitSide, Resolution, SyncConflict, SyncRequest, SyncState,
};
use crate::sync::workdir;

/// Classify one file against its snapshot.
fn classify(
    state: &SyncState,
    snapshot: &EntitySnapshot,
    hash: &str,
) -> Option<(ConflictType, Resolution)> {
    if snapshot.updated_at <= state.last_sync_at {
        return None;
    }
    if snapshot.deleted {
        return Some((ConflictType::ModifyDelete, Resolution::KeepGit));
    }
    if has_changed(hash, snapshot.hash.as_deref()) {
        return Some((ConflictType::BothModified, Resolution::Merge));
    }
    None
}

impl<G: GitAccessor, P: DatabaseProvider> SyncEngine<G, P> {
    /// Files changed in git since the last checkpoint that were also
    /// changed in the database.
    ///
    /// Returns an empty list when there is no checkpoint or nothing new.
    ///
    /// # Errors
    ///
    /// Setup errors as for [`SyncEngine::sync`], and failures to diff the
    /// range or read an entity.
    pub async fn check_conflicts(&self, request: &SyncRequest) -> Result<Vec<SyncConflict>> {
        let filter = PathFilter::new(&request.include, &request.exclude)?;
        let dir = workdir::resolve(self.git(), request).await?;
        let ctx = self.resolve_range(&dir, request).await?;

        let Some(state) = &ctx.previous else {
            debug!(repo = %ctx.repo_key, "no checkpoint; nothing to compare");
            return Ok(Vec::new());
        };
        if state.last_commit == ctx.to.hash {
            return Ok(Vec::new());
        }

        let path = dir.path();
        let diff = self.git().diff(path, &state.last_commit, &ctx.to.hash).await?;

        let mut conflicts = Vec::new();
        for file in &diff.files {
            if file.status == FileStatus::Deleted
                || !is_content_file(&file.path)
                || !filter.allows(&file.path)
            {
                continue;
            }

            let content = match self.git().file_content(path, &file.path, &ctx.to.hash).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %file.path, error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let data = extract_frontmatter(&content).data;
            let (thing_type, Some(id)) = resolve_identity(&file.path, Some(&data)) else {
                continue;
            };
            let url = thing_url(&ctx.ns, &thing_type, &id);

            let Some(snapshot) = self.provider().get_thing(&url).await? else {
                continue;
            };
            let hash = hash_content(&content);
            if let Some((conflict_type, suggestion)) = classify(state, &snapshot, &hash) {
                debug!(path = %file.path, url = %url, ?conflict_type, "conflict");
                conflicts.push(SyncConflict {
                    conflict_type,
                    path: file.path.clone(),
                    url,
                    git: GitSide {
                        commit: ctx.to.hash.clone(),
                        hash,
                        timestamp: ctx.to.timestamp,
                    },
                    db: DbSide {
                        version: snapshot.version,
                        hash: snapshot.hash.clone(),
                        timestamp: snapshot.updated_at,
                    },
                    suggestion,
                });
            }
        }
        Ok(conflicts)
    }
}
