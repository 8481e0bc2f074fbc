//! The synchronization engine.
//!
//! One call to [`SyncEngine::sync`] walks a commit range oldest-first,
//! stages every content change, and applies the staged changes through a
//! [`DatabaseProvider`] in order. Setup problems (bad repository, clone
//! failure, unsupported direction) abort the run; everything after that is
//! collected per commit or per file and the run carries on.
//!
//! Versions are assigned here, not by the store: the first write to a url in
//! a run reads its snapshot, and every later write in the same run
//! increments a local counter. Calls are strictly sequential so the counter
//! never races.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::git::{Commit, FileChange, FileStatus, GitAccessor};
use crate::parser::staged::{is_content_file, resolve_identity};
use crate::parser::{
    ParseOptions, PathFilter, StagedChange, attach_previous, build_staged_change,
    extract_frontmatter,
};
use crate::provider::sqlite::DEFAULT_ACTOR;
use crate::provider::{DatabaseProvider, EntitySnapshot, Event, EventType, SyncActionOptions};
use crate::sync::types::{
    SyncDirection, SyncError, SyncMode, SyncRequest, SyncResult, SyncState, SyncStats, SyncedFile,
};
use crate::sync::workdir::{self, WorkDir};

/// Progress callback: `(processed, total)` commits.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Drives sync runs against one git accessor and one provider.
pub struct SyncEngine<G, P> {
    git: G,
    provider: P,
    progress: Option<ProgressFn>,
}

/// A staged change waiting to be applied.
#[derive(Debug, Clone)]
struct Planned {
    commit: String,
    change: StagedChange,
    /// `false` for the tombstone synthesized before a rename.
    counted: bool,
}

/// What a url looks like after the whole range is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FinalState {
    Live(Option<String>),
    Deleted,
}

/// Per-url state tracked across one run.
#[derive(Debug, Clone, Copy)]
struct UrlState {
    version: u64,
    live: bool,
    /// The store already holds the final state; skip every write.
    settled: bool,
}

/// Resolved range and identity of a run.
pub(crate) struct RunContext {
    pub(crate) repo_key: String,
    pub(crate) branch: String,
    pub(crate) ns: String,
    pub(crate) actor: String,
    pub(crate) from: String,
    pub(crate) to: Commit,
    pub(crate) previous: Option<SyncState>,
}

impl<G: GitAccessor, P: DatabaseProvider> SyncEngine<G, P> {
    pub fn new(git: G, provider: P) -> Self {
        Self {
            git,
            provider,
            progress: None,
        }
    }

    /// Report `(processed, total)` after each commit.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Stored checkpoint for a repository reference and branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be read.
    pub async fn status(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        self.provider
            .get_sync_state(&workdir::repo_key(repo), branch)
            .await
    }

    /// Run one sync.
    ///
    /// # Errors
    ///
    /// Only setup errors are returned: an unsupported direction, an
    /// unusable repository reference or work dir, a failed clone, an
    /// unresolvable target, or a provider that cannot record the run.
    /// Per-commit and per-file failures land in [`SyncResult::errors`].
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncResult> {
        let started = Instant::now();

        if request.direction != SyncDirection::GitToDb {
            return Err(Error::UnsupportedDirection(request.direction.to_string()));
        }
        let filter = PathFilter::new(&request.include, &request.exclude)?;

        let dir = workdir::resolve(&self.git, request).await?;
        let ctx = self.resolve_range(&dir, request).await?;
        let path = dir.path();

        if ctx.from == ctx.to.hash {
            info!(commit = %ctx.to.short_hash, "already up to date");
            return Ok(no_op(&ctx, request, started));
        }

        let commits = self.git.commits(path, &ctx.from, &ctx.to.hash).await?;
        if commits.is_empty() {
            info!(from = %ctx.from, to = %ctx.to.short_hash, "no commits in range");
            return Ok(no_op(&ctx, request, started));
        }

        info!(
            repo = %ctx.repo_key,
            branch = %ctx.branch,
            ns = %ctx.ns,
            commits = commits.len(),
            dry_run = request.dry_run,
            "sync started"
        );

        let options = ParseOptions {
            ns: ctx.ns.clone(),
            filter,
        };

        let mut errors = Vec::new();
        let mut batches: Vec<Vec<Planned>> = Vec::with_capacity(commits.len());
        for commit in &commits {
            match self.stage_commit(path, commit, &options).await {
                Ok(planned) => batches.push(planned),
                Err(e) => {
                    warn!(commit = %commit.short_hash, error = %e, "commit skipped");
                    errors.push(SyncError::commit(&commit.hash, e.to_string()));
                    batches.push(Vec::new());
                }
            }
        }

        let correlation = uuid::Uuid::new_v4().to_string();
        let run_entity = format!("{}@{}", ctx.repo_key, ctx.branch);
        let action_id = if request.dry_run {
            None
        } else {
            let id = self
                .provider
                .create_sync_action(&SyncActionOptions {
                    repo: ctx.repo_key.clone(),
                    branch: ctx.branch.clone(),
                    ns: ctx.ns.clone(),
                    actor: ctx.actor.clone(),
                    from_commit: (!ctx.from.is_empty()).then(|| ctx.from.clone()),
                    to_commit: ctx.to.hash.clone(),
                    commit: commits.last().cloned(),
                    total_commits: commits.len(),
                    objects: batches.iter().flatten().map(|p| p.change.clone()).collect(),
                })
                .await?;

            let range = serde_json::json!({
                "from": ctx.from,
                "to": ctx.to.hash,
                "commits": commits.len(),
            });
            let event = Event::new("sync", &run_entity, EventType::SyncStarted, &ctx.actor)
                .with_values(None, Some(range.to_string()))
                .with_comment(&id)
                .with_correlation(&correlation);
            if let Err(e) = self.provider.emit_event(&event).await {
                warn!(error = %e, "failed to emit start event");
            }
            Some(id)
        };

        let mut stats = SyncStats::default();
        let mut files = Vec::new();
        let finals = final_states(&batches, &ctx.ns);
        let mut urls: HashMap<String, UrlState> = HashMap::new();
        let total = commits.len();

        for (index, planned) in batches.iter().enumerate() {
            for item in planned {
                let file = self
                    .apply(item, &ctx.ns, request, &finals, &mut urls, &mut stats)
                    .await;
                if let Some(message) = &file.error {
                    errors.push(SyncError::file(&item.commit, &file.path, message.clone()));
                }
                files.push(file);
            }

            stats.commits += 1;
            if let Some(id) = &action_id {
                if let Err(e) = self.provider.update_action_progress(id, index + 1, total).await {
                    warn!(error = %e, "failed to record progress");
                }
            }
            if let Some(progress) = &self.progress {
                progress(index + 1, total);
            }
        }

        let state = next_state(&ctx, request.mode, &stats, commits.len());
        if !request.dry_run {
            if let Err(e) = self.provider.save_sync_state(&state).await {
                warn!(error = %e, "failed to save checkpoint");
                errors.push(SyncError {
                    commit: None,
                    path: None,
                    message: format!("saving checkpoint: {e}"),
                });
            }
        }

        stats.errors = errors.len();
        stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Some(id) = &action_id {
            self.finish_action(id, &run_entity, &correlation, &ctx.actor, &stats, &errors)
                .await;
        }

        info!(
            commits = stats.commits,
            created = stats.things_created,
            updated = stats.things_updated,
            deleted = stats.things_deleted,
            unchanged = stats.things_unchanged,
            errors = stats.errors,
            "sync finished"
        );

        Ok(SyncResult {
            success: errors.is_empty(),
            action_id,
            commits,
            files,
            errors,
            stats,
            state,
            dry_run: request.dry_run,
        })
    }

    /// Resolve target commit, branch, namespace and starting point.
    pub(crate) async fn resolve_range(
        &self,
        dir: &WorkDir,
        request: &SyncRequest,
    ) -> Result<RunContext> {
        let path = dir.path();
        let branch = match &request.branch {
            Some(branch) => branch.clone(),
            None => self.git.repo_info(path).await?.current_branch,
        };

        let to = match &request.to_commit {
            Some(reference) => self.git.commit(path, reference).await?,
            None => {
                // A reused clone only moves its remote-tracking refs on fetch.
                let tracked = request
                    .branch
                    .as_deref()
                    .or_else(|| dir.is_remote().then_some(branch.as_str()));
                self.target_commit(path, tracked).await?
            }
        };

        let previous = self.provider.get_sync_state(dir.repo_key(), &branch).await?;
        let from = match (&request.from_commit, request.mode, &previous) {
            (Some(reference), _, _) => self.git.commit(path, reference).await?.hash,
            (None, SyncMode::Full, _) | (None, SyncMode::Incremental, None) => String::new(),
            (None, SyncMode::Incremental, Some(state)) => state.last_commit.clone(),
        };

        Ok(RunContext {
            repo_key: dir.repo_key().to_string(),
            branch,
            ns: request.ns.clone().unwrap_or_else(|| dir.ns().to_string()),
            actor: request
                .actor
                .clone()
                .unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            from,
            to,
            previous,
        })
    }

    /// `origin/<branch>`, then `<branch>`, then `HEAD`.
    async fn target_commit(&self, path: &Path, branch: Option<&str>) -> Result<Commit> {
        if let Some(branch) = branch {
            if let Ok(commit) = self.git.commit(path, &format!("origin/{branch}")).await {
                return Ok(commit);
            }
            return self.git.commit(path, branch).await;
        }
        self.git.commit(path, "HEAD").await
    }

    /// Stage every content change in one commit, diffed against its first parent.
    async fn stage_commit(
        &self,
        path: &Path,
        commit: &Commit,
        options: &ParseOptions,
    ) -> Result<Vec<Planned>> {
        let parent = commit.first_parent().unwrap_or("");
        let diff = self.git.diff(path, parent, &commit.hash).await?;
        debug!(commit = %commit.short_hash, files = diff.files.len(), "diff");

        let mut planned = Vec::new();
        for file in &diff.files {
            if !is_content_file(&file.path) || !options.filter.allows(&file.path) {
                continue;
            }

            let previous_path = file.previous_path.as_deref().unwrap_or(&file.path);
            let previous = if parent.is_empty() || file.status == FileStatus::Added {
                None
            } else {
                self.git
                    .file_content(path, previous_path, parent)
                    .await
                    .ok()
            };

            if file.status == FileStatus::Deleted {
                if let Some(change) = build_staged_change(file, previous.as_deref(), options) {
                    planned.push(Planned {
                        commit: commit.hash.clone(),
                        change,
                        counted: true,
                    });
                }
                continue;
            }

            let content = self.git.file_content(path, &file.path, &commit.hash).await;
            if file.status == FileStatus::Renamed {
                if let Some(tombstone) =
                    rename_tombstone(file, previous.as_deref(), content.as_deref().ok(), options)
                {
                    planned.push(Planned {
                        commit: commit.hash.clone(),
                        change: tombstone,
                        counted: false,
                    });
                }
            }

            let Some(mut change) = build_staged_change(file, content.as_deref().ok(), options)
            else {
                continue;
            };
            if let Err(e) = content {
                change.errors = Some(vec![e.to_string()]);
            }
            if let Some(previous) = previous.as_deref() {
                if file.status != FileStatus::Copied {
                    attach_previous(&mut change, previous);
                }
            }
            planned.push(Planned {
                commit: commit.hash.clone(),
                change,
                counted: true,
            });
        }
        Ok(planned)
    }

    /// Apply one staged change and report what happened.
    async fn apply(
        &self,
        item: &Planned,
        ns: &str,
        request: &SyncRequest,
        finals: &HashMap<String, FinalState>,
        urls: &mut HashMap<String, UrlState>,
        stats: &mut SyncStats,
    ) -> SyncedFile {
        let change = &item.change;
        if item.counted {
            stats.record_change(change.change);
        }

        let mut file = SyncedFile {
            path: change.path.clone(),
            commit: item.commit.clone(),
            change: change.change,
            thing_type: change.thing_type.clone(),
            id: change.id.clone(),
            operation: change.operation,
            version: None,
            synced: false,
            skipped: false,
            error: None,
        };

        if let Some(errors) = &change.errors {
            file.error = Some(errors.join("; "));
            return file;
        }
        let (Some(url), Some(id)) = (change.url(ns), change.id.as_deref()) else {
            file.error = Some(format!("no id for {}", change.path));
            return file;
        };

        let state = match urls.get(&url).copied() {
            Some(state) => state,
            None => match self.provider.get_thing(&url).await {
                Ok(snapshot) => {
                    let state = initial_state(snapshot.as_ref(), finals.get(&url), request.force);
                    urls.insert(url.clone(), state);
                    state
                }
                Err(e) => {
                    file.error = Some(format!("reading {url}: {e}"));
                    return file;
                }
            },
        };

        if state.settled {
            file.synced = true;
            file.skipped = true;
            stats.things_unchanged += 1;
            log_file(request.verbose, &file, &url, "unchanged");
            return file;
        }

        let version = state.version + 1;
        let written = if request.dry_run {
            Ok(())
        } else if change.is_delete() {
            self.provider
                .delete_thing(ns, &change.thing_type, id, version)
                .await
        } else {
            self.provider.upsert_thing(ns, change, version).await
        };

        match written {
            Ok(()) => {
                if change.is_delete() {
                    stats.things_deleted += 1;
                } else if state.live {
                    stats.things_updated += 1;
                } else {
                    stats.things_created += 1;
                }
                urls.insert(
                    url.clone(),
                    UrlState {
                        version,
                        live: !change.is_delete(),
                        settled: false,
                    },
                );
                file.version = Some(version);
                file.synced = true;
                log_file(request.verbose, &file, &url, change.operation.as_str());
            }
            Err(e) => {
                warn!(url = %url, error = %e, "write failed");
                file.error = Some(e.to_string());
            }
        }
        file
    }

    async fn finish_action(
        &self,
        action_id: &str,
        run_entity: &str,
        correlation: &str,
        actor: &str,
        stats: &SyncStats,
        errors: &[SyncError],
    ) {
        let (finished, event_type) = if errors.is_empty() {
            (
                self.provider.complete_action(action_id, stats).await,
                EventType::SyncCompleted,
            )
        } else {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            (
                self.provider.fail_action(action_id, &message).await,
                EventType::SyncFailed,
            )
        };
        if let Err(e) = finished {
            warn!(action = %action_id, error = %e, "failed to finalize action");
        }

        let summary = serde_json::to_string(stats).ok();
        let event = Event::new("sync", run_entity, event_type, actor)
            .with_values(None, summary)
            .with_comment(action_id)
            .with_correlation(correlation);
        if let Err(e) = self.provider.emit_event(&event).await {
            warn!(error = %e, "failed to emit completion event");
        }
    }
}

/// Tombstone for the old identity of a renamed file, if it changes.
fn rename_tombstone(
    file: &FileChange,
    previous: Option<&str>,
    current: Option<&str>,
    options: &ParseOptions,
) -> Option<StagedChange> {
    let old_path = file.previous_path.as_deref()?;
    if !is_content_file(old_path) || !options.filter.allows(old_path) {
        return None;
    }

    let old_data = previous.map(|c| extract_frontmatter(c).data);
    let old_identity = resolve_identity(old_path, old_data.as_ref());
    let new_data = current.map(|c| extract_frontmatter(c).data);
    let new_identity = resolve_identity(&file.path, new_data.as_ref());
    if old_identity == new_identity || old_identity.1.is_none() {
        return None;
    }

    let removed = FileChange::new(old_path, FileStatus::Deleted);
    build_staged_change(&removed, previous, options)
}

/// Result of a run with nothing to do.
fn no_op(ctx: &RunContext, request: &SyncRequest, started: Instant) -> SyncResult {
    let state = ctx.previous.clone().unwrap_or_else(|| SyncState {
        repo: ctx.repo_key.clone(),
        ns: ctx.ns.clone(),
        branch: ctx.branch.clone(),
        last_commit: ctx.to.hash.clone(),
        last_sync_at: Utc::now(),
        total_files: 0,
        total_commits: 0,
    });
    SyncResult {
        success: true,
        action_id: None,
        commits: Vec::new(),
        files: Vec::new(),
        errors: Vec::new(),
        stats: SyncStats {
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ..SyncStats::default()
        },
        state,
        dry_run: request.dry_run,
    }
}

fn log_file(verbose: bool, file: &SyncedFile, url: &str, outcome: &str) {
    if verbose {
        info!(path = %file.path, url = %url, version = ?file.version, "{outcome}");
    } else {
        debug!(path = %file.path, url = %url, version = ?file.version, "{outcome}");
    }
}

/// Final state of every url touched by the range, last write wins.
fn final_states(batches: &[Vec<Planned>], ns: &str) -> HashMap<String, FinalState> {
    let mut finals = HashMap::new();
    for item in batches.iter().flatten() {
        if item.change.errors.is_some() {
            continue;
        }
        if let Some(url) = item.change.url(ns) {
            let state = if item.change.is_delete() {
                FinalState::Deleted
            } else {
                FinalState::Live(item.change.hash.clone())
            };
            finals.insert(url, state);
        }
    }
    finals
}

fn initial_state(
    snapshot: Option<&EntitySnapshot>,
    target: Option<&FinalState>,
    force: bool,
) -> UrlState {
    let Some(snapshot) = snapshot else {
        return UrlState {
            version: 0,
            live: false,
            settled: false,
        };
    };

    let settled = !force
        && match target {
            Some(FinalState::Live(hash)) => !snapshot.deleted && snapshot.hash == *hash,
            Some(FinalState::Deleted) => snapshot.deleted,
            None => false,
        };

    UrlState {
        version: snapshot.version,
        live: !snapshot.deleted,
        settled,
    }
}

fn next_state(ctx: &RunContext, mode: SyncMode, stats: &SyncStats, commits: usize) -> SyncState {
    let (base_files, base_commits) = match (&ctx.previous, mode) {
        (Some(prev), SyncMode::Incremental) => (prev.total_files, prev.total_commits),
        _ => (0, 0),
    };
    SyncState {
        repo: ctx.repo_key.clone(),
        ns: ctx.ns.clone(),
        branch: ctx.branch.clone(),
        last_commit: ctx.to.hash.clone(),
        last_sync_at: Utc::now(),
        total_files: base_files + stats.files() as u64,
        total_commits: base_commits + commits as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn snapshot(version: u64, hash: Option<&str>, deleted: bool) -> EntitySnapshot {
        EntitySnapshot {
            url: "ns/Post/a".to_string(),
            version,
            hash: hash.map(String::from),
            updated_at: DateTime::default(),
            deleted,
        }
    }

    #[test]
    fn test_initial_state_without_snapshot() {
        let state = initial_state(None, Some(&FinalState::Live(Some("h".into()))), false);
        assert_eq!(state.version, 0);
        assert!(!state.live);
        assert!(!state.settled);
    }

    #[test]
    fn test_initial_state_settled_when_hash_matches() {
        let snap = snapshot(3, Some("h"), false);
        let target = FinalState::Live(Some("h".into()));

        assert!(initial_state(Some(&snap), Some(&target), false).settled);
        assert!(!initial_state(Some(&snap), Some(&target), true).settled);

        let other = FinalState::Live(Some("x".into()));
        assert!(!initial_state(Some(&snap), Some(&other), false).settled);
    }

    #[test]
    fn test_initial_state_settled_when_already_deleted() {
        let snap = snapshot(4, None, true);
        let state = initial_state(Some(&snap), Some(&FinalState::Deleted), false);
        assert!(state.settled);
        assert!(!state.live);
        assert_eq!(state.version, 4);
    }

    #[test]
    fn test_final_states_last_write_wins() {
        let make = |path: &str, status: FileStatus, content: Option<&str>| Planned {
            commit: "c".to_string(),
            change: build_staged_change(
                &FileChange::new(path, status),
                content,
                &ParseOptions {
                    ns: "ns".to_string(),
                    ..ParseOptions::default()
                },
            )
            .unwrap(),
            counted: true,
        };

        let batches = vec![
            vec![make("posts/a.md", FileStatus::Added, Some("one"))],
            vec![
                make("posts/a.md", FileStatus::Modified, Some("two")),
                make("posts/b.md", FileStatus::Added, Some("b")),
            ],
            vec![make("posts/b.md", FileStatus::Deleted, None)],
        ];

        let finals = final_states(&batches, "ns");
        assert_eq!(
            finals.get("ns/Post/a"),
            Some(&FinalState::Live(Some(crate::parser::hash_content("two"))))
        );
        assert_eq!(finals.get("ns/Post/b"), Some(&FinalState::Deleted));
    }
}
