//! Working directory resolution for a sync run.
//!
//! A run works either in a directory the caller owns (a local repository or
//! an explicit `work_dir`) or in a temporary clone the run owns. Owned
//! clones live in a [`TempDir`] and are removed when the [`WorkDir`] is
//! dropped, on every exit path. Caller directories are never deleted.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::git::namespace::{derive_namespace, redact, resolve_clone_url};
use crate::git::{CloneOptions, GitAccessor};
use crate::sync::types::SyncRequest;

/// Where a run reads the repository from.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    /// Held for its `Drop`; `Some` only for clones this run created.
    temp: Option<TempDir>,
    /// Stable key for checkpoints of this repository.
    repo_key: String,
    /// Namespace derived from the repository location.
    ns: String,
    remote: bool,
}

impl WorkDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is removed when this value is dropped.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.temp.is_some()
    }

    #[must_use]
    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    #[must_use]
    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// Whether the repository was reached through a clone URL.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.remote
    }
}

/// Checkpoint key for a repository reference.
///
/// Local paths are canonicalized; URLs lose credentials, a trailing `/`
/// and `.git`, so equivalent spellings share one checkpoint.
#[must_use]
pub fn repo_key(reference: &str) -> String {
    let path = Path::new(reference);
    if path.exists() {
        return path
            .canonicalize()
            .map_or_else(|_| reference.to_string(), |p| p.to_string_lossy().into_owned());
    }

    let url = resolve_clone_url(reference).unwrap_or_else(|| reference.to_string());
    let url = redact(&url);
    let url = url.trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).to_string()
}

fn clone_options(request: &SyncRequest) -> CloneOptions {
    CloneOptions {
        branch: request.branch.clone(),
        // Shallow only on request: ranges start at the checkpoint commit.
        depth: request.depth,
        single_branch: true,
        token: request.token.clone(),
    }
}

async fn refresh<G: GitAccessor>(git: &G, path: &Path, branch: Option<&str>) {
    if let Err(e) = git.fetch(path, branch).await {
        warn!(path = %path.display(), error = %e, "fetch failed; using local refs");
    }
}

/// Resolve the directory a run will read from.
///
/// # Errors
///
/// Setup errors: `NotARepository` for a local path without git,
/// `InvalidRepository` for an unusable reference, `WorkDir` when a
/// directory cannot be prepared, and `Clone` when cloning fails.
pub async fn resolve<G: GitAccessor>(git: &G, request: &SyncRequest) -> Result<WorkDir> {
    let local = Path::new(&request.repo);
    if local.exists() {
        if !git.is_repo(local).await {
            return Err(Error::NotARepository {
                path: local.to_path_buf(),
            });
        }
        let info = git.repo_info(local).await?;
        if info.remote_url.is_some() {
            refresh(git, local, request.branch.as_deref()).await;
        }
        debug!(path = %local.display(), "using local repository");
        return Ok(WorkDir {
            path: local.to_path_buf(),
            temp: None,
            repo_key: repo_key(&request.repo),
            ns: info.ns,
            remote: false,
        });
    }

    let url = resolve_clone_url(&request.repo).ok_or_else(|| Error::InvalidRepository {
        reference: request.repo.clone(),
    })?;
    let ns = derive_namespace(&request.repo);
    let key = repo_key(&request.repo);

    if let Some(dir) = &request.work_dir {
        if git.is_repo(dir).await {
            refresh(git, dir, request.branch.as_deref()).await;
            debug!(path = %dir.display(), "reusing work dir");
        } else {
            let occupied = dir.is_dir()
                && std::fs::read_dir(dir)
                    .map_err(|e| Error::WorkDir(format!("{}: {e}", dir.display())))?
                    .next()
                    .is_some();
            if occupied {
                return Err(Error::WorkDir(format!(
                    "{} exists and is not a git repository",
                    dir.display()
                )));
            }
            if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::WorkDir(format!("{}: {e}", parent.display())))?;
            }
            info!(url = %redact(&url), path = %dir.display(), "cloning");
            clone(git, &url, dir, request).await?;
        }
        return Ok(WorkDir {
            path: dir.clone(),
            temp: None,
            repo_key: key,
            ns,
            remote: true,
        });
    }

    let temp = tempfile::Builder::new()
        .prefix("mdxsync-")
        .tempdir()
        .map_err(|e| Error::WorkDir(format!("cannot create temp dir: {e}")))?;
    let path = temp.path().join("repo");
    info!(url = %redact(&url), path = %path.display(), "cloning into temp dir");
    clone(git, &url, &path, request).await?;

    Ok(WorkDir {
        path,
        temp: Some(temp),
        repo_key: key,
        ns,
        remote: true,
    })
}

async fn clone<G: GitAccessor>(git: &G, url: &str, dest: &Path, request: &SyncRequest) -> Result<()> {
    git.clone_repo(url, dest, &clone_options(request))
        .await
        .map_err(|e| match e {
            Error::Clone { .. } => e,
            other => Error::Clone {
                url: redact(url),
                message: other.to_string(),
            },
        })
}
