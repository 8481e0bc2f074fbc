//! Shared fixtures for integration tests.
//!
//! Repositories are real: each [`TestRepo`] is a `git init` in a temp dir
//! driven through the `git` binary.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use mdxsync::git::{CliGit, CloneOptions, Commit, Diff, GitAccessor, RepoInfo};
use mdxsync::{Error, Result};
use mdxsync::parser::StagedChange;
use mdxsync::provider::{
    DatabaseProvider, EntitySnapshot, Event, SqliteProvider, SyncActionOptions,
};
use mdxsync::sync::{SyncState, SyncStats};
use tempfile::TempDir;

pub const NS: &str = "test.local";

/// A throwaway git repository on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let repo = Self { dir };
        repo.git(&["init", "--quiet"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "mdxsync test"]);
        repo.git(&["config", "user.email", "test@mdxsync.dev"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_str(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    /// `file://` URL for cloning this repository.
    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write(&self, file: &str, content: &str) -> &Self {
        let path = self.dir.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(path, content).expect("write file");
        self
    }

    pub fn remove(&self, file: &str) -> &Self {
        self.git(&["rm", "--quiet", file]);
        self
    }

    pub fn rename(&self, from: &str, to: &str) -> &Self {
        if let Some(parent) = self.dir.path().join(to).parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        self.git(&["mv", from, to]);
        self
    }

    /// Commit everything and return the new HEAD.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "--all"]);
        self.git(&["commit", "--quiet", "-m", message]);
        self.head()
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }
}

/// A post with a title and a body.
pub fn post(title: &str, body: &str) -> String {
    format!("---\ntitle: {title}\n---\n\n{body}\n")
}

/// Wraps a provider and counts every mutating call.
pub struct RecordingProvider {
    pub inner: SqliteProvider,
    mutations: AtomicUsize,
    reads: AtomicUsize,
}

impl RecordingProvider {
    pub fn new(inner: SqliteProvider) -> Self {
        Self {
            inner,
            mutations: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl DatabaseProvider for RecordingProvider {
    async fn is_connected(&self) -> bool {
        self.inner.is_connected().await
    }

    async fn get_sync_state(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        self.read();
        self.inner.get_sync_state(repo, branch).await
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.mutated();
        self.inner.save_sync_state(state).await
    }

    async fn create_sync_action(&self, options: &SyncActionOptions) -> Result<String> {
        self.mutated();
        self.inner.create_sync_action(options).await
    }

    async fn update_action_progress(&self, action_id: &str, processed: usize, total: usize) -> Result<()> {
        self.mutated();
        self.inner.update_action_progress(action_id, processed, total).await
    }

    async fn complete_action(&self, action_id: &str, stats: &SyncStats) -> Result<()> {
        self.mutated();
        self.inner.complete_action(action_id, stats).await
    }

    async fn fail_action(&self, action_id: &str, error: &str) -> Result<()> {
        self.mutated();
        self.inner.fail_action(action_id, error).await
    }

    async fn upsert_thing(&self, ns: &str, change: &StagedChange, version: u64) -> Result<()> {
        self.mutated();
        self.inner.upsert_thing(ns, change, version).await
    }

    async fn delete_thing(&self, ns: &str, thing_type: &str, id: &str, version: u64) -> Result<()> {
        self.mutated();
        self.inner.delete_thing(ns, thing_type, id, version).await
    }

    async fn get_thing(&self, url: &str) -> Result<Option<EntitySnapshot>> {
        self.read();
        self.inner.get_thing(url).await
    }

    async fn emit_event(&self, event: &Event) -> Result<()> {
        self.mutated();
        self.inner.emit_event(event).await
    }
}

/// Fails thing writes for one id and passes everything else through.
pub struct FailingProvider {
    pub inner: SqliteProvider,
    fail_id: String,
}

impl FailingProvider {
    pub fn new(inner: SqliteProvider, fail_id: &str) -> Self {
        Self {
            inner,
            fail_id: fail_id.to_string(),
        }
    }

    fn check(&self, id: Option<&str>) -> Result<()> {
        if id == Some(self.fail_id.as_str()) {
            return Err(Error::Provider(format!("write rejected for {}", self.fail_id)));
        }
        Ok(())
    }
}

impl DatabaseProvider for FailingProvider {
    async fn is_connected(&self) -> bool {
        self.inner.is_connected().await
    }

    async fn get_sync_state(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        self.inner.get_sync_state(repo, branch).await
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.inner.save_sync_state(state).await
    }

    async fn create_sync_action(&self, options: &SyncActionOptions) -> Result<String> {
        self.inner.create_sync_action(options).await
    }

    async fn update_action_progress(&self, action_id: &str, processed: usize, total: usize) -> Result<()> {
        self.inner.update_action_progress(action_id, processed, total).await
    }

    async fn complete_action(&self, action_id: &str, stats: &SyncStats) -> Result<()> {
        self.inner.complete_action(action_id, stats).await
    }

    async fn fail_action(&self, action_id: &str, error: &str) -> Result<()> {
        self.inner.fail_action(action_id, error).await
    }

    async fn upsert_thing(&self, ns: &str, change: &StagedChange, version: u64) -> Result<()> {
        self.check(change.id.as_deref())?;
        self.inner.upsert_thing(ns, change, version).await
    }

    async fn delete_thing(&self, ns: &str, thing_type: &str, id: &str, version: u64) -> Result<()> {
        self.check(Some(id))?;
        self.inner.delete_thing(ns, thing_type, id, version).await
    }

    async fn get_thing(&self, url: &str) -> Result<Option<EntitySnapshot>> {
        self.inner.get_thing(url).await
    }

    async fn emit_event(&self, event: &Event) -> Result<()> {
        self.inner.emit_event(event).await
    }
}

/// Real git that remembers every clone destination.
#[derive(Default)]
pub struct TrackingGit {
    inner: CliGit,
    clones: Mutex<Vec<PathBuf>>,
}

impl TrackingGit {
    pub fn clones(&self) -> Vec<PathBuf> {
        self.clones.lock().unwrap().clone()
    }
}

impl GitAccessor for TrackingGit {
    async fn is_repo(&self, path: &Path) -> bool {
        self.inner.is_repo(path).await
    }

    async fn repo_info(&self, path: &Path) -> Result<RepoInfo> {
        self.inner.repo_info(path).await
    }

    async fn commit(&self, path: &Path, reference: &str) -> Result<Commit> {
        self.inner.commit(path, reference).await
    }

    async fn commits(&self, path: &Path, from: &str, to: &str) -> Result<Vec<Commit>> {
        self.inner.commits(path, from, to).await
    }

    async fn diff(&self, path: &Path, from: &str, to: &str) -> Result<Diff> {
        self.inner.diff(path, from, to).await
    }

    async fn file_content(&self, path: &Path, file: &str, reference: &str) -> Result<String> {
        self.inner.file_content(path, file, reference).await
    }

    async fn list_files(&self, path: &Path, reference: &str, pattern: Option<&str>) -> Result<Vec<String>> {
        self.inner.list_files(path, reference, pattern).await
    }

    async fn clone_repo(&self, url: &str, dest: &Path, options: &CloneOptions) -> Result<()> {
        self.clones.lock().unwrap().push(dest.to_path_buf());
        self.inner.clone_repo(url, dest, options).await
    }

    async fn fetch(&self, path: &Path, branch: Option<&str>) -> Result<()> {
        self.inner.fetch(path, branch).await
    }

    async fn checkout(&self, path: &Path, reference: &str) -> Result<()> {
        self.inner.checkout(path, reference).await
    }
}

/// Path inside a fresh temp dir that does not exist yet.
pub fn missing_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}
