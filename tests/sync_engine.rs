//! End-to-end sync runs against real git repositories.

mod common;

use std::sync::{Arc, Mutex};

use common::{FailingProvider, NS, RecordingProvider, TestRepo, TrackingGit, post};
use mdxsync::Error;
use mdxsync::git::{CliGit, FileStatus};
use mdxsync::parser::hash_content;
use mdxsync::provider::{DatabaseProvider, EventType, SqliteProvider};
use mdxsync::sync::{SyncDirection, SyncEngine, SyncMode, SyncRequest, repo_key};

fn engine() -> SyncEngine<CliGit, SqliteProvider> {
    SyncEngine::new(CliGit::new(), SqliteProvider::open_memory().unwrap())
}

fn request(repo: &TestRepo) -> SyncRequest {
    SyncRequest {
        ns: Some(NS.to_string()),
        ..SyncRequest::new(repo.path_str())
    }
}

fn url(thing_type: &str, id: &str) -> String {
    format!("{NS}/{thing_type}/{id}")
}

#[tokio::test]
async fn test_first_sync_creates_version_one() {
    let repo = TestRepo::new();
    let content = post("Hello", "Hi there, world.");
    repo.write("posts/hello.mdx", &content);
    let head = repo.commit("add hello");

    let engine = engine();
    let result = engine.sync(&request(&repo)).await.unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.commits.len(), 1);
    assert_eq!(result.stats.files_added, 1);
    assert_eq!(result.stats.things_created, 1);
    assert_eq!(result.files.len(), 1);

    let file = &result.files[0];
    assert_eq!(file.thing_type, "Post");
    assert_eq!(file.id.as_deref(), Some("hello"));
    assert_eq!(file.version, Some(1));
    assert!(file.synced);
    assert!(!file.skipped);

    assert_eq!(result.state.last_commit, head);
    assert_eq!(result.state.ns, NS);
    assert_eq!(result.state.branch, "main");

    let snapshot = engine
        .provider()
        .get_thing(&url("Post", "hello"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.hash.as_deref(), Some(hash_content(&content).as_str()));
    assert!(!snapshot.deleted);

    let record = engine.provider().thing(&url("Post", "hello")).unwrap().unwrap();
    assert_eq!(record.data.unwrap()["title"], "Hello");
    assert_eq!(record.path.as_deref(), Some("posts/hello.mdx"));
}

#[tokio::test]
async fn test_each_commit_becomes_a_version() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.commit("one");
    repo.write("posts/a.md", &post("A", "two"));
    repo.commit("two");
    repo.write("posts/a.md", &post("A", "three"));
    repo.commit("three");

    let engine = engine();
    let result = engine.sync(&request(&repo)).await.unwrap();

    assert!(result.success);
    assert_eq!(result.stats.commits, 3);
    assert_eq!(result.stats.things_created, 1);
    assert_eq!(result.stats.things_updated, 2);
    let versions: Vec<_> = result.files.iter().map(|f| f.version).collect();
    assert_eq!(versions, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(engine.provider().versions(&url("Post", "a")).unwrap(), vec![1, 2, 3]);

    let events: Vec<_> = engine
        .provider()
        .thing_events(&url("Post", "a"))
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        events,
        vec![EventType::ThingCreated, EventType::ThingUpdated, EventType::ThingUpdated]
    );
}

#[tokio::test]
async fn test_incremental_sync_resumes_from_checkpoint() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.commit("one");

    let engine = engine();
    let first = engine.sync(&request(&repo)).await.unwrap();
    assert_eq!(first.state.total_commits, 1);

    let again = engine.sync(&request(&repo)).await.unwrap();
    assert!(again.success);
    assert!(again.commits.is_empty());
    assert!(again.action_id.is_none());
    assert_eq!(again.stats.things_written(), 0);
    assert_eq!(engine.provider().action_count().unwrap(), 1);

    repo.write("posts/a.md", &post("A", "two"));
    let head = repo.commit("two");

    let next = engine.sync(&request(&repo)).await.unwrap();
    assert_eq!(next.commits.len(), 1);
    assert_eq!(next.commits[0].hash, head);
    assert_eq!(next.files[0].version, Some(2));
    assert_eq!(next.state.total_commits, 2);

    let stored = engine.status(&repo.path_str(), "main").await.unwrap().unwrap();
    assert_eq!(stored.last_commit, head);
    assert_eq!(stored.repo, repo_key(&repo.path_str()));
}

#[tokio::test]
async fn test_full_resync_adds_no_versions() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.commit("one");
    repo.write("posts/a.md", &post("A", "two"));
    repo.commit("two");

    let engine = engine();
    engine.sync(&request(&repo)).await.unwrap();

    let full = SyncRequest {
        mode: SyncMode::Full,
        ..request(&repo)
    };
    let result = engine.sync(&full).await.unwrap();

    assert!(result.success);
    assert_eq!(result.stats.commits, 2);
    assert_eq!(result.stats.things_written(), 0);
    assert_eq!(result.stats.things_unchanged, 2);
    assert!(result.files.iter().all(|f| f.synced && f.skipped));
    assert_eq!(result.state.total_commits, 2);
    assert_eq!(engine.provider().versions(&url("Post", "a")).unwrap(), vec![1, 2]);

    let forced = SyncRequest {
        force: true,
        ..full
    };
    let result = engine.sync(&forced).await.unwrap();
    assert_eq!(result.stats.things_updated, 2);
    assert_eq!(
        engine.provider().versions(&url("Post", "a")).unwrap(),
        vec![1, 2, 3, 4]
    );
}

#[tokio::test]
async fn test_deleted_file_becomes_tombstone() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.write("posts/keep.md", &post("Keep", "stays"));
    repo.commit("add");
    repo.remove("posts/a.md");
    repo.commit("remove");

    let engine = engine();
    let result = engine.sync(&request(&repo)).await.unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.stats.files_deleted, 1);
    assert_eq!(result.stats.things_created, 2);
    assert_eq!(result.stats.things_deleted, 1);

    let snapshot = engine.provider().get_thing(&url("Post", "a")).await.unwrap().unwrap();
    assert!(snapshot.deleted);
    assert_eq!(snapshot.version, 2);
    assert_eq!(engine.provider().count_things(NS).unwrap(), 1);

    let last = engine
        .provider()
        .thing_events(&url("Post", "a"))
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(last.event_type, EventType::ThingDeleted);

    let full = SyncRequest {
        mode: SyncMode::Full,
        ..request(&repo)
    };
    let again = engine.sync(&full).await.unwrap();
    assert_eq!(again.stats.things_written(), 0);
    assert_eq!(engine.provider().versions(&url("Post", "a")).unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_rename_moves_identity() {
    let repo = TestRepo::new();
    let content = post("Moving", "This body stays the same across the rename.");
    repo.write("posts/old-name.md", &content);
    repo.commit("add");

    let engine = engine();
    engine.sync(&request(&repo)).await.unwrap();

    repo.rename("posts/old-name.md", "posts/new-name.md");
    repo.commit("rename");
    let result = engine.sync(&request(&repo)).await.unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.stats.files_renamed, 1);
    assert_eq!(result.stats.files(), 1);
    assert_eq!(result.stats.things_deleted, 1);
    assert_eq!(result.stats.things_created, 1);

    let renamed = result
        .files
        .iter()
        .find(|f| f.change == FileStatus::Renamed)
        .unwrap();
    assert_eq!(renamed.path, "posts/new-name.md");
    assert_eq!(renamed.version, Some(1));

    let old = engine
        .provider()
        .get_thing(&url("Post", "old-name"))
        .await
        .unwrap()
        .unwrap();
    assert!(old.deleted);
    assert_eq!(old.version, 2);

    let new = engine.provider().thing(&url("Post", "new-name")).unwrap().unwrap();
    assert_eq!(new.path.as_deref(), Some("posts/new-name.md"));
    assert_eq!(new.hash.as_deref(), Some(hash_content(&content).as_str()));
}

#[tokio::test]
async fn test_include_and_exclude_filters() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "kept"));
    repo.write("posts/draft-b.md", &post("B", "draft"));
    repo.write("docs/guide.md", &post("Guide", "elsewhere"));
    repo.write("assets/notes.txt", "not content");
    repo.commit("mixed");

    let filtered = SyncRequest {
        include: vec!["posts/**".to_string()],
        exclude: vec!["**/draft-*".to_string()],
        ..request(&repo)
    };
    let engine = engine();
    let result = engine.sync(&filtered).await.unwrap();

    let paths: Vec<_> = result.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["posts/a.md"]);
    assert_eq!(result.stats.files_added, 1);
    assert_eq!(engine.provider().count_things(NS).unwrap(), 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing_and_matches_real_run() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.write("posts/b.md", &post("B", "one"));
    repo.commit("one");
    repo.write("posts/a.md", &post("A", "two"));
    repo.remove("posts/b.md");
    repo.commit("two");

    let recording = RecordingProvider::new(SqliteProvider::open_memory().unwrap());
    let dry_engine = SyncEngine::new(CliGit::new(), recording);
    let dry = dry_engine
        .sync(&SyncRequest {
            dry_run: true,
            ..request(&repo)
        })
        .await
        .unwrap();

    assert!(dry.dry_run);
    assert!(dry.action_id.is_none());
    assert_eq!(dry_engine.provider().mutations(), 0);
    assert!(dry_engine.provider().reads() > 0);
    assert!(
        dry_engine
            .provider()
            .get_thing(&url("Post", "a"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        dry_engine
            .provider()
            .get_sync_state(&repo_key(&repo.path_str()), "main")
            .await
            .unwrap()
            .is_none()
    );

    let real = engine().sync(&request(&repo)).await.unwrap();
    assert!(dry.stats.same_counts(&real.stats), "{:?} vs {:?}", dry.stats, real.stats);
    let dry_versions: Vec<_> = dry.files.iter().map(|f| f.version).collect();
    let real_versions: Vec<_> = real.files.iter().map(|f| f.version).collect();
    assert_eq!(dry_versions, real_versions);
}

#[tokio::test]
async fn test_run_is_audited() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.commit("one");
    repo.write("posts/b.md", &post("B", "one"));
    repo.commit("two");

    let engine = engine();
    let result = engine.sync(&request(&repo)).await.unwrap();
    let action = engine
        .provider()
        .action(result.action_id.as_deref().unwrap())
        .unwrap()
        .unwrap();

    assert_eq!(action.status, "completed");
    assert_eq!(action.processed, 2);
    assert_eq!(action.total, 2);
    assert_eq!(action.object_count, 2);
    assert_eq!(action.to_commit, result.state.last_commit);
    assert!(action.from_commit.is_none());
    assert_eq!(action.stats.unwrap().things_created, 2);

    let conn = engine.provider().conn().unwrap();
    let (events, correlations): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COUNT(DISTINCT correlation_id) FROM events WHERE comment = ?1",
            [&action.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(events, 2);
    assert_eq!(correlations, 1);
}

#[tokio::test]
async fn test_file_errors_do_not_stop_the_run() {
    let repo = TestRepo::new();
    repo.write("schema/[Product].mdx", "---\ntitle: Product\n---\nno id here\n");
    repo.write("posts/a.md", &post("A", "fine"));
    repo.commit("mixed");

    let engine = engine();
    let result = engine.sync(&request(&repo)).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path.as_deref(), Some("schema/[Product].mdx"));
    assert_eq!(result.stats.errors, 1);
    assert_eq!(result.stats.things_created, 1);

    let action = engine
        .provider()
        .action(result.action_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(action.status, "failed");
    assert!(action.error.unwrap().contains("[Product]"));

    // The checkpoint still advances past the bad file.
    assert_eq!(result.state.last_commit, repo.head());
}

#[tokio::test]
async fn test_progress_is_reported_per_commit() {
    let repo = TestRepo::new();
    for n in 1..=3 {
        repo.write("posts/a.md", &post("A", &n.to_string()));
        repo.commit(&format!("c{n}"));
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let engine = engine().with_progress(Box::new(move |done, total| {
        sink.lock().unwrap().push((done, total));
    }));
    engine.sync(&request(&repo)).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_to_commit_bounds_the_range() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    let first = repo.commit("one");
    repo.write("posts/a.md", &post("A", "two"));
    repo.commit("two");

    let engine = engine();
    let result = engine
        .sync(&SyncRequest {
            to_commit: Some(first.clone()),
            ..request(&repo)
        })
        .await
        .unwrap();

    assert_eq!(result.commits.len(), 1);
    assert_eq!(result.state.last_commit, first);
    assert_eq!(engine.provider().versions(&url("Post", "a")).unwrap(), vec![1]);
}

#[tokio::test]
async fn test_directory_without_git_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine()
        .sync(&SyncRequest::new(dir.path().to_string_lossy()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotARepository { .. }));
    assert!(err.is_setup_error());
}

#[tokio::test]
async fn test_only_git_to_db_runs() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.commit("one");

    let err = engine()
        .sync(&SyncRequest {
            direction: SyncDirection::DbToGit,
            ..request(&repo)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedDirection(_)));
}

#[tokio::test]
async fn test_remote_repository_is_cloned() {
    let origin = TestRepo::new();
    origin.write("posts/a.md", &post("A", "one"));
    origin.commit("one");

    let engine = engine();
    let request = SyncRequest {
        ns: Some(NS.to_string()),
        ..SyncRequest::new(origin.url())
    };
    let result = engine.sync(&request).await.unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.stats.things_created, 1);
    assert_eq!(result.state.repo, repo_key(&origin.url()));
    assert!(engine.status(&origin.url(), "main").await.unwrap().is_some());
}

#[tokio::test]
async fn test_work_dir_is_reused_and_kept() {
    let origin = TestRepo::new();
    origin.write("posts/a.md", &post("A", "one"));
    origin.commit("one");

    let scratch = tempfile::tempdir().unwrap();
    let work_dir = scratch.path().join("clone");
    let request = SyncRequest {
        ns: Some(NS.to_string()),
        work_dir: Some(work_dir.clone()),
        ..SyncRequest::new(origin.url())
    };

    let engine = engine();
    engine.sync(&request).await.unwrap();
    assert!(work_dir.join(".git").exists());

    origin.write("posts/a.md", &post("A", "two"));
    let head = origin.commit("two");

    let result = engine.sync(&request).await.unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.commits.len(), 1);
    assert_eq!(result.state.last_commit, head);
    assert!(work_dir.join(".git").exists());
}

#[tokio::test]
async fn test_occupied_work_dir_is_rejected() {
    let origin = TestRepo::new();
    origin.write("posts/a.md", &post("A", "one"));
    origin.commit("one");

    let scratch = tempfile::tempdir().unwrap();
    std::fs::write(scratch.path().join("stray.txt"), "x").unwrap();
    let err = engine()
        .sync(&SyncRequest {
            work_dir: Some(scratch.path().to_path_buf()),
            ..SyncRequest::new(origin.url())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WorkDir(_)));
    assert!(scratch.path().join("stray.txt").exists());
}

#[tokio::test]
async fn test_delete_only_range_writes_tombstone() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    let first = repo.commit("add");
    repo.remove("posts/a.md");
    repo.commit("remove");

    let engine = engine();
    let result = engine
        .sync(&SyncRequest {
            from_commit: Some(first),
            ..request(&repo)
        })
        .await
        .unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.files.len(), 1);
    let file = &result.files[0];
    assert_eq!(file.change, FileStatus::Deleted);
    assert!(file.synced);
    assert!(!file.skipped);
    assert_eq!(file.version, Some(1));
    assert_eq!(result.stats.things_deleted, 1);
    assert_eq!(result.stats.things_unchanged, 0);

    let snapshot = engine.provider().get_thing(&url("Post", "a")).await.unwrap().unwrap();
    assert!(snapshot.deleted);
    assert_eq!(engine.provider().versions(&url("Post", "a")).unwrap(), vec![1]);
    let last = engine
        .provider()
        .thing_events(&url("Post", "a"))
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(last.event_type, EventType::ThingDeleted);
}

#[tokio::test]
async fn test_owned_clone_is_removed_after_sync() {
    let origin = TestRepo::new();
    origin.write("posts/a.md", &post("A", "one"));
    origin.commit("one");
    origin.write("posts/a.md", &post("A", "two"));
    origin.commit("two");

    let engine = SyncEngine::new(TrackingGit::default(), SqliteProvider::open_memory().unwrap());
    let request = SyncRequest {
        ns: Some(NS.to_string()),
        ..SyncRequest::new(origin.url())
    };
    let result = engine.sync(&request).await.unwrap();

    // The whole branch history is cloned, not just its tip.
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.commits.len(), 2);

    let clones = engine.git().clones();
    assert_eq!(clones.len(), 1);
    assert!(!clones[0].exists());
    assert!(!clones[0].parent().unwrap().exists());
}

#[tokio::test]
async fn test_owned_clone_is_removed_after_setup_error() {
    let origin = TestRepo::new();
    origin.write("posts/a.md", &post("A", "one"));
    origin.commit("one");

    let engine = SyncEngine::new(TrackingGit::default(), SqliteProvider::open_memory().unwrap());
    let request = SyncRequest {
        ns: Some(NS.to_string()),
        to_commit: Some("no-such-ref".to_string()),
        ..SyncRequest::new(origin.url())
    };
    assert!(engine.sync(&request).await.is_err());

    let clones = engine.git().clones();
    assert_eq!(clones.len(), 1);
    assert!(!clones[0].parent().unwrap().exists());
}

#[tokio::test]
async fn test_write_failures_are_per_file() {
    let repo = TestRepo::new();
    repo.write("posts/a.md", &post("A", "one"));
    repo.write("posts/b.md", &post("B", "one"));
    repo.commit("add");
    repo.remove("posts/a.md");
    repo.write("posts/b.md", &post("B", "two"));
    let head = repo.commit("remove a, edit b");

    let engine = SyncEngine::new(
        CliGit::new(),
        FailingProvider::new(SqliteProvider::open_memory().unwrap(), "a"),
    );
    let result = engine.sync(&request(&repo)).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.path.as_deref() == Some("posts/a.md")));

    let a_files: Vec<_> = result.files.iter().filter(|f| f.path == "posts/a.md").collect();
    assert_eq!(a_files.len(), 2);
    assert!(a_files.iter().all(|f| !f.synced && f.error.is_some()));
    assert_eq!(a_files[1].change, FileStatus::Deleted);

    let b_files: Vec<_> = result.files.iter().filter(|f| f.path == "posts/b.md").collect();
    assert!(b_files.iter().all(|f| f.synced && f.error.is_none()));
    assert_eq!(b_files.last().unwrap().version, Some(2));

    let inner = &engine.provider().inner;
    assert!(inner.get_thing(&url("Post", "a")).await.unwrap().is_none());
    assert_eq!(inner.versions(&url("Post", "b")).unwrap(), vec![1, 2]);

    let state = engine.status(&repo.path_str(), "main").await.unwrap().unwrap();
    assert_eq!(state.last_commit, head);
}
