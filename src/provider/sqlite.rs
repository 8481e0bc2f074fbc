//! Embedded SQLite backend.
//!
//! Things are stored append-only: every write inserts a new `(url, version)`
//! row and the highest version is current. Writes go through
//! [`SqliteProvider::mutate`], which wraps them in an IMMEDIATE transaction
//! and appends the events they record before committing.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::parser::{Relationship, StagedChange, thing_url};
use crate::provider::events::{Event, EventType, get_correlated, get_events, insert_event};
use crate::provider::schema::apply_schema;
use crate::provider::{DatabaseProvider, EntitySnapshot, SyncActionOptions};
use crate::sync::types::{PipelineStage, StageStatus, SyncState, SyncStats};

/// Actor recorded on writes when none is configured.
pub const DEFAULT_ACTOR: &str = "mdxsync";

/// SQLite-based provider.
#[derive(Debug)]
pub struct SqliteProvider {
    conn: Mutex<Connection>,
    actor: String,
}

/// Context for a mutation, collecting the events it produces.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event with old/new values.
    pub fn record_change(
        &mut self,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new("thing", entity_id, event_type, &self.actor)
                .with_values(old_value, new_value)
                .with_comment(&self.op_name),
        );
    }
}

/// Full current row of a thing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThingRecord {
    pub url: String,
    pub ns: String,
    #[serde(rename = "type")]
    pub thing_type: String,
    pub id: String,
    pub version: u64,
    pub path: Option<String>,
    pub data: Option<Map<String, Value>>,
    pub content: Option<String>,
    pub hash: Option<String>,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

/// Stored audit action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncActionRecord {
    pub id: String,
    pub repo: String,
    pub branch: String,
    pub status: String,
    pub from_commit: Option<String>,
    pub to_commit: String,
    pub processed: u64,
    pub total: u64,
    pub object_count: u64,
    pub stats: Option<SyncStats>,
    pub error: Option<String>,
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidArgument(format!("value out of range: {value}")))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Latest `(version, deleted, hash)` of a url inside a transaction.
fn current_version(tx: &Transaction, url: &str) -> Result<Option<(u64, bool, Option<String>)>> {
    let row = tx
        .query_row(
            "SELECT version, deleted, hash FROM things WHERE url = ?1 ORDER BY version DESC LIMIT 1",
            [url],
            |row| {
                Ok((
                    to_u64(row.get(0)?),
                    row.get::<_, i64>(1)? != 0,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;
    Ok(row)
}

fn check_version(url: &str, attempted: u64, current: Option<u64>) -> Result<()> {
    match current {
        Some(current) if attempted <= current => Err(Error::StaleVersion {
            url: url.to_string(),
            attempted,
            current,
        }),
        _ => Ok(()),
    }
}

impl SqliteProvider {
    /// Open a database at the given path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    /// Actor recorded on thing events.
    #[must_use]
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    /// Lock the underlying connection (for read operations).
    ///
    /// # Errors
    ///
    /// Returns an error if another thread panicked while holding the lock.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("database connection lock poisoned".to_string()))
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// 1. Begins an IMMEDIATE transaction
    /// 2. Executes the mutation closure
    /// 3. Writes the events it recorded
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, &self.actor);
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Thing Operations
    // ==================

    fn write_thing(&self, ns: &str, change: &StagedChange, version: u64) -> Result<()> {
        let url = change.url(ns).ok_or_else(|| {
            Error::InvalidArgument(format!("{} has no resolvable id", change.path))
        })?;
        let id = change.id.clone().unwrap_or_default();
        let now = Utc::now().timestamp_millis();
        let data = change.data.as_ref().map(serde_json::to_string).transpose()?;

        self.mutate("upsert_thing", |tx, ctx| {
            let current = current_version(tx, &url)?;
            check_version(&url, version, current.as_ref().map(|c| c.0))?;

            tx.execute(
                "INSERT INTO things (url, ns, type, id, version, path, previous_path, operation, data, content, hash, previous_hash, deleted, actor, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13, ?14)",
                rusqlite::params![
                    url,
                    ns,
                    change.thing_type,
                    id,
                    to_i64(version)?,
                    change.path,
                    change.previous_path,
                    change.operation.as_str(),
                    data,
                    change.content,
                    change.hash,
                    change.previous_hash,
                    ctx.actor,
                    now,
                ],
            )?;

            tx.execute("DELETE FROM relationships WHERE source = ?1", [&url])?;
            for rel in change.relationships.iter().flatten() {
                tx.execute(
                    "INSERT OR IGNORE INTO relationships (source, predicate, target, reverse, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![url, rel.predicate, rel.target, rel.reverse, now],
                )?;
            }

            match &change.search_metadata {
                Some(meta) => {
                    let keywords = meta.keywords.as_ref().map(|k| k.join(","));
                    tx.execute(
                        "INSERT OR REPLACE INTO search_index (url, ns, type, title, description, keywords, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        rusqlite::params![url, ns, change.thing_type, meta.title, meta.description, keywords, now],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM search_index WHERE url = ?1", [&url])?;
                }
            }

            for stage in PipelineStage::ALL {
                let status = if stage == PipelineStage::Staged {
                    StageStatus::Completed
                } else {
                    StageStatus::Pending
                };
                tx.execute(
                    "INSERT OR REPLACE INTO thing_stages (url, stage, status, version, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![url, stage.as_str(), status.as_str(), to_i64(version)?, now],
                )?;
            }

            let (event_type, old_hash) = match current {
                Some((_, false, hash)) => (EventType::ThingUpdated, hash),
                _ => (EventType::ThingCreated, None),
            };
            ctx.record_change(&url, event_type, old_hash, change.hash.clone());
            Ok(())
        })
    }

    fn write_tombstone(&self, ns: &str, thing_type: &str, id: &str, version: u64) -> Result<()> {
        let url = thing_url(ns, thing_type, id);
        let now = Utc::now().timestamp_millis();

        self.mutate("delete_thing", |tx, ctx| {
            let current = current_version(tx, &url)?;
            check_version(&url, version, current.as_ref().map(|c| c.0))?;

            tx.execute(
                "INSERT INTO things (url, ns, type, id, version, operation, previous_hash, deleted, actor, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'delete', ?6, 1, ?7, ?8)",
                rusqlite::params![
                    url,
                    ns,
                    thing_type,
                    id,
                    to_i64(version)?,
                    current.as_ref().and_then(|c| c.2.clone()),
                    ctx.actor,
                    now,
                ],
            )?;
            tx.execute("DELETE FROM relationships WHERE source = ?1", [&url])?;
            tx.execute("DELETE FROM search_index WHERE url = ?1", [&url])?;

            ctx.record_change(&url, EventType::ThingDeleted, current.and_then(|c| c.2), None);
            Ok(())
        })
    }

    fn snapshot(&self, url: &str) -> Result<Option<EntitySnapshot>> {
        let conn = self.conn()?;
        let snapshot = conn
            .query_row(
                "SELECT url, version, hash, created_at, deleted FROM things
                 WHERE url = ?1 ORDER BY version DESC LIMIT 1",
                [url],
                |row| {
                    Ok(EntitySnapshot {
                        url: row.get(0)?,
                        version: to_u64(row.get(1)?),
                        hash: row.get(2)?,
                        updated_at: from_millis(row.get(3)?),
                        deleted: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Current row of a thing, including payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored data is not valid JSON.
    pub fn thing(&self, url: &str) -> Result<Option<ThingRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT url, ns, type, id, version, path, data, content, hash, deleted, created_at
                 FROM things WHERE url = ?1 ORDER BY version DESC LIMIT 1",
                [url],
                |row| {
                    Ok((
                        ThingRecord {
                            url: row.get(0)?,
                            ns: row.get(1)?,
                            thing_type: row.get(2)?,
                            id: row.get(3)?,
                            version: to_u64(row.get(4)?),
                            path: row.get(5)?,
                            data: None,
                            content: row.get(7)?,
                            hash: row.get(8)?,
                            deleted: row.get::<_, i64>(9)? != 0,
                            updated_at: from_millis(row.get(10)?),
                        },
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(mut record, data)| -> Result<ThingRecord> {
            record.data = data.as_deref().map(serde_json::from_str).transpose()?;
            Ok(record)
        })
        .transpose()
    }

    /// All stored versions of a thing, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn versions(&self, url: &str) -> Result<Vec<u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT version FROM things WHERE url = ?1 ORDER BY version")?;
        let rows = stmt.query_map([url], |row| row.get::<_, i64>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?.into_iter().map(to_u64).collect())
    }

    /// Number of live (not deleted) things in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_things(&self, ns: &str) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM things t
             WHERE t.ns = ?1 AND t.deleted = 0
               AND t.version = (SELECT MAX(version) FROM things WHERE url = t.url)",
            [ns],
            |row| row.get(0),
        )?;
        Ok(to_u64(count))
    }

    /// Outgoing edges of a thing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn relationships(&self, url: &str) -> Result<Vec<Relationship>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT predicate, target, reverse FROM relationships WHERE source = ?1 ORDER BY predicate, target",
        )?;
        let rows = stmt.query_map([url], |row| {
            Ok(Relationship {
                predicate: row.get(0)?,
                target: row.get(1)?,
                reverse: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Urls whose title, description or keywords contain `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search(&self, ns: &str, query: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let pattern = format!("%{query}%");
        let mut stmt = conn.prepare(
            "SELECT url FROM search_index
             WHERE ns = ?1 AND (title LIKE ?2 OR description LIKE ?2 OR keywords LIKE ?2)
             ORDER BY url",
        )?;
        let rows = stmt.query_map(rusqlite::params![ns, pattern], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Pipeline stage state of a thing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or holds unknown stage names.
    pub fn stages(&self, url: &str) -> Result<Vec<(PipelineStage, StageStatus)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT stage, status FROM thing_stages WHERE url = ?1")?;
        let rows = stmt.query_map([url], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut stages = Vec::new();
        for row in rows {
            let (stage, status) = row?;
            stages.push((
                stage.parse().map_err(Error::Other)?,
                status.parse().map_err(Error::Other)?,
            ));
        }
        stages.sort_by_key(|(stage, _)| PipelineStage::ALL.iter().position(|s| s == stage));
        Ok(stages)
    }

    /// Events recorded for a thing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn thing_events(&self, url: &str) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        Ok(get_events(&conn, "thing", url, None)?)
    }

    /// Events sharing a correlation id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn correlated_events(&self, correlation_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        Ok(get_correlated(&conn, correlation_id)?)
    }

    /// Stored audit action.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored stats are not valid JSON.
    pub fn action(&self, id: &str) -> Result<Option<SyncActionRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, repo, branch, status, from_commit, to_commit, processed, total,
                        json_array_length(objects), stats, error
                 FROM sync_actions WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        SyncActionRecord {
                            id: row.get(0)?,
                            repo: row.get(1)?,
                            branch: row.get(2)?,
                            status: row.get(3)?,
                            from_commit: row.get(4)?,
                            to_commit: row.get(5)?,
                            processed: to_u64(row.get(6)?),
                            total: to_u64(row.get(7)?),
                            object_count: to_u64(row.get(8)?),
                            stats: None,
                            error: row.get(10)?,
                        },
                        row.get::<_, Option<String>>(9)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(mut record, stats)| -> Result<SyncActionRecord> {
            record.stats = stats.as_deref().map(serde_json::from_str).transpose()?;
            Ok(record)
        })
        .transpose()
    }

    /// Number of stored audit actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn action_count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_actions", [], |row| row.get(0))?;
        Ok(to_u64(count))
    }

    fn load_state(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT repo, ns, branch, last_commit, last_sync_at, total_files, total_commits
                 FROM sync_state WHERE repo = ?1 AND branch = ?2",
                [repo, branch],
                |row| {
                    Ok(SyncState {
                        repo: row.get(0)?,
                        ns: row.get(1)?,
                        branch: row.get(2)?,
                        last_commit: row.get(3)?,
                        last_sync_at: from_millis(row.get(4)?),
                        total_files: to_u64(row.get(5)?),
                        total_commits: to_u64(row.get(6)?),
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn store_state(&self, state: &SyncState) -> Result<()> {
        self.mutate("save_sync_state", |tx, _| {
            tx.execute(
                "INSERT INTO sync_state (repo, branch, ns, last_commit, last_sync_at, total_files, total_commits)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(repo, branch) DO UPDATE SET
                    ns = excluded.ns,
                    last_commit = excluded.last_commit,
                    last_sync_at = excluded.last_sync_at,
                    total_files = excluded.total_files,
                    total_commits = excluded.total_commits",
                rusqlite::params![
                    state.repo,
                    state.branch,
                    state.ns,
                    state.last_commit,
                    millis(state.last_sync_at),
                    to_i64(state.total_files)?,
                    to_i64(state.total_commits)?,
                ],
            )?;
            Ok(())
        })
    }

    fn insert_action(&self, options: &SyncActionOptions) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let objects = serde_json::to_string(&options.objects)?;
        let commit = options.commit.as_ref().map(serde_json::to_string).transpose()?;
        let total = to_i64(options.total_commits as u64)?;

        self.mutate("create_sync_action", |tx, _| {
            tx.execute(
                "INSERT INTO sync_actions (id, repo, branch, ns, actor, from_commit, to_commit, commit_meta, objects, total, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                rusqlite::params![
                    id,
                    options.repo,
                    options.branch,
                    options.ns,
                    options.actor,
                    options.from_commit,
                    options.to_commit,
                    commit,
                    objects,
                    total,
                    now,
                ],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    fn update_action(&self, action_id: &str, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<()> {
        self.mutate("update_sync_action", |tx, _| {
            let changed = tx.execute(sql, params)?;
            if changed == 0 {
                return Err(Error::InvalidArgument(format!("unknown sync action: {action_id}")));
            }
            Ok(())
        })
    }
}

impl DatabaseProvider for SqliteProvider {
    async fn is_connected(&self) -> bool {
        self.conn()
            .is_ok_and(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
    }

    async fn get_sync_state(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        self.load_state(repo, branch)
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.store_state(state)
    }

    async fn create_sync_action(&self, options: &SyncActionOptions) -> Result<String> {
        self.insert_action(options)
    }

    async fn update_action_progress(&self, action_id: &str, processed: usize, total: usize) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.update_action(
            action_id,
            "UPDATE sync_actions SET processed = ?1, total = ?2, updated_at = ?3 WHERE id = ?4",
            &[&to_i64(processed as u64)?, &to_i64(total as u64)?, &now, &action_id],
        )
    }

    async fn complete_action(&self, action_id: &str, stats: &SyncStats) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let stats = serde_json::to_string(stats)?;
        self.update_action(
            action_id,
            "UPDATE sync_actions SET status = 'completed', stats = ?1, updated_at = ?2, completed_at = ?2 WHERE id = ?3",
            &[&stats, &now, &action_id],
        )
    }

    async fn fail_action(&self, action_id: &str, error: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.update_action(
            action_id,
            "UPDATE sync_actions SET status = 'failed', error = ?1, updated_at = ?2, completed_at = ?2 WHERE id = ?3",
            &[&error, &now, &action_id],
        )
    }

    async fn upsert_thing(&self, ns: &str, change: &StagedChange, version: u64) -> Result<()> {
        self.write_thing(ns, change, version)
    }

    async fn delete_thing(&self, ns: &str, thing_type: &str, id: &str, version: u64) -> Result<()> {
        self.write_tombstone(ns, thing_type, id, version)
    }

    async fn get_thing(&self, url: &str) -> Result<Option<EntitySnapshot>> {
        self.snapshot(url)
    }

    async fn emit_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn()?;
        insert_event(&conn, event)?;
        Ok(())
    }
}
