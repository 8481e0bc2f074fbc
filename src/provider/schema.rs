//! SQLite schema for the embedded content store.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Things
-- ====================

-- One row per version; the highest version of a url is current.
CREATE TABLE IF NOT EXISTS things (
    url TEXT NOT NULL,
    ns TEXT NOT NULL,
    type TEXT NOT NULL,
    id TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version > 0),
    path TEXT,
    previous_path TEXT,
    operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'upsert', 'delete')),
    data TEXT,
    content TEXT,
    hash TEXT,
    previous_hash TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    actor TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (url, version)
);

CREATE INDEX IF NOT EXISTS idx_things_ns_type ON things(ns, type);
CREATE INDEX IF NOT EXISTS idx_things_path ON things(ns, path);

-- Edges from a thing's current version; replaced on every write.
CREATE TABLE IF NOT EXISTS relationships (
    source TEXT NOT NULL,
    predicate TEXT NOT NULL,
    target TEXT NOT NULL,
    reverse TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (source, predicate, target)
);

CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target);

CREATE TABLE IF NOT EXISTS search_index (
    url TEXT PRIMARY KEY,
    ns TEXT NOT NULL,
    type TEXT NOT NULL,
    title TEXT,
    description TEXT,
    keywords TEXT,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_ns ON search_index(ns);

-- Downstream pipeline state per thing
CREATE TABLE IF NOT EXISTS thing_stages (
    url TEXT NOT NULL,
    stage TEXT NOT NULL CHECK (stage IN ('staged', 'rendered', 'embedded', 'indexed')),
    status TEXT NOT NULL CHECK (status IN ('pending', 'running', 'completed', 'failed', 'skipped')),
    version INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (url, stage)
);

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    correlation_id TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_correlation ON events(correlation_id);

CREATE TABLE IF NOT EXISTS sync_actions (
    id TEXT PRIMARY KEY,
    repo TEXT NOT NULL,
    branch TEXT NOT NULL,
    ns TEXT NOT NULL,
    actor TEXT NOT NULL,
    from_commit TEXT,
    to_commit TEXT NOT NULL,
    commit_meta TEXT,
    objects TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running' CHECK (status IN ('running', 'completed', 'failed')),
    processed INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    stats TEXT,
    error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_sync_actions_repo ON sync_actions(repo, branch);

-- ====================
-- Checkpoints
-- ====================

CREATE TABLE IF NOT EXISTS sync_state (
    repo TEXT NOT NULL,
    branch TEXT NOT NULL,
    ns TEXT NOT NULL,
    last_commit TEXT NOT NULL,
    last_sync_at INTEGER NOT NULL,
    total_files INTEGER NOT NULL DEFAULT 0,
    total_commits INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (repo, branch)
);
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
