//! Event log storage and retrieval.
//!
//! Every thing write and every sync run leaves events behind. Rows are only
//! ever appended.

use rusqlite::types::Type;
use rusqlite::{Connection, Result};
use serde::{Deserialize, Serialize};

/// Event types for the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Thing events
    ThingCreated,
    ThingUpdated,
    ThingDeleted,

    // Sync run events
    SyncStarted,
    SyncCompleted,
    SyncFailed,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ThingCreated => "thing_created",
            Self::ThingUpdated => "thing_updated",
            Self::ThingDeleted => "thing_deleted",
            Self::SyncStarted => "sync_started",
            Self::SyncCompleted => "sync_completed",
            Self::SyncFailed => "sync_failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thing_created" => Some(Self::ThingCreated),
            "thing_updated" => Some(Self::ThingUpdated),
            "thing_deleted" => Some(Self::ThingDeleted),
            "sync_started" => Some(Self::SyncStarted),
            "sync_completed" => Some(Self::SyncCompleted),
            "sync_failed" => Some(Self::SyncFailed),
            _ => None,
        }
    }
}

/// An event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    /// Ties together the start and end events of one run.
    pub correlation_id: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            correlation_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, correlation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.correlation_id,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const SELECT_EVENT: &str = "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, correlation_id, created_at FROM events";

fn map_event(row: &rusqlite::Row<'_>) -> Result<Event> {
    let raw: String = row.get(3)?;
    let event_type = EventType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown event type: {raw}").into(),
        )
    })?;

    Ok(Event {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        event_type,
        actor: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
        comment: row.get(7)?,
        correlation_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Get events for an entity, oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(&format!(
        "{SELECT_EVENT} WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id ASC LIMIT ?3"
    ))?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], map_event)?;
    rows.collect()
}

/// Get all events sharing a correlation id, oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_correlated(conn: &Connection, correlation_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_EVENT} WHERE correlation_id = ?1 ORDER BY id ASC"
    ))?;

    let rows = stmt.query_map([correlation_id], map_event)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("thing", "ns/Post/a", EventType::ThingCreated, "test-actor")
            .with_comment("first write");

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "thing", "ns/Post/a", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "test-actor");
        assert_eq!(events[0].event_type, EventType::ThingCreated);
        assert_eq!(events[0].comment, Some("first write".to_string()));
    }

    #[test]
    fn test_correlated_events() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let start = Event::new("sync", "repo@main", EventType::SyncStarted, "a").with_correlation("run-1");
        let other = Event::new("sync", "repo@main", EventType::SyncStarted, "a").with_correlation("run-2");
        let end = Event::new("sync", "repo@main", EventType::SyncCompleted, "a").with_correlation("run-1");
        for event in [&start, &other, &end] {
            insert_event(&conn, event).unwrap();
        }

        let run = get_correlated(&conn, "run-1").unwrap();
        let types: Vec<_> = run.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::SyncStarted, EventType::SyncCompleted]);
    }

    #[test]
    fn test_event_type_parse() {
        assert_eq!(EventType::parse("thing_deleted"), Some(EventType::ThingDeleted));
        assert_eq!(EventType::parse("issue_created"), None);
    }
}
