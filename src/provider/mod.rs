//! Database provider: the sync engine's only window onto the content store.
//!
//! The engine reads entity snapshots and checkpoints and writes versioned
//! things, audit actions and events through [`DatabaseProvider`]. Two
//! backends implement it:
//!
//! - [`SqliteProvider`] - embedded SQLite file (or in-memory for tests)
//! - [`HttpProvider`] - the same contract over HTTP against a remote store
//!
//! [`AnyProvider`] picks one from [`ProviderConfig`] at runtime.
//!
//! # Submodules
//!
//! - [`events`] - append-only event log records
//! - [`schema`] - SQLite DDL
//! - [`sqlite`] - embedded backend
//! - [`http`] - remote backend
//! - [`factory`] - configuration-driven selection

pub mod events;
pub mod factory;
pub mod http;
pub mod schema;
pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::git::Commit;
use crate::parser::StagedChange;
use crate::sync::types::{SyncState, SyncStats};

pub use events::{Event, EventType};
pub use factory::{AnyProvider, ProviderConfig};
pub use http::HttpProvider;
pub use sqlite::SqliteProvider;

/// Minimal database-side state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub url: String,
    pub version: u64,
    /// `None` for soft-deleted entities.
    pub hash: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

/// Payload for [`DatabaseProvider::create_sync_action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncActionOptions {
    pub repo: String,
    pub branch: String,
    pub ns: String,
    pub actor: String,
    pub from_commit: Option<String>,
    pub to_commit: String,
    /// Metadata of the last commit in range.
    pub commit: Option<Commit>,
    pub total_commits: usize,
    /// Every staged change the run intends to apply.
    pub objects: Vec<StagedChange>,
}

/// Operations the sync engine needs from the content store.
///
/// Calls are awaited one at a time; implementations need not handle
/// concurrent writers within one run.
pub trait DatabaseProvider: Send + Sync {
    /// Whether the store is reachable.
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    fn get_sync_state(
        &self,
        repo: &str,
        branch: &str,
    ) -> impl Future<Output = Result<Option<SyncState>>> + Send;

    fn save_sync_state(&self, state: &SyncState) -> impl Future<Output = Result<()>> + Send;

    /// Record the intent of a run; returns the action id.
    fn create_sync_action(
        &self,
        options: &SyncActionOptions,
    ) -> impl Future<Output = Result<String>> + Send;

    fn update_action_progress(
        &self,
        action_id: &str,
        processed: usize,
        total: usize,
    ) -> impl Future<Output = Result<()>> + Send;

    fn complete_action(
        &self,
        action_id: &str,
        stats: &SyncStats,
    ) -> impl Future<Output = Result<()>> + Send;

    fn fail_action(&self, action_id: &str, error: &str) -> impl Future<Output = Result<()>> + Send;

    /// Write `change` as `version` of its entity.
    ///
    /// # Errors
    ///
    /// `Error::StaleVersion` if `version` is not greater than the stored one.
    fn upsert_thing(
        &self,
        ns: &str,
        change: &StagedChange,
        version: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Soft-delete an entity by writing a tombstone at `version`.
    fn delete_thing(
        &self,
        ns: &str,
        thing_type: &str,
        id: &str,
        version: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_thing(&self, url: &str) -> impl Future<Output = Result<Option<EntitySnapshot>>> + Send;

    fn emit_event(&self, event: &Event) -> impl Future<Output = Result<()>> + Send;
}
