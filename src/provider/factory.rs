//! Provider selection.
//!
//! [`DatabaseProvider`] uses `impl Future` returns, so it cannot be boxed as
//! a trait object. [`AnyProvider`] wraps the concrete backends in an enum
//! and dispatches with a `match`.

use std::path::PathBuf;

use crate::error::Result;
use crate::parser::StagedChange;
use crate::provider::events::Event;
use crate::provider::{
    DatabaseProvider, EntitySnapshot, HttpProvider, SqliteProvider, SyncActionOptions,
};
use crate::sync::types::{SyncState, SyncStats};

/// Which backend to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    /// SQLite database file.
    Local { path: PathBuf },
    /// Remote store over HTTP.
    Remote { url: String, token: Option<String> },
    /// Throwaway in-memory database.
    Memory,
}

impl ProviderConfig {
    /// Short human-readable description (never includes the token).
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Local { path } => format!("sqlite:{}", path.display()),
            Self::Remote { url, .. } => url.clone(),
            Self::Memory => "sqlite::memory:".to_string(),
        }
    }
}

/// Any configured backend.
#[derive(Debug)]
pub enum AnyProvider {
    Sqlite(SqliteProvider),
    Http(HttpProvider),
}

impl AnyProvider {
    /// Connect to the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a local database cannot be opened.
    pub fn connect(config: &ProviderConfig, actor: &str) -> Result<Self> {
        Ok(match config {
            ProviderConfig::Local { path } => {
                Self::Sqlite(SqliteProvider::open(path)?.with_actor(actor))
            }
            ProviderConfig::Memory => Self::Sqlite(SqliteProvider::open_memory()?.with_actor(actor)),
            ProviderConfig::Remote { url, token } => {
                Self::Http(HttpProvider::new(url, token.clone()).with_actor(actor))
            }
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Http(_) => "http",
        }
    }
}

impl DatabaseProvider for AnyProvider {
    async fn is_connected(&self) -> bool {
        match self {
            Self::Sqlite(p) => p.is_connected().await,
            Self::Http(p) => p.is_connected().await,
        }
    }

    async fn get_sync_state(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        match self {
            Self::Sqlite(p) => p.get_sync_state(repo, branch).await,
            Self::Http(p) => p.get_sync_state(repo, branch).await,
        }
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.save_sync_state(state).await,
            Self::Http(p) => p.save_sync_state(state).await,
        }
    }

    async fn create_sync_action(&self, options: &SyncActionOptions) -> Result<String> {
        match self {
            Self::Sqlite(p) => p.create_sync_action(options).await,
            Self::Http(p) => p.create_sync_action(options).await,
        }
    }

    async fn update_action_progress(&self, action_id: &str, processed: usize, total: usize) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.update_action_progress(action_id, processed, total).await,
            Self::Http(p) => p.update_action_progress(action_id, processed, total).await,
        }
    }

    async fn complete_action(&self, action_id: &str, stats: &SyncStats) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.complete_action(action_id, stats).await,
            Self::Http(p) => p.complete_action(action_id, stats).await,
        }
    }

    async fn fail_action(&self, action_id: &str, error: &str) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.fail_action(action_id, error).await,
            Self::Http(p) => p.fail_action(action_id, error).await,
        }
    }

    async fn upsert_thing(&self, ns: &str, change: &StagedChange, version: u64) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.upsert_thing(ns, change, version).await,
            Self::Http(p) => p.upsert_thing(ns, change, version).await,
        }
    }

    async fn delete_thing(&self, ns: &str, thing_type: &str, id: &str, version: u64) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.delete_thing(ns, thing_type, id, version).await,
            Self::Http(p) => p.delete_thing(ns, thing_type, id, version).await,
        }
    }

    async fn get_thing(&self, url: &str) -> Result<Option<EntitySnapshot>> {
        match self {
            Self::Sqlite(p) => p.get_thing(url).await,
            Self::Http(p) => p.get_thing(url).await,
        }
    }

    async fn emit_event(&self, event: &Event) -> Result<()> {
        match self {
            Self::Sqlite(p) => p.emit_event(event).await,
            Self::Http(p) => p.emit_event(event).await,
        }
    }
}
