//! Configuration management.
//!
//! Every setting resolves with the same priority: explicit flag, then
//! environment, then default. The local database lives in one global
//! location shared by every repository:
//! `~/.mdxsync/data/mdxsync.db`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::provider::ProviderConfig;

/// Default per-command git timeout in seconds.
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 60;

/// Explicit overrides, usually from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub db_url: Option<String>,
    pub db_token: Option<String>,
    pub actor: Option<String>,
    pub git_token: Option<String>,
    pub git_timeout_secs: Option<u64>,
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub provider: ProviderConfig,
    pub actor: String,
    pub git_token: Option<String>,
    pub git_timeout: Duration,
}

impl SyncConfig {
    /// Resolve configuration from overrides and the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no database location can be found or the
    /// git timeout is not a positive integer.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let provider = resolve_provider(overrides)?;

        let secs = match overrides.git_timeout_secs {
            Some(secs) => secs,
            None => match env("MDXSYNC_GIT_TIMEOUT_SECS") {
                Some(raw) => raw.parse().map_err(|_| {
                    Error::Config(format!("MDXSYNC_GIT_TIMEOUT_SECS must be a number, got '{raw}'"))
                })?,
                None => DEFAULT_GIT_TIMEOUT_SECS,
            },
        };
        if secs == 0 {
            return Err(Error::Config("git timeout must be at least one second".into()));
        }

        Ok(Self {
            provider,
            actor: overrides.actor.clone().unwrap_or_else(default_actor),
            git_token: overrides
                .git_token
                .clone()
                .or_else(|| env("MDXSYNC_GIT_TOKEN"))
                .or_else(|| env("GITHUB_TOKEN")),
            git_timeout: Duration::from_secs(secs),
        })
    }
}

/// Non-empty environment variable.
fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_provider(overrides: &Overrides) -> Result<ProviderConfig> {
    if let Some(url) = overrides.db_url.clone().or_else(|| env("MDXSYNC_DB_URL")) {
        let token = overrides.db_token.clone().or_else(|| env("MDXSYNC_DB_TOKEN"));
        return Ok(ProviderConfig::Remote { url, token });
    }
    resolve_db_path(overrides.db.as_deref())
        .map(|path| ProviderConfig::Local { path })
        .ok_or_else(|| Error::Config("cannot determine a home directory for the database".into()))
}

/// Get the global mdxsync directory (`~/.mdxsync/`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".mdxsync"))
}

/// Check if test mode is enabled.
///
/// Set `MDXSYNC_TEST_DB=1` (any value other than `0`/`false`) to redirect
/// the local database to an isolated test path.
#[must_use]
pub fn is_test_mode() -> bool {
    env("MDXSYNC_TEST_DB").is_some_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// `~/.mdxsync/test/mdxsync.db`.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("test").join("mdxsync.db"))
}

/// Resolve the local database path.
///
/// Priority:
/// 1. `explicit_path`
/// 2. `MDXSYNC_TEST_DB` → test database
/// 3. `MDXSYNC_DB`
/// 4. `~/.mdxsync/data/mdxsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    if is_test_mode() {
        return test_db_path();
    }
    if let Some(path) = env("MDXSYNC_DB") {
        return Some(PathBuf::from(path));
    }
    global_dir().map(|dir| dir.join("data").join("mdxsync.db"))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `MDXSYNC_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Some(actor) = env("MDXSYNC_ACTOR") {
        return actor;
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Some(user) = env("USER") {
        return user;
    }

    "unknown".to_string()
}
