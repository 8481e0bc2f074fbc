//! Command implementations.
//!
//! Commands are synchronous entry points that build a runtime, wire the
//! engine from resolved configuration, and render results.

pub mod conflicts;
pub mod status;
pub mod sync;

use crate::cli::Cli;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::git::CliGit;
use crate::provider::AnyProvider;
use crate::sync::SyncEngine;

/// The engine as the CLI runs it.
pub type CliEngine = SyncEngine<CliGit, AnyProvider>;

/// Resolve configuration and connect the engine.
///
/// `git_token` is the command's `--token`, if any; it wins over the
/// environment.
pub(crate) fn connect(cli: &Cli, git_token: Option<String>) -> Result<(CliEngine, SyncConfig)> {
    let config = SyncConfig::resolve(&cli.overrides(git_token))?;
    let provider = AnyProvider::connect(&config.provider, &config.actor)?;
    tracing::debug!(backend = provider.name(), target = %config.provider.describe(), "provider");
    let engine = SyncEngine::new(CliGit::with_timeout(config.git_timeout), provider);
    Ok((engine, config))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
