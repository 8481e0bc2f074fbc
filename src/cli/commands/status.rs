//! Status command implementation.

use colored::Colorize;

use crate::cli::Cli;
use crate::cli::commands::{connect, runtime};
use crate::error::Result;

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the database cannot be read.
pub fn execute(cli: &Cli, repo: &str, branch: &str, json: bool) -> Result<()> {
    let (engine, _) = connect(cli, None)?;
    let state = runtime()?.block_on(engine.status(repo, branch))?;

    if json {
        let output = serde_json::json!({
            "repo": crate::sync::repo_key(repo),
            "branch": branch,
            "state": state,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    match state {
        None => println!("{} has never been synced on {branch}.", repo.bold()),
        Some(state) => {
            println!("{} {}", state.repo.bold(), format!("@{}", state.branch).dimmed());
            println!("  Namespace:    {}", state.ns);
            println!("  Last commit:  {}", state.last_commit);
            println!(
                "  Last sync:    {}",
                state.last_sync_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("  Files:        {}", state.total_files);
            println!("  Commits:      {}", state.total_commits);
        }
    }
    Ok(())
}
