//! Sync command implementation.

use colored::Colorize;

use crate::cli::commands::{connect, runtime};
use crate::cli::{Cli, SyncArgs};
use crate::error::Result;
use crate::git::FileStatus;
use crate::sync::SyncResult;

/// Execute the sync command.
///
/// # Errors
///
/// Returns setup errors from the engine. Per-file failures are rendered
/// and reflected in the exit code by the caller through `success`.
pub fn execute(cli: &Cli, args: &SyncArgs, json: bool) -> Result<bool> {
    let (engine, config) = connect(cli, args.repo.token.clone())?;
    let request = args.to_request(&config.actor, config.git_token.clone(), cli.verbose > 0);

    let result = runtime()?.block_on(engine.sync(&request))?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else if !cli.quiet {
        print_result(&result);
    }
    Ok(result.success)
}

fn status_marker(status: FileStatus) -> colored::ColoredString {
    match status {
        FileStatus::Added | FileStatus::Copied => "A".green(),
        FileStatus::Modified => "M".yellow(),
        FileStatus::Deleted => "D".red(),
        FileStatus::Renamed => "R".cyan(),
    }
}

fn print_result(result: &SyncResult) {
    let stats = &result.stats;
    let state = &result.state;

    if result.commits.is_empty() {
        println!(
            "{} {} ({}) is up to date at {}",
            "✓".green(),
            state.repo,
            state.branch,
            state.last_commit.get(..7).unwrap_or(&state.last_commit)
        );
        return;
    }

    let title = if result.dry_run { "Dry run" } else { "Sync" };
    println!(
        "{} {} {} ({}) → {}",
        title.bold(),
        state.repo,
        format!("@{}", state.branch).dimmed(),
        state.ns,
        state.last_commit.get(..7).unwrap_or(&state.last_commit)
    );
    println!();

    for file in &result.files {
        let outcome = match (&file.error, file.skipped, file.version) {
            (Some(e), _, _) => e.red().to_string(),
            (None, true, _) => "unchanged".dimmed().to_string(),
            (None, false, Some(v)) => format!("v{v}"),
            (None, false, None) => String::new(),
        };
        println!(
            "  {} {} {} {}",
            status_marker(file.change),
            file.path,
            format!("[{}]", file.thing_type).dimmed(),
            outcome
        );
    }

    println!();
    println!("  Commits:   {}", stats.commits);
    println!(
        "  Files:     {} added, {} modified, {} deleted, {} renamed",
        stats.files_added, stats.files_modified, stats.files_deleted, stats.files_renamed
    );
    println!(
        "  Things:    {} created, {} updated, {} deleted, {} unchanged",
        stats.things_created, stats.things_updated, stats.things_deleted, stats.things_unchanged
    );
    println!("  Duration:  {}ms", stats.duration_ms);
    if let Some(id) = &result.action_id {
        println!("  Action:    {}", id.dimmed());
    }

    if !result.errors.is_empty() {
        println!();
        println!("{}", format!("{} error(s):", result.errors.len()).red().bold());
        for error in &result.errors {
            println!("  {error}");
        }
    }
}
