//! Conflicts command implementation.

use colored::Colorize;

use crate::cli::commands::{connect, runtime};
use crate::cli::{Cli, RepoArgs};
use crate::error::Result;
use crate::sync::{ConflictType, SyncConflict};

/// Execute the conflicts command.
///
/// Returns `true` when there are no conflicts.
///
/// # Errors
///
/// Returns an error if the repository or database cannot be read.
pub fn execute(cli: &Cli, args: &RepoArgs, json: bool) -> Result<bool> {
    let (engine, config) = connect(cli, args.token.clone())?;
    let request = args.to_request(&config.actor, config.git_token.clone());

    let conflicts = runtime()?.block_on(engine.check_conflicts(&request))?;

    if json {
        let output = serde_json::json!({
            "count": conflicts.len(),
            "conflicts": conflicts,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if !cli.quiet {
        print_conflicts(&conflicts);
    }
    Ok(conflicts.is_empty())
}

fn label(conflict_type: ConflictType) -> &'static str {
    match conflict_type {
        ConflictType::BothModified => "both modified",
        ConflictType::DeleteModify => "deleted in git",
        ConflictType::ModifyDelete => "deleted in db",
        ConflictType::TypeMismatch => "type mismatch",
    }
}

fn print_conflicts(conflicts: &[SyncConflict]) {
    if conflicts.is_empty() {
        println!("{} No conflicts.", "✓".green());
        return;
    }

    println!("{}", format!("{} conflict(s)", conflicts.len()).yellow().bold());
    for conflict in conflicts {
        println!(
            "  {} {} {}",
            label(conflict.conflict_type).yellow(),
            conflict.path,
            conflict.url.dimmed()
        );
        println!(
            "    git {} at {}, db v{} at {}; suggest {:?}",
            conflict.git.commit.get(..7).unwrap_or(&conflict.git.commit),
            conflict.git.timestamp.format("%Y-%m-%d %H:%M:%S"),
            conflict.db.version,
            conflict.db.timestamp.format("%Y-%m-%d %H:%M:%S"),
            conflict.suggestion
        );
    }
}
