//! Interactive restore command
//!
//! Walks the restore state machine end to end: numbered listing,
//! selection with re-prompt on invalid input, fetch, verification, and a
//! typed confirmation before the database is replaced.

use crate::{output, CliConfig, Result};
use backup_engine::{RestoreOrchestrator, Snapshot};
use clap::Args;
use std::io::Write;

#[derive(Debug, Clone, Args)]
pub struct RestoreArgs {
    /// Restore from the offsite store instead of the primary
    #[arg(long)]
    pub offsite: bool,
}

/// Outcome of parsing one selection prompt.
#[derive(Debug, PartialEq, Eq)]
enum Selection {
    Quit,
    Index(usize),
    Invalid,
}

fn parse_selection(input: &str, available: usize) -> Selection {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("q") {
        return Selection::Quit;
    }
    match trimmed.parse::<usize>() {
        Ok(index) if index < available => Selection::Index(index),
        _ => Selection::Invalid,
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message} ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line)
}

fn confirm(message: &str) -> Result<bool> {
    let answer = prompt(&format!("{message} (yes/no):"))?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn print_listing(snapshots: &[Snapshot]) {
    output::header("Available backups");
    for (index, snapshot) in snapshots.iter().enumerate() {
        println!(
            "{index:3}. {}  {}  {:>12} bytes",
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.id,
            snapshot.size_bytes,
        );
    }
}

pub async fn execute(args: RestoreArgs, config: CliConfig) -> Result<()> {
    config.engine.validate()?;

    output::header("DATABASE RESTORATION");
    output::warn("This operation will REPLACE your current database.");
    if !confirm("Do you want to proceed?")? {
        output::info("Operation cancelled");
        return Ok(());
    }

    let primary = super::primary_store(&config);
    let offsite = super::offsite_store(&config);
    let database = super::database()?;

    // Primary preferred; fall back to the offsite copy when the primary
    // has nothing to offer.
    let store = if args.offsite {
        offsite
    } else {
        let listing = super::list::merged_listing(&primary, &offsite).await?;
        let primary_has_any = listing.iter().any(|s| s.location.primary);
        if primary_has_any {
            std::sync::Arc::clone(&primary)
        } else {
            output::warn("Primary store holds no snapshots, falling back to offsite");
            offsite
        }
    };

    let mut orchestrator =
        RestoreOrchestrator::new(store, std::sync::Arc::clone(&primary), database, &config.engine);

    let snapshots = orchestrator.list_snapshots().await?.to_vec();
    if snapshots.is_empty() {
        output::info("No backups found in storage; restoration cancelled");
        return Ok(());
    }
    print_listing(&snapshots);

    let selected = loop {
        let line = prompt("\nEnter the number of the backup to restore (or 'q' to quit):")?;
        match parse_selection(&line, snapshots.len()) {
            Selection::Quit => {
                output::info("Operation cancelled");
                return Ok(());
            }
            Selection::Index(index) => match orchestrator.select(&snapshots[index].id) {
                Ok(snapshot) => break snapshot,
                Err(err) => output::error(&err.to_string()),
            },
            Selection::Invalid => output::error("Invalid selection, please try again"),
        }
    };

    output::info(&format!(
        "Selected {} ({})",
        selected.id,
        selected.created_at.format("%Y-%m-%d %H:%M:%S")
    ));

    output::info("Downloading backup");
    orchestrator.fetch().await?;

    output::info("Verifying backup");
    orchestrator.verify()?;

    let confirmed = confirm("Are you sure you want to restore this backup?")?;
    if !confirmed {
        output::info("Operation cancelled");
        return Ok(());
    }

    output::info("Restoring database (this may take a while)");
    let summary = orchestrator.replace(confirmed).await?;

    output::success("Database restored successfully");
    output::kv("snapshot", &summary.id);
    output::kv("created", &summary.created_at.to_rfc3339());
    output::kv("size", &format!("{} bytes", summary.size_bytes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_accepts_valid_indices() {
        assert_eq!(parse_selection("0", 3), Selection::Index(0));
        assert_eq!(parse_selection(" 2 \n", 3), Selection::Index(2));
    }

    #[test]
    fn selection_rejects_out_of_range_and_garbage() {
        assert_eq!(parse_selection("3", 3), Selection::Invalid);
        assert_eq!(parse_selection("-1", 3), Selection::Invalid);
        assert_eq!(parse_selection("abc", 3), Selection::Invalid);
        assert_eq!(parse_selection("", 3), Selection::Invalid);
    }

    #[test]
    fn selection_quits_on_q() {
        assert_eq!(parse_selection("q", 3), Selection::Quit);
        assert_eq!(parse_selection("Q\n", 3), Selection::Quit);
    }
}
