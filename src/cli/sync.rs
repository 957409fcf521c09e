use colored::Colorize;

use crate::error::Result;
use crate::reconciler::{sync_workspace, SyncOutcome};
use crate::settings::Workspace;
use crate::sheet::SavedTo;

pub fn run(ws: &Workspace, dry_run: bool) -> Result<()> {
    let outcome = sync_workspace(ws, dry_run)?;
    print_report(ws, &outcome);
    Ok(())
}

pub(crate) fn print_report(ws: &Workspace, outcome: &SyncOutcome) {
    let r = &outcome.report;
    let name = ws
        .spreadsheet
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    println!(
        "{} {name}: {} rows ({} reconciled, {} skipped)",
        "Synced".green().bold(),
        r.rows_seen,
        r.reconciled(),
        r.skipped
    );
    println!(
        "  ids:      {} kept, {} matched, {} new",
        r.ids_existing, r.ids_matched, r.ids_minted
    );
    println!(
        "  folders:  {} created, {} unchanged, {} moved, {} recreated",
        r.created, r.reused, r.moved, r.recreated
    );
    println!(
        "  cleanup:  {} orphaned, {} removed, {} kept with files",
        r.newly_orphaned, r.removed_folders, r.kept_folders
    );
    if r.taken_over > 0 {
        println!(
            "  {}",
            format!("{} folders were last used by another record (see log)", r.taken_over).yellow()
        );
    }
    if r.legacy_pruned > 0 {
        println!("  legacy:   {} old entries dropped", r.legacy_pruned);
    }
    let failures = r.move_failures + r.create_failures + r.cleanup_failures;
    if failures > 0 {
        println!(
            "  {}",
            format!(
                "{} moves, {} creates and {} removals failed (see log)",
                r.move_failures, r.create_failures, r.cleanup_failures
            )
            .red()
        );
    }

    match &outcome.saved_to {
        None => {
            println!("{}", "Dry run: nothing was written.".yellow());
            for line in &r.planned {
                println!("  would {line}");
            }
        }
        Some(SavedTo::Original(path)) => println!("Spreadsheet updated: {}", path.display()),
        Some(SavedTo::Backup(path)) => println!(
            "{} {}",
            "Spreadsheet was locked; updates written to".yellow(),
            path.display()
        ),
    }
    if outcome.saved_to.is_some() && !outcome.metadata_saved {
        println!("{}", "Metadata could not be saved (see log).".red());
    }
}
