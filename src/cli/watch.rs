use colored::Colorize;

use crate::error::{Result, SyncError};
use crate::reconciler::sync_workspace;
use crate::settings::{Settings, Workspace};
use crate::watcher::{self, WatchOptions};

pub fn run(settings: &Settings, ws: &Workspace, cooldown: Option<u64>, max_wait: Option<u64>) -> Result<()> {
    if !ws.spreadsheet.exists() {
        return Err(SyncError::SpreadsheetNotFound(ws.spreadsheet.display().to_string()));
    }
    let opts = WatchOptions::new(
        cooldown.unwrap_or(settings.watch_cooldown_secs),
        max_wait.unwrap_or(settings.watch_max_wait_secs),
    );

    println!("{}", "Watching for spreadsheet saves".bold());
    println!("  folder:  {}", ws.root.display());
    println!("  sheet:   {}", ws.spreadsheet.display());
    println!("Each save runs a sync. Press Ctrl+C to stop.\n");

    watcher::watch(&ws.spreadsheet, &opts, || {
        println!("{}", format!("Change at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")).cyan());
        let outcome = sync_workspace(ws, false)?;
        super::sync::print_report(ws, &outcome);
        println!();
        Ok(())
    })
}
