//! Re-run the sync whenever the spreadsheet is saved.
//!
//! Events come from a non-recursive `notify` watcher on the spreadsheet's
//! directory. A cooldown gate collapses the burst of events an editor
//! produces on save, and is re-armed once a run finishes so the run's own
//! write to the spreadsheet does not trigger another run.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub cooldown: Duration,
    /// Pause after a save before touching the file.
    pub settle: Duration,
    /// Longest wait for an editor to release the file.
    pub max_wait: Duration,
    pub poll: Duration,
}

impl WatchOptions {
    pub fn new(cooldown_secs: u64, max_wait_secs: u64) -> Self {
        Self {
            cooldown: Duration::from_secs(cooldown_secs),
            settle: Duration::from_millis(500),
            max_wait: Duration::from_secs(max_wait_secs),
            poll: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True if `now` is outside the window; admitting re-arms the gate.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

pub fn is_target_event(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p.file_name() == Some(file_name))
}

/// Owner files an office suite leaves beside a workbook it has open.
/// Long names get their first two characters replaced by `~$`.
fn owner_files(path: &Path) -> Vec<PathBuf> {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return Vec::new();
    };
    let mut candidates = vec![path.with_file_name(format!("~${name}"))];
    let shortened: String = name.chars().skip(2).collect();
    if !shortened.is_empty() {
        candidates.push(path.with_file_name(format!("~${shortened}")));
    }
    candidates
}

/// A file is locked if it cannot be opened for writing or an editor's
/// owner file sits beside it.
pub fn is_locked(path: &Path) -> bool {
    if owner_files(path).iter().any(|p| p.exists()) {
        return true;
    }
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .is_err()
}

/// Poll `locked` every `interval` until it reports false or `max_wait`
/// passes. Returns whether the file was released.
pub fn wait_for_unlock(mut locked: impl FnMut() -> bool, max_wait: Duration, interval: Duration) -> bool {
    let start = Instant::now();
    let mut reported = 0;
    while start.elapsed() < max_wait {
        thread::sleep(interval);
        if !locked() {
            log::info!("File released after {}s", start.elapsed().as_secs());
            return true;
        }
        let waited = start.elapsed().as_secs();
        if waited / 5 > reported {
            reported = waited / 5;
            log::info!("Still waiting for the file to close ({waited}/{}s)", max_wait.as_secs());
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Ran,
    Failed,
    /// The file stayed locked; wait for the next save.
    Skipped,
}

/// Handle one admitted save: settle, wait for the file to be released, run.
pub fn handle_trigger(sheet: &Path, opts: &WatchOptions, run: &mut impl FnMut() -> Result<()>) -> Trigger {
    thread::sleep(opts.settle);

    if is_locked(sheet) {
        log::info!("{} is in use; close it in the editor to continue", sheet.display());
        if !wait_for_unlock(|| is_locked(sheet), opts.max_wait, opts.poll) {
            log::warn!(
                "{} still locked after {}s; skipping until the next save",
                sheet.display(),
                opts.max_wait.as_secs()
            );
            return Trigger::Skipped;
        }
    }

    match run() {
        Ok(()) => Trigger::Ran,
        Err(e) => {
            log::error!("Sync failed: {e}");
            Trigger::Failed
        }
    }
}

/// Block forever, calling `run` after each save of `sheet`.
pub fn watch(sheet: &Path, opts: &WatchOptions, mut run: impl FnMut() -> Result<()>) -> Result<()> {
    let name = sheet
        .file_name()
        .ok_or_else(|| SyncError::Settings(format!("not a file path: {}", sheet.display())))?
        .to_os_string();
    let dir = sheet
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(tx)?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    log::info!("Watching {} for changes", sheet.display());

    let mut gate = Cooldown::new(opts.cooldown);
    for received in rx {
        let event = match received {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Watch error: {e}");
                continue;
            }
        };
        if !is_target_event(&event, &name) || !gate.admit(Instant::now()) {
            continue;
        }
        log::info!("Change detected in {}", sheet.display());
        let outcome = handle_trigger(sheet, opts, &mut run);
        log::debug!("Trigger finished: {outcome:?}");
        gate.mark(Instant::now());
        log::info!("Watching for further changes");
    }
    Ok(())
}
