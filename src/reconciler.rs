use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::identity::{self, ClockIds, IdSource, Resolution};
use crate::layout::Layout;
use crate::metadata::{is_legacy_key, MetadataStore, RowRecord};
use crate::models::Row;
use crate::planner::{decide_placement, derive_status, plan_cleanup, prune_chain, FsOp, Placement, TreeSnapshot};
use crate::settings::Workspace;
use crate::sheet::{self, SavedTo};
use crate::tree::{DiskTree, FolderTree};

#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub rows_seen: usize,
    pub skipped: usize,
    pub ids_existing: usize,
    pub ids_matched: usize,
    pub ids_minted: usize,
    pub created: usize,
    pub reused: usize,
    pub moved: usize,
    pub recreated: usize,
    pub move_failures: usize,
    pub create_failures: usize,
    pub status_changes: usize,
    /// Folders this run handed to a record other than the one that last used them.
    pub taken_over: usize,
    pub newly_orphaned: usize,
    pub removed_folders: usize,
    pub kept_folders: usize,
    pub cleanup_failures: usize,
    pub legacy_pruned: usize,
    /// Filesystem changes a dry run would have made.
    pub planned: Vec<String>,
}

impl SyncReport {
    pub fn reconciled(&self) -> usize {
        self.rows_seen - self.skipped
    }
}

/// One reconciliation pass over the rows of a sheet.
pub struct Engine<'a, T: FolderTree, I: IdSource> {
    tree: &'a mut T,
    ids: &'a mut I,
    layout: &'a Layout,
    threshold: usize,
    dry_run: bool,
    report: SyncReport,
}

impl<'a, T: FolderTree, I: IdSource> Engine<'a, T, I> {
    pub fn new(tree: &'a mut T, ids: &'a mut I, layout: &'a Layout, threshold: usize) -> Self {
        Self {
            tree,
            ids,
            layout,
            threshold,
            dry_run: false,
            report: SyncReport::default(),
        }
    }

    /// Log filesystem changes instead of making them.
    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn run(mut self, rows: &mut [Row], store: &mut MetadataStore) -> SyncReport {
        let mut claimed: HashSet<String> = HashSet::new();

        for row in rows.iter_mut() {
            self.report.rows_seen += 1;
            if !row.is_actionable() {
                log::info!("Skipping line {}: payer or description is empty", row.line);
                self.report.skipped += 1;
                continue;
            }

            let resolution = identity::resolve(row, store, &claimed, &mut *self.ids);
            match &resolution {
                Resolution::Existing(id) => {
                    if claimed.contains(id) {
                        log::warn!("Line {}: id {id} is already used by an earlier line", row.line);
                    }
                    log::debug!("Line {}: using existing id {id}", row.line);
                    self.report.ids_existing += 1;
                }
                Resolution::Matched(id) => {
                    log::info!("Line {}: matched earlier record, reusing id {id}", row.line);
                    self.report.ids_matched += 1;
                }
                Resolution::Minted(id) => {
                    log::info!("Line {}: new id {id}", row.line);
                    self.report.ids_minted += 1;
                }
            }

            let id = resolution.id().to_string();
            row.unique_id = id.clone();
            claimed.insert(id.clone());
            self.reconcile_row(&id, row, store);
        }

        self.clean_up(&claimed, store);

        self.report.legacy_pruned = store.prune_legacy_keys();
        if self.report.legacy_pruned > 0 {
            log::info!("Dropped {} legacy numeric metadata entries", self.report.legacy_pruned);
        }
        self.report
    }

    fn reconcile_row(&mut self, id: &str, row: &mut Row, store: &mut MetadataStore) {
        let prior_abs = store
            .get(id)
            .map(|e| e.folder_path.trim())
            .filter(|p| !p.is_empty())
            .map(|p| self.layout.resolve(p));
        let prior_exists = prior_abs.as_deref().is_some_and(|p| self.tree.is_dir(p));

        // Moves keep contents, so the count seen in the old folder decides
        // the bucket the folder belongs in.
        let observed = match &prior_abs {
            Some(p) if prior_exists => self.count_files(p),
            _ => 0,
        };
        let provisional = derive_status(&row.status, observed, self.threshold);
        let target_rel = self
            .layout
            .target_for(&provisional, &row.payer, row.line, &row.description);
        let target_abs = self.layout.root().join(&target_rel);

        let prior_rel = prior_abs.as_deref().map(|p| self.layout.relative(p));
        let placement = decide_placement(prior_rel.as_deref(), prior_exists, &target_rel);
        if placement != Placement::Reuse && self.tree.is_dir(&target_abs) {
            self.note_takeover(id, row.line, &target_abs, store);
        }
        self.place(&placement, &target_abs, row.line);

        let file_count = self.count_files(&target_abs);
        let status = derive_status(&row.status, file_count, self.threshold);
        log::debug!(
            "Line {}: {} holds {file_count} files (status {})",
            row.line,
            target_rel.display(),
            row.status
        );
        if status != row.status {
            log::info!("Line {}: status {} -> {status}", row.line, row.status);
            self.report.status_changes += 1;
        }
        row.status = status;
        row.file_count = Some(file_count);

        let folder_path = target_rel.to_string_lossy();
        store.record(
            id,
            &RowRecord {
                payer: &row.payer,
                content: &row.description,
                folder_path: &folder_path,
                excel_row: row.line,
            },
        );
    }

    fn place(&mut self, placement: &Placement, target: &Path, line: usize) {
        match placement {
            Placement::Reuse => {
                log::debug!("Line {line}: using existing folder {}", target.display());
                self.report.reused += 1;
            }
            Placement::Create => self.create(target, line),
            Placement::Recreate { missing } => {
                log::warn!(
                    "Line {line}: previous folder {} is gone, creating {}",
                    missing.display(),
                    target.display()
                );
                self.report.recreated += 1;
                self.create(target, line);
            }
            Placement::Move { from } => {
                let from = self.layout.root().join(from);
                if self.dry_run {
                    self.report.planned.push(format!("move {} -> {}", from.display(), target.display()));
                    self.report.moved += 1;
                    return;
                }
                match self.tree.rename(&from, target) {
                    Ok(()) => {
                        log::info!("Line {line}: moved {} -> {}", from.display(), target.display());
                        self.report.moved += 1;
                        let chain = prune_chain(&from, self.layout);
                        if !chain.is_empty() {
                            self.execute(&FsOp::PruneChain(chain));
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Line {line}: could not move {} -> {}: {e}; creating a fresh folder",
                            from.display(),
                            target.display()
                        );
                        self.report.move_failures += 1;
                        self.create(target, line);
                    }
                }
            }
        }
    }

    /// Warn when the folder a row lands in was last recorded for another id.
    fn note_takeover(&mut self, id: &str, line: usize, target: &Path, store: &MetadataStore) {
        let previous = store.iter().find(|(key, entry)| {
            key.as_str() != id
                && !entry.folder_path.trim().is_empty()
                && self.layout.resolve(entry.folder_path.trim()) == target
        });
        if let Some((owner, entry)) = previous {
            log::warn!(
                "Line {line}: folder {} was last used by record {owner} ({} / {}); it now belongs to {id}",
                target.display(),
                entry.display_payer(),
                entry.display_content()
            );
            self.report.taken_over += 1;
        }
    }

    fn create(&mut self, target: &Path, line: usize) {
        if self.tree.is_dir(target) {
            log::debug!("Line {line}: folder {} already exists", target.display());
            self.report.reused += 1;
            return;
        }
        if self.dry_run {
            self.report.planned.push(format!("create {}", target.display()));
            self.report.created += 1;
            return;
        }
        match self.tree.create_dir_all(target) {
            Ok(()) => {
                log::info!("Line {line}: created folder {}", target.display());
                self.report.created += 1;
            }
            Err(e) => {
                log::error!("Line {line}: could not create {}: {e}", target.display());
                self.report.create_failures += 1;
            }
        }
    }

    fn count_files(&self, folder: &Path) -> usize {
        match self.tree.count_files(folder) {
            Ok(n) => n,
            Err(e) => {
                if !self.dry_run {
                    log::warn!("Could not read {}: {e}", folder.display());
                }
                0
            }
        }
    }

    /// Tombstone orphaned entries, then remove every orphaned or untracked
    /// folder that holds no files and prune what that leaves empty.
    fn clean_up(&mut self, claimed: &HashSet<String>, store: &mut MetadataStore) {
        let active: BTreeSet<PathBuf> = claimed
            .iter()
            .filter_map(|id| store.get(id))
            .map(|e| e.folder_path.trim())
            .filter(|p| !p.is_empty())
            .map(|p| self.layout.resolve(p))
            .collect();

        let mut snapshot = TreeSnapshot::default();
        for id in store.ids() {
            if claimed.contains(&id) || is_legacy_key(&id) {
                continue;
            }
            if store.tombstone(&id) {
                self.report.newly_orphaned += 1;
                if let Some(entry) = store.get(&id) {
                    log::info!(
                        "Record {id} ({} / {}) is no longer in the sheet; folder {}",
                        entry.display_payer(),
                        entry.display_content(),
                        entry.folder_path
                    );
                }
            }
            let Some(entry) = store.get(&id) else { continue };
            let stored = entry.folder_path.trim();
            if stored.is_empty() {
                continue;
            }
            let folder = self.layout.resolve(stored);
            if self.tree.is_dir(&folder) && !active.contains(&folder) {
                let has_files = self.tree.contains_files(&folder).unwrap_or(true);
                snapshot.candidates.insert(folder, has_files);
            }
        }

        self.scan_untracked(&active, &mut snapshot);

        for op in plan_cleanup(&snapshot, &active, self.layout) {
            self.execute(&op);
        }
    }

    /// Collect bucket/payer/description folders nobody claims, plus the
    /// payer and top-level folders the final empty-folder pass looks at.
    fn scan_untracked(&mut self, active: &BTreeSet<PathBuf>, snapshot: &mut TreeSnapshot) {
        for bucket in self.layout.bucket_roots() {
            if !self.tree.is_dir(&bucket) {
                continue;
            }
            for payer in self.list_dirs(&bucket) {
                let payer_dir = bucket.join(payer);
                for name in self.list_dirs(&payer_dir) {
                    let folder = payer_dir.join(name);
                    if active.contains(&folder) || snapshot.candidates.contains_key(&folder) {
                        continue;
                    }
                    let has_files = self.tree.contains_files(&folder).unwrap_or(true);
                    snapshot.candidates.insert(folder, has_files);
                }
                snapshot.payer_dirs.push(payer_dir);
            }
        }

        let root = self.layout.root().to_path_buf();
        for name in self.list_dirs(&root) {
            if !self.layout.is_reserved_top_level(&name) {
                snapshot.top_level.push(root.join(name));
            }
        }
    }

    fn list_dirs(&self, dir: &Path) -> Vec<String> {
        self.tree.list_dirs(dir).unwrap_or_else(|e| {
            log::warn!("Could not list {}: {e}", dir.display());
            Vec::new()
        })
    }

    fn execute(&mut self, op: &FsOp) {
        if self.dry_run {
            self.plan(op);
            return;
        }
        match op {
            FsOp::Keep(path) => {
                log::warn!("Keeping {}: it still holds files", path.display());
                self.report.kept_folders += 1;
            }
            FsOp::RemoveTree(path) => {
                if !self.tree.is_dir(path) {
                    return;
                }
                // Files may have arrived since the snapshot.
                if self.tree.contains_files(path).unwrap_or(true) {
                    log::warn!("Keeping {}: it still holds files", path.display());
                    self.report.kept_folders += 1;
                    return;
                }
                match self.tree.remove_dir_all(path) {
                    Ok(()) => {
                        log::info!("Removed empty folder {}", path.display());
                        self.report.removed_folders += 1;
                    }
                    Err(e) => {
                        log::warn!("Could not remove {}: {e}", path.display());
                        self.report.cleanup_failures += 1;
                    }
                }
            }
            FsOp::PruneChain(chain) => {
                for dir in chain {
                    if !self.tree.is_dir(dir) {
                        continue;
                    }
                    if !self.tree.is_empty_dir(dir) || !self.remove_empty(dir) {
                        break;
                    }
                }
            }
            FsOp::RemoveIfEmpty(path) => {
                if self.tree.is_dir(path) && self.tree.is_empty_dir(path) {
                    self.remove_empty(path);
                }
            }
        }
    }

    fn remove_empty(&mut self, dir: &Path) -> bool {
        match self.tree.remove_dir(dir) {
            Ok(()) => {
                log::info!("Removed empty folder {}", dir.display());
                self.report.removed_folders += 1;
                true
            }
            Err(e) => {
                log::warn!("Could not remove {}: {e}", dir.display());
                self.report.cleanup_failures += 1;
                false
            }
        }
    }

    fn plan(&mut self, op: &FsOp) {
        let line = match op {
            FsOp::Keep(path) => format!("keep {} (holds files)", path.display()),
            FsOp::RemoveTree(path) => format!("remove {}", path.display()),
            FsOp::PruneChain(chain) => match chain.first() {
                Some(dir) if self.tree.is_empty_dir(dir) => format!("remove {}", dir.display()),
                _ => return,
            },
            FsOp::RemoveIfEmpty(path) => {
                if !self.tree.is_empty_dir(path) {
                    return;
                }
                format!("remove {}", path.display())
            }
        };
        self.report.planned.push(line);
    }
}

/// Result of a full run against a workspace.
#[derive(Debug)]
pub struct SyncOutcome {
    pub report: SyncReport,
    /// Where the updated sheet went; `None` for a dry run.
    pub saved_to: Option<SavedTo>,
    pub metadata_saved: bool,
}

/// Load the sheet and metadata, reconcile every row against the folder
/// tree, then write the metadata and the sheet back.
pub fn sync_workspace(ws: &Workspace, dry_run: bool) -> Result<SyncOutcome> {
    if !ws.spreadsheet.exists() {
        return Err(SyncError::SpreadsheetNotFound(ws.spreadsheet.display().to_string()));
    }
    let mut table = sheet::read_table(&ws.spreadsheet)?;
    let mut rows = table.extract_rows()?;
    let mut store = MetadataStore::load(&ws.metadata);

    let mut tree = DiskTree;
    let mut ids = ClockIds::new();
    let report = Engine::new(&mut tree, &mut ids, &ws.layout, ws.ready_threshold)
        .dry_run(dry_run)
        .run(&mut rows, &mut store);

    if dry_run {
        return Ok(SyncOutcome {
            report,
            saved_to: None,
            metadata_saved: false,
        });
    }

    let metadata_saved = match store.save(&ws.metadata) {
        Ok(()) => {
            log::info!("Metadata saved to {}", ws.metadata.display());
            true
        }
        Err(e) => {
            log::error!("Could not save metadata {}: {e}", ws.metadata.display());
            false
        }
    };

    table.apply_rows(&rows);
    let saved_to = sheet::save_with_fallback(&table, &ws.spreadsheet)?;

    Ok(SyncOutcome {
        report,
        saved_to: Some(saved_to),
        metadata_saved,
    })
}
