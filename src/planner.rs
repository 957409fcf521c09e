//! Pure decisions about the folder tree. Nothing here touches the disk;
//! the reconciler gathers facts through a `FolderTree`, asks these functions
//! what to do, and hands the resulting ops to the executor.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::layout::Layout;
use crate::models::Status;

/// Readiness gate: below `threshold` files a row is always `no`; at or
/// above it, `yes` is kept and anything else becomes `check`.
pub fn derive_status(prior: &Status, file_count: usize, threshold: usize) -> Status {
    if file_count < threshold {
        Status::No
    } else if prior.is_yes() {
        Status::Yes
    } else {
        Status::Check
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// No usable prior folder: create the target.
    Create,
    /// Prior folder exists and is already the target.
    Reuse,
    /// Prior folder exists elsewhere: move it to the target.
    Move { from: PathBuf },
    /// Prior folder is gone and the target differs: start fresh.
    Recreate { missing: PathBuf },
}

/// Where a row's folder should come from, given the folder its entry last
/// pointed at (if any) and whether that folder still exists.
pub fn decide_placement(prior: Option<&Path>, prior_exists: bool, target: &Path) -> Placement {
    match prior {
        None => Placement::Create,
        Some(prev) if prev == target => {
            if prior_exists {
                Placement::Reuse
            } else {
                Placement::Create
            }
        }
        Some(prev) if prior_exists => Placement::Move {
            from: prev.to_path_buf(),
        },
        Some(prev) => Placement::Recreate {
            missing: prev.to_path_buf(),
        },
    }
}

/// Ancestors of `folder` that may be removed if they turn out empty,
/// deepest first, stopping below the root and any bucket root.
pub fn prune_chain(folder: &Path, layout: &Layout) -> Vec<PathBuf> {
    folder
        .ancestors()
        .skip(1)
        .take_while(|p| p.starts_with(layout.root()) && !layout.is_protected(p))
        .map(Path::to_path_buf)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    /// Remove a folder that holds no files anywhere below it.
    RemoveTree(PathBuf),
    /// Remove each folder in turn while it is empty; stop at the first that is not.
    PruneChain(Vec<PathBuf>),
    /// Remove the folder only if it is empty when the op runs.
    RemoveIfEmpty(PathBuf),
    /// Leave a folder that still holds files; reported, never removed.
    Keep(PathBuf),
}

/// What the cleanup planner needs to know about the tree.
#[derive(Debug, Default, Clone)]
pub struct TreeSnapshot {
    /// Candidate folders (orphaned or untracked) and whether they hold files.
    pub candidates: BTreeMap<PathBuf, bool>,
    /// Payer folders directly under each bucket.
    pub payer_dirs: Vec<PathBuf>,
    /// Folders directly under the root that are neither buckets nor reserved.
    pub top_level: Vec<PathBuf>,
}

/// Plan removal of every orphaned or untracked folder.
///
/// A candidate is skipped when it is, or contains, some active folder.
/// Candidates holding files are kept; empty ones are removed and their
/// emptied ancestors pruned. Finally empty payer folders and stray empty
/// top-level folders are removed.
pub fn plan_cleanup(snapshot: &TreeSnapshot, active: &BTreeSet<PathBuf>, layout: &Layout) -> Vec<FsOp> {
    let mut ops = Vec::new();

    for (path, has_files) in &snapshot.candidates {
        if layout.is_protected(path) || active.iter().any(|a| a.starts_with(path)) {
            continue;
        }
        if *has_files {
            ops.push(FsOp::Keep(path.clone()));
            continue;
        }
        ops.push(FsOp::RemoveTree(path.clone()));
        let chain = prune_chain(path, layout);
        if !chain.is_empty() {
            ops.push(FsOp::PruneChain(chain));
        }
    }

    for dir in snapshot.payer_dirs.iter().chain(&snapshot.top_level) {
        if !layout.is_protected(dir) && !active.iter().any(|a| a.starts_with(dir)) {
            ops.push(FsOp::RemoveIfEmpty(dir.clone()));
        }
    }

    ops
}
