use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::layout::Layout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    #[serde(default = "default_spreadsheet")]
    pub spreadsheet: String,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    #[serde(default = "default_completed_dir")]
    pub completed_dir: String,
    #[serde(default = "default_pending_dir")]
    pub pending_dir: String,
    #[serde(default = "default_ready_threshold")]
    pub ready_threshold: usize,
    #[serde(default = "default_watch_cooldown_secs")]
    pub watch_cooldown_secs: u64,
    #[serde(default = "default_watch_max_wait_secs")]
    pub watch_max_wait_secs: u64,
}

fn default_root_dir() -> String {
    ".".to_string()
}

fn default_spreadsheet() -> String {
    "社团报销.xlsx".to_string()
}

fn default_metadata_file() -> String {
    "folder_metadata.json".to_string()
}

fn default_completed_dir() -> String {
    "completed".to_string()
}

fn default_pending_dir() -> String {
    "pending".to_string()
}

fn default_ready_threshold() -> usize {
    3
}

fn default_watch_cooldown_secs() -> u64 {
    2
}

fn default_watch_max_wait_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            spreadsheet: default_spreadsheet(),
            metadata_file: default_metadata_file(),
            completed_dir: default_completed_dir(),
            pending_dir: default_pending_dir(),
            ready_threshold: default_ready_threshold(),
            watch_cooldown_secs: default_watch_cooldown_secs(),
            watch_max_wait_secs: default_watch_max_wait_secs(),
        }
    }
}

/// Everything one sync run needs to know about where things live.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub spreadsheet: PathBuf,
    pub metadata: PathBuf,
    pub layout: Layout,
    pub ready_threshold: usize,
}

impl Settings {
    /// Resolve into a workspace, applying one-off command line overrides.
    pub fn workspace(&self, root: Option<&str>, sheet: Option<&str>) -> Workspace {
        let root = PathBuf::from(shellexpand_path(root.unwrap_or(&self.root_dir)));
        let spreadsheet = resolve_in(&root, sheet.unwrap_or(&self.spreadsheet));
        let metadata = resolve_in(&root, &self.metadata_file);
        let layout = Layout::new(&root, &self.completed_dir, &self.pending_dir);
        Workspace {
            root,
            spreadsheet,
            metadata,
            layout,
            ready_threshold: self.ready_threshold,
        }
    }
}

fn resolve_in(root: &Path, name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("claimsync")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable settings at {}: {e}", path.display());
            Settings::default()
        })
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SyncError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
