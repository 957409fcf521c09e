use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Persistent record tying one spreadsheet row lineage to one folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataEntry {
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub original_payer: String,
    #[serde(default)]
    pub original_content: String,
    #[serde(default)]
    pub current_payer: String,
    #[serde(default)]
    pub current_content: String,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    /// Older files stored the payer under this name.
    #[serde(default, rename = "payer", skip_serializing_if = "Option::is_none")]
    pub legacy_payer: Option<String>,
    /// Fields this version does not know about, written back untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MetadataEntry {
    /// Payer used for identity matching, falling back to the legacy field.
    pub fn match_payer(&self) -> &str {
        if self.original_payer.is_empty() {
            self.legacy_payer.as_deref().unwrap_or("")
        } else {
            &self.original_payer
        }
    }

    pub fn display_payer(&self) -> &str {
        let payer = self.match_payer();
        if payer.is_empty() {
            &self.current_payer
        } else {
            payer
        }
    }

    pub fn display_content(&self) -> &str {
        if self.original_content.is_empty() {
            &self.current_content
        } else {
            &self.original_content
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

/// Keys made only of digits come from an older row-index scheme.
pub fn is_legacy_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())
}

pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Everything the engine learned about a row in this run.
pub struct RowRecord<'a> {
    pub payer: &'a str,
    pub content: &'a str,
    pub folder_path: &'a str,
    pub excel_row: usize,
}

#[derive(Debug, Default)]
pub struct MetadataStore {
    entries: BTreeMap<String, MetadataEntry>,
    /// Entries that could not be understood; kept so a rewrite loses nothing.
    unparsed: BTreeMap<String, Value>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store, treating a missing, unreadable or corrupt file as empty.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Could not read metadata {}: {e}; rebuilding", path.display());
                return Self::new();
            }
        };
        match Self::from_json(&content) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Metadata {} is corrupt ({e}); rebuilding", path.display());
                Self::new()
            }
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(content)?;
        let mut store = Self::new();
        for (key, value) in raw {
            match serde_json::from_value::<MetadataEntry>(value.clone()) {
                Ok(mut entry) => {
                    if entry.unique_id.is_empty() {
                        entry.unique_id = key.clone();
                    }
                    store.entries.insert(key, entry);
                }
                Err(e) => {
                    log::warn!("Keeping unreadable metadata entry {key} as-is: {e}");
                    store.unparsed.insert(key, value);
                }
            }
        }
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut out: BTreeMap<&str, Value> = BTreeMap::new();
        for (key, value) in &self.unparsed {
            out.insert(key.as_str(), value.clone());
        }
        for (key, entry) in &self.entries {
            out.insert(key.as_str(), serde_json::to_value(entry)?);
        }
        Ok(serde_json::to_string_pretty(&out)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, format!("{json}\n"))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&MetadataEntry> {
        self.entries.get(id)
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Entries in key order. Identity fallback relies on this order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataEntry)> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unparsed.is_empty()
    }

    #[cfg(test)]
    pub fn insert(&mut self, id: &str, entry: MetadataEntry) {
        self.entries.insert(id.to_string(), entry);
    }

    /// Create or refresh the entry for `id`. Returns true when it was new.
    /// A tombstoned entry that reappears is revived.
    pub fn record(&mut self, id: &str, rec: &RowRecord<'_>) -> bool {
        let now = now_stamp();
        let is_new = !self.entries.contains_key(id);
        let entry = self.entries.entry(id.to_string()).or_insert_with(|| MetadataEntry {
            unique_id: id.to_string(),
            original_payer: rec.payer.to_string(),
            original_content: rec.content.to_string(),
            created_at: now.clone(),
            ..MetadataEntry::default()
        });
        entry.current_payer = rec.payer.to_string();
        entry.current_content = rec.content.to_string();
        entry.folder_path = rec.folder_path.to_string();
        entry.last_updated = now;
        entry.excel_row = Some(rec.excel_row);
        entry.deleted = None;
        entry.deleted_at = None;
        is_new
    }

    /// Mark an entry as removed from the sheet. Returns true the first time.
    pub fn tombstone(&mut self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if !entry.is_deleted() => {
                entry.deleted = Some(true);
                entry.deleted_at = Some(now_stamp());
                true
            }
            _ => false,
        }
    }

    /// Drop entries keyed by the old numeric scheme without touching folders.
    pub fn prune_legacy_keys(&mut self) -> usize {
        let before = self.entries.len() + self.unparsed.len();
        self.entries.retain(|k, _| !is_legacy_key(k));
        self.unparsed.retain(|k, _| !is_legacy_key(k));
        before - self.entries.len() - self.unparsed.len()
    }
}
