use std::collections::HashSet;

use rand::Rng;

use crate::metadata::{is_legacy_key, MetadataStore};
use crate::models::Row;

/// Source of fresh unique ids.
pub trait IdSource {
    fn next_id(&mut self) -> String;
}

/// `<unix millis>_<4 random digits>`, never repeated within one process.
#[derive(Debug, Default)]
pub struct ClockIds {
    issued: HashSet<String>,
}

impl ClockIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for ClockIds {
    fn next_id(&mut self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let millis = chrono::Utc::now().timestamp_millis();
            let id = format!("{millis}_{}", rng.gen_range(1000..=9999));
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }
}

/// How a row came by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The row already carried an id.
    Existing(String),
    /// Matched a stored entry by payer and description.
    Matched(String),
    /// Nothing matched; a new id was issued.
    Minted(String),
}

impl Resolution {
    pub fn id(&self) -> &str {
        match self {
            Self::Existing(id) | Self::Matched(id) | Self::Minted(id) => id,
        }
    }
}

/// Decide the unique id for a row.
///
/// An id already in the row is trusted as-is. Otherwise the store is
/// scanned in key order and the first entry whose original payer equals the
/// row's payer and whose original or current content equals the row's
/// description wins. Ids already `claimed` by earlier rows of this run and
/// legacy numeric keys are passed over, so two identical rows never end up
/// sharing one folder. Failing a match, a new id is minted.
pub fn resolve(
    row: &Row,
    store: &MetadataStore,
    claimed: &HashSet<String>,
    ids: &mut impl IdSource,
) -> Resolution {
    let existing = row.unique_id.trim();
    if !existing.is_empty() {
        return Resolution::Existing(existing.to_string());
    }

    let found = store.iter().find(|(key, entry)| {
        !is_legacy_key(key)
            && !claimed.contains(key.as_str())
            && entry.match_payer() == row.payer
            && (entry.original_content == row.description || entry.current_content == row.description)
    });
    if let Some((key, _)) = found {
        return Resolution::Matched(key.clone());
    }

    Resolution::Minted(ids.next_id())
}

#[cfg(test)]
pub use seq::SequenceIds;

#[cfg(test)]
mod seq {
    use super::IdSource;

    /// Deterministic ids for fixtures: `id-1`, `id-2`, ...
    #[derive(Debug, Default)]
    pub struct SequenceIds {
        next: usize,
    }

    impl IdSource for SequenceIds {
        fn next_id(&mut self) -> String {
            self.next += 1;
            format!("id-{}", self.next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataEntry, RowRecord};

    fn row(payer: &str, description: &str) -> Row {
        Row::new(0, payer, description)
    }

    fn store_with(entries: &[(&str, &str, &str, &str)]) -> MetadataStore {
        let mut store = MetadataStore::new();
        for (id, payer, original, current) in entries {
            store.record(
                id,
                &RowRecord {
                    payer,
                    content: original,
                    folder_path: "x",
                    excel_row: 2,
                },
            );
            store.record(
                id,
                &RowRecord {
                    payer,
                    content: current,
                    folder_path: "x",
                    excel_row: 2,
                },
            );
        }
        store
    }

    #[test]
    fn test_existing_id_is_trusted() {
        let mut r = row("张三", "文具");
        r.unique_id = "  not-in-store ".to_string();
        let got = resolve(&r, &MetadataStore::new(), &HashSet::new(), &mut SequenceIds::default());
        assert_eq!(got, Resolution::Existing("not-in-store".to_string()));
    }

    #[test]
    fn test_matches_original_or_current_content() {
        let store = store_with(&[("a", "张三", "文具", "办公用品")]);
        let mut ids = SequenceIds::default();
        let claimed = HashSet::new();
        assert_eq!(resolve(&row("张三", "文具"), &store, &claimed, &mut ids), Resolution::Matched("a".into()));
        assert_eq!(resolve(&row("张三", "办公用品"), &store, &claimed, &mut ids), Resolution::Matched("a".into()));
        assert_eq!(resolve(&row("李四", "文具"), &store, &claimed, &mut ids), Resolution::Minted("id-1".into()));
    }

    #[test]
    fn test_first_match_in_key_order_wins() {
        let store = store_with(&[("b", "张三", "文具", "文具"), ("a", "张三", "文具", "文具")]);
        let got = resolve(&row("张三", "文具"), &store, &HashSet::new(), &mut SequenceIds::default());
        assert_eq!(got, Resolution::Matched("a".into()));
    }

    #[test]
    fn test_claimed_ids_are_skipped() {
        let store = store_with(&[("a", "张三", "文具", "文具"), ("b", "张三", "文具", "文具")]);
        let claimed: HashSet<String> = ["a".to_string()].into_iter().collect();
        let got = resolve(&row("张三", "文具"), &store, &claimed, &mut SequenceIds::default());
        assert_eq!(got, Resolution::Matched("b".into()));
    }

    #[test]
    fn test_legacy_keys_never_match() {
        let mut store = MetadataStore::new();
        store.insert(
            "7",
            MetadataEntry {
                original_payer: "张三".into(),
                original_content: "文具".into(),
                ..MetadataEntry::default()
            },
        );
        let got = resolve(&row("张三", "文具"), &store, &HashSet::new(), &mut SequenceIds::default());
        assert_eq!(got, Resolution::Minted("id-1".into()));
    }

    #[test]
    fn test_tombstoned_entry_can_be_revived_by_match() {
        let mut store = store_with(&[("a", "张三", "文具", "文具")]);
        store.tombstone("a");
        let got = resolve(&row("张三", "文具"), &store, &HashSet::new(), &mut SequenceIds::default());
        assert_eq!(got.id(), "a");
    }

    #[test]
    fn test_clock_ids_are_unique_in_process() {
        let mut ids = ClockIds::new();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = ids.next_id();
            let (millis, suffix) = id.split_once('_').unwrap();
            assert!(millis.parse::<i64>().is_ok());
            assert_eq!(suffix.len(), 4);
            assert!(seen.insert(id));
        }
    }
}
