//! In-memory table of parsed bibliography entries, one slot per source.
//!
//! Slots keep the order in which their sources were first registered, so the
//! flat entry list is stable across re-parses. A slot's entry list is only
//! ever replaced as a whole.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bibliography::BibEntry;
use crate::notice::{Notice, NoticeSink};

struct SourceSlot {
    path: PathBuf,
    entries: Vec<BibEntry>,
}

pub struct EntryStore {
    slots: Vec<SourceSlot>,
    notices: Arc<dyn NoticeSink>,
}

impl EntryStore {
    pub fn new(notices: Arc<dyn NoticeSink>) -> EntryStore {
        EntryStore {
            slots: vec![],
            notices,
        }
    }

    /// Replace the entries of `path`, registering it if it is new.
    pub fn upsert(&mut self, path: &Path, entries: Vec<BibEntry>) {
        match self.slots.iter_mut().find(|slot| slot.path == path) {
            Some(slot) => slot.entries = entries,
            None => self.slots.push(SourceSlot {
                path: path.to_path_buf(),
                entries,
            }),
        }
    }

    /// Returns whether `path` had a slot.
    pub fn evict(&mut self, path: &Path) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.path != path);
        before != self.slots.len()
    }

    /// Every entry across all sources, in source registration order.
    ///
    /// Emits one [`Notice::DuplicateKeys`] per call when any key repeats.
    pub fn all_entries(&self) -> Vec<&BibEntry> {
        let entries: Vec<&BibEntry> = self.slots.iter().flat_map(|slot| &slot.entries).collect();

        let duplicates = duplicate_keys(entries.iter().copied());
        if !duplicates.is_empty() {
            self.notices.notify(Notice::DuplicateKeys(duplicates));
        }

        entries
    }

    /// First entry with `key`; earlier-registered sources win ties.
    pub fn find_by_key(&self, key: &str) -> Option<&BibEntry> {
        self.slots
            .iter()
            .flat_map(|slot| &slot.entries)
            .find(|entry| entry.key == key)
    }

    pub fn entries_for(&self, path: &Path) -> Option<&[BibEntry]> {
        self.slots
            .iter()
            .find(|slot| slot.path == path)
            .map(|slot| slot.entries.as_slice())
    }

    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.slots.iter().map(|slot| slot.path.as_path())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.entries.is_empty())
    }
}

/// Keys occurring more than once, in order of first occurrence.
pub fn duplicate_keys<'a>(entries: impl IntoIterator<Item = &'a BibEntry>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = vec![];

    for entry in entries {
        let count = counts.entry(entry.key.as_str()).or_insert(0);
        if *count == 0 {
            order.push(entry.key.as_str());
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter(|key| counts[key] > 1)
        .map(String::from)
        .collect()
}
