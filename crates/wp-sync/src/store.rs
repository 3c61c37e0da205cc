//! The wave list every view renders from.
//!
//! `EntryStore` only exposes keyed mutations, so no path can introduce a
//! second copy of an entry. Tasks share it through `StoreHandle`, whose
//! methods never await while holding the lock.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use wp_types::{Entry, EntryKey};

#[derive(Debug, Default)]
pub struct EntryStore {
    entries: Vec<Entry>,
    keys: HashSet<EntryKey>,
    total_count: Option<u64>,
}

impl EntryStore {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Count as last reported by the ledger. `None` until first queried.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.keys.contains(key)
    }

    /// Appends `entry` unless an entry with the same key is present.
    pub fn insert_if_absent(&mut self, entry: Entry) -> bool {
        if !self.keys.insert(entry.key()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Replaces the list with `entries` in their given order, keeping the
    /// first of any repeated key. Returns how many repeats were dropped.
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = Entry>) -> usize {
        self.entries.clear();
        self.keys.clear();

        let mut dropped = 0;
        for entry in entries {
            if !self.insert_if_absent(entry) {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn set_total_count(&mut self, count: u64) {
        self.total_count = Some(count);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub entries: Vec<Entry>,
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreHandle {
    inner: Arc<RwLock<EntryStore>>,
}

impl StoreHandle {
    pub async fn insert_if_absent(&self, entry: Entry) -> bool {
        self.inner.write().await.insert_if_absent(entry)
    }

    /// Replaces entries and count in one step.
    pub async fn prime(&self, entries: Vec<Entry>, total_count: u64) -> usize {
        let mut store = self.inner.write().await;
        let dropped = store.replace_all(entries);
        store.set_total_count(total_count);
        dropped
    }

    pub async fn set_total_count(&self, count: u64) {
        self.inner.write().await.set_total_count(count);
    }

    pub async fn total_count(&self) -> Option<u64> {
        self.inner.read().await.total_count()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let store = self.inner.read().await;
        StoreSnapshot {
            entries: store.entries().to_vec(),
            total_count: store.total_count(),
        }
    }
}
