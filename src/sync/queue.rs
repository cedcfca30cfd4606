use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::store::{CollectionPath, DocumentKey};

/// How a queued document is written on flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    /// Replace the remote document with the cached one.
    Set,
    /// Merge the cached fields into the remote document.
    Merge,
}

impl WriteKind {
    /// A replace absorbs any merge queued before or after it.
    fn combine(self, other: WriteKind) -> WriteKind {
        match (self, other) {
            (WriteKind::Merge, WriteKind::Merge) => WriteKind::Merge,
            _ => WriteKind::Set,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingWrite {
    pub key: DocumentKey,
    pub kind: WriteKind,
    pub modified_at: DateTime<Utc>,
}

/// Documents with local changes not yet committed, at most one entry per key.
///
/// Entries only name documents; the data sent on flush is read from the cache
/// at that moment, so repeated writes to one document coalesce.
#[derive(Clone, Debug, Default)]
pub struct SyncQueue {
    entries: BTreeMap<DocumentKey, PendingWrite>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` dirty. Returns `true` when the key was not queued yet.
    pub fn enqueue(&mut self, key: DocumentKey, kind: WriteKind, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(&key) {
            Some(existing) => {
                existing.kind = existing.kind.combine(kind);
                existing.modified_at = existing.modified_at.max(at);
                false
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    PendingWrite {
                        key,
                        kind,
                        modified_at: at,
                    },
                );
                true
            }
        }
    }

    /// Puts writes from a failed flush back. Entries queued since the flush
    /// started are kept and only widened to a replace when needed.
    pub fn requeue(&mut self, writes: impl IntoIterator<Item = PendingWrite>) {
        for write in writes {
            match self.entries.get_mut(&write.key) {
                Some(existing) => existing.kind = existing.kind.combine(write.kind),
                None => {
                    self.entries.insert(write.key.clone(), write);
                }
            }
        }
    }

    pub fn remove(&mut self, key: &DocumentKey) -> Option<PendingWrite> {
        self.entries.remove(key)
    }

    /// Empties the queue, returning its entries in key order.
    pub fn take_all(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &DocumentKey) -> Option<&PendingWrite> {
        self.entries.get(key)
    }

    /// Queued keys that belong to `collection`.
    pub fn keys_in<'a>(&'a self, collection: &'a CollectionPath) -> impl Iterator<Item = &'a DocumentKey> + 'a {
        self.entries
            .keys()
            .filter(move |key| &key.collection() == collection)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
