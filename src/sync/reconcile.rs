//! Rules combining cached and server state.
//!
//! Cached documents override server documents with the same id because they
//! hold local edits the server has not seen yet. Deleted documents are tracked
//! as tombstones until a confirmed snapshot shows them gone, so stale snapshots
//! and stale flushes cannot bring them back.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{CacheResult, LocalCache};
use crate::store::{CollectionPath, Document, DocumentKey, Fields};

/// A local change applied to the cache before it reaches the server.
#[derive(Clone, Debug, PartialEq)]
pub enum LocalMutation {
    /// Full replacement, used by add and set.
    Replace(Fields),
    /// Shallow merge of the given fields.
    Merge(Fields),
    /// Removal of the document.
    Delete,
}

/// Applies `mutation` to the cached copy of `key`.
pub fn apply_local_mutation(cache: &LocalCache, key: &DocumentKey, mutation: LocalMutation) -> CacheResult<()> {
    let collection = key.collection();
    match mutation {
        LocalMutation::Replace(fields) => cache.upsert(&collection, key.id(), fields),
        LocalMutation::Merge(partial) => cache.merge(&collection, key.id(), &partial),
        LocalMutation::Delete => cache.remove(&collection, key.id()),
    }
}

/// Merged view of one collection.
///
/// Server documents come first in server order, each overlaid with its cached
/// copy when there is one. Cached documents the server does not know yet follow
/// in cache order. Ids for which `is_deleted` returns `true` are dropped.
pub fn merge_snapshot<F>(server: &[Document], cached: &[Document], is_deleted: F) -> Vec<Document>
where
    F: Fn(&str) -> bool,
{
    let cached_by_id: HashMap<&str, &Document> = cached
        .iter()
        .map(|document| (document.id(), document))
        .collect();
    let mut seen = BTreeSet::new();
    let mut merged = Vec::with_capacity(server.len() + cached.len());

    for document in server {
        if is_deleted(document.id()) || !seen.insert(document.id().to_string()) {
            continue;
        }
        let mut combined = document.clone();
        if let Some(local) = cached_by_id.get(document.id()) {
            combined.merge_fields(local.fields());
        }
        merged.push(combined);
    }

    for document in cached {
        if is_deleted(document.id()) || !seen.insert(document.id().to_string()) {
            continue;
        }
        merged.push(document.clone());
    }

    merged
}

/// Recently deleted documents.
///
/// A tombstone is either timed, dropped once the TTL has passed, or held while
/// the server has not acknowledged the delete. Held tombstones never expire and
/// survive confirmed snapshots until [`Tombstones::release`] is called.
#[derive(Clone, Debug)]
pub struct Tombstones {
    entries: BTreeMap<DocumentKey, DateTime<Utc>>,
    held: BTreeSet<DocumentKey>,
    ttl: chrono::Duration,
}

impl Tombstones {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            held: BTreeSet::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52)),
        }
    }

    pub fn record(&mut self, key: DocumentKey, at: DateTime<Utc>) {
        self.entries.insert(key, at);
    }

    /// Keeps the tombstone of `key` alive until it is released or cleared.
    pub fn hold(&mut self, key: DocumentKey, at: DateTime<Utc>) {
        self.entries.insert(key.clone(), at);
        self.held.insert(key);
    }

    /// Turns a held tombstone back into a timed one starting at `at`. Returns
    /// `false` when `key` was not held, e.g. because it was written again.
    pub fn release(&mut self, key: &DocumentKey, at: DateTime<Utc>) -> bool {
        if !self.held.remove(key) {
            return false;
        }
        self.entries.insert(key.clone(), at);
        true
    }

    pub fn clear(&mut self, key: &DocumentKey) -> bool {
        self.held.remove(key);
        self.entries.remove(key).is_some()
    }

    pub fn is_held(&self, key: &DocumentKey) -> bool {
        self.held.contains(key)
    }

    /// Keys whose delete has not reached the server yet.
    pub fn held(&self) -> Vec<DocumentKey> {
        self.held.iter().cloned().collect()
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Whether `key` is held or was deleted less than the TTL ago.
    pub fn is_live(&self, key: &DocumentKey, now: DateTime<Utc>) -> bool {
        if self.held.contains(key) {
            return true;
        }
        self.entries
            .get(key)
            .is_some_and(|deleted_at| !self.expired(*deleted_at, now))
    }

    /// Drops timed tombstones older than the TTL.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        let held = &self.held;
        self.entries.retain(|key, deleted_at| {
            held.contains(key) || now.signed_duration_since(*deleted_at) < ttl
        });
    }

    /// Clears the timed tombstones of `collection` whose ids are absent from a
    /// confirmed server snapshot, except those in `keep`.
    pub fn confirm_absent(
        &mut self,
        collection: &CollectionPath,
        present_ids: &BTreeSet<String>,
        keep: &BTreeSet<DocumentKey>,
    ) {
        let held = &self.held;
        self.entries.retain(|key, _| {
            &key.collection() != collection
                || present_ids.contains(key.id())
                || keep.contains(key)
                || held.contains(key)
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expired(&self, deleted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(deleted_at) >= self.ttl
    }
}
