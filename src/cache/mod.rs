//! Durable local cache of collection contents.
//!
//! Each collection path maps to one storage entry holding a JSON array of
//! documents. All operations are synchronous and immediately visible to the next
//! [`LocalCache::load`]. Unreadable entries are logged and discarded so the read
//! path never fails; the next server snapshot repopulates them.

mod error;
mod file;
mod storage;
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod web;

use std::sync::Arc;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::store::{CollectionPath, Document, Fields};

pub use error::{CacheError, CacheResult};
pub use file::FileStorage;
pub use storage::{InMemoryStorage, KeyValueStorage};
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use web::WebLocalStorage;

/// Prefix of every storage key written by the cache.
pub const CACHE_KEY_PREFIX: &str = "questlog:";

/// Characters replaced in collection paths; `/` is the path separator and `%`
/// must be escaped so decoding is unambiguous.
const PATH_ESCAPES: &AsciiSet = &CONTROLS.add(b'/').add(b'%');

/// Storage key for `collection`, e.g. `questlog:users%2Fu1%2Fquests`.
pub fn cache_key(collection: &CollectionPath) -> String {
    format!(
        "{CACHE_KEY_PREFIX}{}",
        utf8_percent_encode(&collection.canonical_string(), PATH_ESCAPES)
    )
}

/// Inverse of [`cache_key`]; `None` for keys the cache did not write.
pub fn decode_cache_key(key: &str) -> Option<CollectionPath> {
    let encoded = key.strip_prefix(CACHE_KEY_PREFIX)?;
    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
    CollectionPath::from_string(&decoded).ok()
}

#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish()
    }
}

impl LocalCache {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStorage::new()))
    }

    /// Documents cached for `collection`, `[]` when absent or unreadable.
    pub fn load(&self, collection: &CollectionPath) -> Vec<Document> {
        let key = cache_key(collection);
        let raw = match self.storage.get_item(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                log::warn!("cache read for {collection} failed: {err}");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Document>>(&raw) {
            Ok(documents) => documents,
            Err(err) => {
                log::warn!("discarding corrupt cache entry for {collection}: {err}");
                if let Err(err) = self.storage.remove_item(&key) {
                    log::warn!("failed to drop corrupt cache entry for {collection}: {err}");
                }
                Vec::new()
            }
        }
    }

    /// Replaces the whole entry for `collection`.
    pub fn save(&self, collection: &CollectionPath, documents: &[Document]) -> CacheResult<()> {
        let serialized = serde_json::to_string(documents)?;
        self.storage.set_item(&cache_key(collection), &serialized)
    }

    pub fn get(&self, collection: &CollectionPath, doc_id: &str) -> Option<Document> {
        self.load(collection)
            .into_iter()
            .find(|document| document.id() == doc_id)
    }

    /// Replaces the document with id `doc_id`, or appends it.
    pub fn upsert(&self, collection: &CollectionPath, doc_id: &str, fields: Fields) -> CacheResult<()> {
        let mut documents = self.load(collection);
        let replacement = Document::new(doc_id, fields);
        match documents.iter_mut().find(|document| document.id() == doc_id) {
            Some(existing) => *existing = replacement,
            None => documents.push(replacement),
        }
        self.save(collection, &documents)
    }

    /// Shallow-merges `partial` into the cached document, or appends a document
    /// holding only `partial` when none is cached yet.
    pub fn merge(&self, collection: &CollectionPath, doc_id: &str, partial: &Fields) -> CacheResult<()> {
        let mut documents = self.load(collection);
        match documents.iter_mut().find(|document| document.id() == doc_id) {
            Some(existing) => existing.merge_fields(partial),
            None => documents.push(Document::new(doc_id, partial.clone())),
        }
        self.save(collection, &documents)
    }

    pub fn remove(&self, collection: &CollectionPath, doc_id: &str) -> CacheResult<()> {
        let mut documents = self.load(collection);
        let before = documents.len();
        documents.retain(|document| document.id() != doc_id);
        if documents.len() == before {
            return Ok(());
        }
        self.save(collection, &documents)
    }

    /// Keeps only the documents accepted by `keep`; drops the entry when nothing
    /// is left.
    pub fn retain<F>(&self, collection: &CollectionPath, keep: F) -> CacheResult<()>
    where
        F: FnMut(&Document) -> bool,
    {
        let mut documents = self.load(collection);
        documents.retain(keep);
        if documents.is_empty() {
            return self.purge(collection);
        }
        self.save(collection, &documents)
    }

    pub fn purge(&self, collection: &CollectionPath) -> CacheResult<()> {
        self.storage.remove_item(&cache_key(collection))
    }

    /// Collections that currently have a cache entry.
    pub fn collections(&self) -> Vec<CollectionPath> {
        match self.storage.keys() {
            Ok(keys) => keys.iter().filter_map(|key| decode_cache_key(key)).collect(),
            Err(err) => {
                log::warn!("listing cache entries failed: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields_from_value;
    use serde_json::json;

    fn quests() -> CollectionPath {
        CollectionPath::for_user("u1", "quests").unwrap()
    }

    fn doc(id: &str, value: serde_json::Value) -> Document {
        Document::new(id, fields_from_value(value))
    }

    #[test]
    fn save_then_load_round_trips() {
        let cache = LocalCache::in_memory();
        let documents = vec![
            doc("q1", json!({"title": "A", "completed": false})),
            doc("q2", json!({"title": "B", "difficulty": 3})),
        ];
        cache.save(&quests(), &documents).unwrap();
        assert_eq!(cache.load(&quests()), documents);
    }

    #[test]
    fn load_of_missing_entry_is_empty() {
        let cache = LocalCache::in_memory();
        assert!(cache.load(&quests()).is_empty());
    }

    #[test]
    fn corrupt_entry_is_discarded() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.set_item(&cache_key(&quests()), "{not json").unwrap();
        let cache = LocalCache::new(storage.clone());

        assert!(cache.load(&quests()).is_empty());
        assert!(storage.get_item(&cache_key(&quests())).unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_or_appends() {
        let cache = LocalCache::in_memory();
        cache
            .upsert(&quests(), "q1", fields_from_value(json!({"title": "A", "emoji": "1f525"})))
            .unwrap();
        cache
            .upsert(&quests(), "q1", fields_from_value(json!({"title": "A2"})))
            .unwrap();
        cache.upsert(&quests(), "q2", Fields::new()).unwrap();

        let documents = cache.load(&quests());
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0], doc("q1", json!({"title": "A2"})));
    }

    #[test]
    fn merge_is_shallow_and_creates_missing_documents() {
        let cache = LocalCache::in_memory();
        cache
            .upsert(&quests(), "q1", fields_from_value(json!({"title": "A", "completed": false})))
            .unwrap();
        cache
            .merge(&quests(), "q1", &fields_from_value(json!({"completed": true})))
            .unwrap();
        cache
            .merge(&quests(), "q9", &fields_from_value(json!({"completed": true})))
            .unwrap();

        assert_eq!(
            cache.get(&quests(), "q1"),
            Some(doc("q1", json!({"title": "A", "completed": true})))
        );
        assert_eq!(cache.get(&quests(), "q9"), Some(doc("q9", json!({"completed": true}))));
    }

    #[test]
    fn remove_and_purge() {
        let cache = LocalCache::in_memory();
        cache.upsert(&quests(), "q1", Fields::new()).unwrap();
        cache.upsert(&quests(), "q2", Fields::new()).unwrap();

        cache.remove(&quests(), "missing").unwrap();
        cache.remove(&quests(), "q1").unwrap();
        assert_eq!(cache.load(&quests()).len(), 1);

        cache.purge(&quests()).unwrap();
        assert!(cache.load(&quests()).is_empty());
        assert!(cache.collections().is_empty());
    }

    #[test]
    fn retain_drops_empty_entries() {
        let cache = LocalCache::in_memory();
        cache.upsert(&quests(), "q1", Fields::new()).unwrap();
        cache.upsert(&quests(), "q2", Fields::new()).unwrap();

        cache.retain(&quests(), |document| document.id() == "q2").unwrap();
        assert_eq!(cache.load(&quests()).len(), 1);

        cache.retain(&quests(), |_| false).unwrap();
        assert!(cache.collections().is_empty());
    }

    #[test]
    fn cache_keys_round_trip() {
        let nested = CollectionPath::for_user("u%1", "stages/s1/notes").unwrap();
        let key = cache_key(&nested);
        assert!(key.starts_with(CACHE_KEY_PREFIX));
        assert!(!key[CACHE_KEY_PREFIX.len()..].contains('/'));
        assert_eq!(decode_cache_key(&key), Some(nested));
        assert_eq!(decode_cache_key("unrelated"), None);
    }

    #[test]
    fn file_backed_cache_persists_entries() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("questlog-local-cache-{}", std::process::id()));
        let cache = LocalCache::new(Arc::new(FileStorage::new(&dir).unwrap()));
        cache.upsert(&quests(), "q1", fields_from_value(json!({"title": "A"}))).unwrap();

        let reopened = LocalCache::new(Arc::new(FileStorage::new(&dir).unwrap()));
        assert_eq!(reopened.load(&quests()), vec![doc("q1", json!({"title": "A"}))]);
        assert_eq!(reopened.collections(), vec![quests()]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
