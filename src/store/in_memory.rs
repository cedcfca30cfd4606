use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::store::document::{CollectionSnapshot, Document, Fields, SnapshotMetadata};
use crate::store::error::{not_found, resource_exhausted, StoreError, StoreResult};
use crate::store::path::{CollectionPath, DocumentKey};
use crate::store::remote::{
    BatchWrite, ListenerRegistration, RemoteStore, SetOptions, SnapshotListener, TransactionFn,
    MAX_BATCH_WRITES,
};

/// Operations that can be made to fail with [`InMemoryRemoteStore::fail_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    Set,
    Update,
    Delete,
    Commit,
    Transaction,
}

struct ListenerEntry {
    id: u64,
    collection: CollectionPath,
    listener: SnapshotListener,
}

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<DocumentKey, Fields>,
    failures: HashMap<StoreOperation, VecDeque<StoreError>>,
    commits: Vec<Vec<BatchWrite>>,
}

/// Process-local document store.
///
/// Stands in for the hosted backend in tests and offline demos. Every successful
/// write notifies the listeners of the affected collection synchronously with a
/// confirmed (`has_pending_writes == false`) snapshot.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<StoreState>>,
    listeners: Arc<Mutex<Vec<ListenerEntry>>>,
    next_listener_id: Arc<AtomicU64>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `operation` fail with `error`. Calls queue up.
    pub fn fail_next(&self, operation: StoreOperation, error: StoreError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Every batch that was committed successfully, in commit order.
    pub fn commits(&self) -> Vec<Vec<BatchWrite>> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn document(&self, key: &DocumentKey) -> Option<Document> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(key)
            .map(|fields| Document::new(key.id(), fields.clone()))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Current contents of `collection` as a snapshot, without delivering it.
    pub fn snapshot(&self, collection: &CollectionPath, has_pending_writes: bool) -> CollectionSnapshot {
        let state = self.state.lock().unwrap();
        snapshot_from_state(&state, collection, has_pending_writes)
    }

    /// Delivers `snapshot` to the listeners of its collection, even if it is
    /// older than the stored data.
    pub fn deliver(&self, snapshot: CollectionSnapshot) {
        for listener in self.listeners_for(snapshot.collection()) {
            listener(Ok(snapshot.clone()));
        }
    }

    /// Re-emits the current contents of `collection`.
    pub fn emit_snapshot(&self, collection: &CollectionPath, has_pending_writes: bool) {
        self.deliver(self.snapshot(collection, has_pending_writes));
    }

    /// Reports a transport error to the listeners of `collection`.
    pub fn emit_error(&self, collection: &CollectionPath, error: StoreError) {
        for listener in self.listeners_for(collection) {
            listener(Err(error.clone()));
        }
    }

    fn take_failure(&self, operation: StoreOperation) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn listeners_for(&self, collection: &CollectionPath) -> Vec<SnapshotListener> {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| &entry.collection == collection)
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }

    fn notify(&self, collections: impl IntoIterator<Item = CollectionPath>) {
        let mut seen = Vec::new();
        for collection in collections {
            if seen.contains(&collection) {
                continue;
            }
            self.emit_snapshot(&collection, false);
            seen.push(collection);
        }
    }

    fn apply_set(state: &mut StoreState, key: &DocumentKey, fields: Fields, options: SetOptions) {
        let fields = Document::new(key.id(), fields).into_fields();
        if options.merge {
            let entry = state.documents.entry(key.clone()).or_default();
            for (name, value) in fields {
                entry.insert(name, value);
            }
        } else {
            state.documents.insert(key.clone(), fields);
        }
    }
}

fn snapshot_from_state(
    state: &StoreState,
    collection: &CollectionPath,
    has_pending_writes: bool,
) -> CollectionSnapshot {
    let documents = state
        .documents
        .iter()
        .filter(|(key, _)| &key.collection() == collection)
        .map(|(key, fields)| Document::new(key.id(), fields.clone()))
        .collect();
    CollectionSnapshot::new(
        collection.clone(),
        documents,
        SnapshotMetadata::new(false, has_pending_writes),
    )
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        self.take_failure(StoreOperation::Get)?;
        Ok(self.document(key))
    }

    async fn set(&self, key: &DocumentKey, fields: Fields, options: SetOptions) -> StoreResult<()> {
        self.take_failure(StoreOperation::Set)?;
        {
            let mut state = self.state.lock().unwrap();
            Self::apply_set(&mut state, key, fields, options);
        }
        self.notify([key.collection()]);
        Ok(())
    }

    async fn update(&self, key: &DocumentKey, partial: Fields) -> StoreResult<()> {
        self.take_failure(StoreOperation::Update)?;
        {
            let mut state = self.state.lock().unwrap();
            let current = state
                .documents
                .get_mut(key)
                .ok_or_else(|| not_found(format!("Document {key} does not exist")))?;
            for (name, value) in Document::new(key.id(), partial).into_fields() {
                current.insert(name, value);
            }
        }
        self.notify([key.collection()]);
        Ok(())
    }

    async fn delete(&self, key: &DocumentKey) -> StoreResult<()> {
        self.take_failure(StoreOperation::Delete)?;
        self.state.lock().unwrap().documents.remove(key);
        self.notify([key.collection()]);
        Ok(())
    }

    fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        listener: SnapshotListener,
    ) -> StoreResult<ListenerRegistration> {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push(ListenerEntry {
            id,
            collection: collection.clone(),
            listener: Arc::clone(&listener),
        });

        listener(Ok(self.snapshot(collection, false)));

        let listeners = Arc::downgrade(&self.listeners);
        Ok(ListenerRegistration::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                if let Ok(mut guard) = listeners.lock() {
                    guard.retain(|entry| entry.id != id);
                }
            }
        }))
    }

    async fn batch_commit(&self, writes: Vec<BatchWrite>) -> StoreResult<()> {
        if writes.len() > MAX_BATCH_WRITES {
            return Err(resource_exhausted(format!(
                "A batch cannot contain more than {MAX_BATCH_WRITES} writes"
            )));
        }
        self.take_failure(StoreOperation::Commit)?;
        let collections = {
            let mut state = self.state.lock().unwrap();
            for write in &writes {
                Self::apply_set(&mut state, &write.key, write.fields.clone(), write.options);
            }
            let collections = writes.iter().map(|write| write.key.collection()).collect::<Vec<_>>();
            state.commits.push(writes);
            collections
        };
        self.notify(collections);
        Ok(())
    }

    async fn run_transaction(&self, key: &DocumentKey, update: TransactionFn) -> StoreResult<Fields> {
        self.take_failure(StoreOperation::Transaction)?;
        let stored = {
            let mut state = self.state.lock().unwrap();
            let next = update(state.documents.get(key))?;
            let next = Document::new(key.id(), next).into_fields();
            state.documents.insert(key.clone(), next.clone());
            next
        };
        self.notify([key.collection()]);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::fields_from_value;
    use crate::store::error::{aborted, unavailable};
    use serde_json::json;

    fn quests() -> CollectionPath {
        CollectionPath::for_user("u1", "quests").unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn set_merge_and_update() {
        let store = InMemoryRemoteStore::new();
        let key = quests().doc("q1").unwrap();
        store
            .set(&key, fields_from_value(json!({"title": "A", "n": 1})), SetOptions::replace())
            .await
            .unwrap();
        store
            .set(&key, fields_from_value(json!({"n": 2})), SetOptions::merge_all())
            .await
            .unwrap();
        store
            .update(&key, fields_from_value(json!({"done": true})))
            .await
            .unwrap();

        let doc = store.get(&key).await.unwrap().unwrap();
        assert_eq!(doc.fields(), &fields_from_value(json!({"title": "A", "n": 2, "done": true})));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn update_missing_document_fails() {
        let store = InMemoryRemoteStore::new();
        let key = quests().doc("missing").unwrap();
        let err = store.update(&key, Fields::new()).await.unwrap_err();
        assert_eq!(err.code_str(), "store/not-found");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn add_generates_id() {
        let store = InMemoryRemoteStore::new();
        let id = store
            .add(&quests(), fields_from_value(json!({"title": "B"})))
            .await
            .unwrap();
        let stored = store.document(&quests().doc(&id).unwrap()).unwrap();
        assert_eq!(stored.get("title"), Some(&json!("B")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn injected_failures_are_consumed_once() {
        let store = InMemoryRemoteStore::new();
        store.fail_next(StoreOperation::Commit, unavailable("offline"));
        let write = BatchWrite {
            key: quests().doc("q1").unwrap(),
            fields: Fields::new(),
            options: SetOptions::merge_all(),
        };
        assert!(store.batch_commit(vec![write.clone()]).await.is_err());
        assert!(store.batch_commit(vec![write]).await.is_ok());
        assert_eq!(store.commits().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn listeners_receive_initial_and_change_snapshots() {
        let store = InMemoryRemoteStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let mut registration = store
            .subscribe_collection(
                &quests(),
                Arc::new(move |result: StoreResult<CollectionSnapshot>| {
                    captured.lock().unwrap().push(result.unwrap().documents().len());
                }),
            )
            .unwrap();

        let key = quests().doc("q1").unwrap();
        store.set(&key, Fields::new(), SetOptions::replace()).await.unwrap();
        // Writes to other collections are not delivered.
        let stage = CollectionPath::for_user("u1", "stages").unwrap().doc("s1").unwrap();
        store.set(&stage, Fields::new(), SetOptions::replace()).await.unwrap();

        registration.detach();
        store.delete(&key).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn transaction_reads_and_writes() {
        let store = InMemoryRemoteStore::new();
        let key = DocumentKey::from_string("users/u1").unwrap();
        store
            .set(&key, fields_from_value(json!({"exp": 10})), SetOptions::replace())
            .await
            .unwrap();

        let stored = store
            .run_transaction(
                &key,
                Arc::new(|current: Option<&Fields>| {
                    let exp = current.and_then(|f| f.get("exp")).and_then(|v| v.as_i64()).unwrap_or(0);
                    Ok(fields_from_value(json!({"exp": exp + 5})))
                }),
            )
            .await
            .unwrap();
        assert_eq!(stored.get("exp"), Some(&json!(15)));

        store.fail_next(StoreOperation::Transaction, aborted("contention"));
        let err = store
            .run_transaction(&key, Arc::new(|_: Option<&Fields>| Ok(Fields::new())))
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "store/aborted");
    }
}
