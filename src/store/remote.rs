use std::sync::Arc;

use async_trait::async_trait;

use crate::store::document::{CollectionSnapshot, Document, Fields};
use crate::store::error::StoreResult;
use crate::store::path::{generate_auto_id, CollectionPath, DocumentKey};

/// Maximum number of writes the store accepts in one batched commit.
pub const MAX_BATCH_WRITES: usize = 500;

/// Callback invoked with every snapshot (or transport error) of a collection.
pub type SnapshotListener = Arc<dyn Fn(StoreResult<CollectionSnapshot>) + Send + Sync + 'static>;

/// Read-modify-write step of a transaction. Receives the current fields (`None`
/// when the document does not exist) and returns the fields to store. The store
/// may call it more than once when the document changes underneath.
pub type TransactionFn =
    Arc<dyn Fn(Option<&Fields>) -> StoreResult<Fields> + Send + Sync + 'static>;

/// Options accepted by [`RemoteStore::set`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// When `true` the provided fields are merged into the existing document
    /// instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge_all() -> Self {
        Self { merge: true }
    }

    pub fn replace() -> Self {
        Self { merge: false }
    }
}

/// One `set` inside a batched commit.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchWrite {
    pub key: DocumentKey,
    pub fields: Fields,
    pub options: SetOptions,
}

/// Handle to an active snapshot subscription. Detaches on drop.
pub struct ListenerRegistration {
    cleanup: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ListenerRegistration {
    /// Creates a registration with a cleanup callback that runs once, on
    /// `detach` or on drop.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// Returns a registration that performs no cleanup work.
    pub fn noop() -> Self {
        Self { cleanup: None }
    }

    pub fn detach(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.cleanup.is_none()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Hosted per-user document database consumed by the sync layer.
///
/// Implementations own transport, retries and id generation; the sync layer only
/// relies on the contract below.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RemoteStore: Send + Sync + 'static {
    async fn get(&self, key: &DocumentKey) -> StoreResult<Option<Document>>;

    async fn set(&self, key: &DocumentKey, fields: Fields, options: SetOptions) -> StoreResult<()>;

    /// Partial update; fails with `store/not-found` when the document is absent.
    async fn update(&self, key: &DocumentKey, partial: Fields) -> StoreResult<()>;

    /// Succeeds even if the document does not exist.
    async fn delete(&self, key: &DocumentKey) -> StoreResult<()>;

    /// Stores `fields` under a generated id and returns that id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        let id = generate_auto_id();
        let key = collection.doc(&id)?;
        self.set(&key, fields, SetOptions::replace()).await?;
        Ok(id)
    }

    /// Registers `listener` for changes to `collection`. The current contents are
    /// delivered once right after registration.
    fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        listener: SnapshotListener,
    ) -> StoreResult<ListenerRegistration>;

    /// Applies every write; each entry is independent of the others.
    async fn batch_commit(&self, writes: Vec<BatchWrite>) -> StoreResult<()>;

    /// Optimistic read-modify-write of one document; returns the stored fields.
    async fn run_transaction(&self, key: &DocumentKey, update: TransactionFn) -> StoreResult<Fields>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registration_cleanup_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registration.detach();
        registration.detach();
        assert!(registration.is_detached());
        drop(registration);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_registration_detaches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _registration = ListenerRegistration::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
