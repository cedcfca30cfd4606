use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cache::{CacheError, LocalCache};
use crate::store::error::{internal_error, invalid_argument, StoreError, StoreResult};
use crate::store::path::user_root;
use crate::store::{
    generate_auto_id, BatchWrite, CollectionPath, CollectionSnapshot, Document, DocumentKey, Fields,
    RemoteStore, SetOptions, TransactionFn,
};
use crate::sync::queue::{PendingWrite, SyncQueue, WriteKind};
use crate::sync::reconcile::{apply_local_mutation, merge_snapshot, LocalMutation, Tombstones};
use crate::sync::scheduler::{CancelToken, Scheduler, TokioScheduler};
use crate::sync::settings::SyncSettings;
use crate::util::runtime::boxed_task;

/// Outcome of a successful flush.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlushReport {
    pub committed: Vec<DocumentKey>,
    /// Queued keys with nothing to send because they were deleted or are no
    /// longer cached.
    pub skipped: Vec<DocumentKey>,
    /// Deletes that had failed earlier and reached the store in this flush.
    pub deleted: Vec<DocumentKey>,
}

/// A flush whose commit was rejected. Holds the writes that did not reach the
/// store so they can be queued again with [`SyncContext::requeue`]. Failed
/// deletes are not listed; they stay pending until a later flush sends them.
#[derive(Clone, Debug)]
pub struct FlushError {
    failed: Vec<PendingWrite>,
    source: StoreError,
}

impl FlushError {
    pub fn failed_keys(&self) -> Vec<DocumentKey> {
        self.failed.iter().map(|write| write.key.clone()).collect()
    }

    pub fn failed_writes(&self) -> &[PendingWrite] {
        &self.failed
    }

    pub fn store_error(&self) -> &StoreError {
        &self.source
    }
}

impl Display for FlushError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flush failed for {} document(s): {}",
            self.failed.len(),
            self.source
        )
    }
}

impl Error for FlushError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Snapshot of the write buffer, backing the "changes pending" indicator.
#[derive(Clone, Debug, Default)]
pub struct SyncStatus {
    pub pending: usize,
    pub in_flight: usize,
    pub tombstones: usize,
    pub last_error: Option<StoreError>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// No local change is waiting for the server. Deletes the store has not
    /// acknowledged count as pending.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }

    pub fn has_failed(&self) -> bool {
        self.last_error.is_some()
    }
}

struct CommitOutcome {
    committed: Vec<DocumentKey>,
    skipped: Vec<DocumentKey>,
    failure: Option<FlushError>,
}

struct SyncState {
    queue: SyncQueue,
    in_flight: BTreeSet<DocumentKey>,
    tombstones: Tombstones,
    timer: Option<CancelToken>,
    retry_attempt: u32,
    last_error: Option<StoreError>,
    last_synced_at: Option<DateTime<Utc>>,
}

struct SyncInner {
    uid: String,
    remote: Arc<dyn RemoteStore>,
    cache: LocalCache,
    scheduler: Arc<dyn Scheduler>,
    settings: SyncSettings,
    state: Mutex<SyncState>,
    flush_gate: async_lock::Mutex<()>,
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        let unsynced = state.queue.len() + state.tombstones.held_count();
        if unsynced > 0 {
            log::warn!(
                "dropping sync context for {} with {} unsynced document(s)",
                self.uid,
                unsynced
            );
        }
    }
}

/// Non-owning handle held by timers and listeners.
#[derive(Clone)]
pub(crate) struct WeakSyncContext {
    inner: Weak<SyncInner>,
}

impl WeakSyncContext {
    pub(crate) fn upgrade(&self) -> Option<SyncContext> {
        self.inner.upgrade().map(|inner| SyncContext { inner })
    }
}

/// Write buffer and cache coordinator for one signed-in user.
///
/// Local writes land in the cache immediately and are committed to the remote
/// store in batches once no further write arrives for the debounce window.
/// Deletes go straight to the store. Clones share the same state.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<SyncInner>,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("uid", &self.inner.uid)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl SyncContext {
    /// Context with default settings, flushing on the ambient async runtime.
    pub fn new(uid: impl Into<String>, remote: Arc<dyn RemoteStore>, cache: LocalCache) -> StoreResult<Self> {
        Self::with_options(
            uid,
            remote,
            cache,
            Arc::new(TokioScheduler::new()),
            SyncSettings::default(),
        )
    }

    pub fn with_options(
        uid: impl Into<String>,
        remote: Arc<dyn RemoteStore>,
        cache: LocalCache,
        scheduler: Arc<dyn Scheduler>,
        settings: SyncSettings,
    ) -> StoreResult<Self> {
        let uid = uid.into();
        user_root(&uid)?;
        let state = SyncState {
            queue: SyncQueue::new(),
            in_flight: BTreeSet::new(),
            tombstones: Tombstones::new(settings.tombstone_ttl()),
            timer: None,
            retry_attempt: 0,
            last_error: None,
            last_synced_at: None,
        };
        Ok(Self {
            inner: Arc::new(SyncInner {
                uid,
                remote,
                cache,
                scheduler,
                settings,
                state: Mutex::new(state),
                flush_gate: async_lock::Mutex::new(()),
            }),
        })
    }

    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    pub(crate) fn downgrade(&self) -> WeakSyncContext {
        WeakSyncContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    /// `users/{uid}/{name}`.
    pub fn collection(&self, name: &str) -> StoreResult<CollectionPath> {
        CollectionPath::for_user(&self.inner.uid, name)
    }

    /// `users/{uid}/{relative}`.
    pub fn document_key(&self, relative: &str) -> StoreResult<DocumentKey> {
        DocumentKey::for_user(&self.inner.uid, relative)
    }

    /// The profile document `users/{uid}`.
    pub fn profile_key(&self) -> StoreResult<DocumentKey> {
        DocumentKey::from_path(user_root(&self.inner.uid)?)
    }

    /// Creates a document under a freshly generated id and returns the id. The
    /// document is readable from the cache right away.
    pub fn add_document(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let collection = self.collection(collection)?;
        let id = generate_auto_id();
        let key = collection.doc(&id)?;
        self.buffer_write(key, WriteKind::Set, fields)?;
        Ok(id)
    }

    /// Replaces the document at `path` (relative to the user root).
    pub fn set_document(&self, path: &str, fields: Fields) -> StoreResult<()> {
        let key = self.document_key(path)?;
        self.buffer_write(key, WriteKind::Set, fields)
    }

    /// Shallow-merges `partial` into the document at `path`.
    pub fn update_document(&self, path: &str, partial: Fields) -> StoreResult<()> {
        let key = self.document_key(path)?;
        self.buffer_write(key, WriteKind::Merge, partial)
    }

    /// Sets a single field, e.g. `completed`.
    pub fn tweak_field(&self, path: &str, field: &str, value: Value) -> StoreResult<()> {
        if field.is_empty() || field == "id" {
            return Err(invalid_argument(format!("Cannot tweak field `{field}`")));
        }
        let mut partial = Fields::new();
        partial.insert(field.to_string(), value);
        self.update_document(path, partial)
    }

    /// Deletes the document locally and remotely without buffering. Returns
    /// whether the store acknowledged the delete. The local removal stands either
    /// way; a failed remote delete stays pending and is retried with backoff.
    pub async fn delete_document(&self, path: &str) -> StoreResult<bool> {
        let key = self.document_key(path)?;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.queue.remove(&key);
            state.tombstones.hold(key.clone(), Utc::now());
            if let Err(err) = apply_local_mutation(&self.inner.cache, &key, LocalMutation::Delete) {
                log::warn!("failed to remove {key} from the cache: {err}");
            }
        }

        match self.inner.remote.delete(&key).await {
            Ok(()) => {
                self.inner.state.lock().unwrap().tombstones.release(&key, Utc::now());
                Ok(true)
            }
            Err(err) => {
                log::warn!("deleting {key} failed, will retry: {err}");
                {
                    let mut state = self.inner.state.lock().unwrap();
                    state.last_error = Some(err);
                    state.retry_attempt = state.retry_attempt.saturating_add(1);
                }
                self.schedule_flush(self.retry_delay());
                Ok(false)
            }
        }
    }

    /// Server copy of the document overlaid with local changes. `None` when the
    /// document is deleted or exists nowhere. Falls back to the cache when the
    /// store cannot be reached.
    pub async fn read_document(&self, path: &str) -> StoreResult<Option<Document>> {
        let key = self.document_key(path)?;
        if self.is_deleted(&key) {
            return Ok(None);
        }
        let cached = self.inner.cache.get(&key.collection(), key.id());

        let document = match self.inner.remote.get(&key).await {
            Ok(Some(mut server)) => {
                if let Some(local) = &cached {
                    server.merge_fields(local.fields());
                }
                Some(server)
            }
            Ok(None) => {
                if cached.is_none() {
                    log::debug!("document {key} does not exist");
                }
                cached
            }
            Err(err) => {
                log::warn!("reading {key} failed, using cached copy: {err}");
                cached
            }
        };

        if self.is_deleted(&key) {
            return Ok(None);
        }
        Ok(document)
    }

    /// Cached documents of `collection`, minus recent deletes.
    pub fn cached_documents(&self, collection: &CollectionPath) -> Vec<Document> {
        let now = Utc::now();
        let state = self.inner.state.lock().unwrap();
        self.inner
            .cache
            .load(collection)
            .into_iter()
            .filter(|document| !is_tombstoned(&state.tombstones, collection, document.id(), now))
            .collect()
    }

    /// Commits every queued document now. Failed writes are returned, not
    /// queued again; pass the error to [`SyncContext::requeue`] to retry them.
    pub async fn flush(&self) -> Result<FlushReport, FlushError> {
        self.flush_inner(false).await
    }

    /// Queues the writes of a failed flush again and schedules a retry with
    /// backoff. Keys written since the flush started keep their newer entry.
    pub fn requeue(&self, error: &FlushError) {
        {
            let mut guard = self.inner.state.lock().unwrap();
            let state = &mut *guard;
            requeue_live(state, error.failed.iter().cloned());
        }
        self.schedule_flush(self.retry_delay());
    }

    /// Cancels the debounce timer and flushes immediately. Returns `false` when
    /// the commit failed; the writes are then queued for a retry.
    pub async fn force_sync_all(&self) -> bool {
        self.cancel_timer();
        match self.flush_inner(true).await {
            Ok(report) => {
                log::debug!("forced sync committed {} document(s)", report.committed.len());
                true
            }
            Err(err) => {
                log::warn!("forced sync failed: {err}");
                self.schedule_flush(self.retry_delay());
                false
            }
        }
    }

    /// Read-modify-write of one document on the server. The cache is not
    /// consulted. Returns `false` on conflict, missing data or transport errors.
    pub async fn run_transaction(&self, key: &DocumentKey, update: TransactionFn) -> bool {
        match self.inner.remote.run_transaction(key, update).await {
            Ok(_) => true,
            Err(err) => {
                log::warn!("transaction on {key} failed: {err}");
                false
            }
        }
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.inner.state.lock().unwrap();
        SyncStatus {
            pending: state.queue.len() + state.tombstones.held_count(),
            in_flight: state.in_flight.len(),
            tombstones: state.tombstones.len(),
            last_error: state.last_error.clone(),
            last_synced_at: state.last_synced_at,
        }
    }

    /// Folds a server snapshot into the cache and returns the merged view.
    ///
    /// Confirmed snapshots (no pending writes) also drop cached documents that
    /// have no queued or in-flight write, so the server copy becomes
    /// authoritative again.
    pub(crate) fn reconcile_snapshot(&self, snapshot: CollectionSnapshot) -> Vec<Document> {
        let collection = snapshot.collection().clone();
        let confirmed = !snapshot.has_pending_writes();
        let server = snapshot.into_documents();
        let now = Utc::now();

        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        state.tombstones.expire(now);

        let cached = self.inner.cache.load(&collection);
        let tombstones = &state.tombstones;
        let merged = merge_snapshot(&server, &cached, |id| {
            is_tombstoned(tombstones, &collection, id, now)
        });
        if let Err(err) = self.inner.cache.save(&collection, &merged) {
            log::warn!("failed to cache snapshot of {collection}: {err}");
        }

        if confirmed {
            let present: BTreeSet<String> = server.iter().map(|document| document.id().to_string()).collect();
            state
                .tombstones
                .confirm_absent(&collection, &present, &state.in_flight);

            let dirty: BTreeSet<String> = state
                .queue
                .keys_in(&collection)
                .chain(state.in_flight.iter().filter(|key| key.collection() == collection))
                .map(|key| key.id().to_string())
                .collect();
            if let Err(err) = self
                .inner
                .cache
                .retain(&collection, |document| dirty.contains(document.id()))
            {
                log::warn!("failed to purge cache of {collection}: {err}");
            }
        }

        merged
    }

    fn buffer_write(&self, key: DocumentKey, kind: WriteKind, fields: Fields) -> StoreResult<()> {
        let now = Utc::now();
        {
            let mut state = self.inner.state.lock().unwrap();
            if kind == WriteKind::Merge && state.tombstones.is_live(&key, now) {
                log::debug!("ignoring update of deleted document {key}");
                return Ok(());
            }
            state.tombstones.clear(&key);
            let mutation = match kind {
                WriteKind::Set => LocalMutation::Replace(fields),
                WriteKind::Merge => LocalMutation::Merge(fields),
            };
            apply_local_mutation(&self.inner.cache, &key, mutation).map_err(cache_failure)?;
            state.queue.enqueue(key, kind, now);
        }
        self.schedule_flush(self.inner.settings.debounce());
        Ok(())
    }

    /// Restarts the flush timer. Any previously scheduled flush is cancelled.
    fn schedule_flush(&self, delay: Duration) {
        let weak = self.downgrade();
        let token = self.inner.scheduler.schedule(
            delay,
            Box::new(move || {
                boxed_task(async move {
                    if let Some(context) = weak.upgrade() {
                        context.run_scheduled_flush().await;
                    }
                })
            }),
        );
        let previous = self.inner.state.lock().unwrap().timer.replace(token);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn cancel_timer(&self) {
        let timer = self.inner.state.lock().unwrap().timer.take();
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    fn retry_delay(&self) -> Duration {
        let attempt = self.inner.state.lock().unwrap().retry_attempt;
        self.inner.settings.retry().delay(attempt.saturating_sub(1))
    }

    async fn run_scheduled_flush(&self) {
        match self.flush_inner(true).await {
            Ok(report) => {
                if !report.committed.is_empty() {
                    log::debug!("flushed {} document(s)", report.committed.len());
                }
            }
            Err(err) => {
                let delay = self.retry_delay();
                log::warn!("{err}; retrying in {delay:?}");
                self.schedule_flush(delay);
            }
        }
    }

    async fn flush_inner(&self, requeue_failures: bool) -> Result<FlushReport, FlushError> {
        let _gate = self.inner.flush_gate.lock().await;
        let deletes = self.inner.state.lock().unwrap().tombstones.held();
        let pending = self.take_pending();
        if deletes.is_empty() && pending.is_empty() {
            return Ok(FlushReport::default());
        }

        let keys: Vec<DocumentKey> = pending.iter().map(|write| write.key.clone()).collect();
        let (deleted, delete_error) = self.retry_deletes(deletes).await;
        let outcome = self.commit_pending(pending).await;
        let redelete_error = self.delete_resurrected(&outcome.committed).await;

        let failure = outcome.failure.or_else(|| {
            delete_error.or(redelete_error).map(|source| FlushError {
                failed: Vec::new(),
                source,
            })
        });
        self.finish_flush(&keys, failure.as_ref(), requeue_failures);

        match failure {
            Some(error) => Err(error),
            None => Ok(FlushReport {
                committed: outcome.committed,
                skipped: outcome.skipped,
                deleted,
            }),
        }
    }

    /// Empties the queue and marks its keys as in flight.
    fn take_pending(&self) -> Vec<PendingWrite> {
        let mut state = self.inner.state.lock().unwrap();
        let pending = state.queue.take_all();
        for write in &pending {
            state.in_flight.insert(write.key.clone());
        }
        pending
    }

    /// Sends deletes that failed before. A key stays held until its delete
    /// succeeds or the document is written again.
    async fn retry_deletes(&self, keys: Vec<DocumentKey>) -> (Vec<DocumentKey>, Option<StoreError>) {
        let mut deleted = Vec::new();
        let mut error = None;
        for key in keys {
            match self.inner.remote.delete(&key).await {
                Ok(()) => {
                    let released = self.inner.state.lock().unwrap().tombstones.release(&key, Utc::now());
                    if released {
                        deleted.push(key);
                    }
                }
                Err(err) => {
                    log::warn!("retrying delete of {key} failed: {err}");
                    error.get_or_insert(err);
                }
            }
        }
        (deleted, error)
    }

    async fn commit_pending(&self, pending: Vec<PendingWrite>) -> CommitOutcome {
        let (writes, skipped) = self.prepare_batch(pending);
        let batch_size = self.inner.settings.max_batch_writes();

        let mut committed = Vec::with_capacity(writes.len());
        let mut failure = None;
        let mut start = 0;
        while start < writes.len() {
            let end = (start + batch_size).min(writes.len());
            let batch: Vec<BatchWrite> = writes[start..end].iter().map(|(_, batch)| batch.clone()).collect();
            if let Err(source) = self.inner.remote.batch_commit(batch).await {
                failure = Some(FlushError {
                    failed: writes[start..].iter().map(|(write, _)| write.clone()).collect(),
                    source,
                });
                break;
            }
            committed.extend(writes[start..end].iter().map(|(write, _)| write.key.clone()));
            start = end;
        }

        CommitOutcome {
            committed,
            skipped,
            failure,
        }
    }

    /// Pairs each pending write with the batch entry built from the latest cached
    /// data. Deleted and uncached documents are skipped.
    fn prepare_batch(&self, pending: Vec<PendingWrite>) -> (Vec<(PendingWrite, BatchWrite)>, Vec<DocumentKey>) {
        let now = Utc::now();
        let state = self.inner.state.lock().unwrap();
        let mut writes = Vec::with_capacity(pending.len());
        let mut skipped = Vec::new();

        for write in pending {
            if state.tombstones.is_live(&write.key, now) {
                log::debug!("skipping deleted document {}", write.key);
                skipped.push(write.key);
                continue;
            }
            match self.inner.cache.get(&write.key.collection(), write.key.id()) {
                Some(document) => {
                    let batch = BatchWrite {
                        key: write.key.clone(),
                        fields: document.into_fields(),
                        options: SetOptions {
                            merge: write.kind == WriteKind::Merge,
                        },
                    };
                    writes.push((write, batch));
                }
                None => {
                    log::debug!("skipping {} with no cached data", write.key);
                    skipped.push(write.key);
                }
            }
        }

        (writes, skipped)
    }

    /// Deletes again any committed document that was deleted locally while the
    /// commit was in flight. Failed re-deletes are held for the next flush.
    async fn delete_resurrected(&self, committed: &[DocumentKey]) -> Option<StoreError> {
        let resurrected: Vec<DocumentKey> = {
            let now = Utc::now();
            let state = self.inner.state.lock().unwrap();
            committed
                .iter()
                .filter(|key| state.tombstones.is_live(key, now))
                .cloned()
                .collect()
        };

        let mut error = None;
        for key in resurrected {
            log::debug!("re-deleting {key} written by a concurrent flush");
            if let Err(err) = self.inner.remote.delete(&key).await {
                log::warn!("failed to re-delete {key}: {err}");
                let now = Utc::now();
                let mut state = self.inner.state.lock().unwrap();
                if state.tombstones.is_live(&key, now) {
                    state.tombstones.hold(key, now);
                }
                error.get_or_insert(err);
            }
        }
        error
    }

    fn finish_flush(&self, keys: &[DocumentKey], failure: Option<&FlushError>, requeue_failures: bool) {
        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        for key in keys {
            state.in_flight.remove(key);
        }

        match failure {
            Some(error) => {
                state.last_error = Some(error.source.clone());
                state.retry_attempt = state.retry_attempt.saturating_add(1);
                if requeue_failures {
                    requeue_live(state, error.failed.iter().cloned());
                }
            }
            None => {
                state.last_error = None;
                state.last_synced_at = Some(Utc::now());
                state.retry_attempt = 0;
            }
        }
    }

    fn is_deleted(&self, key: &DocumentKey) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .tombstones
            .is_live(key, Utc::now())
    }
}

fn requeue_live(state: &mut SyncState, writes: impl IntoIterator<Item = PendingWrite>) {
    let now = Utc::now();
    let tombstones = &state.tombstones;
    let live: Vec<PendingWrite> = writes
        .into_iter()
        .filter(|write| !tombstones.is_live(&write.key, now))
        .collect();
    state.queue.requeue(live);
}

fn is_tombstoned(tombstones: &Tombstones, collection: &CollectionPath, id: &str, now: DateTime<Utc>) -> bool {
    collection
        .doc(id)
        .map(|key| tombstones.is_live(&key, now))
        .unwrap_or(false)
}

fn cache_failure(err: CacheError) -> StoreError {
    internal_error(format!("Local cache write failed: {err}"))
}
