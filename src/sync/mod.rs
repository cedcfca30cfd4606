//! Offline-first write buffer over the remote store.
//!
//! [`SyncContext`] applies every edit to the local cache first, queues the
//! document key and commits all queued documents in one batch once writes stop
//! for the debounce window. Server snapshots are merged with the cache so local
//! edits are never hidden by stale server data, and deletes are remembered long
//! enough that neither stale snapshots nor stale flushes can revive them.

mod context;
mod listener;
pub mod queue;
pub mod reconcile;
pub mod scheduler;
pub mod settings;

pub use context::{FlushError, FlushReport, SyncContext, SyncStatus};
pub use listener::{CollectionPair, CollectionPairSubscription, CollectionSubscription, SubscriptionState};
pub use queue::{PendingWrite, SyncQueue, WriteKind};
pub use reconcile::{apply_local_mutation, merge_snapshot, LocalMutation, Tombstones};
pub use scheduler::{CancelToken, ManualScheduler, ScheduledTask, Scheduler, TokioScheduler};
pub use settings::{SyncSettings, DEFAULT_DEBOUNCE_MILLIS, DEFAULT_TOMBSTONE_TTL_MILLIS};
