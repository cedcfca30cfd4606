//! Offline-first data layer of the Questlog productivity game.
//!
//! Quests, stages and daily quests live in a hosted per-user document store.
//! This crate keeps a durable local cache in front of it so the UI reads and
//! writes instantly, buffers edits and commits them in debounced batches, and
//! merges live server snapshots with local changes.
//!
//! - [`store`]: the remote store contract, document paths and an in-memory store.
//! - [`cache`]: the local cache over pluggable key/value storage.
//! - [`sync`]: the write buffer, snapshot reconciliation and live subscriptions.
//! - [`game`]: reward formulas, the level curve, records and quest filters.
//! - [`util`]: observers, retry backoff and runtime helpers.
//!
//! ```
//! use std::sync::Arc;
//!
//! use questlog::cache::LocalCache;
//! use questlog::game::{Quest, Record, QUESTS_COLLECTION};
//! use questlog::store::InMemoryRemoteStore;
//! use questlog::sync::SyncContext;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Arc::new(InMemoryRemoteStore::new());
//! let context = SyncContext::new("player-1", remote, LocalCache::in_memory())?;
//!
//! let quest = Quest::draft("Run 5k", 3)?;
//! let id = context.add_document(QUESTS_COLLECTION, quest.to_fields()?)?;
//!
//! let quests = context.collection(QUESTS_COLLECTION)?;
//! assert_eq!(context.cached_documents(&quests)[0].id(), id);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod game;
pub mod store;
pub mod sync;
pub mod util;
