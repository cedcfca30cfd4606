//! Contract of the hosted document store and the types exchanged with it.
//!
//! The store itself is an external collaborator; [`InMemoryRemoteStore`] is a
//! process-local stand-in used by tests and offline demos.

pub mod document;
pub mod error;
pub mod in_memory;
pub mod path;
pub mod remote;

pub use document::{fields_from_value, CollectionSnapshot, Document, Fields, SnapshotMetadata};
pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use in_memory::{InMemoryRemoteStore, StoreOperation};
pub use path::{generate_auto_id, CollectionPath, DocumentKey, ResourcePath};
pub use remote::{
    BatchWrite, ListenerRegistration, RemoteStore, SetOptions, SnapshotListener, TransactionFn,
    MAX_BATCH_WRITES,
};
