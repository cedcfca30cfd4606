use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::path::CollectionPath;

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// A document as seen by the cache and the remote store.
///
/// Serializes as a flat JSON object with `id` next to the fields, which is the
/// layout persisted in local storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    #[serde(flatten)]
    fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, mut fields: Fields) -> Self {
        // `id` is carried by the document itself, never by its fields.
        fields.remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Shallow merge: every field in `partial` overwrites the existing one,
    /// fields not mentioned are kept.
    pub fn merge_fields(&mut self, partial: &Fields) {
        for (name, value) in partial {
            if name == "id" {
                continue;
            }
            self.fields.insert(name.clone(), value.clone());
        }
    }

    pub fn replace_fields(&mut self, fields: Fields) {
        *self = Document::new(self.id.clone(), fields);
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        if name != "id" {
            self.fields.insert(name.to_string(), value);
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }
}

/// Metadata about the state of a collection snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    from_cache: bool,
    has_pending_writes: bool,
}

impl SnapshotMetadata {
    pub fn new(from_cache: bool, has_pending_writes: bool) -> Self {
        Self {
            from_cache,
            has_pending_writes,
        }
    }

    /// Indicates whether the snapshot was served from the store's own cache.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Indicates whether the snapshot still contains writes the server has not
    /// acknowledged.
    pub fn has_pending_writes(&self) -> bool {
        self.has_pending_writes
    }
}

/// Push-delivered view of every document in one collection.
#[derive(Clone, Debug)]
pub struct CollectionSnapshot {
    collection: CollectionPath,
    documents: Vec<Document>,
    metadata: SnapshotMetadata,
}

impl CollectionSnapshot {
    pub fn new(
        collection: CollectionPath,
        documents: Vec<Document>,
        metadata: SnapshotMetadata,
    ) -> Self {
        Self {
            collection,
            documents,
            metadata,
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn has_pending_writes(&self) -> bool {
        self.metadata.has_pending_writes()
    }
}

/// Builds a field map from a `json!({...})` object literal; non-objects give an
/// empty map.
pub fn fields_from_value(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
