use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::cache::error::CacheResult;

/// String key/value store with the semantics of browser `localStorage`.
///
/// Implementations must make every write visible to the next read on the same
/// instance; durability across restarts depends on the backend.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> CacheResult<()>;
    fn remove_item(&self, key: &str) -> CacheResult<()>;
    fn keys(&self) -> CacheResult<Vec<String>>;
}

/// Volatile storage, shared between clones.
#[derive(Clone, Default, Debug)]
pub struct InMemoryStorage {
    items: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.items.lock().unwrap().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> CacheResult<()> {
        self.items.lock().unwrap().remove(key);
        Ok(())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.items.lock().unwrap().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_items() {
        let storage = InMemoryStorage::new();
        let other = storage.clone();
        storage.set_item("a", "1").unwrap();
        assert_eq!(other.get_item("a").unwrap(), Some("1".to_string()));
        other.remove_item("a").unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }
}
