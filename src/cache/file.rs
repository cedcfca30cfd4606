use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{percent_decode_str, percent_encode, NON_ALPHANUMERIC};

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::storage::KeyValueStorage;

const FILE_EXTENSION: &str = "json";

/// Directory-backed storage: one file per key, named after the percent-encoded key.
#[derive(Clone, Debug)]
pub struct FileStorage {
    base_dir: Arc<PathBuf>,
}

impl FileStorage {
    pub fn new(base_dir: impl AsRef<Path>) -> CacheResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).map_err(|err| {
            CacheError::Unavailable(format!(
                "Failed to create cache directory '{}': {}",
                base_dir.display(),
                err
            ))
        })?;
        Ok(Self {
            base_dir: Arc::new(base_dir),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let encoded = percent_encode(key.as_bytes(), NON_ALPHANUMERIC).to_string();
        self.base_dir.join(format!("{encoded}.{FILE_EXTENSION}"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        match fs::read_to_string(self.file_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CacheError::Io(format!("Failed to read cache entry '{key}': {err}"))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        let path = self.file_for(key);
        let staging = path.with_extension("tmp");
        fs::write(&staging, value)
            .and_then(|_| fs::rename(&staging, &path))
            .map_err(|err| CacheError::Io(format!("Failed to write cache entry '{key}': {err}")))
    }

    fn remove_item(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.file_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::Io(format!("Failed to remove cache entry '{key}': {err}"))),
        }
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let entries = fs::read_dir(&*self.base_dir)
            .map_err(|err| CacheError::Io(format!("Failed to list cache directory: {err}")))?;
        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(key) = percent_decode_str(stem).decode_utf8() {
                keys.push(key.into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
