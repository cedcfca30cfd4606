use wasm_bindgen::JsValue;
use web_sys::{Storage, Window};

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::storage::KeyValueStorage;

/// `window.localStorage` backend used by browser builds.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebLocalStorage;

impl WebLocalStorage {
    pub fn new() -> Self {
        Self
    }

    fn storage() -> CacheResult<Storage> {
        let window: Window = web_sys::window()
            .ok_or_else(|| CacheError::Unavailable("window object is not available in this environment".into()))?;
        window
            .local_storage()
            .map_err(map_js_error)?
            .ok_or_else(|| CacheError::Unavailable("localStorage is unavailable".into()))
    }
}

impl KeyValueStorage for WebLocalStorage {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        Self::storage()?.get_item(key).map_err(map_js_error)
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        Self::storage()?.set_item(key, value).map_err(map_js_error)
    }

    fn remove_item(&self, key: &str) -> CacheResult<()> {
        Self::storage()?.remove_item(key).map_err(map_js_error)
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let storage = Self::storage()?;
        let length = storage.length().map_err(map_js_error)?;
        let mut keys = Vec::with_capacity(length as usize);
        for index in 0..length {
            if let Some(key) = storage.key(index).map_err(map_js_error)? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

fn map_js_error(err: JsValue) -> CacheError {
    CacheError::Io(format!("Web storage error: {}", stringify_js_error(err)))
}

fn stringify_js_error(err: JsValue) -> String {
    if let Some(string) = err.as_string() {
        return string;
    }

    if let Ok(stringified) = js_sys::JSON::stringify(&err) {
        if let Some(text) = stringified.as_string() {
            return text;
        }
    }

    "unknown JavaScript error".to_string()
}
