//! Setting store contract
//!
//! Key/value string persistence with synchronous reads and writes. Structured
//! payloads are JSON strings; absence is a missing key, never `"null"`.

pub mod codec;
mod file_store;
mod lock;

pub use file_store::JsonFileSettingStore;
pub use lock::KeyedLock;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait SettingStore: Send + Sync {
    fn get_setting(&self, key: &str) -> Option<String>;

    /// `None` removes the key
    fn set_setting(&self, key: &str, value: Option<&str>);
}

pub type SharedSettingStore = Arc<dyn SettingStore>;

#[derive(Debug, Default)]
pub struct MemorySettingStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .lock()
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl SettingStore for MemorySettingStore {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set_setting(&self, key: &str, value: Option<&str>) {
        if let Ok(mut values) = self.values.lock() {
            match value {
                Some(value) => {
                    values.insert(key.to_string(), value.to_string());
                }
                None => {
                    values.remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_remove_on_none() {
        let store = MemorySettingStore::new();
        store.set_setting("a", Some("1"));
        assert_eq!(store.get_setting("a").as_deref(), Some("1"));

        store.set_setting("a", None);
        assert_eq!(store.get_setting("a"), None);
        assert!(store.keys().is_empty());
    }
}
