//! Validated JSON codecs over the setting store
//!
//! Nothing read from the store is trusted: a value that fails to parse into the
//! expected shape is reported, the key is reset, and the caller gets the empty
//! default.

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::SettingStore;
use crate::error::ErrorReporter;

/// Load a `{ [screenId]: T }` map
pub fn load_map<T: DeserializeOwned>(
    store: &dyn SettingStore,
    errors: &dyn ErrorReporter,
    key: &str,
) -> BTreeMap<String, T> {
    let Some(raw) = store.get_setting(key) else {
        return BTreeMap::new();
    };
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }
    match serde_json::from_str::<BTreeMap<String, T>>(&raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(key = %key, error = %e, "Invalid setting map, resetting");
            store.set_setting(key, Some("{}"));
            errors.report(&anyhow!(e).context(format!("Invalid data in setting '{key}'")));
            BTreeMap::new()
        }
    }
}

/// Load one entry of a `{ [screenId]: T }` map
pub fn load_map_entry<T: DeserializeOwned>(
    store: &dyn SettingStore,
    errors: &dyn ErrorReporter,
    key: &str,
    screen_id: u32,
) -> Option<T> {
    load_map::<T>(store, errors, key).remove(&screen_id.to_string())
}

/// Insert or remove (`None`) one entry of a `{ [screenId]: T }` map
pub fn save_map_entry<T: Serialize>(
    store: &dyn SettingStore,
    errors: &dyn ErrorReporter,
    key: &str,
    screen_id: u32,
    value: Option<&T>,
) {
    let mut map = store
        .get_setting(key)
        .and_then(|raw| serde_json::from_str::<Map<String, Value>>(&raw).ok())
        .unwrap_or_default();
    let entry_key = screen_id.to_string();
    match value {
        Some(value) => match serde_json::to_value(value) {
            Ok(json) => {
                map.insert(entry_key, json);
            }
            Err(e) => {
                errors.report(&anyhow!(e).context(format!(
                    "Failed to serialize entry {screen_id} of setting '{key}'"
                )));
                return;
            }
        },
        None => {
            map.remove(&entry_key);
        }
    }
    match serde_json::to_string(&map) {
        Ok(raw) => {
            debug!(key = %key, screen_id, entries = map.len(), "Persisted setting map");
            store.set_setting(key, Some(&raw));
        }
        Err(e) => errors.report(&anyhow!(e).context(format!("Failed to write setting '{key}'"))),
    }
}

/// Load a whole-key JSON value
pub fn load_json<T: DeserializeOwned>(
    store: &dyn SettingStore,
    errors: &dyn ErrorReporter,
    key: &str,
) -> Option<T> {
    let raw = store.get_setting(key)?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<T>(&raw).with_context(|| format!("Invalid data in setting '{key}'")) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, "Invalid setting value, resetting");
            store.set_setting(key, None);
            errors.report(&e);
            None
        }
    }
}

/// Store a whole-key JSON value, `None` removes the key
pub fn save_json<T: Serialize>(
    store: &dyn SettingStore,
    errors: &dyn ErrorReporter,
    key: &str,
    value: Option<&T>,
) {
    let Some(value) = value else {
        store.set_setting(key, None);
        return;
    };
    match serde_json::to_string(value) {
        Ok(raw) => store.set_setting(key, Some(&raw)),
        Err(e) => errors.report(&anyhow!(e).context(format!("Failed to write setting '{key}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorReporter;
    use crate::settings::MemorySettingStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        text: String,
    }

    #[test]
    fn test_load_map_missing_key_is_empty() {
        let store = MemorySettingStore::new();
        let errors = CollectingErrorReporter::new();
        let map = load_map::<Entry>(&store, &errors, "k");
        assert!(map.is_empty());
        assert!(errors.messages().is_empty());
    }

    #[test]
    fn test_load_map_malformed_resets_and_reports() {
        let store = MemorySettingStore::new();
        let errors = CollectingErrorReporter::new();
        store.set_setting("k", Some("{not json"));

        let map = load_map::<Entry>(&store, &errors, "k");
        assert!(map.is_empty());
        assert_eq!(store.get_setting("k").as_deref(), Some("{}"));
        assert_eq!(errors.messages().len(), 1);
    }

    #[test]
    fn test_load_map_shape_mismatch_resets() {
        let store = MemorySettingStore::new();
        let errors = CollectingErrorReporter::new();
        store.set_setting("k", Some(r#"{"0":{"wrong":1}}"#));

        assert!(load_map::<Entry>(&store, &errors, "k").is_empty());
        assert_eq!(store.get_setting("k").as_deref(), Some("{}"));
    }

    #[test]
    fn test_save_map_entry_none_removes_key_entirely() {
        let store = MemorySettingStore::new();
        let errors = CollectingErrorReporter::new();
        let entry = Entry { text: "hi".to_string() };
        save_map_entry(&store, &errors, "k", 0, Some(&entry));
        save_map_entry(&store, &errors, "k", 1, Some(&entry));
        save_map_entry(&store, &errors, "k", 0, None::<&Entry>);

        let raw: Map<String, Value> = serde_json::from_str(&store.get_setting("k").unwrap()).unwrap();
        assert!(!raw.contains_key("0"));
        assert!(raw.contains_key("1"));
        assert_eq!(load_map_entry::<Entry>(&store, &errors, "k", 1), Some(entry));
    }

    #[test]
    fn test_save_map_entry_recovers_from_corrupt_map() {
        let store = MemorySettingStore::new();
        let errors = CollectingErrorReporter::new();
        store.set_setting("k", Some("[1,2"));
        let entry = Entry { text: "x".to_string() };
        save_map_entry(&store, &errors, "k", 4, Some(&entry));

        assert_eq!(load_map_entry::<Entry>(&store, &errors, "k", 4), Some(entry));
    }

    #[test]
    fn test_load_json_malformed_removes_key() {
        let store = MemorySettingStore::new();
        let errors = CollectingErrorReporter::new();
        store.set_setting("style", Some("not-json"));

        assert_eq!(load_json::<Entry>(&store, &errors, "style"), None);
        assert_eq!(store.get_setting("style"), None);
        assert_eq!(errors.messages().len(), 1);
    }
}
