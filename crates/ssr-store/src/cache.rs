//! In-memory data cache shared between server render and client hydration.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::StoreError;

/// Key/value cache mapping a cache key to fetched data.
///
/// Clones share the same entries. On the server one cache lives for one
/// render and is reset after serialization; on the client it is seeded once
/// from injected state and lives for the page session.
#[derive(Debug, Clone, Default)]
pub struct DataCache {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl DataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the value stored under `key`, or `None` for an unknown key.
    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.entries().get(key).cloned()
    }

    /// Store `value` under `key`.
    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.entries().insert(key.into(), value);
    }

    /// Get a typed value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_data(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store a typed value.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set_data(key, value);
        Ok(())
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Copy of all entries, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Serialize all entries as a JSON object safe to embed in a `<script>`.
    pub fn serialize_state(&self) -> Result<String, StoreError> {
        let json = serde_json::to_string(&self.snapshot())?;
        Ok(escape_for_script(&json))
    }

    /// Seed the cache from serialized state, merging over existing entries.
    ///
    /// Returns the number of entries read.
    pub fn hydrate(&self, state: &str) -> Result<usize, StoreError> {
        let value: Value = serde_json::from_str(state)?;
        self.hydrate_value(value)
    }

    /// Seed the cache from an already-parsed state object.
    pub fn hydrate_value(&self, state: Value) -> Result<usize, StoreError> {
        let Value::Object(map) = state else {
            return Err(StoreError::InvalidState(format!(
                "expected an object, got {}",
                state
            )));
        };
        let count = map.len();
        self.entries().extend(map);
        Ok(count)
    }

    /// Remove every entry.
    pub fn reset(&self) {
        self.entries().clear();
    }
}

/// Escape characters that could end a `<script>` block or break JS parsing.
///
/// They only occur inside JSON strings, so `\uXXXX` escapes keep the text
/// valid JSON.
fn escape_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    // === Get/Set Tests ===

    #[test]
    fn test_set_then_get_round_trip() {
        let cache = DataCache::new();
        cache.set_data("user", json!({"name": "ada"}));
        assert_eq!(cache.get_data("user"), Some(json!({"name": "ada"})));
    }

    #[test]
    fn test_unknown_key_is_none() {
        let cache = DataCache::new();
        assert_eq!(cache.get_data("missing"), None);
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn test_typed_get_set() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Ip {
            ip: String,
        }

        let cache = DataCache::new();
        cache
            .set("ip", &Ip {
                ip: "10.0.0.1".to_string(),
            })
            .unwrap();

        let ip: Option<Ip> = cache.get("ip").unwrap();
        assert_eq!(ip.unwrap().ip, "10.0.0.1");
        assert!(cache.get::<Ip>("none").unwrap().is_none());
    }

    #[test]
    fn test_typed_get_wrong_shape_errors() {
        let cache = DataCache::new();
        cache.set_data("n", json!("text"));
        assert!(cache.get::<u32>("n").is_err());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = DataCache::new();
        let other = cache.clone();
        other.set_data("k", json!(1));
        assert_eq!(cache.len(), 1);
    }

    // === State Tests ===

    #[test]
    fn test_serialize_state_is_object_of_entries() {
        let cache = DataCache::new();
        cache.set_data("b", json!(2));
        cache.set_data("a", json!(1));

        assert_eq!(cache.serialize_state().unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_serialize_state_escapes_script_breakers() {
        let cache = DataCache::new();
        cache.set_data("html", json!("</script><b>&\u{2028}"));

        let state = cache.serialize_state().unwrap();
        assert!(!state.contains("</script>"));
        assert!(!state.contains('&'));
        assert!(!state.contains('\u{2028}'));

        let parsed: Value = serde_json::from_str(&state).unwrap();
        assert_eq!(parsed["html"], json!("</script><b>&\u{2028}"));
    }

    #[test]
    fn test_hydrate_seeds_entries() {
        let cache = DataCache::new();
        cache.set_data("keep", json!(true));

        let count = cache.hydrate(r#"{"ip":{"ip":"1.1.1.1"}}"#).unwrap();
        assert_eq!(count, 1);
        assert_eq!(cache.get_data("ip"), Some(json!({"ip": "1.1.1.1"})));
        assert_eq!(cache.get_data("keep"), Some(json!(true)));
    }

    #[test]
    fn test_hydrate_rejects_non_object() {
        let cache = DataCache::new();
        assert!(matches!(
            cache.hydrate("[1,2]"),
            Err(StoreError::InvalidState(_))
        ));
        assert!(cache.hydrate("not json").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reset_clears() {
        let cache = DataCache::new();
        cache.set_data("a", json!(1));
        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(cache.serialize_state().unwrap(), "{}");
    }
}
