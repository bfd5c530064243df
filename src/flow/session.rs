//! Session storage for flow state
//!
//! The store is a collaborator: the host application decides where session
//! data lives. Values are JSON so state written by one process can be read
//! by another.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key/value session storage
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value);

    fn forget(&self, key: &str);

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Process-local store, mainly for tests and the CLI
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: Value) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    fn forget(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Value) {
        (**self).put(key, value)
    }

    fn forget(&self, key: &str) {
        (**self).forget(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_forget() {
        let store = InMemorySessionStore::new();
        assert!(!store.has("a"));
        store.put("a", json!({"x": 1}));
        assert_eq!(store.get("a"), Some(json!({"x": 1})));
        store.forget("a");
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_through_arc() {
        let store = std::sync::Arc::new(InMemorySessionStore::new());
        let handle = std::sync::Arc::clone(&store);
        handle.put("k", json!(1));
        assert!(store.has("k"));
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}
