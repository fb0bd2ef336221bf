use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::{KeyValueStore, StoreError};

/// In-process store with an optional byte quota (keys plus values), the way
/// browser storage enforces one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock();
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("resume", "{}").await.unwrap();
        assert_eq!(store.get("resume").await.unwrap().as_deref(), Some("{}"));
        store.remove("resume").await.unwrap();
        store.remove("resume").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_quota_rejects_and_keeps_previous_value() {
        let store = MemoryStore::with_quota(16);
        store.set("k", "small").await.unwrap();
        let err = store.set("k", "a value that is far too large").await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("small"));
    }

    #[tokio::test]
    async fn test_quota_ignores_the_value_being_replaced() {
        let store = MemoryStore::with_quota(12);
        store.set("k", "0123456789").await.unwrap();
        store.set("k", "9876543210").await.unwrap();
    }
}
