use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::persistence::error::{quota_exceeded, StorageResult};
use crate::persistence::KeyValueStorage;

/// Process-local storage. An optional byte quota (keys + values) emulates a full browser store.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn used_bytes(entries: &HashMap<String, String>, skip: &str) -> usize {
        entries
            .iter()
            .filter(|(key, _)| key.as_str() != skip)
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota_bytes {
            let required = Self::used_bytes(&entries, key) + key.len() + value.len();
            if required > quota {
                return Err(quota_exceeded(format!(
                    "writing '{key}' needs {required} bytes, quota is {quota}"
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
