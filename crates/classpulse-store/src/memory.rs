use std::collections::BTreeMap;
use std::sync::Mutex;

use classpulse_core::PulseError;
use serde_json::Value;

use crate::{validate_key, SnapshotStore};

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>, PulseError> {
        self.entries
            .lock()
            .map_err(|_| PulseError::Store("memory store lock poisoned".into()))
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, key: &str, value: &Value) -> Result<(), PulseError> {
        validate_key(key)?;
        self.entries()?.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Value>, PulseError> {
        validate_key(key)?;
        Ok(self.entries()?.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>, PulseError> {
        Ok(self.entries()?.keys().cloned().collect())
    }
}
