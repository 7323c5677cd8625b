//! Snapshot persistence for pipeline stages.
//!
//! A [`SnapshotStore`] maps stage keys such as `local.25spring` to schema-less
//! JSON values. [`JsonFileStore`] keeps one file per key in a directory and
//! replaces files atomically; [`MemoryStore`] is the in-process variant used
//! by tests and dry runs.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use classpulse_core::PulseError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Key-value persistence of stage outputs.
pub trait SnapshotStore: Send + Sync {
    /// Replace the value under `key`. Readers see either the old or the new
    /// value, never a mix.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Store`] for an invalid key or a failed write.
    fn save(&self, key: &str, value: &Value) -> Result<(), PulseError>;

    /// Value under `key`, or `None` if nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Store`] for an invalid key or unreadable data.
    fn load(&self, key: &str) -> Result<Option<Value>, PulseError>;

    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>, PulseError>;
}

/// Typed helpers over any [`SnapshotStore`].
pub trait SnapshotStoreExt: SnapshotStore {
    /// Serialize and save.
    fn save_as<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<(), PulseError> {
        self.save(key, &serde_json::to_value(data)?)
    }

    /// Load and deserialize.
    fn load_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PulseError> {
        match self.load(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                PulseError::Store(format!("snapshot '{key}' has an unexpected shape: {e}"))
            }),
            None => Ok(None),
        }
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStoreExt for S {}

/// Check that a key only uses `[A-Za-z0-9_.-]` and does not start with a dot.
///
/// # Examples
///
/// ```
/// use classpulse_store::validate_key;
///
/// assert!(validate_key("charts.25spring").is_ok());
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<(), PulseError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(PulseError::Store(format!("invalid snapshot key '{key}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn typed_helpers_work_through_trait_objects() {
        let store: Box<dyn SnapshotStore> = Box::new(MemoryStore::new());
        let sample = Sample {
            name: "x".into(),
            count: 3,
        };
        store.save_as("sample", &sample).unwrap();
        assert_eq!(store.load_as::<Sample>("sample").unwrap(), Some(sample));
        assert_eq!(store.load_as::<Sample>("absent").unwrap(), None);
    }

    #[test]
    fn shape_mismatch_is_a_store_error() {
        let store = MemoryStore::new();
        store.save("sample", &serde_json::json!([1, 2])).unwrap();
        let err = store.load_as::<Sample>("sample").unwrap_err();
        assert!(matches!(err, PulseError::Store(_)));
    }

    #[test]
    fn keys_reject_separators() {
        for key in ["a/b", "a\\b", "a b", ".hidden", "ümlaut"] {
            assert!(validate_key(key).is_err(), "{key} should be rejected");
        }
        for key in ["roster", "local.23spring", "charts", "pulls.24spring-rerun"] {
            assert!(validate_key(key).is_ok(), "{key} should be accepted");
        }
    }
}
