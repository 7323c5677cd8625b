use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use classpulse_core::PulseError;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{validate_key, SnapshotStore};

/// One pretty-printed `<key>.json` file per key under a directory.
///
/// # Examples
///
/// ```
/// use classpulse_store::{JsonFileStore, SnapshotStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = JsonFileStore::open(dir.path()).unwrap();
/// store.save("roster", &serde_json::json!([])).unwrap();
/// assert!(dir.path().join("roster.json").exists());
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Io`] if the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self, PulseError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, key: &str, value: &Value) -> Result<(), PulseError> {
        validate_key(key)?;
        let target = self.path_for(key);
        let write_err = |e: std::io::Error| {
            PulseError::Store(format!("failed to write {}: {e}", target.display()))
        };

        // Same directory as the target so the final rename stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&target).map_err(|e| write_err(e.error))?;

        log::debug!("saved snapshot {key} to {}", target.display());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Value>, PulseError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PulseError::Store(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| PulseError::Store(format!("{} is not valid JSON: {e}", path.display())))
    }

    fn keys(&self) -> Result<Vec<String>, PulseError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
