//! Persisted editor text.
//!
//! Exactly one field survives across sessions: the last-edited configuration
//! text. It is stored in an embedded sled database under a fixed key as a
//! small versioned JSON document:
//!
//! ```text
//! "ic10-storage" => {"version": 1, "initial_env": "<yaml>"}
//! ```
//!
//! Older browser-era documents (`{"state": {"initialEnv": ...}, "version": 0}`)
//! are migrated on load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fixed storage key.
pub const STORAGE_KEY: &str = "ic10-storage";

/// Current persisted document version.
pub const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Persisted editor state is corrupt: {0}")]
    Corrupt(String),

    #[error("Persisted editor state has unsupported version {0}")]
    UnsupportedVersion(u32),
}

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEditor {
    pub version: u32,
    pub initial_env: String,
}

impl PersistedEditor {
    pub fn new(initial_env: impl Into<String>) -> Self {
        Self {
            version: STORAGE_VERSION,
            initial_env: initial_env.into(),
        }
    }

    /// Parses a stored document, migrating older layouts.
    pub fn migrate(doc: Value) -> Result<Self, StoreError> {
        let version = doc
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        if version > STORAGE_VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }

        if doc.get("initial_env").is_some() {
            return serde_json::from_value(doc).map_err(|e| StoreError::Corrupt(e.to_string()));
        }

        // Browser layout: {"state": {"initialEnv": "..."}, "version": N}
        match doc.pointer("/state/initialEnv").and_then(Value::as_str) {
            Some(text) => Ok(Self::new(text)),
            None => Err(StoreError::Corrupt("missing initial_env".to_string())),
        }
    }
}

/// Sled-backed store for the editor text.
pub struct EditorStore {
    db: sled::Db,
}

impl EditorStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::StorageError(format!("Failed to open sled DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a temporary store, deleted on drop
    pub fn open_temp() -> Result<Self, StoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| StoreError::StorageError(format!("Failed to open temp DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Loads the persisted editor text, if any.
    pub fn load(&self) -> Result<Option<String>, StoreError> {
        let raw = self
            .db
            .get(STORAGE_KEY)
            .map_err(|e| StoreError::StorageError(format!("Read failed: {}", e)))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let doc: Value =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Some(PersistedEditor::migrate(doc)?.initial_env))
    }

    /// Persists the editor text, replacing any previous value.
    pub fn save(&self, text: &str) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&PersistedEditor::new(text))
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.db
            .insert(STORAGE_KEY, bytes)
            .map_err(|e| StoreError::StorageError(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| StoreError::StorageError(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Writes a raw document under the storage key (migration tests, imports).
    pub fn save_raw(&self, doc: &Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(doc).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.db
            .insert(STORAGE_KEY, bytes)
            .map_err(|e| StoreError::StorageError(format!("Insert failed: {}", e)))?;
        Ok(())
    }
}
