//! The persistent key-value state store.
//!
//! A [`StateStore`] owns a mapping from string keys to JSON values plus a
//! [`StoreMetadata`] record, and persists both as named snapshot documents
//! under its storage directory.
//!
//! # Autosave
//!
//! With autosave enabled, every mutation (`set`, `delete` of a present key,
//! `clear`) independently writes a new timestamp-named snapshot. Writes
//! within the same second replace each other; writes in different seconds
//! accumulate as separate files. Callers who want a single canonical file
//! should disable autosave and call `save` with an explicit name.
//!
//! # Use from one thread
//!
//! A store is not synchronized. Two stores may share a directory, but two
//! writers targeting the same snapshot name race and the last one wins.

use crate::document::{
    self, DocumentReader, DocumentWriter, SnapshotInfo, StateDocument, StoreMetadata,
    BACKUP_PREFIX, STATE_PREFIX,
};
use crate::errors::{StateError, StateResult};
use crate::schema::{self, Schema, SchemaViolation};
use crate::types::{StateMap, StateValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub const DEFAULT_STATE_DIR: &str = "states";

/// Default name of the backup subdirectory
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Configuration for a state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding snapshot documents (created on first write)
    pub state_dir: PathBuf,

    /// Persist a new snapshot after every mutation
    pub autosave: bool,

    /// Backup subdirectory name under `state_dir`
    #[serde(default = "default_backup_dir")]
    pub backup_dir_name: String,
}

fn default_backup_dir() -> String {
    DEFAULT_BACKUP_DIR.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            autosave: true,
            backup_dir_name: default_backup_dir(),
        }
    }
}

impl StoreConfig {
    /// Create a config for the given storage directory
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Default::default()
        }
    }

    /// Set autosave
    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// Set the backup subdirectory name
    pub fn backup_dir_name(mut self, name: impl Into<String>) -> Self {
        self.backup_dir_name = name.into();
        self
    }

    /// Default backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.state_dir.join(&self.backup_dir_name)
    }
}

/// In-memory key-value state with JSON-backed durability.
#[derive(Debug, Clone)]
pub struct StateStore {
    config: StoreConfig,
    entries: StateMap,
    metadata: StoreMetadata,
}

impl StateStore {
    /// Create an empty store. Nothing touches the disk until the first write.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            entries: StateMap::new(),
            metadata: StoreMetadata::new(),
        }
    }

    /// Create a store rooted at `state_dir` with the given autosave setting
    pub fn open(state_dir: impl Into<PathBuf>, autosave: bool) -> Self {
        Self::new(StoreConfig::new(state_dir).autosave(autosave))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn state_dir(&self) -> &Path {
        &self.config.state_dir
    }

    pub fn autosave(&self) -> bool {
        self.config.autosave
    }

    pub fn set_autosave(&mut self, autosave: bool) {
        self.config.autosave = autosave;
    }

    // ═══════════════════════════════════════════════════════
    // ENTRIES
    // ═══════════════════════════════════════════════════════

    /// Insert or overwrite `key`.
    ///
    /// The in-memory write always happens. An error is returned only when
    /// autosave is on and persisting the snapshot fails.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) -> StateResult<()> {
        self.entries.insert(key.into(), value.into());
        self.metadata.touch();
        self.autosave_now()
    }

    /// Serialize `value` to JSON and store it under `key`.
    ///
    /// Fails with `SERIALIZATION_ERROR` (leaving the store untouched) if the
    /// value has no JSON representation.
    pub fn set_serialized<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> StateResult<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            StateError::serialization(format!("Value for {key:?} is not serializable: {e}"))
                .with_context("key", &key)
        })?;
        self.set(key, value)
    }

    /// Borrow the value under `key`
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.get(key)
    }

    /// Value under `key`, or `default` when absent
    pub fn get_or(&self, key: &str, default: impl Into<StateValue>) -> StateValue {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    /// Deserialize the value under `key` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StateResult<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => T::deserialize(value).map(Some).map_err(|e| {
                StateError::serialization(format!("Value for {key:?} has the wrong shape: {e}"))
                    .with_context("key", key)
            }),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow all entries
    pub fn entries(&self) -> &StateMap {
        &self.entries
    }

    /// Owned copy of all entries
    pub fn snapshot(&self) -> StateMap {
        self.entries.clone()
    }

    /// Remove `key`. Returns whether it existed.
    ///
    /// Deleting an absent key changes nothing: no timestamp refresh, no autosave.
    pub fn delete(&mut self, key: &str) -> StateResult<bool> {
        if self.entries.remove(key).is_none() {
            return Ok(false);
        }
        self.metadata.touch();
        self.autosave_now()?;
        Ok(true)
    }

    /// Remove every entry.
    pub fn clear(&mut self) -> StateResult<()> {
        self.entries.clear();
        self.metadata.touch();
        self.autosave_now()
    }

    fn autosave_now(&self) -> StateResult<()> {
        if self.config.autosave {
            self.save(None)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════

    fn document(&self) -> StateDocument {
        StateDocument {
            metadata: self.metadata.clone(),
            state: self.entries.clone(),
        }
    }

    /// Write a snapshot named `name` (default: `state_<timestamp>`).
    ///
    /// Creates the storage directory if needed and silently replaces an
    /// existing snapshot of the same name. Returns the file path.
    pub fn save(&self, name: Option<&str>) -> StateResult<PathBuf> {
        let name = match name {
            Some(name) => name.to_string(),
            None => document::generated_name(STATE_PREFIX),
        };
        let path = self.config.state_dir.join(document::file_name(&name)?);

        document::ensure_dir(&self.config.state_dir)?;
        self.document().write_file(&path)?;

        tracing::debug!(path = %path.display(), items = self.entries.len(), "state saved");
        Ok(path)
    }

    /// Replace entries and metadata with the named snapshot.
    ///
    /// `.json` is appended when omitted. `updated_at` is re-stamped to the
    /// load time; everything else comes from the document. Fails with
    /// `NOT_FOUND` when the snapshot does not exist.
    pub fn load(&mut self, name: &str) -> StateResult<()> {
        let path = self.config.state_dir.join(document::file_name(name)?);
        self.restore(&path)
    }

    /// Load an arbitrary document path (e.g. a backup) with `load` semantics.
    pub fn restore(&mut self, path: &Path) -> StateResult<()> {
        let doc = StateDocument::read_file(path)?;

        self.entries = doc.state;
        self.metadata = doc.metadata;
        self.metadata.touch();

        tracing::debug!(path = %path.display(), items = self.entries.len(), "state loaded");
        Ok(())
    }

    /// File names of every snapshot in the storage directory.
    pub fn list_snapshots(&self) -> StateResult<Vec<String>> {
        document::list_documents(&self.config.state_dir)
    }

    /// File names of every backup in `directory` (default: the backup subdirectory).
    pub fn list_backups(&self, directory: Option<&Path>) -> StateResult<Vec<String>> {
        match directory {
            Some(dir) => document::list_documents(dir),
            None => document::list_documents(&self.config.backup_dir()),
        }
    }

    /// Size, modification time and checksum of a named snapshot
    pub fn snapshot_info(&self, name: &str) -> StateResult<SnapshotInfo> {
        let path = self.config.state_dir.join(document::file_name(name)?);
        SnapshotInfo::inspect(&path)
    }

    /// Write a `backup_<timestamp>` copy of the current state into
    /// `directory` (default: the backup subdirectory). Returns the path.
    ///
    /// Independent of `save`: no snapshot name is consumed or changed.
    pub fn backup(&self, directory: Option<&Path>) -> StateResult<PathBuf> {
        let dir = match directory {
            Some(dir) => dir.to_path_buf(),
            None => self.config.backup_dir(),
        };
        document::ensure_dir(&dir)?;

        let name = document::file_name(&document::generated_name(BACKUP_PREFIX))?;
        let path = dir.join(name);
        self.document().write_file(&path)?;

        tracing::debug!(path = %path.display(), "state backed up");
        Ok(path)
    }

    // ═══════════════════════════════════════════════════════
    // VALIDATION & METADATA
    // ═══════════════════════════════════════════════════════

    /// True when every present key named in `schema` has the expected kind.
    /// Absent keys are not checked.
    pub fn validate(&self, schema: &Schema) -> bool {
        self.validation_errors(schema).is_empty()
    }

    /// Every schema violation among present keys
    pub fn validation_errors(&self, schema: &Schema) -> Vec<SchemaViolation> {
        schema::check(&self.entries, schema)
    }

    /// Copy of the metadata record
    pub fn get_metadata(&self) -> StoreMetadata {
        self.metadata.clone()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Display for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StateStore(state_dir='{}', items={})",
            self.config.state_dir.display(),
            self.entries.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use serde_json::json;

    fn store_in(dir: &Path) -> StateStore {
        StateStore::open(dir, false)
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new("/data/states")
            .autosave(false)
            .backup_dir_name("old");
        assert_eq!(config.state_dir, PathBuf::from("/data/states"));
        assert!(!config.autosave);
        assert_eq!(config.backup_dir(), PathBuf::from("/data/states/old"));

        let default = StoreConfig::default();
        assert!(default.autosave);
        assert_eq!(default.state_dir, PathBuf::from("states"));
    }

    #[test]
    fn test_new_store_does_not_touch_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("states");
        let store = store_in(&dir);
        assert!(store.is_empty());
        assert!(!dir.exists());
        assert!(store.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_set_get_default() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.set("key1", "value1").unwrap();
        store.set("key2", 42).unwrap();

        assert_eq!(store.get("key1"), Some(&json!("value1")));
        assert_eq!(store.get("key2"), Some(&json!(42)));
        assert_eq!(store.get_or("nonexistent", "default"), json!("default"));
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_set_refreshes_updated_at() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        let before = store.get_metadata();
        store.set("a", 1).unwrap();
        let after = store.get_metadata();
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= after.created_at);
    }

    #[test]
    fn test_typed_access() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.set_serialized("p", &Point { x: 1, y: 2 }).unwrap();
        assert_eq!(store.get_as::<Point>("p").unwrap(), Some(Point { x: 1, y: 2 }));
        assert_eq!(store.get_as::<Point>("missing").unwrap(), None);

        let err = store.get_as::<String>("p").unwrap_err();
        assert_eq!(err.code, ErrorCode::SerializationError);
    }

    #[test]
    fn test_set_serialized_rejects_non_string_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1);

        let err = store.set_serialized("bad", &bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::SerializationError);
        assert!(!store.contains_key("bad"));
    }

    #[test]
    fn test_display() {
        let mut store = StateStore::open("states", false);
        store.set("a", 1).unwrap();
        assert_eq!(store.to_string(), "StateStore(state_dir='states', items=1)");
    }

    #[test]
    fn test_save_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let err = store.save(Some("../outside")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidName);
    }
}
