//! The persisted snapshot document.
//!
//! One document is one named snapshot of a store: a pretty-printed JSON
//! object with two top-level fields.
//!
//! ```json
//! {
//!   "metadata": {"created_at": "<ISO-8601>", "updated_at": "<ISO-8601>", "version": "1.0"},
//!   "state": { "<key>": <any JSON value> }
//! }
//! ```
//!
//! Documents live as `<name>.json` under a storage directory. Names are
//! plain file names: no separators, no `..`, no control characters.

use crate::errors::{StateError, StateResult, SuggestedAction};
use crate::types::{StateMap, StateValue, Timestamp, FORMAT_VERSION};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File extension for snapshot documents (without dot)
pub const SNAPSHOT_EXTENSION: &str = "json";

/// Prefix of generated snapshot names (`state_YYYYmmdd_HHMMSS`)
pub const STATE_PREFIX: &str = "state";

/// Prefix of generated backup names (`backup_YYYYmmdd_HHMMSS`)
pub const BACKUP_PREFIX: &str = "backup";

/// Store metadata, persisted alongside the entries.
///
/// Reading is lenient: a field that is missing, of the wrong type or not
/// a parseable timestamp falls back to its default, and fields this crate
/// does not know are kept and written back on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreMetadata {
    /// When the store (or the snapshot it was loaded from) was created
    pub created_at: DateTime<Utc>,

    /// Last mutation or load time
    pub updated_at: DateTime<Utc>,

    /// Document format version
    pub version: String,

    /// Any other fields found in a loaded document
    #[serde(flatten)]
    pub extra: StateMap,
}

fn default_version() -> String {
    FORMAT_VERSION.to_string()
}

impl StoreMetadata {
    /// Fresh metadata stamped with the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            version: default_version(),
            extra: StateMap::new(),
        }
    }

    /// Build metadata from a loaded JSON value, defaulting whatever is
    /// absent or unreadable. A non-object value yields fresh metadata.
    pub fn from_value(value: StateValue) -> Self {
        let mut meta = Self::new();
        let StateValue::Object(mut fields) = value else {
            return meta;
        };
        if let Some(ts) = fields.remove("created_at").as_ref().and_then(parse_timestamp) {
            meta.created_at = ts;
        }
        if let Some(ts) = fields.remove("updated_at").as_ref().and_then(parse_timestamp) {
            meta.updated_at = ts;
        }
        if let Some(StateValue::String(version)) = fields.remove("version") {
            meta.version = version;
        }
        meta.extra = fields;
        meta
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        let now = Utc::now();
        // Keep updated_at >= created_at even if the clock steps backwards.
        self.updated_at = now.max(self.created_at);
    }
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl<'de> Deserialize<'de> for StoreMetadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        StateValue::deserialize(deserializer).map(Self::from_value)
    }
}

/// Parse an ISO-8601 timestamp. Values without a UTC offset are taken as UTC.
fn parse_timestamp(value: &StateValue) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// A full snapshot: metadata plus entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDocument {
    pub metadata: StoreMetadata,
    pub state: StateMap,
}

// The document must be an object. Missing or null sections default; a
// `state` that is present but not an object is rejected.
impl<'de> Deserialize<'de> for StateDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut fields = StateMap::deserialize(deserializer)?;
        let metadata = fields
            .remove("metadata")
            .map(StoreMetadata::from_value)
            .unwrap_or_default();
        let state = match fields.remove("state") {
            None | Some(StateValue::Null) => StateMap::new(),
            Some(StateValue::Object(state)) => state,
            Some(_) => return Err(serde::de::Error::custom("`state` must be an object")),
        };
        Ok(Self { metadata, state })
    }
}

/// Document reader.
pub trait DocumentReader: Sized {
    /// Read a document from disk. Fails with `NotFound` if absent.
    fn read_file(path: &Path) -> StateResult<Self>;

    /// Parse a document from bytes
    fn from_bytes(data: &[u8]) -> StateResult<Self>;
}

/// Document writer.
pub trait DocumentWriter {
    /// Write to a file path, replacing any existing file
    fn write_file(&self, path: &Path) -> StateResult<()>;

    /// Serialize the content to bytes
    fn to_bytes(&self) -> StateResult<Vec<u8>>;
}

impl DocumentReader for StateDocument {
    fn read_file(path: &Path) -> StateResult<Self> {
        if !path.is_file() {
            return Err(StateError::not_found(path.display().to_string()));
        }
        let data = fs::read(path)?;
        Self::from_bytes(&data).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    fn from_bytes(data: &[u8]) -> StateResult<Self> {
        serde_json::from_slice(data).map_err(|e| {
            StateError::serialization(format!("Malformed state document: {}", e))
                .with_context("line", e.line())
        })
    }
}

impl DocumentWriter for StateDocument {
    fn write_file(&self, path: &Path) -> StateResult<()> {
        let bytes = self.to_bytes()?;
        write_replacing(path, &bytes)
    }

    fn to_bytes(&self) -> StateResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {}", e)))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Write `bytes` to `path` through a temporary sibling, then rename over
/// the target.
fn write_replacing(path: &Path, bytes: &[u8]) -> StateResult<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, bytes).map_err(|e| {
        StateError::storage(format!("Failed to write temp file: {}", e))
            .with_context("path", temp_path.display().to_string())
    })?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StateError::storage(format!("Failed to rename temp file: {}", e))
            .with_context("path", path.display().to_string()));
    }

    Ok(())
}

/// Ensure `path` exists as a directory (creating parents). Idempotent.
///
/// Used for both storage and log directories.
pub fn ensure_dir(path: impl AsRef<Path>) -> StateResult<PathBuf> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|e| {
        StateError::storage(format!("Failed to create directory: {}", e))
            .with_context("io_error_kind", format!("{:?}", e.kind()))
            .with_suggestion(SuggestedAction::CheckPath {
                path: path.display().to_string(),
            })
    })?;
    Ok(path.to_path_buf())
}

/// Validate that a snapshot name is safe for use as a filename.
/// Rejects path separators, `.` and `..`, and control characters.
pub fn validate_name(name: &str) -> StateResult<()> {
    if name.is_empty() {
        return Err(StateError::invalid_name("snapshot name cannot be empty"));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(StateError::invalid_name(format!(
            "snapshot name is not a plain file name: {name:?}"
        ))
        .with_context("name", name));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(StateError::invalid_name(format!(
            "snapshot name contains control characters: {name:?}"
        ))
        .with_context("name", name));
    }
    Ok(())
}

/// Resolve a snapshot name to its file name, appending `.json` if omitted.
pub fn file_name(name: &str) -> StateResult<String> {
    validate_name(name)?;
    let suffix = format!(".{}", SNAPSHOT_EXTENSION);
    if name.ends_with(&suffix) {
        Ok(name.to_string())
    } else {
        Ok(format!("{}{}", name, suffix))
    }
}

/// Timestamp-derived name with second resolution, e.g. `state_20240305_070809`.
pub fn generated_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Timestamp::now().file_stamp())
}

/// File names of every snapshot document directly under `dir`, sorted.
///
/// A missing directory holds no snapshots.
pub fn list_documents(dir: &Path) -> StateResult<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().is_some_and(|ext| ext == SNAPSHOT_EXTENSION) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Information about a snapshot file (without parsing it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// File name, including the `.json` suffix
    pub name: String,

    pub path: PathBuf,

    /// File size in bytes
    pub size_bytes: u64,

    /// Last modification time, if the filesystem reports one
    pub modified_at: Option<DateTime<Utc>>,

    /// BLAKE3 checksum of the file bytes
    #[serde(with = "hex_serde")]
    pub checksum: [u8; 32],
}

impl SnapshotInfo {
    /// Inspect the document at `path`.
    pub fn inspect(path: &Path) -> StateResult<Self> {
        if !path.is_file() {
            return Err(StateError::not_found(path.display().to_string()));
        }
        let data = fs::read(path)?;
        let meta = fs::metadata(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| StateError::invalid_name(format!("{} has no file name", path.display())))?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            size_bytes: meta.len(),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
            checksum: *blake3::hash(&data).as_bytes(),
        })
    }

    /// Hex-encoded checksum
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }

    /// Check whether the file on disk still matches the recorded checksum
    pub fn verify(&self) -> StateResult<bool> {
        let data = fs::read(&self.path)?;
        Ok(blake3::hash(&data).as_bytes() == &self.checksum)
    }
}

// Hex serialization for checksums
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid checksum length"))
    }
}
