//! Content store client.
//!
//! The store owns the original payload content. The codec only ever inserts
//! and retrieves records; it never updates or deletes them, so a record lives
//! for as long as the store keeps it, independent of any ciphertext in flight.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

/// A stored record: a structured mapping including its identity field.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// The field holding a record's identity. Its value is a string.
pub const IDENTITY_FIELD: &str = "_id";

/// Read the identity of `record`.
pub fn record_id<'a>(collection: &str, record: &'a Record) -> Result<&'a str, StoreError> {
    record
        .get(IDENTITY_FIELD)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| StoreError::Rejected {
            collection: collection.to_string(),
            reason: format!("record has no string {} field", IDENTITY_FIELD),
        })
}

/// Failures reported by a content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write.
    #[error("write rejected in {collection}: {reason}")]
    Rejected { collection: String, reason: String },

    /// No record exists under this id.
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-addressable persistence for original payload content.
///
/// Implementations must be safe for concurrent invocation. Timeouts and
/// retries belong to the implementation, not to the codec.
pub trait ContentStore: Send + Sync {
    /// Persist `record` in `collection` under its [`IDENTITY_FIELD`].
    fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError>;

    /// Fetch the record stored under `id`.
    fn retrieve(&self, collection: &str, id: &str) -> Result<Record, StoreError>;
}

fn duplicate(collection: &str, id: &str) -> StoreError {
    StoreError::Rejected {
        collection: collection.to_string(),
        reason: format!("duplicate id {}", id),
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A thread-safe in-memory store. Useful for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Returns true if `collection` holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Ids of every record in `collection`, in no particular order.
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .get(collection)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ContentStore for MemoryStore {
    fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let id = record_id(collection, record)?;
        let mut collections = self.collections.write();
        let records = collections.entry(collection.to_string()).or_default();
        if records.contains_key(id) {
            return Err(duplicate(collection, id));
        }
        records.insert(id.to_string(), record.clone());
        Ok(())
    }

    fn retrieve(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
        self.collections
            .read()
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }
}

// ---------------------------------------------------------------------------
// Directory store
// ---------------------------------------------------------------------------

/// Persists each record as `<root>/<collection>/<id>.json`.
///
/// Records are written with create-new semantics, so an existing record is
/// never overwritten.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_segment(collection) || !is_safe_segment(id) {
            return Err(StoreError::Rejected {
                collection: collection.to_string(),
                reason: "unsafe path segment".to_string(),
            });
        }
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Remove a record file whose write did not complete, so a truncated record
/// never shadows its id.
fn discard_on_error(path: &Path, written: std::io::Result<()>) -> Result<(), StoreError> {
    let err = match written {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if let Err(cleanup) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %cleanup, "Failed to remove partial record");
    }
    Err(err.into())
}

impl ContentStore for DirectoryStore {
    fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let id = record_id(collection, record)?;
        let path = self.record_path(collection, id)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let bytes = serde_json::to_vec(record)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => {
                return Err(duplicate(collection, id))
            }
            Err(err) => return Err(err.into()),
        };
        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        drop(file);
        discard_on_error(&path, written)?;

        debug!(collection, bytes = bytes.len(), "Record persisted");
        Ok(())
    }

    fn retrieve(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
        let path = self.record_path(collection, id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                return Err(not_found(collection, id))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_memory_store_insert_retrieve() {
        let store = MemoryStore::new();
        let rec = record(json!({"_id": "a", "user": "alice"}));

        store.insert("c", &rec).unwrap();
        assert_eq!(store.retrieve("c", "a").unwrap(), rec);
        assert_eq!(store.len("c"), 1);
        assert!(store.is_empty("other"));
    }

    #[test]
    fn test_memory_store_never_overwrites() {
        let store = MemoryStore::new();
        store.insert("c", &record(json!({"_id": "a", "v": 1}))).unwrap();

        let err = store.insert("c", &record(json!({"_id": "a", "v": 2}))).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert_eq!(store.retrieve("c", "a").unwrap()["v"], 1);
    }

    #[test]
    fn test_insert_requires_identity() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert("c", &record(json!({"user": "alice"}))),
            Err(StoreError::Rejected { .. })
        ));
        assert!(matches!(
            store.insert("c", &record(json!({"_id": 7}))),
            Err(StoreError::Rejected { .. })
        ));
    }

    #[test]
    fn test_memory_store_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.retrieve("c", "missing"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_directory_store_roundtrip_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("records")).unwrap();
        let rec = record(json!({"_id": "abc-1", "nested": {"list": [1, 2, 3]}}));

        store.insert("codex-data", &rec).unwrap();
        assert_eq!(store.retrieve("codex-data", "abc-1").unwrap(), rec);
        assert!(matches!(
            store.insert("codex-data", &rec),
            Err(StoreError::Rejected { .. })
        ));
        assert!(matches!(
            store.retrieve("codex-data", "abc-2"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_store_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let store = DirectoryStore::open(&root).unwrap();
        assert_eq!(store.root(), root.as_path());
        assert!(root.is_dir());
    }

    #[test]
    fn test_failed_write_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.json");
        fs::write(&path, b"{\"_id\":").unwrap();

        let failed = Err(std::io::Error::new(IoErrorKind::WriteZero, "disk full"));
        assert!(matches!(discard_on_error(&path, failed), Err(StoreError::Io(_))));
        assert!(!path.exists());

        fs::write(&path, b"{}").unwrap();
        discard_on_error(&path, Ok(())).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_directory_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.insert("../escape", &record(json!({"_id": "x"}))),
            Err(StoreError::Rejected { .. })
        ));
        assert!(matches!(
            store.insert("codex-data", &record(json!({"_id": "../x"}))),
            Err(StoreError::Rejected { .. })
        ));
        assert!(matches!(
            store.retrieve("codex-data", "../../etc/passwd"),
            Err(StoreError::Rejected { .. })
        ));
    }
}
