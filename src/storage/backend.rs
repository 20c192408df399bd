use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::Value;

/// Storage contract used by hives configured with a store key.
///
/// Three methods, whole-value JSON snapshots, opaque string keys. `get`
/// returns `None` for missing keys; `set` and `clear` are fire-and-forget.
/// Implementations deal with their own failures — callers treat persistence
/// as best-effort and never depend on it for correctness.
pub trait StorageBackend: Send + Sync {
    /// Read the snapshot stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous snapshot.
    fn set(&self, key: &str, value: &Value);

    /// Remove the snapshot stored under `key`, if any.
    fn clear(&self, key: &str);
}

/// In-memory backend. Lives as long as the process, which makes it the
/// session-scoped storage of a native application.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.clone());
        }
    }

    fn clear(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

/// Durable backend keeping all snapshots in a single JSON object file.
///
/// The file is loaded lazily on first access and rewritten after every
/// mutation. I/O and parse failures are logged at debug level and otherwise
/// ignored; the in-memory copy stays authoritative for the session.
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<Option<HashMap<String, Value>>>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(None),
        }
    }

    fn load(&self) -> HashMap<String, Value> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::debug!(path = %self.path.display(), %err, "discarding unreadable storage file");
                HashMap::new()
            }),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "storage file not loaded");
                HashMap::new()
            }
        }
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Value>) -> R) -> Option<R> {
        let mut guard = self.entries.write().ok()?;
        let entries = guard.get_or_insert_with(|| self.load());
        Some(f(entries))
    }

    fn flush(&self, entries: &HashMap<String, Value>) {
        match serde_json::to_string(entries) {
            Ok(raw) => {
                if let Err(err) = fs::write(&self.path, raw) {
                    tracing::debug!(path = %self.path.display(), %err, "storage write failed");
                }
            }
            Err(err) => tracing::debug!(%err, "storage serialization failed"),
        }
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.with_entries(|entries| entries.get(key).cloned())?
    }

    fn set(&self, key: &str, value: &Value) {
        let _ = self.with_entries(|entries| {
            entries.insert(key.to_string(), value.clone());
            self.flush(entries);
        });
    }

    fn clear(&self, key: &str) {
        let _ = self.with_entries(|entries| {
            if entries.remove(key).is_some() {
                self.flush(entries);
            }
        });
    }
}
