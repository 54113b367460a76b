use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Collection of all tasks, JSON array of `models::Task`.
pub const TODOS_KEY: &str = "@todos";
/// Tag registry, JSON object of name -> keyword list.
pub const TAGS_KEY: &str = "@tags";
/// Stringified integer hours used by the notification snooze action.
pub const SNOOZE_DURATION_KEY: &str = "@snooze_duration";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Async string-keyed storage of JSON-stringified values. The platform
/// bridge decides where the bytes live; the core only sees this surface.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process store. Backs unit tests and ephemeral preview sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("store poisoned")
            .contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .expect("store poisoned")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().expect("store poisoned").remove(key);
        Ok(())
    }
}

const STORE_FILE: &str = "store.json";

/// File-backed store: one JSON object per app, rewritten atomically
/// (temp file, fsync, rename) on every mutation.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes the read-modify-write of the backing file within this
    // process. Cross-operation races on the task collection remain the
    // caller's documented last-write-wins behavior.
    guard: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn open(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)?;
        Ok(Self {
            path: root.join(STORE_FILE),
            guard: Arc::new(Mutex::new(())),
        })
    }

    fn load_map(&self) -> Result<HashMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let mut file = File::open(&self.path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(map)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().expect("store poisoned");
        Ok(self.load_map()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().expect("store poisoned");
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_atomic(&map)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().expect("store poisoned");
        let mut map = self.load_map()?;
        if map.remove(key).is_some() {
            self.write_atomic(&map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_and_removes() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));

        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // Removing again stays a no-op.
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).unwrap();

        assert_eq!(store.get("@todos").await.unwrap(), None);
        store.set("@todos", "[]").await.unwrap();
        store.set("notification_t1", "n1").await.unwrap();

        // A fresh handle over the same directory sees the persisted state.
        let reopened = JsonFileStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.get("@todos").await.unwrap(), Some("[]".to_string()));
        assert_eq!(
            reopened.get("notification_t1").await.unwrap(),
            Some("n1".to_string())
        );

        reopened.remove("notification_t1").await.unwrap();
        assert_eq!(store.get("notification_t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_surfaces_corrupt_contents_as_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join(STORE_FILE), b"{ not json").unwrap();

        match store.get("@todos").await {
            Err(StorageError::Json(_)) => {}
            other => panic!("expected json error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn file_store_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).unwrap();
        store.set("k", "v").await.unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![STORE_FILE.to_string()]);
    }

    #[test]
    fn storage_error_displays_source() {
        let err = StorageError::from(std::io::Error::other("boom"));
        assert!(err.to_string().contains("boom"));
    }
}
