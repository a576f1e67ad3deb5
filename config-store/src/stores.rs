use async_trait::async_trait;
use scrapedeck_core::{CoreError, KeyValueStore};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// In-process storage, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CoreError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Desktop storage: one JSON object on disk holding every key.
///
/// Writes go to a sibling temp file which is then renamed into place,
/// so a reader sees either the old object or the new one.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "storage.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_all(&self) -> Result<Map<String, Value>, CoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(CoreError::Io(e)),
        };
        match serde_json::from_slice::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(CoreError::Internal {
                message: format!("{} does not hold a JSON object", self.path.display()),
            }),
        }
    }

    async fn write_all(&self, map: Map<String, Value>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp = self.temp_path();
        let bytes = serde_json::to_vec_pretty(&Value::Object(map))?;
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!("Wrote storage file {}", self.path.display());
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.write_lock.lock().await;
        let mut map = match self.read_all().await {
            Ok(map) => map,
            Err(e) => {
                warn!("Storage file unreadable, starting fresh: {}", e);
                Map::new()
            }
        };
        apply(&mut map);
        self.write_all(map).await
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let mut map = self.read_all().await?;
        Ok(map.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CoreError> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.update(|map| {
            map.remove(key);
        })
        .await
    }
}
