use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Listing entry returned by a key/value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
}

/// External key/value store with per-entry expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn list(&self) -> Result<Vec<KeyInfo>>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local store. Expired entries are invisible and dropped on write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(key.to_string(), MemoryEntry { value, expires_at: now + ttl });
        Ok(())
    }

    async fn list(&self) -> Result<Vec<KeyInfo>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let mut keys: Vec<KeyInfo> = entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| KeyInfo { name: k.clone() })
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    /// Absolute expiry, epoch milliseconds
    expires_at: i64,
}

/// JSON file holding a key -> entry map. The whole file is rewritten on each mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: RwLock::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, FileEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(Error::store),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(Error::store(format!("{}: {}", self.path.display(), e))),
        }
    }

    async fn save(&self, entries: &HashMap<String, FileEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(Error::store)?;
        }
        let bytes = serde_json::to_vec_pretty(entries).map_err(Error::store)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::store(format!("{}: {}", self.path.display(), e)))
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut entries = self.load().await?;
        let now = Self::now_millis();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(key.to_string(), FileEntry {
            value,
            expires_at: now + ttl.as_millis() as i64,
        });
        self.save(&entries).await
    }

    async fn list(&self) -> Result<Vec<KeyInfo>> {
        let _guard = self.lock.read().await;
        let now = Self::now_millis();
        let mut keys: Vec<KeyInfo> = self
            .load()
            .await?
            .into_iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(name, _)| KeyInfo { name })
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.read().await;
        let now = Self::now_millis();
        Ok(self
            .load()
            .await?
            .remove(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put("b", "2".to_string(), DAY).await.unwrap();
        store.put("a", "1".to_string(), DAY).await.unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store.put("short", "x".to_string(), Duration::from_secs(5)).await.unwrap();
        store.put("long", "y".to_string(), DAY).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["long"]);
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let store = FileStore::new(&path);
        assert!(store.list().await.unwrap().is_empty());
        store.put("k1", "{\"a\":1}".to_string(), DAY).await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("k1").await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(reopened.list().await.unwrap(), vec![KeyInfo { name: "k1".to_string() }]);

        reopened.delete("k1").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_ignores_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("history.json"));
        store.put("gone", "x".to_string(), Duration::ZERO).await.unwrap();
        assert_eq!(store.get("gone").await.unwrap(), None);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.list().await, Err(Error::StoreUnavailable(_))));
    }
}
