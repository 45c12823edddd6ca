//! Persistence providers for the breadcrumb queue
//!
//! A provider stores one opaque string per key. The manager owns the
//! serialization format; providers only move bytes.

use crate::error::BreadcrumbResult;
use async_trait::async_trait;
use mts_core::StorageBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Key-value persistence
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Stored value, or `None` if the key was never written or was deleted
    async fn read(&self, key: &str) -> BreadcrumbResult<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> BreadcrumbResult<()>;

    /// Deleting a missing key succeeds
    async fn delete(&self, key: &str) -> BreadcrumbResult<()>;

    fn name(&self) -> &str;
}

/// Per-instance in-memory storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, for callers that hold a clone
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl PersistenceProvider for MemoryStorage {
    async fn read(&self, key: &str) -> BreadcrumbResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> BreadcrumbResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> BreadcrumbResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

static PROCESS_ENTRIES: LazyLock<Mutex<HashMap<String, String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Process-wide storage; every instance sees the same map
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessStorage;

#[async_trait]
impl PersistenceProvider for ProcessStorage {
    async fn read(&self, key: &str) -> BreadcrumbResult<Option<String>> {
        Ok(PROCESS_ENTRIES.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> BreadcrumbResult<()> {
        PROCESS_ENTRIES
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> BreadcrumbResult<()> {
        PROCESS_ENTRIES.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// One `<key>.json` file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory, if one exists
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("mtsynergy"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl PersistenceProvider for FileStorage {
    async fn read(&self, key: &str) -> BreadcrumbResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> BreadcrumbResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, value).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Persisted breadcrumbs to {:?}", path);
        Ok(())
    }

    async fn delete(&self, key: &str) -> BreadcrumbResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Resolve a configured backend to a provider.
///
/// `Auto` prefers files on mobile targets, the process map when a tokio
/// runtime is running, and plain memory otherwise.
pub fn select_provider(
    backend: StorageBackend,
    dir: Option<&Path>,
) -> Arc<dyn PersistenceProvider> {
    let file_or_memory = |dir: Option<&Path>| -> Arc<dyn PersistenceProvider> {
        match dir.map(Path::to_path_buf).or_else(FileStorage::default_dir) {
            Some(dir) => Arc::new(FileStorage::new(dir)),
            None => {
                warn!("No storage directory available, keeping breadcrumbs in memory");
                Arc::new(MemoryStorage::new())
            }
        }
    };

    let provider: Arc<dyn PersistenceProvider> = match backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::Process => Arc::new(ProcessStorage),
        StorageBackend::File => file_or_memory(dir),
        StorageBackend::Auto => {
            if cfg!(any(target_os = "ios", target_os = "android")) {
                file_or_memory(dir)
            } else if tokio::runtime::Handle::try_current().is_ok() {
                Arc::new(ProcessStorage)
            } else {
                Arc::new(MemoryStorage::new())
            }
        }
    };

    debug!("Breadcrumb storage: {}", provider.name());
    provider
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("k").await.unwrap(), None);

        storage.write("k", "[1]").await.unwrap();
        assert_eq!(storage.read("k").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(storage.clone().get("k").as_deref(), Some("[1]"));

        storage.delete("k").await.unwrap();
        storage.delete("k").await.unwrap();
        assert_eq!(storage.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_storage_is_per_instance() {
        let a = MemoryStorage::new();
        let b = MemoryStorage::new();
        a.write("k", "a").await.unwrap();
        assert_eq!(b.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_process_storage_is_shared() {
        let key = "process_storage_shared_test";
        ProcessStorage.write(key, "x").await.unwrap();
        assert_eq!(ProcessStorage.read(key).await.unwrap().as_deref(), Some("x"));
        ProcessStorage.delete(key).await.unwrap();
        assert_eq!(ProcessStorage.read(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));

        assert_eq!(storage.read("crumbs").await.unwrap(), None);
        storage.delete("crumbs").await.unwrap();

        storage.write("crumbs", "[]").await.unwrap();
        assert!(dir.path().join("nested/crumbs.json").exists());
        assert!(!dir.path().join("nested/crumbs.tmp").exists());
        assert_eq!(storage.read("crumbs").await.unwrap().as_deref(), Some("[]"));

        storage.delete("crumbs").await.unwrap();
        assert_eq!(storage.read("crumbs").await.unwrap(), None);
    }

    #[test]
    fn test_select_provider_explicit() {
        assert_eq!(select_provider(StorageBackend::Memory, None).name(), "memory");
        assert_eq!(select_provider(StorageBackend::Process, None).name(), "process");

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            select_provider(StorageBackend::File, Some(dir.path())).name(),
            "file"
        );
    }

    #[test]
    fn test_select_provider_auto_without_runtime() {
        assert_eq!(select_provider(StorageBackend::Auto, None).name(), "memory");
    }

    #[tokio::test]
    async fn test_select_provider_auto_with_runtime() {
        assert_eq!(select_provider(StorageBackend::Auto, None).name(), "process");
    }
}
