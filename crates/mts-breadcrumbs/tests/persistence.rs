//! Background persistence and hydration

use async_trait::async_trait;
use mts_breadcrumbs::{
    BreadcrumbConfig, BreadcrumbError, BreadcrumbEvent, BreadcrumbKind, BreadcrumbManager,
    BreadcrumbResult, FileStorage, MemoryStorage, PersistenceProvider,
};
use mts_core::CorrelationId;
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "crumbs";

fn config() -> BreadcrumbConfig {
    BreadcrumbConfig::default().with_storage_key(KEY)
}

fn persisted(storage: &MemoryStorage) -> Option<Vec<BreadcrumbEvent>> {
    storage
        .get(KEY)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Provider that fails every call
struct Broken;

#[async_trait]
impl PersistenceProvider for Broken {
    async fn read(&self, _key: &str) -> BreadcrumbResult<Option<String>> {
        Err(BreadcrumbError::storage("unavailable"))
    }

    async fn write(&self, _key: &str, _value: &str) -> BreadcrumbResult<()> {
        Err(BreadcrumbError::storage("quota exceeded"))
    }

    async fn delete(&self, _key: &str) -> BreadcrumbResult<()> {
        Err(BreadcrumbError::storage("unavailable"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn test_add_persists_in_background() {
    let storage = MemoryStorage::new();
    let manager = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));

    manager.add(BreadcrumbEvent::click("#one", None));
    manager.add(BreadcrumbEvent::click("#two", None));

    wait_for(|| persisted(&storage).map(|e| e.len()) == Some(2)).await;
    assert_eq!(persisted(&storage).unwrap(), manager.get_all());
}

#[tokio::test]
async fn test_flush_writes_snapshot() {
    let storage = MemoryStorage::new();
    let manager = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));

    manager.add(BreadcrumbEvent::network("GET", "/api/feed").with_response(200, 8));
    manager.flush().await.unwrap();

    let stored = persisted(&storage).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(matches!(stored[0].kind, BreadcrumbKind::Network { .. }));
}

#[tokio::test]
async fn test_clear_removes_persisted_copy() {
    let storage = MemoryStorage::new();
    let manager = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));

    manager.add(BreadcrumbEvent::click("#one", None));
    manager.flush().await.unwrap();
    assert!(storage.get(KEY).is_some());

    manager.clear();
    assert!(manager.is_empty());
    wait_for(|| storage.get(KEY).is_none()).await;
}

#[tokio::test]
async fn test_persisted_copy_is_redacted() {
    let storage = MemoryStorage::new();
    let manager = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));

    manager.add(BreadcrumbEvent::form_submit("invite jane@example.com", 1));
    manager.flush().await.unwrap();

    let raw = storage.get(KEY).unwrap();
    assert!(!raw.contains("jane@example.com"));
    assert!(raw.contains("[REDACTED-EMAIL]"));
}

#[tokio::test]
async fn test_initialize_hydrates_then_appends_pending() {
    let storage = MemoryStorage::new();
    let earlier = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));
    earlier.add(BreadcrumbEvent::navigation("/", "/inbox"));
    earlier.flush().await.unwrap();

    let manager = BreadcrumbManager::with_provider(config(), Arc::new(MemoryStorage::new()));
    manager.add(BreadcrumbEvent::click("#compose", None));

    let restored = manager.initialize(config(), Arc::new(storage.clone())).await;
    assert_eq!(restored, 1);

    let all = manager.get_all();
    assert_eq!(all.len(), 2);
    assert!(matches!(all[0].kind, BreadcrumbKind::Navigation { .. }));
    assert!(matches!(all[1].kind, BreadcrumbKind::Click { .. }));

    wait_for(|| persisted(&storage).map(|e| e.len()) == Some(2)).await;
}

#[tokio::test]
async fn test_hydration_respects_new_limits() {
    let storage = MemoryStorage::new();
    let earlier = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));
    for i in 0..5 {
        earlier.add(BreadcrumbEvent::click(format!("#b{}", i), None));
    }
    earlier.flush().await.unwrap();

    let manager = BreadcrumbManager::load(config().with_max_items(2), Arc::new(storage)).await;
    let all = manager.get_all();
    assert_eq!(all.len(), 2);
    match &all[0].kind {
        BreadcrumbKind::Click { target, .. } => assert_eq!(target, "#b3"),
        other => panic!("unexpected kind {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_state_is_ignored() {
    let storage = MemoryStorage::new();
    storage.write(KEY, "not json").await.unwrap();

    let manager = BreadcrumbManager::load(config(), Arc::new(storage)).await;
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_failing_provider_never_reaches_add() {
    let manager = BreadcrumbManager::load(config(), Arc::new(Broken)).await;

    manager.add(BreadcrumbEvent::click("#a", None));
    manager.clear();
    manager.add(BreadcrumbEvent::click("#b", None));
    tokio::task::yield_now().await;

    assert_eq!(manager.len(), 1);
    assert!(matches!(
        manager.flush().await,
        Err(BreadcrumbError::Storage(_))
    ));
}

#[tokio::test]
async fn test_correlation_id_round_trips() {
    let storage = MemoryStorage::new();
    let manager = BreadcrumbManager::with_provider(config(), Arc::new(storage.clone()));
    let id = CorrelationId::generate();

    manager.add(BreadcrumbEvent::click("#pay", None).with_correlation_id(id.clone()));
    manager.flush().await.unwrap();

    let restored = BreadcrumbManager::load(config(), Arc::new(storage)).await;
    assert_eq!(restored.get_all()[0].correlation_id, Some(id));
}

#[tokio::test]
async fn test_file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first = BreadcrumbManager::with_provider(
        config(),
        Arc::new(FileStorage::new(dir.path())),
    );
    first.add(BreadcrumbEvent::click("#save", Some("Save".to_string())));
    first.flush().await.unwrap();

    let second = BreadcrumbManager::load(config(), Arc::new(FileStorage::new(dir.path()))).await;
    assert_eq!(second.get_all(), first.get_all());
}
