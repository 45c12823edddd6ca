//! Bounded breadcrumb queue

use crate::error::BreadcrumbResult;
use crate::event::BreadcrumbEvent;
use crate::storage::{select_provider, MemoryStorage, PersistenceProvider};
use mts_core::config::{BreadcrumbSettings, DEFAULT_BREADCRUMB_STORAGE_KEY};
use mts_core::{PiiScrubber, TelemetryConfig};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static GLOBAL: LazyLock<BreadcrumbManager> = LazyLock::new(BreadcrumbManager::new);

/// Fixed redaction applied to every breadcrumb
static SCRUBBER: LazyLock<PiiScrubber> = LazyLock::new(PiiScrubber::builtin);

/// Queue limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreadcrumbConfig {
    pub max_items: usize,
    pub max_size_kb: usize,
    pub storage_key: String,
}

impl Default for BreadcrumbConfig {
    fn default() -> Self {
        Self {
            max_items: 50,
            max_size_kb: 50,
            storage_key: DEFAULT_BREADCRUMB_STORAGE_KEY.to_string(),
        }
    }
}

impl BreadcrumbConfig {
    pub fn from_settings(settings: &BreadcrumbSettings) -> Self {
        Self {
            max_items: settings.max_items,
            max_size_kb: settings.max_size_kb,
            storage_key: settings.storage_key.clone(),
        }
    }

    pub fn from_telemetry_config(config: &TelemetryConfig) -> Self {
        Self::from_settings(&config.breadcrumbs)
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_max_size_kb(mut self, max_size_kb: usize) -> Self {
        self.max_size_kb = max_size_kb;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_size_kb.saturating_mul(1024)
    }
}

/// Snapshot of queue occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreadcrumbStats {
    pub count: usize,
    pub total_size_bytes: usize,
    pub max_items: usize,
    pub max_size_bytes: usize,
    pub storage: String,
}

struct Stored {
    event: BreadcrumbEvent,
    size: usize,
}

/// Last sequence number handed to the provider.
///
/// Held across the provider call so writes land one at a time and in order.
#[derive(Default)]
struct PersistGate {
    last: tokio::sync::Mutex<u64>,
}

enum PersistJob {
    Write(String),
    Delete,
}

struct PersistTask {
    provider: Arc<dyn PersistenceProvider>,
    gate: Arc<PersistGate>,
    key: String,
    seq: u64,
    job: PersistJob,
}

impl PersistTask {
    async fn run(self) -> BreadcrumbResult<()> {
        let mut last = self.gate.last.lock().await;
        if self.seq <= *last {
            debug!(
                "Skipping stale breadcrumb write {} (already at {})",
                self.seq, *last
            );
            return Ok(());
        }
        *last = self.seq;

        match &self.job {
            PersistJob::Write(snapshot) => self.provider.write(&self.key, snapshot).await,
            PersistJob::Delete => self.provider.delete(&self.key).await,
        }
    }

    /// Run in the background; failures are logged
    fn spawn(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let provider = self.provider.name().to_string();
                    if let Err(e) = self.run().await {
                        warn!("Breadcrumb persistence to {} failed: {}", provider, e);
                    }
                });
            }
            Err(_) => debug!("No async runtime, skipping breadcrumb persistence"),
        }
    }
}

struct QueueState {
    config: BreadcrumbConfig,
    queue: VecDeque<Stored>,
    total_size: usize,
    provider: Arc<dyn PersistenceProvider>,
    seq: u64,
    gate: Arc<PersistGate>,
}

impl QueueState {
    fn new(config: BreadcrumbConfig, provider: Arc<dyn PersistenceProvider>) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            total_size: 0,
            provider,
            seq: 0,
            gate: Arc::new(PersistGate::default()),
        }
    }

    /// Append, evicting from the head until the limits hold.
    ///
    /// An event that could never fit is dropped and the queue is left alone.
    fn admit(&mut self, event: BreadcrumbEvent, size: usize) -> bool {
        let max_items = self.config.max_items;
        let max_bytes = self.config.max_bytes();

        if max_items == 0 || size > max_bytes {
            warn!(
                "Dropping breadcrumb of {} bytes (limit {} bytes, {} items)",
                size, max_bytes, max_items
            );
            return false;
        }

        while self.queue.len() >= max_items || self.total_size + size > max_bytes {
            match self.queue.pop_front() {
                Some(evicted) => self.total_size -= evicted.size,
                None => break,
            }
        }

        self.queue.push_back(Stored { event, size });
        self.total_size += size;
        true
    }

    fn task(&mut self, job: PersistJob) -> PersistTask {
        self.seq += 1;
        PersistTask {
            provider: self.provider.clone(),
            gate: self.gate.clone(),
            key: self.config.storage_key.clone(),
            seq: self.seq,
            job,
        }
    }

    fn snapshot_task(&mut self) -> BreadcrumbResult<PersistTask> {
        let events: Vec<&BreadcrumbEvent> = self.queue.iter().map(|s| &s.event).collect();
        let snapshot = serde_json::to_string(&events)?;
        Ok(self.task(PersistJob::Write(snapshot)))
    }
}

fn measure(event: &BreadcrumbEvent) -> Option<usize> {
    match event.size_bytes() {
        Ok(size) => Some(size),
        Err(e) => {
            warn!("Failed to serialize breadcrumb: {}", e);
            None
        }
    }
}

/// FIFO of recent user interactions, redacted on the way in
pub struct BreadcrumbManager {
    state: Mutex<QueueState>,
}

impl Default for BreadcrumbManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BreadcrumbManager {
    /// Default limits with storage picked for the current runtime
    pub fn new() -> Self {
        Self::with_provider(
            BreadcrumbConfig::default(),
            select_provider(Default::default(), None),
        )
    }

    pub fn with_provider(config: BreadcrumbConfig, provider: Arc<dyn PersistenceProvider>) -> Self {
        Self {
            state: Mutex::new(QueueState::new(config, provider)),
        }
    }

    /// Build from loaded configuration, resolving the storage backend
    pub fn from_settings(settings: &BreadcrumbSettings) -> Self {
        Self::with_provider(
            BreadcrumbConfig::from_settings(settings),
            select_provider(settings.storage, settings.storage_dir.as_deref()),
        )
    }

    /// Construct and hydrate from `provider`
    pub async fn load(config: BreadcrumbConfig, provider: Arc<dyn PersistenceProvider>) -> Self {
        let manager = Self::with_provider(config.clone(), Arc::new(MemoryStorage::new()));
        manager.initialize(config, provider).await;
        manager
    }

    /// Process-wide manager
    pub fn global() -> &'static BreadcrumbManager {
        &GLOBAL
    }

    /// Install new limits and storage, hydrating from what was persisted.
    ///
    /// Persisted events come first, then anything added before this call.
    /// Unreadable state is logged and treated as empty. Returns the number of
    /// events loaded from storage.
    pub async fn initialize(
        &self,
        config: BreadcrumbConfig,
        provider: Arc<dyn PersistenceProvider>,
    ) -> usize {
        let persisted = match provider.read(&config.storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<BreadcrumbEvent>>(&raw) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Ignoring unreadable persisted breadcrumbs: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read breadcrumbs from {}: {}", provider.name(), e);
                Vec::new()
            }
        };
        let hydrated = persisted.len();

        let task = {
            let mut state = self.state.lock();
            let pending: Vec<BreadcrumbEvent> = state.queue.drain(..).map(|s| s.event).collect();
            let has_pending = !pending.is_empty();

            *state = QueueState::new(config, provider);
            for event in persisted.into_iter().chain(pending) {
                if let Some(size) = measure(&event) {
                    state.admit(event, size);
                }
            }

            info!(
                "Breadcrumbs initialized: {} restored, {} queued, storage {}",
                hydrated,
                state.queue.len(),
                state.provider.name()
            );

            if has_pending {
                state.snapshot_task().ok()
            } else {
                None
            }
        };

        if let Some(task) = task {
            task.spawn();
        }
        hydrated
    }

    /// Redact and append one event, then persist in the background
    pub fn add(&self, event: BreadcrumbEvent) {
        let event = event.redacted(&SCRUBBER);
        let Some(size) = measure(&event) else {
            return;
        };

        let task = {
            let mut state = self.state.lock();
            if !state.admit(event, size) {
                return;
            }
            state.snapshot_task()
        };

        match task {
            Ok(task) => task.spawn(),
            Err(e) => warn!("Failed to snapshot breadcrumbs: {}", e),
        }
    }

    /// Copy of the queue, oldest first
    pub fn get_all(&self) -> Vec<BreadcrumbEvent> {
        self.state.lock().queue.iter().map(|s| s.event.clone()).collect()
    }

    /// Empty the queue and delete the persisted copy
    pub fn clear(&self) {
        let task = {
            let mut state = self.state.lock();
            state.queue.clear();
            state.total_size = 0;
            state.task(PersistJob::Delete)
        };
        task.spawn();
    }

    /// Persist the current queue and wait for the write
    pub async fn flush(&self) -> BreadcrumbResult<()> {
        let task = self.state.lock().snapshot_task()?;
        task.run().await
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Sum of serialized event sizes
    pub fn total_size_bytes(&self) -> usize {
        self.state.lock().total_size
    }

    pub fn stats(&self) -> BreadcrumbStats {
        let state = self.state.lock();
        BreadcrumbStats {
            count: state.queue.len(),
            total_size_bytes: state.total_size,
            max_items: state.config.max_items,
            max_size_bytes: state.config.max_bytes(),
            storage: state.provider.name().to_string(),
        }
    }

    /// Discard everything and fall back to defaults with in-memory storage
    pub fn reset(&self) {
        *self.state.lock() =
            QueueState::new(BreadcrumbConfig::default(), Arc::new(MemoryStorage::new()));
    }
}
