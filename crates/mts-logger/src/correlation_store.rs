//! Where the current correlation ID lives
//!
//! One store is picked per logger at initialize time:
//!
//! | Runtime | Store | Scope of a value |
//! |---|---|---|
//! | Server (tokio) | [`TaskLocalStore`] | one `with_correlation_id` future |
//! | Browser (wasm) | [`SessionStore`] | the logger instance |
//! | Mobile / no runtime | [`GlobalStore`] | every thread using the logger |

use mts_core::CorrelationId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

tokio::task_local! {
    static TASK_CORRELATION_ID: RefCell<Option<CorrelationId>>;
}

/// Runtime families with distinct correlation storage needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    Server,
    Browser,
    Mobile,
}

impl RuntimeEnvironment {
    /// Detect from the compile target and the presence of a tokio runtime
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            RuntimeEnvironment::Browser
        } else if cfg!(any(target_os = "ios", target_os = "android")) {
            RuntimeEnvironment::Mobile
        } else if tokio::runtime::Handle::try_current().is_ok() {
            RuntimeEnvironment::Server
        } else {
            RuntimeEnvironment::Mobile
        }
    }

    /// Fresh store for this runtime
    pub fn store(self) -> Arc<dyn CorrelationStore> {
        match self {
            RuntimeEnvironment::Server => Arc::new(TaskLocalStore),
            RuntimeEnvironment::Browser => Arc::new(SessionStore::default()),
            RuntimeEnvironment::Mobile => Arc::new(GlobalStore::default()),
        }
    }
}

/// Holds the correlation ID that new log entries pick up
pub trait CorrelationStore: Send + Sync {
    fn get(&self) -> Option<CorrelationId>;

    fn set(&self, id: CorrelationId);

    fn clear(&self);

    fn name(&self) -> &'static str;

    /// Whether values are scoped to a task rather than stored on the instance
    fn is_task_scoped(&self) -> bool {
        false
    }
}

/// Task-local storage: each request future sees only its own ID
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskLocalStore;

impl TaskLocalStore {
    /// Run `fut` with `id` as its correlation ID
    pub async fn scope<F: Future>(id: CorrelationId, fut: F) -> F::Output {
        TASK_CORRELATION_ID.scope(RefCell::new(Some(id)), fut).await
    }

    /// Run `f` synchronously with `id` as its correlation ID
    pub fn sync_scope<R>(id: CorrelationId, f: impl FnOnce() -> R) -> R {
        TASK_CORRELATION_ID.sync_scope(RefCell::new(Some(id)), f)
    }
}

impl CorrelationStore for TaskLocalStore {
    fn get(&self) -> Option<CorrelationId> {
        TASK_CORRELATION_ID
            .try_with(|cell| cell.borrow().clone())
            .ok()
            .flatten()
    }

    fn set(&self, id: CorrelationId) {
        if TASK_CORRELATION_ID
            .try_with(|cell| *cell.borrow_mut() = Some(id))
            .is_err()
        {
            warn!("Correlation ID set outside a correlation scope; ignoring");
        }
    }

    fn clear(&self) {
        let _ = TASK_CORRELATION_ID.try_with(|cell| cell.borrow_mut().take());
    }

    fn name(&self) -> &'static str {
        "task-local"
    }

    fn is_task_scoped(&self) -> bool {
        true
    }
}

/// Per-instance storage, the analogue of browser session storage
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<CorrelationId>>,
}

impl CorrelationStore for SessionStore {
    fn get(&self) -> Option<CorrelationId> {
        self.current.read().clone()
    }

    fn set(&self, id: CorrelationId) {
        *self.current.write() = Some(id);
    }

    fn clear(&self) {
        *self.current.write() = None;
    }

    fn name(&self) -> &'static str {
        "session"
    }
}

/// Storage shared by every thread and clone; one value for the whole logger
#[derive(Debug, Default, Clone)]
pub struct GlobalStore {
    current: Arc<RwLock<Option<CorrelationId>>>,
}

impl CorrelationStore for GlobalStore {
    fn get(&self) -> Option<CorrelationId> {
        self.current.read().clone()
    }

    fn set(&self, id: CorrelationId) {
        *self.current.write() = Some(id);
    }

    fn clear(&self) {
        *self.current.write() = None;
    }

    fn name(&self) -> &'static str {
        "global"
    }
}
