//! The logger facade
//!
//! Every logging call is fail-open: before `initialize` the entry is dropped
//! with a diagnostic, and serialization or sink failures are reported through
//! `tracing` rather than returned.

use crate::config::LoggerConfig;
use crate::correlation_store::{CorrelationStore, RuntimeEnvironment, TaskLocalStore};
use crate::entry::{stack_trace, LogEntry, LogLevel};
use crate::error::{LoggerError, LoggerResult};
use crate::pattern_source::PatternSource;
use crate::sink::LogSink;
use chrono::Utc;
use mts_core::pii::{builtin_pattern_set, Map};
use mts_core::{CorrelationId, PatternSet, PiiPattern, PiiScrubber, ScrubOptions, Value};
use parking_lot::RwLock;
use std::error::Error;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_ID_KEY: &str = "userId";
const WORKSPACE_ID_KEY: &str = "workspaceId";

/// Wait for a shared context root that is being written elsewhere
const SHARED_ROOT_TIMEOUT: Duration = Duration::from_millis(100);

static GLOBAL: LazyLock<Logger> = LazyLock::new(Logger::new);

/// Active scrubber, swapped wholesale when fresher patterns arrive
#[derive(Clone)]
struct ScrubberSlot {
    scrubber: Arc<RwLock<Arc<PiiScrubber>>>,
    include_builtin: bool,
}

impl ScrubberSlot {
    fn new(patterns: &[PiiPattern], include_builtin: bool) -> Self {
        Self {
            scrubber: Arc::new(RwLock::new(Arc::new(build_scrubber(patterns, include_builtin)))),
            include_builtin,
        }
    }

    fn current(&self) -> Arc<PiiScrubber> {
        Arc::clone(&self.scrubber.read())
    }

    fn replace(&self, patterns: &[PiiPattern]) -> usize {
        let scrubber = build_scrubber(patterns, self.include_builtin);
        let count = scrubber.patterns().len();
        *self.scrubber.write() = Arc::new(scrubber);
        count
    }
}

fn build_scrubber(patterns: &[PiiPattern], include_builtin: bool) -> PiiScrubber {
    let mut set = PatternSet::compile(patterns);
    if include_builtin {
        for pattern in builtin_pattern_set().iter() {
            set.push(pattern.clone());
        }
    }
    PiiScrubber::from_pattern_set(set)
}

struct LoggerState {
    service_name: String,
    production: bool,
    scrubber: ScrubberSlot,
    scrub_options: ScrubOptions,
    store: Arc<dyn CorrelationStore>,
    sink: Arc<dyn LogSink>,
    patterns_url: Option<String>,
    fetch_timeout: Duration,
}

/// Structured, PII-scrubbing logger
pub struct Logger {
    state: RwLock<Option<LoggerState>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Uninitialized logger; most code should use [`Logger::global`]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Process-wide logger
    pub fn global() -> &'static Logger {
        &GLOBAL
    }

    /// Configure the logger.
    ///
    /// Only the first call takes effect; later calls warn and return `false`.
    /// With a pattern URL and a tokio runtime, a background fetch is started
    /// that swaps in the fetched patterns on success.
    pub fn initialize(&self, config: LoggerConfig) -> bool {
        let mut state = self.state.write();
        if let Some(existing) = state.as_ref() {
            warn!(
                "Logger already initialized for {}; ignoring re-initialization",
                existing.service_name
            );
            return false;
        }

        let environment = config.environment.unwrap_or_else(RuntimeEnvironment::detect);
        let store = environment.store();
        let scrubber = ScrubberSlot::new(&config.patterns, config.include_builtin_patterns);

        info!(
            service = %config.service_name,
            store = store.name(),
            patterns = scrubber.current().patterns().len(),
            "Logger initialized"
        );

        if let Some(url) = &config.patterns_url {
            spawn_pattern_refresh(
                PatternSource::new(url.clone()).with_timeout(config.fetch_timeout),
                scrubber.clone(),
            );
        }

        *state = Some(LoggerState {
            service_name: config.service_name,
            production: config.production,
            scrubber,
            scrub_options: config.scrub_options,
            store,
            sink: config.sink,
            patterns_url: config.patterns_url,
            fetch_timeout: config.fetch_timeout,
        });
        true
    }

    /// Discard all state so the logger can be initialized again
    pub fn reset(&self) {
        if let Some(state) = self.state.write().take() {
            state.store.clear();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn service_name(&self) -> Option<String> {
        self.state.read().as_ref().map(|s| s.service_name.clone())
    }

    /// Number of compiled patterns currently applied
    pub fn active_pattern_count(&self) -> usize {
        self.state
            .read()
            .as_ref()
            .map(|s| s.scrubber.current().patterns().len())
            .unwrap_or(0)
    }

    /// Fetch patterns from the configured URL now and swap them in.
    ///
    /// On failure the current patterns stay in effect.
    pub async fn refresh_patterns(&self) -> LoggerResult<usize> {
        let (source, slot) = {
            let state = self.state.read();
            let state = state.as_ref().ok_or(LoggerError::NotInitialized)?;
            let url = state
                .patterns_url
                .clone()
                .ok_or(LoggerError::NoPatternSource)?;
            (
                PatternSource::new(url).with_timeout(state.fetch_timeout),
                state.scrubber.clone(),
            )
        };

        let patterns = source.fetch().await?;
        Ok(slot.replace(&patterns))
    }

    /// Current correlation ID from the configured store
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.state.read().as_ref().and_then(|s| s.store.get())
    }

    /// Store `id` for subsequent entries.
    ///
    /// With the task-local store (the default inside a tokio runtime) this only
    /// takes effect inside [`Logger::with_correlation_id`]; outside a scope the
    /// call is ignored with a warning.
    pub fn set_correlation_id(&self, id: CorrelationId) {
        match self.state.read().as_ref() {
            Some(state) => state.store.set(id),
            None => warn!("Logger not initialized; correlation ID not stored"),
        }
    }

    pub fn clear_correlation_id(&self) {
        if let Some(state) = self.state.read().as_ref() {
            state.store.clear();
        }
    }

    /// Run `fut` with `id` as the correlation ID of every entry it logs.
    ///
    /// With task-local storage the ID is scoped to `fut`; with instance or
    /// process storage it is set for the duration and the previous value is
    /// restored afterwards.
    pub async fn with_correlation_id<F: Future>(&self, id: CorrelationId, fut: F) -> F::Output {
        let store = self.state.read().as_ref().map(|s| Arc::clone(&s.store));
        match store {
            Some(store) if !store.is_task_scoped() => {
                let previous = store.get();
                store.set(id);
                let output = fut.await;
                match previous {
                    Some(previous) => store.set(previous),
                    None => store.clear(),
                }
                output
            }
            _ => TaskLocalStore::scope(id, fut).await,
        }
    }

    pub fn debug(&self, message: &str, context: Option<Value>) {
        self.log(LogLevel::Debug, message, context, None);
    }

    pub fn info(&self, message: &str, context: Option<Value>) {
        self.log(LogLevel::Info, message, context, None);
    }

    pub fn warn(&self, message: &str, context: Option<Value>) {
        self.log(LogLevel::Warn, message, context, None);
    }

    /// Log at error level; `error` and its source chain become `stackTrace`
    pub fn error(&self, message: &str, context: Option<Value>, error: Option<&(dyn Error + 'static)>) {
        self.log(LogLevel::Error, message, context, error);
    }

    /// Build, scrub and emit one entry
    pub fn log(
        &self,
        level: LogLevel,
        message: &str,
        context: Option<Value>,
        error: Option<&(dyn Error + 'static)>,
    ) {
        let state = self.state.read();
        let Some(state) = state.as_ref() else {
            warn!("Logger used before initialize; dropping {} entry", level);
            return;
        };

        if level == LogLevel::Debug && state.production {
            return;
        }

        let scrubber = state.scrubber.current();
        let (user_id, workspace_id, context) = split_identity(context);

        let stack_trace = match (level, error) {
            (LogLevel::Error, Some(err)) => Some(scrubber.apply_patterns(&stack_trace(err))),
            _ => None,
        };

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            correlation_id: state.store.get(),
            user_id,
            workspace_id,
            service: state.service_name.clone(),
            message: scrubber.apply_patterns(message),
            stack_trace,
            context: context.map(|c| scrubber.scrub(&c, &state.scrub_options)),
        };

        match entry.to_json_line() {
            Ok(line) => state.sink.write_line(&line),
            Err(e) => warn!("Failed to serialize log entry: {}", e),
        }
    }
}

/// Pull `userId`/`workspaceId` out of an object context.
///
/// A shared root is read through. String and number values are lifted; other
/// shapes stay in the context. An object left empty is dropped.
fn split_identity(context: Option<Value>) -> (Option<String>, Option<String>, Option<Value>) {
    let mut map = match context {
        Some(Value::Object(map)) => map,
        Some(Value::Shared(node)) => {
            let root = node
                .try_read_for(SHARED_ROOT_TIMEOUT)
                .and_then(|value| value.as_object().cloned());
            match root {
                Some(map) => map,
                None => return (None, None, Some(Value::Shared(node))),
            }
        }
        other => return (None, None, other),
    };

    let user_id = lift(&mut map, USER_ID_KEY);
    let workspace_id = lift(&mut map, WORKSPACE_ID_KEY);
    let context = (!map.is_empty()).then_some(Value::Object(map));
    (user_id, workspace_id, context)
}

fn lift(map: &mut Map, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(_) | Value::Number(_) => {}
        _ => return None,
    }
    match map.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn spawn_pattern_refresh(source: PatternSource, slot: ScrubberSlot) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(
            "No async runtime; skipping pattern fetch from {} and keeping baseline patterns",
            source.url()
        );
        return;
    };

    handle.spawn(async move {
        match source.fetch().await {
            Ok(patterns) => {
                let count = slot.replace(&patterns);
                debug!("Swapped in {} fetched PII patterns", count);
            }
            Err(e) => warn!("Pattern fetch failed, keeping baseline patterns: {}", e),
        }
    });
}
