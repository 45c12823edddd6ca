//! Logger configuration

use crate::correlation_store::RuntimeEnvironment;
use crate::pattern_source::DEFAULT_FETCH_TIMEOUT;
use crate::sink::{LogSink, StdoutSink};
use mts_core::{PiiPattern, ScrubOptions, TelemetryConfig, DEFAULT_SERVICE_NAME};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One-time logger setup
#[derive(Clone)]
pub struct LoggerConfig {
    pub service_name: String,

    /// Suppresses debug entries
    pub production: bool,

    /// Baseline patterns, in effect until a fetch succeeds
    pub patterns: Vec<PiiPattern>,

    /// Append the built-in catalogue to whatever pattern list is active
    pub include_builtin_patterns: bool,

    pub patterns_url: Option<String>,
    pub fetch_timeout: Duration,
    pub scrub_options: ScrubOptions,

    /// Correlation storage strategy; detected when `None`
    pub environment: Option<RuntimeEnvironment>,

    pub sink: Arc<dyn LogSink>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            production: false,
            patterns: Vec::new(),
            include_builtin_patterns: false,
            patterns_url: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            scrub_options: ScrubOptions::default(),
            environment: None,
            sink: Arc::new(StdoutSink),
        }
    }

    /// Build from loaded telemetry configuration
    pub fn from_telemetry_config(config: &TelemetryConfig) -> Self {
        Self {
            service_name: config.service.name.clone(),
            production: config.service.is_production(),
            patterns: config.logger.patterns.clone(),
            include_builtin_patterns: config.logger.use_builtin_patterns,
            patterns_url: config.logger.patterns_url.clone(),
            fetch_timeout: config.logger.fetch_timeout(),
            scrub_options: config.redaction.scrub_options(),
            ..Self::new(config.service.name.clone())
        }
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<PiiPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_builtin_patterns(mut self) -> Self {
        self.include_builtin_patterns = true;
        self
    }

    pub fn with_patterns_url(mut self, url: impl Into<String>) -> Self {
        self.patterns_url = Some(url.into());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_scrub_options(mut self, options: ScrubOptions) -> Self {
        self.scrub_options = options;
        self
    }

    pub fn with_environment(mut self, environment: RuntimeEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("service_name", &self.service_name)
            .field("production", &self.production)
            .field("patterns", &self.patterns.len())
            .field("include_builtin_patterns", &self.include_builtin_patterns)
            .field("patterns_url", &self.patterns_url)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("scrub_options", &self.scrub_options)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mts_core::ConfigLoader;

    #[test]
    fn test_defaults() {
        let config = LoggerConfig::default();
        assert_eq!(config.service_name, "mtsynergy");
        assert!(!config.production);
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.scrub_options.max_depth, 50);
        assert!(config.environment.is_none());
    }

    #[test]
    fn test_from_telemetry_config() {
        let telemetry = ConfigLoader::parse(
            r#"
            [service]
            name = "web"
            environment = "production"

            [logger]
            patterns_url = "http://localhost/pii"
            fetch_timeout_ms = 250
            use_builtin_patterns = true

            [redaction]
            max_depth = 7
        "#,
        )
        .unwrap();

        let config = LoggerConfig::from_telemetry_config(&telemetry);
        assert_eq!(config.service_name, "web");
        assert!(config.production);
        assert!(config.include_builtin_patterns);
        assert_eq!(config.patterns_url.as_deref(), Some("http://localhost/pii"));
        assert_eq!(config.fetch_timeout, Duration::from_millis(250));
        assert_eq!(config.scrub_options.max_depth, 7);
    }
}
