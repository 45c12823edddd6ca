//! Remote PII pattern source

use crate::error::{LoggerError, LoggerResult};
use mts_core::pii::validate_all;
use mts_core::PiiPattern;
use std::time::Duration;
use tracing::{debug, info};

/// Default bound on a pattern fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches a JSON array of `{name, pattern, replacement}` from a URL
#[derive(Debug, Clone)]
pub struct PatternSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl PatternSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and validate the pattern list.
    ///
    /// The whole request, body included, is abandoned once the timeout
    /// elapses. Every pattern must validate; one bad entry rejects the list.
    pub async fn fetch(&self) -> LoggerResult<Vec<PiiPattern>> {
        debug!("Fetching PII patterns from {}", self.url);

        let patterns = tokio::time::timeout(self.timeout, self.request())
            .await
            .map_err(|_| LoggerError::FetchTimeout(self.timeout))??;

        if patterns.is_empty() {
            return Err(LoggerError::EmptyPatternSet);
        }
        validate_all(&patterns)?;

        info!("Fetched {} PII patterns from {}", patterns.len(), self.url);
        Ok(patterns)
    }

    async fn request(&self) -> LoggerResult<Vec<PiiPattern>> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(LoggerError::Http {
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
