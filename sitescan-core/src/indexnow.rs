//! Change notification through the IndexNow protocol.
//!
//! URLs are POSTed in batches as `{host, key, keyLocation, urlList}`. A batch is
//! accepted on 200 or 202. Transport errors, 429 and 5xx responses are retried
//! with a linearly growing backoff; any other status fails the batch at once.

use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use sitescan_scanner::ResolvedUrl;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const BING_ENDPOINT: &str = "https://api.indexnow.org/indexnow";
pub const YANDEX_ENDPOINT: &str = "https://yandex.com/indexnow";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexNowEndpoint {
    Bing,
    Yandex,
    Custom(String),
}

impl IndexNowEndpoint {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bing" => Some(IndexNowEndpoint::Bing),
            "yandex" => Some(IndexNowEndpoint::Yandex),
            other if other.starts_with("http://") || other.starts_with("https://") => {
                Some(IndexNowEndpoint::Custom(s.to_string()))
            }
            _ => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            IndexNowEndpoint::Bing => BING_ENDPOINT,
            IndexNowEndpoint::Yandex => YANDEX_ENDPOINT,
            IndexNowEndpoint::Custom(url) => url,
        }
    }
}

/// URLs to announce. With `since`, entries last modified before that day are
/// dropped; entries without a parseable `lastmod` are always kept.
pub fn changed_urls(urls: &[ResolvedUrl], since: Option<NaiveDate>) -> Vec<String> {
    urls.iter()
        .filter(|resolved| match (since, lastmod_date(resolved.lastmod.as_deref())) {
            (Some(since), Some(modified)) => modified >= since,
            _ => true,
        })
        .map(|resolved| resolved.url.clone())
        .collect()
}

/// W3C datetime values start with `YYYY-MM-DD`
fn lastmod_date(lastmod: Option<&str>) -> Option<NaiveDate> {
    let date = lastmod?.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionPayload<'a> {
    host: &'a str,
    key: &'a str,
    key_location: &'a str,
    url_list: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl SubmitError {
    fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Transport(_) => true,
            SubmitError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// 0-based batch number
    pub index: usize,
    pub url_count: usize,
    pub attempts: u32,
    /// Accepting status code, or the last error seen
    pub result: Result<u16, SubmitError>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionSummary {
    pub total_urls: usize,
    pub batches: Vec<BatchOutcome>,
}

impl SubmissionSummary {
    pub fn submitted_urls(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.is_success())
            .map(|b| b.url_count)
            .sum()
    }

    pub fn successful_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.is_success()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.batches.iter().all(BatchOutcome::is_success)
    }
}

pub struct IndexNowSubmitter {
    client: Client,
    api_key: String,
    key_location: String,
    endpoint: IndexNowEndpoint,
    batch_size: usize,
    delay: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    timeout: Duration,
}

impl IndexNowSubmitter {
    pub fn new(api_key: impl Into<String>, key_location: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            key_location: key_location.into(),
            endpoint: IndexNowEndpoint::Bing,
            batch_size: 100,
            delay: Duration::from_secs(1),
            max_retries: 2,
            retry_backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: IndexNowEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pause between consecutive batches
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound on each POST
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn batch_count(&self, url_count: usize) -> usize {
        url_count.div_ceil(self.batch_size)
    }

    /// Submit every URL. A failed batch is recorded and the remaining batches still go out.
    pub async fn submit(&self, host: &str, urls: &[String]) -> SubmissionSummary {
        let total_batches = self.batch_count(urls.len());
        let mut summary = SubmissionSummary {
            total_urls: urls.len(),
            batches: Vec::with_capacity(total_batches),
        };

        for (index, batch) in urls.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            info!(
                "Submitting batch {}/{} ({} URLs) to {}",
                index + 1,
                total_batches,
                batch.len(),
                self.endpoint.url()
            );
            let outcome = self.submit_batch(index, host, batch).await;
            match &outcome.result {
                Ok(status) => info!("Batch {} accepted ({})", index + 1, status),
                Err(e) => warn!("Batch {} failed after {} attempts: {}", index + 1, outcome.attempts, e),
            }
            summary.batches.push(outcome);
        }

        summary
    }

    async fn submit_batch(&self, index: usize, host: &str, batch: &[String]) -> BatchOutcome {
        let payload = SubmissionPayload {
            host,
            key: &self.api_key,
            key_location: &self.key_location,
            url_list: batch,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.post(&payload).await;

            let retry = match &result {
                Err(e) => e.is_retryable() && attempts <= self.max_retries,
                Ok(_) => false,
            };
            if !retry {
                return BatchOutcome {
                    index,
                    url_count: batch.len(),
                    attempts,
                    result,
                };
            }

            let backoff = self.retry_backoff * attempts;
            debug!("Retrying batch {} in {:?}", index + 1, backoff);
            tokio::time::sleep(backoff).await;
        }
    }

    async fn post(&self, payload: &SubmissionPayload<'_>) -> Result<u16, SubmitError> {
        let response = self
            .client
            .post(self.endpoint.url())
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if matches!(status, 200 | 202) {
            return Ok(status);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SubmitError::Rejected { status, body })
    }
}
