use crate::aggregate::{AnalysisReport, ResultAggregator};
use crate::cancel::CancelToken;
use crate::client::{Followed, HttpClient, Method, follow_redirects};
use crate::error::RedirectError;
use crate::result::{FailureKind, ProbeOutcome, ProbeResult};
use crate::seo::{PageSignals, extract_signals, is_html};
use crate::sitemap::ResolvedUrl;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Called with the worker id and URL each time a probe completes.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Which request a probe starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStrategy {
    /// GET every page and extract its SEO signals
    #[default]
    Get,
    /// HEAD only, retried as GET when the server answers 405 or 501
    Head,
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub concurrency: usize,
    /// Bounds one URL's whole probe, fallback request and redirect hops included
    pub per_request_timeout: Duration,
    pub max_redirects: usize,
    pub strategy: ProbeStrategy,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            per_request_timeout: Duration::from_secs(30),
            max_redirects: 5,
            strategy: ProbeStrategy::Get,
        }
    }
}

/// Fixed-size pool of workers draining one shared queue of URLs.
pub struct ProbeWorkerPool {
    client: Arc<dyn HttpClient>,
    options: ProbeOptions,
    progress_callback: Option<ProgressCallback>,
}

impl ProbeWorkerPool {
    pub fn new(client: Arc<dyn HttpClient>, options: ProbeOptions) -> Self {
        Self {
            client,
            options,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.options.concurrency.max(1)
    }

    /// Probe every URL and return the report in discovery order.
    pub async fn probe(&self, urls: &[ResolvedUrl], cancel: CancelToken) -> AnalysisReport {
        let shared: Arc<[ResolvedUrl]> = urls.into();
        let (tx, rx) = mpsc::channel(self.concurrency() * 2);

        let started = Instant::now();
        let handles = self.run(shared, tx, cancel);

        let mut aggregator = ResultAggregator::new(urls.to_vec());
        aggregator.collect(rx).await;

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!("Probe worker failed: {}", e);
            }
        }

        let report = aggregator.finish();
        info!(
            "Probed {}/{} URLs in {:?} ({} succeeded, {} failed)",
            report.summary.total - report.summary.pending,
            report.summary.total,
            started.elapsed(),
            report.summary.succeeded,
            report.summary.failed
        );
        report
    }

    /// Spawn exactly `concurrency` workers. Each result is sent on `sink` as soon
    /// as it completes; the channel closes once every worker has exited.
    pub fn run(
        &self,
        urls: Arc<[ResolvedUrl]>,
        sink: mpsc::Sender<ProbeResult>,
        cancel: CancelToken,
    ) -> Vec<JoinHandle<()>> {
        let workers = self.concurrency();
        info!("Probing {} URLs with {} workers", urls.len(), workers);

        let queue: Arc<Mutex<VecDeque<usize>>> = Arc::new(Mutex::new((0..urls.len()).collect()));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let client = self.client.clone();
            let options = self.options.clone();
            let progress_cb = self.progress_callback.clone();
            let urls = urls.clone();
            let queue = queue.clone();
            let sink = sink.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                debug!("Worker {} started", worker_id);

                loop {
                    if cancel.is_cancelled() {
                        debug!("Worker {} stopping: run cancelled", worker_id);
                        break;
                    }

                    let next = queue.lock().await.pop_front();
                    let Some(position) = next else {
                        break;
                    };
                    let target = &urls[position];

                    let result = probe_url(client.as_ref(), target, &options).await;
                    if let Some(ref callback) = progress_cb {
                        callback(worker_id, target.url.clone());
                    }
                    if sink.send(result).await.is_err() {
                        warn!("Result sink closed, worker {} exiting", worker_id);
                        break;
                    }
                }

                debug!("Worker {} finished", worker_id);
            });

            handles.push(handle);
        }

        handles
    }
}

/// Probe a single URL. Never fails: every problem is classified into the outcome.
pub async fn probe_url(
    client: &dyn HttpClient,
    target: &ResolvedUrl,
    options: &ProbeOptions,
) -> ProbeResult {
    let started = Instant::now();

    let outcome = match tokio::time::timeout(
        options.per_request_timeout,
        fetch_terminal(client, &target.url, options),
    )
    .await
    {
        Ok(fetched) => classify(fetched, started.elapsed()),
        Err(_) => ProbeOutcome::Failure {
            kind: FailureKind::Network,
            message: "timeout".to_string(),
            http_status: None,
        },
    };

    if let ProbeOutcome::Failure { kind, ref message, .. } = outcome {
        debug!("Probe of {} failed ({}): {}", target.url, kind, message);
    }

    ProbeResult::new(target.order_index, target.url.clone(), outcome)
}

async fn fetch_terminal(
    client: &dyn HttpClient,
    url: &str,
    options: &ProbeOptions,
) -> Result<Followed, RedirectError> {
    let timeout = options.per_request_timeout;
    let limit = options.max_redirects;

    match options.strategy {
        ProbeStrategy::Get => follow_redirects(client, Method::Get, url, timeout, limit).await,
        ProbeStrategy::Head => {
            let followed = follow_redirects(client, Method::Head, url, timeout, limit).await?;
            if matches!(followed.response.status, 405 | 501) {
                debug!("HEAD not supported by {}, retrying with GET", url);
                follow_redirects(client, Method::Get, url, timeout, limit).await
            } else {
                Ok(followed)
            }
        }
    }
}

fn classify(fetched: Result<Followed, RedirectError>, latency: Duration) -> ProbeOutcome {
    let followed = match fetched {
        Ok(followed) => followed,
        Err(RedirectError::Transport(e)) => {
            return ProbeOutcome::Failure {
                kind: FailureKind::Network,
                message: e.to_string(),
                http_status: None,
            };
        }
        Err(e @ RedirectError::TooManyRedirects { .. }) => {
            return ProbeOutcome::Failure {
                kind: FailureKind::TooManyRedirects,
                message: e.to_string(),
                http_status: None,
            };
        }
    };

    let response = &followed.response;
    if !response.is_success() {
        return ProbeOutcome::Failure {
            kind: FailureKind::HttpStatus,
            message: response.status.to_string(),
            http_status: Some(response.status),
        };
    }

    let signals = if is_html(response.content_type()) && !response.body.is_empty() {
        extract_signals(&String::from_utf8_lossy(&response.body))
    } else {
        PageSignals::default()
    };

    ProbeOutcome::Success {
        http_status: response.status,
        latency,
        content_length: response.content_length(),
        final_url: followed.final_url.clone(),
        redirect_chain: followed.chain.clone(),
        signals,
    }
}
