use indicatif::{ProgressBar, ProgressStyle};
use sitescan_scanner::{
    AnalysisReport, CancelToken, HttpClient, ProbeOptions, ProbeStrategy, ProbeWorkerPool,
    ReqwestClient, ResolveOptions, ResolvedUrl, ScanError, SitemapResolver,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Options for configuring an analysis run
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub concurrency: usize,
    pub per_request_timeout: Duration,
    pub max_redirects: usize,
    pub strategy: ProbeStrategy,
    pub show_progress_bars: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            per_request_timeout: Duration::from_secs(30),
            max_redirects: 5,
            strategy: ProbeStrategy::Get,
            show_progress_bars: false,
        }
    }
}

impl AnalyzeOptions {
    fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            concurrency: self.concurrency,
            per_request_timeout: self.per_request_timeout,
            max_redirects: self.max_redirects,
            strategy: self.strategy,
        }
    }
}

/// Fetch a sitemap (or sitemap index) and flatten it into the ordered URL list
pub async fn resolve_sitemap(
    url: &str,
    options: &ResolveOptions,
) -> Result<Vec<ResolvedUrl>, ScanError> {
    let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
    resolve_sitemap_with(client, url, options).await
}

pub async fn resolve_sitemap_with(
    client: Arc<dyn HttpClient>,
    url: &str,
    options: &ResolveOptions,
) -> Result<Vec<ResolvedUrl>, ScanError> {
    let resolver = SitemapResolver::new(client, options.clone());
    let urls = resolver.resolve(url).await?;
    info!("Resolved {} URLs from {}", urls.len(), url);
    Ok(urls)
}

/// Probe every URL with a fresh HTTP client. Only fails if the client cannot be built.
pub async fn analyze_urls(
    urls: &[ResolvedUrl],
    options: AnalyzeOptions,
    cancel: CancelToken,
) -> Result<AnalysisReport, ScanError> {
    let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
    Ok(analyze_urls_with(client, urls, options, cancel).await)
}

pub async fn analyze_urls_with(
    client: Arc<dyn HttpClient>,
    urls: &[ResolvedUrl],
    options: AnalyzeOptions,
    cancel: CancelToken,
) -> AnalysisReport {
    let progress_bar = if options.show_progress_bars {
        let pb = ProgressBar::new(urls.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message("Probing...");
        Some(pb)
    } else {
        None
    };

    let mut pool = ProbeWorkerPool::new(client, options.probe_options());

    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        let completed = Arc::new(AtomicUsize::new(0));
        pool = pool.with_progress_callback(Arc::new(move |_worker_id: usize, url: String| {
            let count = completed.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_position(count as u64);
            pb.set_message(url);
        }));
    }

    let report = pool.probe(urls, cancel).await;

    if let Some(pb) = progress_bar {
        let summary = &report.summary;
        pb.set_position((summary.total - summary.pending) as u64);
        if report.complete {
            pb.finish_with_message(format!(
                "Analysis complete! {} succeeded, {} failed",
                summary.succeeded, summary.failed
            ));
        } else {
            pb.abandon_with_message(format!(
                "Analysis cancelled, {} URLs not probed",
                summary.pending
            ));
        }
    }

    report
}
