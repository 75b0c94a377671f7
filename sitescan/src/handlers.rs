use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::ArgMatches;
use colored::Colorize;
use sitescan_core::analyze::{AnalyzeOptions, analyze_urls, resolve_sitemap};
use sitescan_core::indexnow::{IndexNowEndpoint, IndexNowSubmitter, changed_urls};
use sitescan_core::report::{
    ReportFormat, default_report_path, frequent_issues, generate_report, issue_totals,
    report_rows, save_report,
};
use sitescan_scanner::seo::IssueSeverity;
use sitescan_scanner::{
    AnalysisReport, CancelSource, CancelToken, ProbeStrategy, ResolveOptions, ResolvedUrl,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

const UNAVAILABLE_SHOWN: usize = 10;

/// Log filter for the given `-v` count; `RUST_LOG` takes precedence when set
pub fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn parse_since(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected a date as YYYY-MM-DD: {}", e))
}

pub fn parse_endpoint(s: &str) -> Result<IndexNowEndpoint, String> {
    IndexNowEndpoint::from_str(s)
        .ok_or_else(|| format!("unknown endpoint '{}' (use bing, yandex or a URL)", s))
}

/// `host[:port]` of the sitemap URL, used as the IndexNow host by default
pub fn sitemap_host(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Timestamped report path under a `~`-expandable prefix
pub fn report_path(prefix: &str, format: ReportFormat) -> PathBuf {
    let expanded = shellexpand::tilde(prefix);
    default_report_path(&expanded, format, chrono::Local::now().naive_local())
}

pub fn format_url_list(urls: &[ResolvedUrl]) -> String {
    let mut out = String::new();
    for resolved in urls {
        out.push_str(&resolved.url);
        out.push('\n');
    }
    out
}

/// Up to `limit` failed URLs with their status cell, in discovery order
pub fn unavailable_urls(report: &AnalysisReport, limit: usize) -> Vec<(String, String)> {
    report_rows(report)
        .into_iter()
        .filter(|row| !row.status.starts_with('2'))
        .take(limit)
        .map(|row| (row.url, row.status))
        .collect()
}

/// Cancellation wired to Ctrl-C and an optional deadline
fn run_cancel_token(deadline: Option<Duration>) -> CancelToken {
    let source = Arc::new(CancelSource::new());
    let token = source.token();

    let on_signal = source.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight probes");
            eprintln!("\n{} Interrupted, writing partial report...", "⚠".yellow().bold());
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            info!("Deadline of {:?} reached, cancelling run", deadline);
            source.cancel();
        });
    }

    token
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn resolve_options(sub_matches: &ArgMatches) -> ResolveOptions {
    ResolveOptions {
        max_depth: *sub_matches.get_one::<usize>("max-depth").unwrap_or(&5),
        http_timeout: Duration::from_secs(*sub_matches.get_one::<u64>("timeout").unwrap_or(&30)),
        ..ResolveOptions::default()
    }
}

async fn resolve_urls(sitemap_url: &Url, options: &ResolveOptions) -> Result<Vec<ResolvedUrl>> {
    println!("{} Parsing sitemap: {}", "→".blue(), sitemap_url.as_str().bright_white());

    let urls = resolve_sitemap(sitemap_url.as_str(), options)
        .await
        .with_context(|| format!("failed to resolve sitemap {}", sitemap_url))?;

    if urls.is_empty() {
        return Err(anyhow!("No URLs found in sitemap"));
    }
    println!("{} Found {} URLs", "✓".green().bold(), urls.len());
    Ok(urls)
}

pub async fn handle_resolve(sub_matches: &ArgMatches) -> Result<()> {
    let sitemap_url = sub_matches
        .get_one::<Url>("SITEMAP_URL")
        .context("missing sitemap URL")?;
    let output = sub_matches.get_one::<String>("output");

    let urls = resolve_urls(sitemap_url, &resolve_options(sub_matches)).await?;
    let listing = format_url_list(&urls);

    match output {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).as_ref());
            save_report(&listing, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} URL list saved to: {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", listing),
    }
    Ok(())
}

pub async fn handle_analyze(sub_matches: &ArgMatches) -> Result<()> {
    let sitemap_url = sub_matches
        .get_one::<Url>("SITEMAP_URL")
        .context("missing sitemap URL")?;
    let quiet = sub_matches.get_flag("quiet");
    let threads = *sub_matches.get_one::<usize>("threads").unwrap_or(&10);
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&30);
    let max_redirects = *sub_matches.get_one::<usize>("max-redirects").unwrap_or(&5);
    let prefix = sub_matches
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or("seo_report");
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Csv);
    let deadline = sub_matches
        .get_one::<u64>("deadline")
        .map(|secs| Duration::from_secs(*secs));

    let urls = resolve_urls(sitemap_url, &resolve_options(sub_matches)).await?;

    println!("Workers: {}", threads);
    println!("Timeout: {}s\n", timeout);

    let options = AnalyzeOptions {
        concurrency: threads,
        per_request_timeout: Duration::from_secs(timeout),
        max_redirects,
        strategy: ProbeStrategy::Get,
        show_progress_bars: !quiet,
    };
    let report = analyze_urls(&urls, options, run_cancel_token(deadline)).await?;

    let path = report_path(prefix, format);
    let content = generate_report(&report, format).context("failed to render report")?;
    save_report(&content, &path)
        .with_context(|| format!("failed to write report to {}", path.display()))?;

    println!(
        "\n{} Saving detailed report to: {}",
        "→".blue(),
        path.display().to_string().bright_white()
    );
    print_summary(&report);
    Ok(())
}

pub fn print_summary(report: &AnalysisReport) {
    let summary = &report.summary;

    println!();
    print_divider();
    println!("{}", "  SUMMARY REPORT".bright_white().bold());
    print_divider();

    if !report.complete {
        println!(
            "{} Run incomplete: {} URLs not probed",
            "⚠".yellow().bold(),
            summary.pending
        );
    }
    println!("Total URLs: {}", summary.total);
    println!("{} Successfully analyzed: {}", "✓".green().bold(), summary.succeeded);
    println!("{} Accessibility errors: {}", "✗".red().bold(), summary.failed);
    println!("Success rate: {:.1}%", summary.success_rate());

    if let Some(latency) = summary.latency {
        println!(
            "Latency: min {:?}, mean {:?}, p50 {:?}, p95 {:?}",
            latency.min, latency.mean, latency.p50, latency.p95
        );
    }
    for (kind, count) in &summary.failures_by_kind {
        println!("  {} {}: {}", "•".yellow(), kind, count);
    }

    let (total_errors, total_warnings) = issue_totals(report);
    println!("Total SEO errors: {}", total_errors);
    println!("Total warnings: {}", total_warnings);

    let common_errors = frequent_issues(report, IssueSeverity::Error, 5);
    if !common_errors.is_empty() {
        println!("\n{}", "Most frequent errors:".red().bold());
        for (message, count) in common_errors {
            println!("  {} {}: {} times", "•".red(), message, count);
        }
    }

    let common_warnings = frequent_issues(report, IssueSeverity::Warning, 5);
    if !common_warnings.is_empty() {
        println!("\n{}", "Most frequent warnings:".yellow().bold());
        for (message, count) in common_warnings {
            println!("  {} {}: {} times", "•".yellow(), message, count);
        }
    }
    println!();
}

pub async fn handle_check(sub_matches: &ArgMatches) -> Result<()> {
    let sitemap_url = sub_matches
        .get_one::<Url>("SITEMAP_URL")
        .context("missing sitemap URL")?;
    let quiet = sub_matches.get_flag("quiet");
    let threads = *sub_matches.get_one::<usize>("threads").unwrap_or(&20);
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&10);

    let urls = resolve_urls(sitemap_url, &resolve_options(sub_matches)).await?;
    println!("{} Checking availability of {} URLs...\n", "→".blue(), urls.len());

    let options = AnalyzeOptions {
        concurrency: threads,
        per_request_timeout: Duration::from_secs(timeout),
        strategy: ProbeStrategy::Head,
        show_progress_bars: !quiet,
        ..AnalyzeOptions::default()
    };
    let report = analyze_urls(&urls, options, run_cancel_token(None)).await?;
    let summary = &report.summary;

    println!();
    print_divider();
    println!("{}", "  AVAILABILITY".bright_white().bold());
    print_divider();
    println!("{} Available: {}", "✓".green().bold(), summary.succeeded);
    println!("{} Unavailable: {}", "✗".red().bold(), summary.failed);
    println!("Availability rate: {:.1}%", summary.success_rate());

    let unavailable = unavailable_urls(&report, UNAVAILABLE_SHOWN);
    if !unavailable.is_empty() {
        println!("\n{}", "Unavailable URLs:".red().bold());
        for (url, status) in &unavailable {
            println!("  {} {}: {}", "•".red(), url, status);
        }
        let hidden = summary.failed + summary.pending - unavailable.len();
        if hidden > 0 {
            println!("  ... and {} more", hidden);
        }
    }
    println!();
    Ok(())
}

/// Build the submitter from the `submit` arguments; `--timeout` bounds each POST as well as sitemap fetches
pub fn indexnow_submitter(sub_matches: &ArgMatches) -> Result<IndexNowSubmitter> {
    let api_key = sub_matches
        .get_one::<String>("api-key")
        .context("missing --api-key")?;
    let key_location = sub_matches
        .get_one::<String>("key-location")
        .context("missing --key-location")?;
    let endpoint = sub_matches
        .get_one::<IndexNowEndpoint>("endpoint")
        .cloned()
        .unwrap_or(IndexNowEndpoint::Bing);
    let batch_size = *sub_matches.get_one::<usize>("batch-size").unwrap_or(&100);
    let delay = *sub_matches.get_one::<u64>("delay").unwrap_or(&1);
    let retries = *sub_matches.get_one::<u32>("retries").unwrap_or(&2);
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&30);

    Ok(IndexNowSubmitter::new(api_key.as_str(), key_location.as_str())
        .with_endpoint(endpoint)
        .with_batch_size(batch_size)
        .with_delay(Duration::from_secs(delay))
        .with_max_retries(retries)
        .with_timeout(Duration::from_secs(timeout)))
}

pub async fn handle_submit(sub_matches: &ArgMatches) -> Result<()> {
    let sitemap_url = sub_matches
        .get_one::<Url>("SITEMAP_URL")
        .context("missing sitemap URL")?;
    let since = sub_matches.get_one::<NaiveDate>("since").copied();

    let host = match sub_matches.get_one::<String>("host") {
        Some(host) => host.clone(),
        None => sitemap_host(sitemap_url)
            .ok_or_else(|| anyhow!("cannot derive a host from {}; pass --host", sitemap_url))?,
    };

    let resolved = resolve_urls(sitemap_url, &resolve_options(sub_matches)).await?;
    let urls = changed_urls(&resolved, since);
    if let Some(since) = since {
        println!("{} {} URLs changed since {}", "→".blue(), urls.len(), since);
    }
    if urls.is_empty() {
        println!("{} Nothing to submit", "ℹ".blue());
        return Ok(());
    }

    let submitter = indexnow_submitter(sub_matches)?;

    println!(
        "{} Submitting {} URLs for {} in {} batches",
        "→".blue(),
        urls.len(),
        host.bright_white(),
        submitter.batch_count(urls.len())
    );
    let summary = submitter.submit(&host, &urls).await;

    for batch in &summary.batches {
        match &batch.result {
            Ok(status) => println!(
                "  {} Batch {}: {} URLs accepted ({})",
                "✓".green().bold(),
                batch.index + 1,
                batch.url_count,
                status
            ),
            Err(e) => eprintln!(
                "  {} Batch {}: {} (after {} attempts)",
                "✗".red().bold(),
                batch.index + 1,
                e,
                batch.attempts
            ),
        }
    }

    println!(
        "\nTotal submitted: {}/{} URLs",
        summary.submitted_urls(),
        summary.total_urls
    );
    println!(
        "Successful batches: {}/{}",
        summary.successful_batches(),
        summary.batches.len()
    );
    Ok(())
}
