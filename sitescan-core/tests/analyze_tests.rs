// Tests for analysis runs against a mock site

use sitescan_core::analyze::{AnalyzeOptions, analyze_urls, resolve_sitemap};
use sitescan_core::report::{NOT_PROBED, report_rows};
use sitescan_scanner::{
    AnalysisReport, CancelSource, CancelToken, FailureKind, ResolveOptions, ScanError,
};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/xml")
        .set_body_string(body)
}

fn urlset(locs: &[String]) -> String {
    let urls: String = locs
        .iter()
        .map(|loc| format!("<url><loc>{}</loc></url>", loc))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        urls
    )
}

/// Index with two children: A lists /a and /b, B lists /b and /c.
/// /a answers 200, /b 404 and /c only after two seconds.
async fn example_site() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    let index = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>{base}/sitemap-a.xml</loc></sitemap>
  <sitemap><loc>{base}/sitemap-b.xml</loc></sitemap>
</sitemapindex>"#
    );

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(index))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap-a.xml"))
        .respond_with(xml(urlset(&[format!("{base}/a"), format!("{base}/b")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap-b.xml"))
        .respond_with(xml(urlset(&[format!("{base}/b"), format!("{base}/c")])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><head><title>Example</title></head><body></body></html>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html></html>")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    server
}

fn fast_options() -> AnalyzeOptions {
    AnalyzeOptions {
        concurrency: 2,
        per_request_timeout: Duration::from_millis(500),
        ..AnalyzeOptions::default()
    }
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[tokio::test]
async fn test_resolve_then_analyze_example_site() {
    let server = example_site().await;
    let base = server.uri();

    let urls = resolve_sitemap(&format!("{}/sitemap.xml", base), &ResolveOptions::default())
        .await
        .unwrap();

    let resolved: Vec<(usize, String)> = urls.iter().map(|u| (u.order_index, u.url.clone())).collect();
    assert_eq!(
        resolved,
        vec![
            (0, format!("{}/a", base)),
            (1, format!("{}/b", base)),
            (2, format!("{}/c", base)),
        ]
    );

    let report = analyze_urls(&urls, fast_options(), CancelToken::never())
        .await
        .unwrap();

    assert!(report.complete);
    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 2);

    let first = report.entries[0].result.as_ref().unwrap();
    assert!(first.is_success());
    assert_eq!(first.http_status(), Some(200));
    assert_eq!(first.signals().unwrap().title, "Example");
    assert_eq!(first.signals().unwrap().meta_description, "");

    let second = report.entries[1].result.as_ref().unwrap();
    assert_eq!(second.failure_kind(), Some(FailureKind::HttpStatus));
    assert_eq!(second.http_status(), Some(404));

    let third = report.entries[2].result.as_ref().unwrap();
    assert_eq!(third.failure_kind(), Some(FailureKind::Network));

    let statuses: Vec<String> = report_rows(&report).into_iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec!["200", "404", "network"]);
}

#[tokio::test]
async fn test_repeated_runs_give_identical_rows() {
    let server = example_site().await;
    let urls = resolve_sitemap(
        &format!("{}/sitemap.xml", server.uri()),
        &ResolveOptions::default(),
    )
    .await
    .unwrap();

    let strip_latency = |report: AnalysisReport| {
        report_rows(&report)
            .into_iter()
            .map(|mut row| {
                row.latency_ms = None;
                row
            })
            .collect::<Vec<_>>()
    };

    let first = analyze_urls(&urls, fast_options(), CancelToken::never()).await.unwrap();
    let second = analyze_urls(&urls, fast_options(), CancelToken::never()).await.unwrap();

    assert_eq!(strip_latency(first), strip_latency(second));
}

#[tokio::test]
async fn test_cancelled_before_start_reports_nothing_probed() {
    let server = example_site().await;
    let urls = resolve_sitemap(
        &format!("{}/sitemap.xml", server.uri()),
        &ResolveOptions::default(),
    )
    .await
    .unwrap();

    let source = CancelSource::new();
    source.cancel();
    let report = analyze_urls(&urls, fast_options(), source.token()).await.unwrap();

    assert!(!report.complete);
    assert_eq!(report.summary.pending, 3);
    assert!(report_rows(&report).iter().all(|row| row.status == NOT_PROBED));
}

#[tokio::test]
async fn test_failures_only_pass_keeps_each_url_with_its_result() {
    let server = example_site().await;
    let base = server.uri();
    let urls = resolve_sitemap(&format!("{}/sitemap.xml", base), &ResolveOptions::default())
        .await
        .unwrap();

    let first = analyze_urls(&urls, fast_options(), CancelToken::never()).await.unwrap();
    let failed: Vec<_> = first
        .entries
        .iter()
        .filter(|e| e.result.as_ref().is_some_and(|r| !r.is_success()))
        .map(|e| e.resolved.clone())
        .collect();
    assert_eq!(failed.len(), 2);

    let retry = analyze_urls(&failed, fast_options(), CancelToken::never()).await.unwrap();

    assert!(retry.complete);
    assert_eq!(retry.summary.pending, 0);
    let rows: Vec<(usize, String, String)> = report_rows(&retry)
        .into_iter()
        .map(|r| (r.order_index, r.url, r.status))
        .collect();
    assert_eq!(
        rows,
        vec![
            (1, format!("{}/b", base), "404".to_string()),
            (2, format!("{}/c", base), "network".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_reversed_input_pairs_each_url_with_its_own_result() {
    let server = example_site().await;
    let base = server.uri();
    let mut urls = resolve_sitemap(&format!("{}/sitemap.xml", base), &ResolveOptions::default())
        .await
        .unwrap();
    urls.reverse();

    let report = analyze_urls(&urls, fast_options(), CancelToken::never()).await.unwrap();

    assert!(report.complete);
    for entry in &report.entries {
        let result = entry.result.as_ref().unwrap();
        assert_eq!(result.url, entry.resolved.url);
        assert_eq!(result.order_index, entry.resolved.order_index);
    }
    let statuses: Vec<String> = report_rows(&report).into_iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec!["network", "404", "200"]);
}

#[tokio::test]
async fn test_cancel_mid_run_writes_partial_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<title>Page</title>")
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let locs: Vec<String> = (0..6).map(|i| format!("{}/page{}", server.uri(), i)).collect();
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(urlset(&locs)))
        .with_priority(1)
        .mount(&server)
        .await;

    let urls = resolve_sitemap(
        &format!("{}/sitemap.xml", server.uri()),
        &ResolveOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(urls.len(), 6);

    let source = CancelSource::new();
    let token = source.token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        source.cancel();
    });

    let options = AnalyzeOptions {
        concurrency: 2,
        per_request_timeout: Duration::from_secs(5),
        ..AnalyzeOptions::default()
    };
    let report = analyze_urls(&urls, options, token).await.unwrap();
    canceller.await.unwrap();

    assert!(!report.complete);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.pending, 4);
    assert!(report.entries[..2].iter().all(|e| e.result.as_ref().is_some_and(|r| r.is_success())));
    assert!(report.entries[2..].iter().all(|e| e.result.is_none()));

    let statuses: Vec<String> = report_rows(&report).into_iter().map(|r| r.status).collect();
    assert_eq!(statuses[..2], ["200", "200"]);
    assert!(statuses[2..].iter().all(|s| s == NOT_PROBED));
}

// ============================================================================
// Resolution Error Tests
// ============================================================================

#[tokio::test]
async fn test_missing_sitemap_is_fetch_error() {
    let server = MockServer::start().await;

    let err = resolve_sitemap(
        &format!("{}/sitemap.xml", server.uri()),
        &ResolveOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::Fetch { .. }));
}

#[tokio::test]
async fn test_html_instead_of_sitemap_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"))
        .mount(&server)
        .await;

    let err = resolve_sitemap(
        &format!("{}/sitemap.xml", server.uri()),
        &ResolveOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::Parse { .. }));
}

#[test]
fn test_analyze_options_defaults() {
    let options = AnalyzeOptions::default();
    assert_eq!(options.concurrency, 10);
    assert_eq!(options.per_request_timeout, Duration::from_secs(30));
    assert_eq!(options.max_redirects, 5);
    assert!(!options.show_progress_bars);
}
