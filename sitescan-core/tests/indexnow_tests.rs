// Tests for IndexNow change notification

use chrono::NaiveDate;
use serde_json::json;
use sitescan_core::indexnow::{
    BING_ENDPOINT, IndexNowEndpoint, IndexNowSubmitter, SubmitError, YANDEX_ENDPOINT, changed_urls,
};
use sitescan_scanner::ResolvedUrl;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://ex.com/page/{}", i)).collect()
}

fn submitter(server: &MockServer) -> IndexNowSubmitter {
    IndexNowSubmitter::new("secret-key", "https://ex.com/secret-key.txt")
        .with_endpoint(IndexNowEndpoint::Custom(format!("{}/indexnow", server.uri())))
        .with_delay(Duration::ZERO)
        .with_retry_backoff(Duration::ZERO)
}

// ============================================================================
// Endpoint Tests
// ============================================================================

#[test]
fn test_endpoint_from_str() {
    assert_eq!(IndexNowEndpoint::from_str("bing"), Some(IndexNowEndpoint::Bing));
    assert_eq!(IndexNowEndpoint::from_str("Yandex"), Some(IndexNowEndpoint::Yandex));
    assert_eq!(
        IndexNowEndpoint::from_str("https://search.test/indexnow"),
        Some(IndexNowEndpoint::Custom("https://search.test/indexnow".to_string()))
    );
    assert_eq!(IndexNowEndpoint::from_str("google"), None);
}

#[test]
fn test_endpoint_urls() {
    assert_eq!(IndexNowEndpoint::Bing.url(), BING_ENDPOINT);
    assert_eq!(IndexNowEndpoint::Yandex.url(), YANDEX_ENDPOINT);
    assert_eq!(BING_ENDPOINT, "https://api.indexnow.org/indexnow");
    assert_eq!(YANDEX_ENDPOINT, "https://yandex.com/indexnow");
}

// ============================================================================
// Changed URL Tests
// ============================================================================

fn resolved(index: usize, lastmod: Option<&str>) -> ResolvedUrl {
    ResolvedUrl {
        order_index: index,
        url: format!("https://ex.com/{}", index),
        lastmod: lastmod.map(str::to_string),
        priority: None,
        changefreq: None,
    }
}

#[test]
fn test_changed_urls_without_since_keeps_everything() {
    let list = vec![resolved(0, Some("2020-01-01")), resolved(1, None)];
    assert_eq!(
        changed_urls(&list, None),
        vec!["https://ex.com/0".to_string(), "https://ex.com/1".to_string()]
    );
}

#[test]
fn test_changed_urls_filters_by_lastmod() {
    let list = vec![
        resolved(0, Some("2024-01-31")),
        resolved(1, Some("2024-02-01")),
        resolved(2, Some("2024-03-10T08:30:00+00:00")),
        resolved(3, None),
        resolved(4, Some("last tuesday")),
    ];
    let since = NaiveDate::from_ymd_opt(2024, 2, 1);

    assert_eq!(
        changed_urls(&list, since),
        vec![
            "https://ex.com/1".to_string(),
            "https://ex.com/2".to_string(),
            "https://ex.com/3".to_string(),
            "https://ex.com/4".to_string(),
        ]
    );
}

// ============================================================================
// Submission Tests
// ============================================================================

#[tokio::test]
async fn test_urls_are_submitted_in_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexnow"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "host": "ex.com",
            "key": "secret-key",
            "keyLocation": "https://ex.com/secret-key.txt",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&server)
        .await;

    let summary = submitter(&server)
        .with_batch_size(2)
        .submit("ex.com", &urls(5))
        .await;

    assert_eq!(summary.total_urls, 5);
    assert_eq!(summary.batches.len(), 3);
    assert_eq!(summary.successful_batches(), 3);
    assert_eq!(summary.submitted_urls(), 5);
    assert!(summary.all_succeeded());
    assert_eq!(summary.batches[2].url_count, 1);
    assert_eq!(summary.batches[0].result, Ok(202));
}

#[tokio::test]
async fn test_batch_payload_lists_its_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "urlList": ["https://ex.com/page/0", "https://ex.com/page/1"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let summary = submitter(&server).submit("ex.com", &urls(2)).await;
    assert!(summary.all_succeeded());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let summary = submitter(&server).submit("ex.com", &urls(3)).await;

    assert_eq!(summary.batches.len(), 1);
    assert_eq!(summary.batches[0].attempts, 2);
    assert_eq!(summary.batches[0].result, Ok(200));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let summary = submitter(&server)
        .with_max_retries(2)
        .submit("ex.com", &urls(1))
        .await;

    assert_eq!(summary.batches[0].attempts, 3);
    assert!(matches!(
        summary.batches[0].result,
        Err(SubmitError::Rejected { status: 429, .. })
    ));
}

#[tokio::test]
async fn test_rejected_batch_does_not_stop_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("key not valid"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let summary = submitter(&server)
        .with_batch_size(2)
        .submit("ex.com", &urls(4))
        .await;

    assert_eq!(summary.batches.len(), 2);
    assert_eq!(summary.batches[0].attempts, 1);
    assert_eq!(
        summary.batches[0].result,
        Err(SubmitError::Rejected {
            status: 403,
            body: "key not valid".to_string()
        })
    );
    assert!(summary.batches[1].is_success());
    assert_eq!(summary.successful_batches(), 1);
    assert_eq!(summary.submitted_urls(), 2);
    assert!(!summary.all_succeeded());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let summary = IndexNowSubmitter::new("k", "https://ex.com/k.txt")
        .with_endpoint(IndexNowEndpoint::Custom("http://127.0.0.1:9/indexnow".to_string()))
        .with_max_retries(1)
        .with_retry_backoff(Duration::ZERO)
        .with_timeout(Duration::from_secs(2))
        .submit("ex.com", &urls(1))
        .await;

    assert_eq!(summary.batches[0].attempts, 2);
    assert!(matches!(summary.batches[0].result, Err(SubmitError::Transport(_))));
}

#[tokio::test]
async fn test_nothing_to_submit() {
    let server = MockServer::start().await;
    let summary = submitter(&server).submit("ex.com", &[]).await;

    assert!(summary.batches.is_empty());
    assert!(summary.all_succeeded());
    assert_eq!(submitter(&server).with_batch_size(100).batch_count(250), 3);
}
