//! HTTP crawl tests
//!
//! These tests use wiremock to create mock HTTP servers and run the full crawl
//! cycle through the real reqwest fetcher.

use crate::common::{detail_html, list_html, test_config};
use catalog_harvest::crawler::{CrawlOrchestrator, HttpFetcher};
use catalog_harvest::storage::{CheckpointStore, ListingStore, SqliteListingStore};
use catalog_harvest::HarvestError;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn fetcher(config: &catalog_harvest::Config) -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::from_config(&config.crawler, &config.user_agent).unwrap())
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let server = MockServer::start().await;
    let category = format!("{}/homes", server.uri());

    // The start page only answers requests carrying the configured language
    Mock::given(method("GET"))
        .and(path("/homes"))
        .and(header("accept-language", "az-AZ"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_html(&["h1", "h2"], Some(2))))
        .mount(&server)
        .await;
    mount_html(&server, "/homes/page/2/", list_html(&["h3"], Some(2))).await;
    mount_html(&server, "/items/h1", detail_html("h1")).await;
    mount_html(&server, "/items/h3", detail_html("h3")).await;

    // h2 fails once with a server error, then succeeds
    Mock::given(method("GET"))
        .and(path("/items/h2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_html(&server, "/items/h2", detail_html("h2")).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &category, "max-concurrent = 2");
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let summary = CrawlOrchestrator::new(config.clone(), None, fetcher(&config), rx)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.listings, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.flush.written, 3);

    let store = SqliteListingStore::open(&dir.path().join("listings.db")).unwrap();
    assert_eq!(store.count_listings().unwrap(), 3);

    let h1_url = format!("{}/items/h1", server.uri());
    let h1 = store.get_listing(&h1_url).unwrap().unwrap();
    assert_eq!(h1.fields.title.as_deref(), Some("Card h1"));
    assert_eq!(h1.fields.city.as_deref(), Some("Bakı"));
    assert_eq!(h1.fields.price.as_deref(), Some("h1 AZN"));
}

#[tokio::test]
async fn test_missing_detail_page_is_recorded() {
    let server = MockServer::start().await;
    let category = format!("{}/homes", server.uri());

    mount_html(&server, "/homes", list_html(&["m1", "m2"], None)).await;
    mount_html(&server, "/homes/page/2/", list_html(&[], None)).await;
    mount_html(&server, "/items/m1", detail_html("m1")).await;
    Mock::given(method("GET"))
        .and(path("/items/m2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &category, "");
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let summary = CrawlOrchestrator::new(config.clone(), None, fetcher(&config), rx)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.listings, 1);
    assert_eq!(summary.failed, 1);

    let state = CheckpointStore::new(&config.output.checkpoint_path).load(&category);
    assert_eq!(state.last_page, Some(1));
    assert_eq!(state.failed[0].error, "request rejected (HTTP 404)");

    let report = std::fs::read_to_string(&config.output.failed_urls_path).unwrap();
    assert_eq!(
        report,
        format!("{}/items/m2\trequest rejected (HTTP 404)\n", server.uri())
    );
}

#[tokio::test]
async fn test_unreachable_start_page_aborts() {
    let server = MockServer::start().await;
    let category = format!("{}/homes", server.uri());

    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &category, "max-retries = 1");
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let err = CrawlOrchestrator::new(config.clone(), None, fetcher(&config), rx)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::FatalDiscovery { .. }));

    // State was persisted before aborting
    let state = CheckpointStore::new(&config.output.checkpoint_path).load(&category);
    assert_eq!(state.failed.len(), 1);
    assert_eq!(state.failed[0].attempts, 2);
}
