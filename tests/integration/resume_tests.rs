//! Interrupt and resume behavior

use crate::common::*;
use catalog_harvest::crawler::{CrawlOrchestrator, ShutdownCoordinator};
use catalog_harvest::storage::{CheckpointStore, ListingStore, SqliteListingStore};
use catalog_harvest::CrawlPhase;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

fn two_page_site() -> ScriptedFetch {
    ScriptedFetch::new()
        .page(list_url(1), list_html(&["a1", "a2"], Some(2)))
        .page(list_url(2), list_html(&["b1", "b2"], Some(2)))
        .page(item_url("a1"), detail_html("a1"))
        .page(item_url("a2"), detail_html("a2"))
        .page(item_url("b1"), detail_html("b1"))
        .page(item_url("b2"), detail_html("b2"))
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_refetching() {
    let dir = TempDir::new().unwrap();
    let extra = "max-concurrent = 1";

    // First run: shut down while the third fetch is in flight
    let shutdown = ShutdownCoordinator::new();
    let trigger = shutdown.clone();
    let first = Arc::new(two_page_site().on_fetch(move |call, _| {
        if call == 3 {
            trigger.trigger();
        }
    }));

    let orchestrator = CrawlOrchestrator::new(
        test_config(&dir, CATEGORY, extra),
        Some("hash".to_string()),
        first.clone(),
        shutdown.subscribe(),
    )
    .unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(first.calls(), vec![list_url(1), list_url(2), item_url("a1")]);
    assert_eq!(summary.listings, 1);
    assert_eq!(summary.pending, 3);

    let saved = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert!(saved.check_invariants().is_ok());
    let processed_before = saved.processed.clone();

    // Second run picks up only the pending items
    let second = Arc::new(two_page_site());
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let orchestrator = CrawlOrchestrator::new(
        test_config(&dir, CATEGORY, extra),
        Some("hash".to_string()),
        second.clone(),
        rx,
    )
    .unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert!(!summary.interrupted);
    assert_eq!(summary.listings, 4);
    assert_eq!(summary.pending, 0);

    let refetched: BTreeSet<String> = second.calls().into_iter().collect();
    let expected: BTreeSet<String> = [item_url("a2"), item_url("b1"), item_url("b2")]
        .into_iter()
        .collect();
    assert_eq!(refetched, expected);

    let state = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert!(state.processed.is_superset(&processed_before));
    assert_eq!(state.processed.len(), 6);

    // One row per listing across both runs
    let store = SqliteListingStore::open(&dir.path().join("listings.db")).unwrap();
    assert_eq!(store.count_listings().unwrap(), 4);
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let dir = TempDir::new().unwrap();

    let first = Arc::new(two_page_site());
    let (_tx, rx) = tokio::sync::watch::channel(false);
    CrawlOrchestrator::new(test_config(&dir, CATEGORY, ""), None, first, rx)
        .unwrap()
        .run()
        .await
        .unwrap();

    let second = Arc::new(two_page_site());
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let summary = CrawlOrchestrator::new(
        test_config(&dir, CATEGORY, "resume = false"),
        None,
        second.clone(),
        rx,
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(second.calls().len(), 6);
    assert_eq!(summary.listings, 4);
}

#[tokio::test]
async fn test_refetched_listing_is_upserted() {
    let dir = TempDir::new().unwrap();
    let config = || test_config(&dir, CATEGORY, "resume = false\nend-page = 1");

    let old = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["u1"], None))
            .page(item_url("u1"), detail_html("100")),
    );
    let (_tx, rx) = tokio::sync::watch::channel(false);
    CrawlOrchestrator::new(config(), None, old, rx)
        .unwrap()
        .run()
        .await
        .unwrap();

    let new = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["u1"], None))
            .page(item_url("u1"), detail_html("200")),
    );
    let (_tx, rx) = tokio::sync::watch::channel(false);
    CrawlOrchestrator::new(config(), None, new, rx)
        .unwrap()
        .run()
        .await
        .unwrap();

    let store = SqliteListingStore::open(&dir.path().join("listings.db")).unwrap();
    assert_eq!(store.count_listings().unwrap(), 1);
    let listing = store.get_listing(&item_url("u1")).unwrap().unwrap();
    assert_eq!(listing.fields.price_value.as_deref(), Some("200"));
    assert_eq!(listing.fields.description.as_deref(), Some("Listing 200"));
    assert_eq!(listing.fields.title.as_deref(), Some("Card u1"));
}

#[tokio::test]
async fn test_checkpoint_for_other_category_is_ignored() {
    let dir = TempDir::new().unwrap();

    let mut foreign = catalog_harvest::CrawlState::new("https://catalog.test/cars");
    foreign.mark_processed(&list_url(1));
    std::fs::write(
        checkpoint_path(&dir),
        serde_json::to_vec_pretty(&foreign).unwrap(),
    )
    .unwrap();

    let fetch = Arc::new(two_page_site());
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let summary = CrawlOrchestrator::new(
        test_config(&dir, CATEGORY, ""),
        None,
        fetch.clone(),
        rx,
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(fetch.calls().contains(&list_url(1)));
    assert_eq!(summary.listings, 4);
}
