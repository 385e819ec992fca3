//! End-to-end crawl scenarios with a scripted fetcher

use crate::common::*;
use catalog_harvest::crawler::{CrawlOrchestrator, FetchError, ShutdownCoordinator};
use catalog_harvest::storage::{CheckpointStore, ListingStore, SqliteListingStore};
use catalog_harvest::CrawlPhase;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

fn orchestrator(
    dir: &TempDir,
    crawler_extra: &str,
    fetch: Arc<ScriptedFetch>,
) -> (CrawlOrchestrator, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let config = test_config(dir, CATEGORY, crawler_extra);
    let orchestrator = CrawlOrchestrator::new(config, Some("hash".to_string()), fetch, rx).unwrap();
    (orchestrator, tx)
}

#[tokio::test]
async fn test_three_pages_with_one_permanent_failure() {
    let dir = TempDir::new().unwrap();
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["a1", "a2"], Some(3)))
            .page(list_url(2), list_html(&["b1", "b2"], Some(3)))
            .page(list_url(3), list_html(&["c1", "c2"], Some(3)))
            .page(item_url("a1"), detail_html("a1"))
            .page(item_url("a2"), detail_html("a2"))
            .script(item_url("b1"), vec![Err(FetchError::Client(404))])
            .page(item_url("b2"), detail_html("b2"))
            .page(item_url("c1"), detail_html("c1"))
            .page(item_url("c2"), detail_html("c2"))
            .with_delay(Duration::from_millis(5)),
    );

    let (orchestrator, _tx) = orchestrator(
        &dir,
        "max-concurrent = 2\nmax-retries = 1",
        Arc::clone(&fetch),
    );
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert!(!summary.interrupted);
    assert_eq!(summary.completed, 9);
    assert_eq!(summary.listings, 5);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pending, 0);
    assert!(summary.peak_in_flight <= 2);
    assert!(fetch.peak_in_flight() <= 2);

    // A permanent error is never retried
    assert_eq!(fetch.call_times(&item_url("b1")).len(), 1);

    let state = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert_eq!(state.processed.len(), 9);
    assert_eq!(state.listings.len(), 5);
    assert_eq!(state.failed.len(), 1);
    assert_eq!(state.failed[0].url, item_url("b1"));
    assert_eq!(state.failed[0].attempts, 1);
    assert_eq!(state.last_page, Some(3));
    assert!(state.check_invariants().is_ok());

    // Card and detail data are merged into one record
    let a1 = &state.listings[&item_url("a1")];
    assert_eq!(a1.fields.title.as_deref(), Some("Card a1"));
    assert_eq!(a1.fields.listing_id.as_deref(), Some("a1"));
    assert_eq!(a1.fields.description.as_deref(), Some("Listing a1"));
    assert_eq!(a1.fields.city.as_deref(), Some("Bakı"));

    let store = SqliteListingStore::open(&dir.path().join("listings.db")).unwrap();
    assert_eq!(store.count_listings().unwrap(), 5);

    let report = std::fs::read_to_string(dir.path().join("failed.txt")).unwrap();
    assert_eq!(report.lines().count(), 1);
    assert!(report.starts_with(&format!("{}\t", item_url("b1"))));
}

#[tokio::test]
async fn test_in_flight_never_exceeds_max_concurrent() {
    let dir = TempDir::new().unwrap();
    let ids: Vec<String> = (1..=12).map(|i| format!("x{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let mut fetch = ScriptedFetch::new()
        .page(list_url(1), list_html(&id_refs, None))
        .page(list_url(2), list_html(&[], None))
        .with_delay(Duration::from_millis(20));
    for id in &ids {
        fetch = fetch.page(item_url(id), detail_html(id));
    }
    let fetch = Arc::new(fetch);

    let (orchestrator, _tx) = orchestrator(&dir, "max-concurrent = 3", Arc::clone(&fetch));
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.listings, 12);
    assert!(fetch.peak_in_flight() <= 3, "peak was {}", fetch.peak_in_flight());
    assert!(fetch.peak_in_flight() >= 2, "fetches never overlapped");
    assert!(summary.peak_in_flight <= 3);
}

#[tokio::test]
async fn test_checkpoint_written_before_third_fetch() {
    let dir = TempDir::new().unwrap();
    let path = checkpoint_path(&dir);
    let seen: Arc<Mutex<Option<Option<usize>>>> = Arc::new(Mutex::new(None));

    let hook_seen = Arc::clone(&seen);
    let hook_path = path.clone();
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["a1", "a2", "a3"], None))
            .page(item_url("a1"), detail_html("a1"))
            .page(item_url("a2"), detail_html("a2"))
            .page(item_url("a3"), detail_html("a3"))
            .on_fetch(move |call, _url| {
                if call == 3 {
                    let processed = std::fs::read(&hook_path)
                        .ok()
                        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
                        .and_then(|json| json["processed"].as_array().map(Vec::len));
                    *hook_seen.lock().unwrap() = Some(processed);
                }
            }),
    );

    let (orchestrator, _tx) = orchestrator(
        &dir,
        "max-concurrent = 1\nauto-save-interval = 2\nend-page = 1",
        fetch,
    );
    orchestrator.run().await.unwrap();

    let observed = seen.lock().unwrap().clone();
    assert_eq!(observed, Some(Some(2)), "checkpoint must hold 2 processed urls");
}

#[tokio::test]
async fn test_backoff_schedule_doubles_then_abandons() {
    let dir = TempDir::new().unwrap();
    let flaky = item_url("f1");
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["f1"], None))
            .page(list_url(2), list_html(&[], None))
            .script(flaky.clone(), vec![Err(FetchError::Server(503))]),
    );

    let (orchestrator, _tx) = orchestrator(
        &dir,
        "max-retries = 3\nretry-base-delay-ms = 40",
        Arc::clone(&fetch),
    );
    let summary = orchestrator.run().await.unwrap();

    let times = fetch.call_times(&flaky);
    assert_eq!(times.len(), 4, "one attempt plus three retries");

    for (i, pair) in times.windows(2).enumerate() {
        let expected = Duration::from_millis(40 * 2u64.pow(i as u32));
        let gap = pair[1] - pair[0];
        assert!(gap >= expected, "retry {} came after {:?}, expected {:?}", i + 1, gap, expected);
        assert!(gap < expected + Duration::from_millis(500), "retry {} too late: {:?}", i + 1, gap);
    }

    assert_eq!(summary.failed, 1);
    let state = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert_eq!(state.failed[0].attempts, 4);
    assert!(state.failed[0].error.contains("503"));
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let dir = TempDir::new().unwrap();
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["r1"], None))
            .page(list_url(2), list_html(&[], None))
            .script(
                item_url("r1"),
                vec![
                    Err(FetchError::Timeout),
                    Err(FetchError::RateLimited),
                    Ok(detail_html("r1")),
                ],
            ),
    );

    let (orchestrator, _tx) = orchestrator(&dir, "max-retries = 3", Arc::clone(&fetch));
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.listings, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(fetch.call_times(&item_url("r1")).len(), 3);
}

#[tokio::test]
async fn test_cards_only_without_details() {
    let dir = TempDir::new().unwrap();
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["n1", "n2"], Some(2)))
            .page(list_url(2), list_html(&["n3"], Some(2))),
    );

    let (orchestrator, _tx) = orchestrator(&dir, "fetch-details = false", Arc::clone(&fetch));
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.listings, 3);
    assert_eq!(fetch.calls(), vec![list_url(1), list_url(2)]);

    let state = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert!(state.is_processed(&item_url("n3")));
    assert_eq!(
        state.listings[&item_url("n1")].fields.price.as_deref(),
        Some("n100 AZN")
    );
}

#[tokio::test]
async fn test_empty_detail_page_is_extraction_failure() {
    let dir = TempDir::new().unwrap();
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["e1"], None))
            .page(list_url(2), list_html(&[], None))
            .page(item_url("e1"), "<html><body><p>gone</p></body></html>"),
    );

    let (orchestrator, _tx) = orchestrator(&dir, "", Arc::clone(&fetch));
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.listings, 0);
    assert_eq!(summary.failed, 1);
    // Extraction failures are not retried
    assert_eq!(fetch.call_times(&item_url("e1")).len(), 1);

    let state = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert!(state.failed[0].error.starts_with("extraction failed"));
}

#[tokio::test]
async fn test_auto_save_writes_listings_and_failures() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("listings.db");
    let report_path = dir.path().join("failed.txt");
    let seen: Arc<Mutex<Option<(u64, usize)>>> = Arc::new(Mutex::new(None));

    let hook_seen = Arc::clone(&seen);
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["a1", "a2", "a3", "a4"], None))
            .script(item_url("a1"), vec![Err(FetchError::Client(404))])
            .page(item_url("a2"), detail_html("a2"))
            .page(item_url("a3"), detail_html("a3"))
            .page(item_url("a4"), detail_html("a4"))
            .on_fetch(move |call, _url| {
                // The list page and three detail pages are done: two auto-saves so far
                if call == 5 {
                    let rows = SqliteListingStore::open(&db_path)
                        .and_then(|store| store.count_listings())
                        .unwrap_or(0);
                    let reported = std::fs::read_to_string(&report_path)
                        .map(|text| text.lines().count())
                        .unwrap_or(0);
                    *hook_seen.lock().unwrap() = Some((rows, reported));
                }
            }),
    );

    let (orchestrator, _tx) = orchestrator(
        &dir,
        "max-concurrent = 1\nauto-save-interval = 2\nend-page = 1\nmax-retries = 0",
        fetch,
    );
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.listings, 3);

    let observed = *seen.lock().unwrap();
    assert_eq!(observed, Some((2, 1)), "database rows and report lines mid-run");

    // The final flush reports nothing twice
    let report = std::fs::read_to_string(dir.path().join("failed.txt")).unwrap();
    assert_eq!(report.lines().count(), 1);
}

#[tokio::test]
async fn test_shutdown_during_backoff_keeps_item_pending() {
    let dir = TempDir::new().unwrap();
    let flaky = item_url("w1");
    let fetch = Arc::new(
        ScriptedFetch::new()
            .page(list_url(1), list_html(&["w1"], None))
            .script(flaky.clone(), vec![Err(FetchError::Server(503))]),
    );

    let shutdown = ShutdownCoordinator::new();
    let config = test_config(
        &dir,
        CATEGORY,
        "end-page = 1\nretry-base-delay-ms = 60000\nretry-max-delay-ms = 60000",
    );
    let orchestrator =
        CrawlOrchestrator::new(config, None, fetch.clone(), shutdown.subscribe()).unwrap();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .expect("the backoff timer must not hold up shutdown")
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.failed, 0);
    assert_eq!(fetch.call_times(&flaky).len(), 1);

    let state = CheckpointStore::new(checkpoint_path(&dir)).load(CATEGORY);
    assert!(!state.is_processed(&flaky));
    let pending: Vec<(String, u32)> = state
        .pending
        .iter()
        .map(|item| (item.url.clone(), item.attempt))
        .collect();
    assert_eq!(pending, vec![(flaky, 1)]);
}
