//! Crawler module for catalog fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and error classification
//! - Retry policy with exponential backoff
//! - The pending work queue and the bounded worker pool
//! - Card and detail page extraction
//! - Shutdown signalling
//! - Overall crawl orchestration

mod coordinator;
mod fetcher;
mod parser;
mod pool;
mod queue;
mod retry;
mod shutdown;

pub use coordinator::{run_crawl, CrawlOrchestrator, RunSummary};
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher};
pub use parser::{Card, CatalogExtractor, ExtractionError, Extractor, ListPage};
pub use pool::{FetchOutcome, PoolEvent, WorkerPool};
pub use queue::WorkQueue;
pub use retry::{ErrorClass, RetryDecision, RetryPolicy};
pub use shutdown::{wait_for_shutdown, ShutdownCoordinator, FORCED_EXIT_CODE};

use crate::config::Config;
use crate::Result;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load or create the crawl state
/// 2. Build the HTTP client
/// 3. Fetch list pages and detail pages
/// 4. Persist the checkpoint and write the listings
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, if known
pub async fn crawl(config: Config, config_hash: Option<String>) -> Result<RunSummary> {
    run_crawl(config, config_hash).await
}
