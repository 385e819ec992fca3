//! Statistics generation from a crawl checkpoint
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the saved crawl state.

use crate::state::CrawlState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub category_url: String,

    /// URLs completed (fetched or abandoned)
    pub processed: usize,

    pub pending_list_pages: usize,
    pub pending_detail_pages: usize,

    pub listings: usize,

    pub failed: usize,

    /// Failure count per error summary
    pub failures_by_error: HashMap<String, usize>,

    pub last_page: Option<u32>,
    pub saved_at: Option<DateTime<Utc>>,
    pub config_hash: Option<String>,
}

impl CrawlStatistics {
    /// Computes statistics for a crawl state
    pub fn from_state(state: &CrawlState) -> Self {
        let (pending_list_pages, pending_detail_pages) = state.pending_counts();

        let mut failures_by_error = HashMap::new();
        for failure in &state.failed {
            *failures_by_error
                .entry(error_class(&failure.error))
                .or_insert(0) += 1;
        }

        Self {
            category_url: state.category_url.clone(),
            processed: state.processed.len(),
            pending_list_pages,
            pending_detail_pages,
            listings: state.listings.len(),
            failed: state.failed.len(),
            failures_by_error,
            last_page: state.last_page,
            saved_at: state.saved_at,
            config_hash: state.config_hash.clone(),
        }
    }
}

/// Groups error summaries such as "server error (HTTP 503)" by their leading words
fn error_class(error: &str) -> String {
    error
        .split(|c: char| c == '(' || c == ':')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Category: {}", stats.category_url);
    println!("  Processed URLs: {}", stats.processed);
    println!("  Listings: {}", stats.listings);
    println!(
        "  Pending: {} list pages, {} detail pages",
        stats.pending_list_pages, stats.pending_detail_pages
    );
    match stats.last_page {
        Some(page) => println!("  Last page: {}", page),
        None => println!("  Last page: unknown"),
    }
    if let Some(saved_at) = stats.saved_at {
        println!("  Saved at: {}", saved_at.to_rfc3339());
    }
    if let Some(hash) = &stats.config_hash {
        println!("  Config hash: {}", hash);
    }
    println!();

    if !stats.failures_by_error.is_empty() {
        println!("Failures ({}):", stats.failed);
        let mut error_counts: Vec<_> = stats.failures_by_error.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (error, count) in error_counts {
            println!("  {}: {}", error, count);
        }
        println!();
    }

    let success_rate = if stats.processed > 0 {
        (stats.processed - stats.failed.min(stats.processed)) as f64 / stats.processed as f64
            * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} of {} processed URLs)",
        success_rate,
        stats.processed - stats.failed.min(stats.processed),
        stats.processed
    );
}
