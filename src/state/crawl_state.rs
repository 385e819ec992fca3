//! Crawl progress snapshot
//!
//! `CrawlState` is the value written to the checkpoint file. It is owned by the
//! orchestrator; nothing else mutates it.

use crate::state::{Listing, WorkItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A permanently abandoned URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub url: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Result of inserting a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Durable crawl progress
///
/// Invariants (restored by [`CrawlState::repair`] after loading):
/// - `processed` and `pending` are disjoint
/// - every failed URL is in `processed`
/// - every listing id is in `processed`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlState {
    /// Seed URL of the run that produced this state
    pub category_url: String,

    /// Hash of the configuration file of the last run
    pub config_hash: Option<String>,

    /// Last list page, once known
    pub last_page: Option<u32>,

    pub processed: BTreeSet<String>,

    /// Work not yet completed, in dispatch order
    pub pending: Vec<WorkItem>,

    pub listings: BTreeMap<String, Listing>,

    pub failed: Vec<FailedItem>,

    /// Leading entries of `failed` already appended to the failed-URL report
    pub failed_reported: usize,

    pub saved_at: Option<DateTime<Utc>>,
}

impl CrawlState {
    /// Creates an empty state for a category
    pub fn new(category_url: impl Into<String>) -> Self {
        Self {
            category_url: category_url.into(),
            ..Self::default()
        }
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed.contains(url)
    }

    /// Marks a URL as completed; returns false if it already was
    pub fn mark_processed(&mut self, url: &str) -> bool {
        self.processed.insert(url.to_string())
    }

    /// Inserts a listing or merges it into the existing record with the same id
    pub fn upsert_listing(&mut self, listing: Listing) -> Upsert {
        self.processed.insert(listing.id.clone());

        match self.listings.get_mut(&listing.id) {
            Some(existing) => {
                existing.absorb(&listing);
                Upsert::Updated
            }
            None => {
                self.listings.insert(listing.id.clone(), listing);
                Upsert::Inserted
            }
        }
    }

    /// Records a URL as permanently abandoned
    ///
    /// A URL already in the failed list has its entry refreshed instead of duplicated.
    pub fn record_failure(&mut self, url: &str, error: impl Into<String>, attempts: u32) {
        self.processed.insert(url.to_string());

        let entry = FailedItem {
            url: url.to_string(),
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
        };

        match self.failed.iter_mut().find(|f| f.url == url) {
            Some(existing) => *existing = entry,
            None => self.failed.push(entry),
        }
    }

    /// Failures not yet written to the failed-URL report
    pub fn unreported_failures(&self) -> &[FailedItem] {
        &self.failed[self.failed_reported.min(self.failed.len())..]
    }

    pub fn mark_failures_reported(&mut self) {
        self.failed_reported = self.failed.len();
    }

    /// Number of pending list pages and detail pages
    pub fn pending_counts(&self) -> (usize, usize) {
        let lists = self.pending.iter().filter(|i| i.is_list_page()).count();
        (lists, self.pending.len() - lists)
    }

    /// Restores the invariants on a state read from disk
    ///
    /// Returns the number of entries that had to be fixed.
    pub fn repair(&mut self) -> usize {
        let mut fixed = 0;

        for url in self.failed.iter().map(|f| f.url.clone()) {
            if self.processed.insert(url) {
                fixed += 1;
            }
        }

        for id in self.listings.keys() {
            if self.processed.insert(id.clone()) {
                fixed += 1;
            }
        }

        let mut seen = HashSet::new();
        let before = self.pending.len();
        let processed = &self.processed;
        self.pending
            .retain(|item| !processed.contains(&item.url) && seen.insert(item.url.clone()));
        fixed += before - self.pending.len();

        self.failed_reported = self.failed_reported.min(self.failed.len());

        fixed
    }

    /// Checks the invariants, describing the first violation found
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(item) = self.pending.iter().find(|i| self.processed.contains(&i.url)) {
            return Err(format!("{} is both pending and processed", item.url));
        }
        if let Some(failed) = self.failed.iter().find(|f| !self.processed.contains(&f.url)) {
            return Err(format!("failed url {} is not processed", failed.url));
        }
        if let Some(id) = self.listings.keys().find(|id| !self.processed.contains(*id)) {
            return Err(format!("listing {} is not processed", id));
        }
        Ok(())
    }

    /// Merges another state for the same category into this one
    ///
    /// Processed URLs, listings and failures are unioned. For a listing present in
    /// both, the more recently ingested record is applied last. The page bound and
    /// config hash come from whichever state was saved later.
    pub fn merge(&mut self, other: CrawlState) {
        let other_is_newer = other.saved_at > self.saved_at;

        self.processed.extend(other.processed);

        for (id, listing) in other.listings {
            match self.listings.get_mut(&id) {
                Some(existing) if listing.ingested_at >= existing.ingested_at => {
                    existing.absorb(&listing)
                }
                Some(existing) => {
                    let newer = std::mem::replace(existing, listing);
                    existing.absorb(&newer);
                }
                None => {
                    self.listings.insert(id, listing);
                }
            }
        }

        for failed in other.failed {
            if !self.failed.iter().any(|f| f.url == failed.url) {
                self.failed.push(failed);
            }
        }

        self.pending.extend(other.pending);

        if other_is_newer {
            self.last_page = other.last_page.or(self.last_page);
            self.config_hash = other.config_hash.or(self.config_hash.take());
            self.saved_at = other.saved_at;
        } else {
            self.last_page = self.last_page.or(other.last_page);
        }

        self.repair();
    }
}
