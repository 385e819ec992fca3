//! Pending work for the crawl
//!
//! This module handles:
//! - Two FIFO lanes, one for list pages and one for detail pages
//! - Uniqueness on URL across both lanes
//! - Rejecting URLs that are already processed

use crate::state::WorkItem;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Queue of work not yet handed to the worker pool
///
/// Dequeue prefers the list lane so that page discovery keeps moving while detail
/// work from earlier pages is fetched.
#[derive(Debug, Default)]
pub struct WorkQueue {
    list_lane: VecDeque<WorkItem>,
    detail_lane: VecDeque<WorkItem>,

    /// URLs currently in either lane
    queued: HashSet<String>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item unless its URL is processed or already queued
    ///
    /// # Returns
    ///
    /// `true` if the item was added
    pub fn enqueue(&mut self, item: WorkItem, processed: &BTreeSet<String>) -> bool {
        if processed.contains(&item.url) || self.queued.contains(&item.url) {
            tracing::trace!(url = %item.url, "Skipping duplicate work item");
            return false;
        }

        self.queued.insert(item.url.clone());
        if item.is_list_page() {
            self.list_lane.push_back(item);
        } else {
            self.detail_lane.push_back(item);
        }
        true
    }

    /// Takes the next item, list pages first
    pub fn pop(&mut self) -> Option<WorkItem> {
        let item = self
            .list_lane
            .pop_front()
            .or_else(|| self.detail_lane.pop_front())?;
        self.queued.remove(&item.url);
        Some(item)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.queued.contains(url)
    }

    pub fn len(&self) -> usize {
        self.list_lane.len() + self.detail_lane.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queued list pages
    pub fn list_len(&self) -> usize {
        self.list_lane.len()
    }

    /// Snapshot of queued items in dequeue order, for checkpointing
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.list_lane.iter().chain(self.detail_lane.iter())
    }
}
