//! Bounded pool of fetch tasks
//!
//! The pool runs at most `max_concurrent` fetches at once and owns the backoff
//! timers of items waiting to be retried. A waiting item holds no slot. Workers
//! only fetch; results come back to the orchestrator through a `JoinSet`.

use crate::crawler::{ErrorClass, Fetch, FetchError, RetryDecision, RetryPolicy};
use crate::state::WorkItem;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

/// Result of one fetch attempt, as returned by a worker task
#[derive(Debug)]
pub struct FetchOutcome {
    pub item: WorkItem,
    pub result: Result<String, FetchError>,
}

/// Something the orchestrator has to react to
#[derive(Debug)]
pub enum PoolEvent {
    /// The page was fetched
    Fetched { item: WorkItem, body: String },

    /// The item failed and the retry policy gave up on it
    ///
    /// `item.attempt` is the total number of failed attempts.
    Abandoned { item: WorkItem, error: FetchError },

    /// The item failed and will be retried after `delay`; its slot is free
    Rescheduled { url: String, attempt: u32, delay: Duration },

    /// A backoff timer expired and a retry is ready to dispatch
    RetryReady,
}

/// Worker pool with a fixed number of fetch slots
pub struct WorkerPool {
    fetcher: Arc<dyn Fetch>,
    policy: RetryPolicy,
    max_concurrent: usize,
    tasks: JoinSet<FetchOutcome>,

    /// Items currently being fetched, by URL
    in_flight: HashMap<String, WorkItem>,

    /// Items waiting for their backoff delay to pass
    backoff: Vec<(Instant, WorkItem)>,

    peak_in_flight: usize,
}

impl WorkerPool {
    pub fn new(fetcher: Arc<dyn Fetch>, policy: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            policy,
            max_concurrent: max_concurrent.max(1),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
            backoff: Vec::new(),
            peak_in_flight: 0,
        }
    }

    /// Returns true if another fetch may start
    pub fn has_capacity(&self) -> bool {
        self.tasks.len() < self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Highest number of simultaneous fetches seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    /// Returns true if nothing is in flight and nothing is waiting to be retried
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.backoff.is_empty()
    }

    /// Returns true if the pool is fetching or holding `url`
    pub fn is_tracking(&self, url: &str) -> bool {
        self.in_flight.contains_key(url) || self.backoff.iter().any(|(_, item)| item.url == url)
    }

    /// Starts fetching an item
    ///
    /// The caller must check [`WorkerPool::has_capacity`] first.
    pub fn dispatch(&mut self, item: WorkItem) {
        debug_assert!(self.has_capacity(), "dispatch without a free slot");

        tracing::debug!(url = %item.url, attempt = item.attempt, "Dispatching fetch");

        let fetcher = Arc::clone(&self.fetcher);
        self.in_flight.insert(item.url.clone(), item.clone());
        self.tasks.spawn(async move {
            let result = fetcher.fetch(&item.url).await;
            FetchOutcome { item, result }
        });

        self.peak_in_flight = self.peak_in_flight.max(self.tasks.len());
    }

    /// Removes and returns a retry whose delay has passed, earliest first
    pub fn pop_ready_retry(&mut self) -> Option<WorkItem> {
        let now = Instant::now();
        let index = self
            .backoff
            .iter()
            .enumerate()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .min_by_key(|(_, (deadline, _))| *deadline)
            .map(|(index, _)| index)?;
        Some(self.backoff.swap_remove(index).1)
    }

    /// Drops every backoff timer and returns the waiting items
    ///
    /// Used on shutdown; the items go back to the pending list.
    pub fn take_backoff(&mut self) -> Vec<WorkItem> {
        let mut waiting = std::mem::take(&mut self.backoff);
        waiting.sort_by_key(|(deadline, _)| *deadline);
        waiting.into_iter().map(|(_, item)| item).collect()
    }

    /// Items the pool holds that are not yet complete, for checkpointing
    pub fn pending_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.backoff
            .iter()
            .map(|(_, item)| item)
            .chain(self.in_flight.values())
    }

    /// Waits for the next fetch result or backoff expiry
    ///
    /// Returns `None` when the pool is idle.
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        loop {
            let next_retry = self.backoff.iter().map(|(deadline, _)| *deadline).min();

            if self.tasks.is_empty() {
                let deadline = next_retry?;
                sleep_until(deadline).await;
                return Some(PoolEvent::RetryReady);
            }

            tokio::select! {
                joined = self.tasks.join_next() => {
                    match joined {
                        Some(Ok(outcome)) => return Some(self.settle(outcome)),
                        Some(Err(e)) => {
                            // The item stays in `in_flight` and is persisted as pending
                            tracing::error!(error = %e, "Fetch task failed");
                        }
                        None => {}
                    }
                }
                _ = sleep_until(next_retry.unwrap_or_else(Instant::now)), if next_retry.is_some() => {
                    return Some(PoolEvent::RetryReady);
                }
            }
        }
    }

    /// Applies the retry policy to a finished fetch
    fn settle(&mut self, outcome: FetchOutcome) -> PoolEvent {
        let FetchOutcome { mut item, result } = outcome;
        self.in_flight.remove(&item.url);

        let error = match result {
            Ok(body) => return PoolEvent::Fetched { item, body },
            Err(error) => error,
        };

        let class = error.class();
        match self.policy.decide(item.attempt, class) {
            RetryDecision::Retry(delay) => {
                item.attempt += 1;
                tracing::warn!(
                    url = %item.url,
                    attempt = item.attempt,
                    class = class.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Fetch failed, retrying"
                );
                let url = item.url.clone();
                let attempt = item.attempt;
                self.backoff.push((Instant::now() + delay, item));
                PoolEvent::Rescheduled {
                    url,
                    attempt,
                    delay,
                }
            }
            RetryDecision::Abandon => {
                item.attempt += 1;
                if class == ErrorClass::Permanent {
                    tracing::warn!(
                        url = %item.url,
                        attempt = item.attempt,
                        class = class.as_str(),
                        error = %error,
                        "Fetch failed permanently"
                    );
                } else {
                    tracing::error!(
                        url = %item.url,
                        attempt = item.attempt,
                        class = class.as_str(),
                        error = %error,
                        "Retries exhausted"
                    );
                }
                PoolEvent::Abandoned { item, error }
            }
        }
    }
}
