//! State module for tracking crawl progress
//!
//! This module provides the data the orchestrator owns while a crawl runs.
//!
//! # Components
//!
//! - `CrawlPhase`: The phase of the orchestrator state machine
//! - `WorkItem`: A list page or detail page waiting to be fetched
//! - `Listing`: One extracted catalog item
//! - `CrawlState`: The checkpointed snapshot of all of the above

mod crawl_state;
mod listing;
mod phase;
mod work_item;

// Re-export main types
pub use crawl_state::{CrawlState, FailedItem, Upsert};
pub use listing::{Listing, ListingFields};
pub use phase::CrawlPhase;
pub use work_item::{WorkItem, WorkKind};
