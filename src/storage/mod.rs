//! Storage module for persisting crawl data
//!
//! This module handles everything written to disk during a crawl:
//! - The JSON checkpoint of the crawl state, written atomically
//! - The SQLite listings database and its schema

mod checkpoint;
mod schema;
mod sqlite;
mod traits;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub(crate) use checkpoint::write_atomic;
pub use sqlite::SqliteListingStore;
pub use traits::{ListingStore, StorageError, StorageResult};
