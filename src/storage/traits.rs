//! Storage traits and error types
//!
//! This module defines the trait interface for listing stores and
//! associated error types.

use crate::state::Listing;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid timestamp for {id}: {value}")]
    InvalidTimestamp { id: String, value: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A durable store of listings keyed by id
///
/// Writes are upserts: a listing whose id already exists replaces the stored
/// row, so writing the same batch twice leaves one row per id.
pub trait ListingStore {
    /// Writes a batch of listings in a single transaction
    ///
    /// # Returns
    ///
    /// The number of rows written
    fn upsert_listings(&mut self, listings: &[&Listing]) -> StorageResult<usize>;

    /// Gets a listing by id
    fn get_listing(&self, id: &str) -> StorageResult<Option<Listing>>;

    /// Counts stored listings
    fn count_listings(&self) -> StorageResult<u64>;
}
