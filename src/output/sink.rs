//! SQLite result sink with a JSON fallback
//!
//! Listings go to the SQLite database. If that write fails for any reason the
//! whole batch is dumped as a JSON array instead, so a run never ends with its
//! data only in the checkpoint.

use crate::output::traits::{FlushDestination, FlushReport, OutputError, OutputResult, ResultSink};
use crate::state::Listing;
use crate::storage::{write_atomic, ListingStore, SqliteListingStore, StorageError};
use std::path::PathBuf;

/// Writes listings to SQLite, falling back to a JSON file
#[derive(Debug, Clone)]
pub struct SqliteSink {
    database_path: PathBuf,
    fallback_path: PathBuf,
}

impl SqliteSink {
    pub fn new(database_path: impl Into<PathBuf>, fallback_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            fallback_path: fallback_path.into(),
        }
    }

    fn write_primary(&self, listings: &[&Listing]) -> Result<usize, StorageError> {
        let mut store = SqliteListingStore::open(&self.database_path)?;
        store.upsert_listings(listings)
    }

    fn write_fallback(&self, listings: &[&Listing]) -> OutputResult<()> {
        let bytes = serde_json::to_vec_pretty(listings)?;
        write_atomic(&self.fallback_path, &bytes).map_err(|e| OutputError::Flush {
            primary: String::new(),
            path: self.fallback_path.clone(),
            fallback: e.to_string(),
        })
    }
}

impl ResultSink for SqliteSink {
    fn flush(&mut self, listings: &[&Listing]) -> OutputResult<FlushReport> {
        let valid: Vec<&Listing> = listings.iter().copied().filter(|l| l.is_valid()).collect();
        let rejected = listings.len() - valid.len();
        if rejected > 0 {
            tracing::warn!(rejected, "Dropping listings without data");
        }

        match self.write_primary(&valid) {
            Ok(written) => {
                tracing::info!(
                    path = %self.database_path.display(),
                    written,
                    "Listings written to database"
                );
                Ok(FlushReport {
                    written,
                    rejected,
                    destination: FlushDestination::Primary(self.database_path.clone()),
                })
            }
            Err(primary) => {
                tracing::error!(
                    path = %self.database_path.display(),
                    error = %primary,
                    "Database write failed, writing JSON fallback"
                );
                self.write_fallback(&valid).map_err(|e| match e {
                    OutputError::Flush { path, fallback, .. } => OutputError::Flush {
                        primary: primary.to_string(),
                        path,
                        fallback,
                    },
                    other => other,
                })?;
                tracing::warn!(
                    path = %self.fallback_path.display(),
                    written = valid.len(),
                    "Listings written to fallback file"
                );
                Ok(FlushReport {
                    written: valid.len(),
                    rejected,
                    destination: FlushDestination::Fallback(self.fallback_path.clone()),
                })
            }
        }
    }
}
