//! Output sink traits and types
//!
//! This module defines the trait interface for result sinks and the errors and
//! reports they produce.

use crate::state::Listing;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("primary output failed ({primary}) and fallback {path} failed ({fallback})")]
    Flush {
        primary: String,
        path: PathBuf,
        fallback: String,
    },

    #[error("Failed to serialize listings: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Where a flush ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushDestination {
    Primary(PathBuf),
    Fallback(PathBuf),
}

/// Outcome of a successful flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Listings written
    pub written: usize,

    /// Listings dropped by validation
    pub rejected: usize,

    pub destination: FlushDestination,
}

/// Final destination for extracted listings
///
/// Implementations must be idempotent: flushing the same listings twice leaves
/// one record per listing id.
pub trait ResultSink {
    fn flush(&mut self, listings: &[&Listing]) -> OutputResult<FlushReport>;
}
