//! Catalog-Harvest: a resumable catalog crawler
//!
//! This crate collects paginated listing data from a web catalog. A crawl can be
//! interrupted at any point (process kill, network loss, Ctrl-C) and resumed later
//! without losing gathered listings and without re-fetching processed pages.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transient network error for {url} (attempt {attempt}): {message}")]
    TransientNetwork {
        url: String,
        attempt: u32,
        message: String,
    },

    #[error("Permanent request error for {url}: {message}")]
    PermanentRequest { url: String, message: String },

    #[error("Extraction error for {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("Checkpoint I/O error: {0}")]
    CheckpointIo(#[from] storage::CheckpointError),

    #[error("Discovery failed, start page {url} unreachable: {reason}")]
    FatalDiscovery { url: String, reason: String },

    #[error("Final flush failed: {0}")]
    Flush(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl HarvestError {
    /// Returns true if this error must terminate the process with a non-zero status
    ///
    /// Per-item errors are contained by the orchestrator and never reach the caller;
    /// only a failed discovery or a failed final flush end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalDiscovery { .. } | Self::Flush(_) | Self::Config(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}' for {field}")]
    InvalidSelector { field: String, selector: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{CrawlPhase, CrawlState, Listing, WorkItem, WorkKind};
pub use url::{normalize_url, page_url};
