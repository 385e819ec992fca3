//! Output module for crawl results and reports
//!
//! This module handles:
//! - Writing listings to the SQLite database, with a JSON fallback
//! - Appending abandoned URLs to the failed-URL report
//! - Computing and printing checkpoint statistics

mod failed_report;
mod sink;
pub mod stats;
mod traits;

pub use failed_report::FailedReport;
pub use sink::SqliteSink;
pub use stats::{print_statistics, CrawlStatistics};
pub use traits::{FlushDestination, FlushReport, OutputError, OutputResult, ResultSink};
