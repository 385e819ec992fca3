//! Integration tests for Catalog-Harvest
//!
//! `crawl_tests` drives the real HTTP fetcher against wiremock servers; the other
//! modules use a scripted in-process fetcher for deterministic timing.

mod common;
mod crawl_tests;
mod resume_tests;
mod scenario_tests;
