/// Crawl phase definitions for the orchestrator state machine
///
/// This module defines the phases a crawl run moves through and which moves are legal.
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Fetching the start page to learn the page bound
    Discovering,

    /// Fetching list pages and enqueueing detail URLs
    Listing,

    /// Only detail pages remain
    Detailing,

    /// No new work is taken; waiting for in-flight fetches
    Draining,

    /// Terminal: state persisted and output flushed
    Done,
}

impl CrawlPhase {
    /// Returns true if this is the terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if new work may be dispatched in this phase
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Discovering | Self::Listing | Self::Detailing)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// Phases only move forward; `Draining` is reachable from every non-terminal
    /// phase because a shutdown signal can arrive at any point.
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        match (self, next) {
            (Done, _) => false,
            (_, Draining) => true,
            (Discovering, Listing) | (Discovering, Detailing) => true,
            (Listing, Detailing) => true,
            (Draining, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovering => "discovering",
            Self::Listing => "listing",
            Self::Detailing => "detailing",
            Self::Draining => "draining",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
