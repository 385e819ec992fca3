use crate::state::ListingFields;
use serde::{Deserialize, Serialize};

/// What a work item fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkKind {
    /// A catalog list page
    ListPage { page: u32 },

    /// A listing detail page, carrying the summary taken from its card
    DetailPage {
        #[serde(default)]
        card: ListingFields,
    },
}

/// A unit of fetch work; identity is the URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub url: String,
    pub kind: WorkKind,

    /// Failed attempts so far; only the worker pool increments this
    #[serde(default)]
    pub attempt: u32,
}

impl WorkItem {
    pub fn list_page(url: impl Into<String>, page: u32) -> Self {
        Self {
            url: url.into(),
            kind: WorkKind::ListPage { page },
            attempt: 0,
        }
    }

    pub fn detail_page(url: impl Into<String>, card: ListingFields) -> Self {
        Self {
            url: url.into(),
            kind: WorkKind::DetailPage { card },
            attempt: 0,
        }
    }

    pub fn is_list_page(&self) -> bool {
        matches!(self.kind, WorkKind::ListPage { .. })
    }

    /// Page number for list pages
    pub fn page(&self) -> Option<u32> {
        match self.kind {
            WorkKind::ListPage { page } => Some(page),
            WorkKind::DetailPage { .. } => None,
        }
    }
}
