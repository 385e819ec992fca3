//! URL handling module for Catalog-Harvest
//!
//! This module provides URL normalization (the dedup identity of every work item)
//! and the catalog's pagination scheme.

mod normalize;

use crate::UrlError;
use url::Url;

pub use normalize::normalize_url;

/// Builds the URL of a list page
///
/// Page 1 is the category URL itself; page N is `<category>/page/N/`.
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::page_url;
///
/// let first = page_url("https://catalog.example.com/homes/", 1).unwrap();
/// assert_eq!(first.as_str(), "https://catalog.example.com/homes");
///
/// let third = page_url("https://catalog.example.com/homes", 3).unwrap();
/// assert_eq!(third.as_str(), "https://catalog.example.com/homes/page/3/");
/// ```
pub fn page_url(category_url: &str, page: u32) -> Result<Url, UrlError> {
    let base = category_url.trim().trim_end_matches('/');
    if page <= 1 {
        normalize_url(base)
    } else {
        normalize_url(&format!("{}/page/{}/", base, page))
    }
}

/// Extracts the page number from a list page URL built by [`page_url`]
pub fn page_number(url: &Url) -> Option<u32> {
    let segments = url.path_segments()?.filter(|s| !s.is_empty());
    let mut previous = None;
    for segment in segments {
        if previous == Some("page") {
            return segment.parse().ok();
        }
        previous = Some(segment);
    }
    None
}

/// Returns a short name for the category, used to derive output file names
///
/// This is the last non-empty path segment of the category URL, falling back to
/// the host and then to `"catalog"`.
pub fn category_slug(category_url: &str) -> String {
    let Ok(url) = Url::parse(category_url) else {
        return "catalog".to_string();
    };

    let from_path = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string);

    from_path
        .or_else(|| url.host_str().map(|h| h.replace('.', "_")))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "catalog".to_string())
}
