//! Shared fixtures for the integration tests

use async_trait::async_trait;
use catalog_harvest::config::{parse_config, Config};
use catalog_harvest::crawler::{Fetch, FetchError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

pub const CATEGORY: &str = "https://catalog.test/homes";

/// URL of list page `page` of [`CATEGORY`]
pub fn list_url(page: u32) -> String {
    if page <= 1 {
        CATEGORY.to_string()
    } else {
        format!("{CATEGORY}/page/{page}/")
    }
}

/// URL of the detail page of item `id`
pub fn item_url(id: &str) -> String {
    format!("https://catalog.test/items/{id}")
}

/// A list page with one card per id and pagination links up to `last_page`
pub fn list_html(ids: &[&str], last_page: Option<u32>) -> String {
    let cards: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"
            <div class="products-i">
              <a class="products-link" href="/items/{id}">
                <div class="products-price">
                  <span class="price-val">{id}00</span><span class="price-cur">AZN</span>
                </div>
                <div class="products-name">Card {id}</div>
              </a>
              <a class="add_bookmark" data-id="{id}"></a>
            </div>"#
            )
        })
        .collect();

    let pagination: String = (2..=last_page.unwrap_or(1))
        .map(|page| format!(r#"<a href="/homes/page/{page}/">{page}</a>"#))
        .collect();

    format!(
        r#"<html><body><div class="products">{cards}</div>
        <div class="navigation">{pagination}</div></body></html>"#
    )
}

/// A detail page whose description and price depend on `marker`
pub fn detail_html(marker: &str) -> String {
    format!(
        r#"<html><body>
          <div class="product-price">
            <span class="price-val">{marker}</span><span class="price-cur">AZN</span>
          </div>
          <div class="product-properties__i">
            <label class="product-properties__i-name">Şəhər</label>
            <span class="product-properties__i-value">Bakı</span>
          </div>
          <div class="product-description__content"><div>Listing {marker}</div></div>
        </body></html>"#
    )
}

/// Crawler settings that keep tests fast unless a test overrides them
const FAST_DEFAULTS: &[(&str, &str)] = &[
    ("retry-base-delay-ms", "10"),
    ("retry-max-delay-ms", "1000"),
    ("request-timeout-secs", "5"),
];

/// Builds a validated config writing every output into `dir`
///
/// `crawler_extra` holds additional `[crawler]` lines.
pub fn test_config(dir: &TempDir, category: &str, crawler_extra: &str) -> Config {
    let out = dir.path().display();
    let defaults: String = FAST_DEFAULTS
        .iter()
        .filter(|(key, _)| !crawler_extra.contains(key))
        .map(|(key, value)| format!("{key} = {value}\n"))
        .collect();

    parse_config(&format!(
        r#"
[crawler]
category-url = "{category}"
{defaults}{crawler_extra}

[user-agent]
accept-language = "az-AZ"

[output]
checkpoint-path = "{out}/checkpoint.json"
database-path = "{out}/listings.db"
fallback-path = "{out}/backup.json"
failed-urls-path = "{out}/failed.txt"
"#
    ))
    .expect("test config must be valid")
}

pub fn checkpoint_path(dir: &TempDir) -> PathBuf {
    dir.path().join("checkpoint.json")
}

type Hook = Box<dyn Fn(usize, &str) + Send + Sync>;

/// In-process fetcher serving scripted responses
///
/// Each URL maps to a sequence of responses; the last one repeats. Unknown URLs
/// answer with HTTP 404.
#[derive(Default)]
pub struct ScriptedFetch {
    responses: HashMap<String, Vec<Result<String, FetchError>>>,
    served: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<(String, Instant)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    hook: Option<Hook>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answers `url` with `body`
    pub fn page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.script(url, vec![Ok(body.into())])
    }

    pub fn script(mut self, url: impl Into<String>, responses: Vec<Result<String, FetchError>>) -> Self {
        self.responses.insert(url.into(), responses);
        self
    }

    /// Holds every fetch for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs `hook(call_number, url)` at the start of every fetch; calls count from 1
    pub fn on_fetch(mut self, hook: impl Fn(usize, &str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Every fetched URL in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Start times of the fetches of `url`
    pub fn call_times(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((url.to_string(), Instant::now()));
            calls.len()
        };
        if let Some(hook) = &self.hook {
            hook(call, url);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(responses) = self.responses.get(url) else {
            return Err(FetchError::Client(404));
        };
        let index = {
            let mut served = self.served.lock().unwrap();
            let count = served.entry(url.to_string()).or_insert(0);
            *count += 1;
            (*count - 1).min(responses.len() - 1)
        };
        responses[index].clone()
    }
}
