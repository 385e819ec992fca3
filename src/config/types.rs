use serde::Deserialize;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Seed URL of the catalog category (page 1)
    #[serde(rename = "category-url")]
    pub category_url: String,

    /// First list page to fetch
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// Last list page to fetch; absent means auto-detect
    #[serde(rename = "end-page", default)]
    pub end_page: Option<u32>,

    /// Upper bound on list pages when auto-detecting without a pagination hint
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Maximum number of fetches in flight at once
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Whether to visit each listing's detail page
    #[serde(rename = "fetch-details", default = "default_true")]
    pub fetch_details: bool,

    /// Retries for transient failures before an item is abandoned
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay (milliseconds), doubled on every retry
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Cap on a single backoff delay (milliseconds)
    #[serde(rename = "retry-max-delay-ms", default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Completed items between checkpoint persists
    #[serde(rename = "auto-save-interval", default = "default_auto_save_interval")]
    pub auto_save_interval: u32,

    /// Whether to load an existing checkpoint at startup
    #[serde(default = "default_true")]
    pub resume: bool,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Last path segment of the category URL, used to name output files
    pub fn category_slug(&self) -> String {
        crate::url::category_slug(&self.category_url)
    }
}

/// Request identification headers
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// User-Agent header value
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Language header value
    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Referer header value
    #[serde(default)]
    pub referer: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            referer: None,
        }
    }
}

/// Output locations
///
/// Paths left empty are derived from the category slug by
/// [`OutputConfig::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON checkpoint file
    #[serde(rename = "checkpoint-path", default)]
    pub checkpoint_path: String,

    /// Path to the SQLite listings database
    #[serde(rename = "database-path", default)]
    pub database_path: String,

    /// Path to the JSON dump written when the database write fails
    #[serde(rename = "fallback-path", default)]
    pub fallback_path: String,

    /// Path to the append-only failed-URL report
    #[serde(rename = "failed-urls-path", default)]
    pub failed_urls_path: String,
}

impl OutputConfig {
    /// Fills every empty path with a default named after `slug`
    pub fn resolve(&mut self, slug: &str) {
        if self.checkpoint_path.is_empty() {
            self.checkpoint_path = format!("{}_checkpoint.json", slug);
        }
        if self.database_path.is_empty() {
            self.database_path = format!("{}_listings.db", slug);
        }
        if self.fallback_path.is_empty() {
            self.fallback_path = format!("{}_listings_backup.json", slug);
        }
        if self.failed_urls_path.is_empty() {
            self.failed_urls_path = format!("{}_failed_urls.txt", slug);
        }
    }
}

/// CSS selectors used by the catalog extractor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    #[serde(rename = "card")]
    pub card: String,
    #[serde(rename = "card-link")]
    pub card_link: String,
    #[serde(rename = "card-title")]
    pub card_title: String,
    #[serde(rename = "card-price")]
    pub card_price: String,
    #[serde(rename = "card-date")]
    pub card_date: String,
    #[serde(rename = "card-bookmark")]
    pub card_bookmark: String,
    #[serde(rename = "pagination")]
    pub pagination: String,
    #[serde(rename = "detail-price")]
    pub detail_price: String,
    #[serde(rename = "price-value")]
    pub price_value: String,
    #[serde(rename = "price-currency")]
    pub price_currency: String,
    #[serde(rename = "property")]
    pub property: String,
    #[serde(rename = "property-name")]
    pub property_name: String,
    #[serde(rename = "property-value")]
    pub property_value: String,
    #[serde(rename = "description")]
    pub description: String,
    #[serde(rename = "gallery-image")]
    pub gallery_image: String,
    #[serde(rename = "statistic")]
    pub statistic: String,
    #[serde(rename = "owner-name")]
    pub owner_name: String,
    #[serde(rename = "phone")]
    pub phone: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: "div.products-i".to_string(),
            card_link: "a.products-link".to_string(),
            card_title: "div.products-name".to_string(),
            card_price: "div.products-price".to_string(),
            card_date: "div.products-created".to_string(),
            card_bookmark: "a.add_bookmark".to_string(),
            pagination: "div.navigation a, ul.pagination a".to_string(),
            detail_price: "div.product-price".to_string(),
            price_value: "span.price-val".to_string(),
            price_currency: "span.price-cur".to_string(),
            property: "div.product-properties__i".to_string(),
            property_name: "label.product-properties__i-name".to_string(),
            property_value: "span.product-properties__i-value".to_string(),
            description: "div.product-description__content div".to_string(),
            gallery_image: "ul.xfieldimagegallery img".to_string(),
            statistic: "div.product-info__statistics div.product-info__statistics__i"
                .to_string(),
            owner_name: "div.product-owner__info div.product-owner__info-name".to_string(),
            phone: "span.phone_number".to_string(),
        }
    }
}

fn default_start_page() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    100
}

fn default_max_concurrent() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_auto_save_interval() -> u32 {
    50
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_language() -> String {
    "en-GB,en-US;q=0.9,en;q=0.8".to_string()
}
