//! HTML extraction for catalog pages
//!
//! This module turns fetched HTML into structured data:
//! - List pages: listing cards and a pagination hint
//! - Detail pages: the listing's property table and metadata
//!
//! Selectors come from [`SelectorConfig`] so that a layout change on the site is a
//! configuration edit.

use crate::config::SelectorConfig;
use crate::state::ListingFields;
use crate::url::normalize_url;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// Property labels with a dedicated column
const LABEL_FIELDS: &[(&str, &str)] = &[
    ("Şəhər", "city"),
    ("Əmlakın növü", "property_type"),
    ("Elanın tipi", "listing_type"),
    ("Yerləşdirmə yeri", "location"),
    ("Yerləşmə yeri", "location"),
    ("Binanın tipi", "building_type"),
    ("Sahə, m²", "area_sqm"),
    ("Sahə", "area_sqm"),
    ("Otaq sayı", "rooms"),
    ("Mərtəbə", "floor"),
    ("Mərtəbələrin sayı", "total_floors"),
    ("Tikinti ili", "construction_year"),
    ("Torpaq sahəsi", "land_area"),
    ("Otaqların sayı", "room_count"),
    ("Çıxarış", "deed_type"),
];

/// Month names used by the site's posting dates
const MONTHS: &[&str] = &[
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

/// Errors raised while extracting data from a page
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid CSS selector '{selector}' for {field}")]
    InvalidSelector { field: &'static str, selector: String },

    #[error("no listing data found on detail page")]
    EmptyDetail,
}

/// A listing card found on a list page
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Normalized detail page URL
    pub url: String,
    pub fields: ListingFields,
}

/// Everything extracted from a list page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub cards: Vec<Card>,

    /// Largest page number linked from the pagination block, if above 1
    pub last_page_hint: Option<u32>,
}

/// Turns page HTML into cards and listing fields
pub trait Extractor: Send + Sync {
    fn extract_list(&self, html: &str, page_url: &Url) -> Result<ListPage, ExtractionError>;

    fn extract_detail(&self, html: &str, url: &Url) -> Result<ListingFields, ExtractionError>;
}

/// Compiled selectors for the catalog layout
#[derive(Debug)]
pub struct CatalogExtractor {
    card: Selector,
    card_link: Selector,
    card_title: Selector,
    card_price: Selector,
    card_date: Selector,
    card_bookmark: Selector,
    pagination: Selector,
    detail_price: Selector,
    price_value: Selector,
    price_currency: Selector,
    property: Selector,
    property_name: Selector,
    property_value: Selector,
    description: Selector,
    gallery_image: Selector,
    statistic: Selector,
    owner_name: Selector,
    phone: Selector,
    image: Selector,
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|_| ExtractionError::InvalidSelector {
        field,
        selector: selector.to_string(),
    })
}

impl CatalogExtractor {
    pub fn new(selectors: &SelectorConfig) -> Result<Self, ExtractionError> {
        Ok(Self {
            card: compile("card", &selectors.card)?,
            card_link: compile("card-link", &selectors.card_link)?,
            card_title: compile("card-title", &selectors.card_title)?,
            card_price: compile("card-price", &selectors.card_price)?,
            card_date: compile("card-date", &selectors.card_date)?,
            card_bookmark: compile("card-bookmark", &selectors.card_bookmark)?,
            pagination: compile("pagination", &selectors.pagination)?,
            detail_price: compile("detail-price", &selectors.detail_price)?,
            price_value: compile("price-value", &selectors.price_value)?,
            price_currency: compile("price-currency", &selectors.price_currency)?,
            property: compile("property", &selectors.property)?,
            property_name: compile("property-name", &selectors.property_name)?,
            property_value: compile("property-value", &selectors.property_value)?,
            description: compile("description", &selectors.description)?,
            gallery_image: compile("gallery-image", &selectors.gallery_image)?,
            statistic: compile("statistic", &selectors.statistic)?,
            owner_name: compile("owner-name", &selectors.owner_name)?,
            phone: compile("phone", &selectors.phone)?,
            image: compile("image", "img")?,
        })
    }

    fn parse_card(&self, card: ElementRef<'_>, page_url: &Url) -> Option<Card> {
        let link = card.select(&self.card_link).next()?;
        let href = link.value().attr("href")?;
        let url = page_url.join(href.trim()).ok()?;
        let url = normalize_url(url.as_str()).ok()?;

        let mut fields = ListingFields::default();

        if let Some(title) = first_text(link, &self.card_title) {
            fields.set("title", title);
        }
        if let Some(src) = link
            .select(&self.image)
            .next()
            .and_then(|img| img.value().attr("src"))
        {
            fields.set("thumbnail", src);
        }
        if let Some(price) = card.select(&self.card_price).next() {
            self.set_price(&mut fields, price);
        }
        if let Some(date) = first_text(card, &self.card_date) {
            fields.set("listing_date", date);
        }
        if let Some(id) = card
            .select(&self.card_bookmark)
            .next()
            .and_then(|b| b.value().attr("data-id"))
        {
            fields.set("listing_id", id);
        }

        Some(Card {
            url: url.to_string(),
            fields,
        })
    }

    fn set_price(&self, fields: &mut ListingFields, container: ElementRef<'_>) {
        let value = first_text(container, &self.price_value);
        let currency = first_text(container, &self.price_currency);

        let combined = match (&value, &currency) {
            (Some(v), Some(c)) => Some(format!("{} {}", v, c)),
            (Some(v), None) => Some(v.clone()),
            _ => None,
        };

        if let Some(value) = value {
            fields.set("price_value", value);
        }
        if let Some(currency) = currency {
            fields.set("price_currency", currency);
        }
        if let Some(combined) = combined {
            fields.set("price", combined);
        }
    }

    fn last_page_hint(&self, document: &Html) -> Option<u32> {
        let max = document
            .select(&self.pagination)
            .flat_map(|link| {
                let from_text = element_text(link).parse::<u32>().ok();
                let from_href = link.value().attr("href").and_then(page_from_href);
                [from_text, from_href]
            })
            .flatten()
            .max()?;

        (max > 1).then_some(max)
    }

    fn set_statistic(fields: &mut ListingFields, text: &str) {
        if text.contains('№') {
            fields.set("listing_number", text.replace('№', ""));
        } else if MONTHS.iter().any(|month| text.contains(month)) {
            fields.set("posted_date", text);
        } else if text.contains("sayı") {
            let digits: String = text
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || c.is_whitespace())
                .filter(char::is_ascii_digit)
                .collect();
            fields.set("views", digits);
        }
    }
}

impl Extractor for CatalogExtractor {
    fn extract_list(&self, html: &str, page_url: &Url) -> Result<ListPage, ExtractionError> {
        let document = Html::parse_document(html);

        let cards: Vec<Card> = document
            .select(&self.card)
            .filter_map(|card| self.parse_card(card, page_url))
            .collect();

        tracing::debug!(url = %page_url, cards = cards.len(), "Extracted list page");

        Ok(ListPage {
            cards,
            last_page_hint: self.last_page_hint(&document),
        })
    }

    fn extract_detail(&self, html: &str, url: &Url) -> Result<ListingFields, ExtractionError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut fields = ListingFields::default();

        if let Some(price) = root.select(&self.detail_price).next() {
            self.set_price(&mut fields, price);
        }

        for property in root.select(&self.property) {
            let (Some(label), Some(value)) = (
                first_text(property, &self.property_name),
                first_text(property, &self.property_value),
            ) else {
                continue;
            };
            let label = label.replace(':', "");
            fields.set(&field_for_label(label.trim()), value);
        }

        if let Some(description) = first_text(root, &self.description) {
            fields.set("description", description);
        }

        let images: Vec<&str> = root
            .select(&self.gallery_image)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .collect();
        if !images.is_empty() {
            fields.set("all_images", images.join("|"));
            fields.set("image_count", images.len().to_string());
        }

        for statistic in root.select(&self.statistic) {
            Self::set_statistic(&mut fields, &element_text(statistic));
        }

        if let Some(owner) = first_text(root, &self.owner_name) {
            fields.set("owner_name", owner);
        }
        if let Some(phone) = first_text(root, &self.phone) {
            fields.set("phone", phone);
        }

        if fields.is_empty() {
            return Err(ExtractionError::EmptyDetail);
        }

        tracing::debug!(url = %url, fields = fields.populated(), "Extracted detail page");
        Ok(fields)
    }
}

/// Maps a property label to its column, or a snake_case key for `extra`
fn field_for_label(label: &str) -> String {
    if let Some((_, field)) = LABEL_FIELDS.iter().find(|(name, _)| *name == label) {
        return field.to_string();
    }

    let mut key = String::with_capacity(label.len());
    for c in label.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            key.push(c);
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// Extracts `N` from an href containing `/page/N/`
fn page_from_href(href: &str) -> Option<u32> {
    let (_, rest) = href.split_once("/page/")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Visible text of an element with whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}
