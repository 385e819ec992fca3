//! Extracted listing records
//!
//! Every listing carries the same fixed set of optional columns so that output
//! stores see a stable schema. Labels the extractor does not recognise are kept in
//! `extra` rather than dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

macro_rules! listing_fields {
    ($($name:ident),* $(,)?) => {
        /// Optional fields extracted from a listing card or detail page
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct ListingFields {
            $(pub $name: Option<String>,)*

            /// Fields with no dedicated column, keyed by snake_case label
            #[serde(skip_serializing_if = "BTreeMap::is_empty")]
            pub extra: BTreeMap<String, String>,
        }

        impl ListingFields {
            /// Column names in output order
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($name)),*];

            /// Returns the value of a named column
            pub fn get(&self, column: &str) -> Option<&str> {
                match column {
                    $(stringify!($name) => self.$name.as_deref(),)*
                    _ => None,
                }
            }

            fn slot_mut(&mut self, column: &str) -> Option<&mut Option<String>> {
                match column {
                    $(stringify!($name) => Some(&mut self.$name),)*
                    _ => None,
                }
            }

            fn columns_mut(&mut self) -> Vec<&mut Option<String>> {
                vec![$(&mut self.$name),*]
            }

            fn columns(&self) -> Vec<&Option<String>> {
                vec![$(&self.$name),*]
            }
        }
    };
}

listing_fields!(
    listing_id,
    listing_number,
    title,
    price,
    price_value,
    price_currency,
    city,
    location,
    property_type,
    listing_type,
    building_type,
    area_sqm,
    rooms,
    room_count,
    floor,
    total_floors,
    construction_year,
    land_area,
    deed_type,
    description,
    owner_name,
    phone,
    listing_date,
    posted_date,
    views,
    image_count,
    thumbnail,
    all_images,
);

impl ListingFields {
    /// Sets a field by name
    ///
    /// Known columns are set directly; anything else lands in `extra`. Blank values
    /// are ignored so that an absent field stays `None`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        match self.slot_mut(name) {
            Some(slot) => *slot = Some(value.to_string()),
            None => {
                self.extra.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Overlays `newer` onto `self`; every field present in `newer` wins
    pub fn merge_from(&mut self, newer: &ListingFields) {
        for (slot, value) in self.columns_mut().into_iter().zip(newer.columns()) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        for (key, value) in &newer.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Number of populated fields, including extras
    pub fn populated(&self) -> usize {
        self.columns().iter().filter(|v| v.is_some()).count() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populated() == 0
    }
}

/// One extracted, deduplicated catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Stable identity; the normalized detail URL
    pub id: String,

    /// Detail page URL
    pub url: String,

    pub fields: ListingFields,

    /// When this record was last written by a fetch
    pub ingested_at: DateTime<Utc>,
}

impl Listing {
    /// Creates a listing keyed by its detail URL
    pub fn new(url: impl Into<String>, fields: ListingFields) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            url,
            fields,
            ingested_at: Utc::now(),
        }
    }

    /// Applies a later fetch of the same listing
    ///
    /// Fields present in `newer` overwrite ours; the ingestion time moves forward.
    pub fn absorb(&mut self, newer: &Listing) {
        self.fields.merge_from(&newer.fields);
        self.url.clone_from(&newer.url);
        if newer.ingested_at > self.ingested_at {
            self.ingested_at = newer.ingested_at;
        }
    }

    /// A listing is valid for output when it has an identity and at least one field
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.url.trim().is_empty() && !self.fields.is_empty()
    }
}
