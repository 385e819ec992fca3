//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ListingStore trait.

use crate::state::{Listing, ListingFields};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ListingStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite listing store
pub struct SqliteListingStore {
    conn: Connection,
}

impl SqliteListingStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteListingStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn upsert_sql() -> String {
    let columns = ListingFields::COLUMNS;

    let names = columns.join(", ");
    let placeholders = (1..=columns.len() + 4)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = columns
        .iter()
        .map(|c| format!("{c} = COALESCE(excluded.{c}, listings.{c})"))
        .collect::<Vec<_>>()
        .join(",\n    ");

    format!(
        "INSERT INTO listings (id, url, {names}, extra, ingested_at)
VALUES ({placeholders})
ON CONFLICT(id) DO UPDATE SET
    url = excluded.url,
    {updates},
    extra = COALESCE(excluded.extra, listings.extra),
    ingested_at = excluded.ingested_at"
    )
}

fn select_sql() -> String {
    format!(
        "SELECT id, url, {}, extra, ingested_at FROM listings WHERE id = ?1",
        ListingFields::COLUMNS.join(", ")
    )
}

fn row_to_listing(row: &Row<'_>) -> rusqlite::Result<(Listing, Option<String>, String)> {
    let id: String = row.get(0)?;
    let url: String = row.get(1)?;

    let mut fields = ListingFields::default();
    for (offset, column) in ListingFields::COLUMNS.iter().enumerate() {
        if let Some(value) = row.get::<_, Option<String>>(offset + 2)? {
            fields.set(column, value);
        }
    }

    let base = ListingFields::COLUMNS.len() + 2;
    let extra: Option<String> = row.get(base)?;
    let ingested_at: String = row.get(base + 1)?;

    let listing = Listing {
        id,
        url,
        fields,
        ingested_at: Utc::now(),
    };
    Ok((listing, extra, ingested_at))
}

impl ListingStore for SqliteListingStore {
    fn upsert_listings(&mut self, listings: &[&Listing]) -> StorageResult<usize> {
        let sql = upsert_sql();
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(&sql)?;
            for listing in listings {
                let extra = if listing.fields.extra.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&listing.fields.extra)?)
                };
                let ingested_at = listing.ingested_at.to_rfc3339();

                let mut values: Vec<Option<&str>> = Vec::with_capacity(ListingFields::COLUMNS.len() + 4);
                values.push(Some(listing.id.as_str()));
                values.push(Some(listing.url.as_str()));
                values.extend(ListingFields::COLUMNS.iter().map(|c| listing.fields.get(c)));
                values.push(extra.as_deref());
                values.push(Some(ingested_at.as_str()));

                stmt.execute(params_from_iter(values))?;
            }
        }

        tx.commit()?;
        Ok(listings.len())
    }

    fn get_listing(&self, id: &str) -> StorageResult<Option<Listing>> {
        let row = self
            .conn
            .query_row(&select_sql(), params![id], row_to_listing)
            .optional()?;

        let Some((mut listing, extra, ingested_at)) = row else {
            return Ok(None);
        };

        if let Some(extra) = extra {
            let extra: BTreeMap<String, String> = serde_json::from_str(&extra)?;
            listing.fields.extra = extra;
        }
        listing.ingested_at = DateTime::parse_from_rfc3339(&ingested_at)
            .map_err(|_| StorageError::InvalidTimestamp {
                id: listing.id.clone(),
                value: ingested_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Some(listing))
    }

    fn count_listings(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
