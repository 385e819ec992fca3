//! Database schema definitions
//!
//! This module contains the SQL schema for the listings database.

/// SQL schema for the database
///
/// One column per [`crate::state::ListingFields`] column; unmapped labels are
/// stored as a JSON object in `extra`.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    listing_id TEXT,
    listing_number TEXT,
    title TEXT,
    price TEXT,
    price_value TEXT,
    price_currency TEXT,
    city TEXT,
    location TEXT,
    property_type TEXT,
    listing_type TEXT,
    building_type TEXT,
    area_sqm TEXT,
    rooms TEXT,
    room_count TEXT,
    floor TEXT,
    total_floors TEXT,
    construction_year TEXT,
    land_area TEXT,
    deed_type TEXT,
    description TEXT,
    owner_name TEXT,
    phone TEXT,
    listing_date TEXT,
    posted_date TEXT,
    views TEXT,
    image_count TEXT,
    thumbnail TEXT,
    all_images TEXT,
    extra TEXT,
    ingested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listings_listing_id ON listings(listing_id);
CREATE INDEX IF NOT EXISTS idx_listings_city ON listings(city);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
