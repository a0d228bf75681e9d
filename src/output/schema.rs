//! Database schema for SQLite output

/// SQL schema for the output database
pub const SCHEMA_SQL: &str = r#"
-- Track scrape runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scraper_id TEXT NOT NULL,
    definition_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    records_emitted INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0,
    message TEXT
);

-- One row per record id; later runs overwrite earlier ones
CREATE TABLE IF NOT EXISTS scenes (
    id TEXT PRIMARY KEY,
    site_local_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    site TEXT NOT NULL,
    studio TEXT NOT NULL,
    title TEXT NOT NULL,
    synopsis TEXT NOT NULL,
    release_date TEXT NOT NULL,
    duration INTEGER NOT NULL,
    homepage_url TEXT NOT NULL,
    covers TEXT NOT NULL,
    gallery TEXT NOT NULL,
    tags TEXT NOT NULL,
    cast_members TEXT NOT NULL,
    filenames TEXT NOT NULL,
    first_run INTEGER NOT NULL REFERENCES runs(id),
    last_run INTEGER NOT NULL REFERENCES runs(id),
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scenes_site ON scenes(site);
CREATE INDEX IF NOT EXISTS idx_scenes_homepage ON scenes(homepage_url);
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
