//! SQLite-based record sink
//!
//! Records are upserted by their generated id, so re-running a scraper
//! updates existing rows instead of duplicating them.

use crate::crawler::CrawlReport;
use crate::output::schema::initialize_schema;
use crate::output::traits::{OutputResult, RecordSink, RunStatus};
use crate::record::OutputRecord;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite-based record sink
pub struct SqliteSink {
    conn: Connection,
    run_id: i64,
    written: u64,
}

impl SqliteSink {
    /// Opens (or creates) the database and starts a run
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `scraper_id` - Definition the run belongs to
    /// * `definition_hash` - Hash of the definition document
    pub fn open(path: &Path, scraper_id: &str, definition_hash: &str) -> OutputResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        Self::with_connection(conn, scraper_id, definition_hash)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(scraper_id: &str, definition_hash: &str) -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn, scraper_id, definition_hash)
    }

    fn with_connection(
        conn: Connection,
        scraper_id: &str,
        definition_hash: &str,
    ) -> OutputResult<Self> {
        initialize_schema(&conn)?;

        conn.execute(
            "INSERT INTO runs (scraper_id, definition_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                scraper_id,
                definition_hash,
                Utc::now().to_rfc3339(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        let run_id = conn.last_insert_rowid();
        tracing::debug!("Started output run {}", run_id);

        Ok(Self {
            conn,
            run_id,
            written: 0,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    fn close_run(
        &mut self,
        status: RunStatus,
        failures: usize,
        message: Option<&str>,
    ) -> OutputResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records_emitted = ?3,
                 failures = ?4, message = ?5
             WHERE id = ?6",
            params![
                status.to_db_string(),
                Utc::now().to_rfc3339(),
                self.written as i64,
                failures as i64,
                message,
                self.run_id
            ],
        )?;
        Ok(())
    }
}

impl RecordSink for SqliteSink {
    fn write_record(&mut self, record: &OutputRecord) -> OutputResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO scenes (id, site_local_id, kind, site, studio, title, synopsis,
                 release_date, duration, homepage_url, covers, gallery, tags, cast_members,
                 filenames, first_run, last_run, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
                 site_local_id = excluded.site_local_id,
                 kind = excluded.kind,
                 site = excluded.site,
                 studio = excluded.studio,
                 title = excluded.title,
                 synopsis = excluded.synopsis,
                 release_date = excluded.release_date,
                 duration = excluded.duration,
                 homepage_url = excluded.homepage_url,
                 covers = excluded.covers,
                 gallery = excluded.gallery,
                 tags = excluded.tags,
                 cast_members = excluded.cast_members,
                 filenames = excluded.filenames,
                 last_run = excluded.last_run,
                 updated_at = excluded.updated_at",
            params![
                record.id,
                record.site_local_id,
                record.kind,
                record.site,
                record.studio,
                record.title,
                record.synopsis,
                record.release_date,
                record.duration,
                record.homepage_url,
                serde_json::to_string(&record.covers)?,
                serde_json::to_string(&record.gallery)?,
                serde_json::to_string(&record.tags)?,
                serde_json::to_string(&record.cast)?,
                serde_json::to_string(&record.filenames)?,
                self.run_id,
                now
            ],
        )?;

        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, report: &CrawlReport) -> OutputResult<()> {
        self.close_run(RunStatus::Completed, report.total_failures(), None)?;
        tracing::debug!("Stored {} records in run {}", self.written, self.run_id);
        Ok(())
    }

    fn abort(&mut self, reason: &str) -> OutputResult<()> {
        self.close_run(RunStatus::Failed, 0, Some(reason))
    }
}
