//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the frontier database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Scheduled entries, one row per (crawl, queue, url).
-- seq preserves insertion order as the tie-break within a schedule time.
CREATE TABLE IF NOT EXISTS scheduled (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id TEXT NOT NULL,
    queue_key TEXT NOT NULL,
    url TEXT NOT NULL,
    refetchable_from INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    in_flight INTEGER NOT NULL DEFAULT 0,
    UNIQUE(crawl_id, queue_key, url)
);

CREATE INDEX IF NOT EXISTS idx_scheduled_due
    ON scheduled(crawl_id, queue_key, refetchable_from, seq);

-- Known-set: every URL ever ingested under a crawl, with the queue it was
-- filed under at first ingest.
CREATE TABLE IF NOT EXISTS known_urls (
    crawl_id TEXT NOT NULL,
    url TEXT NOT NULL,
    queue_key TEXT NOT NULL,
    PRIMARY KEY (crawl_id, url)
);

CREATE INDEX IF NOT EXISTS idx_known_queue ON known_urls(crawl_id, queue_key);

-- One row per queue; survives its entries so completed counts persist
-- across restarts.
CREATE TABLE IF NOT EXISTS queues (
    crawl_id TEXT NOT NULL,
    queue_key TEXT NOT NULL,
    completed_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (crawl_id, queue_key)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
