//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Sweep database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Job snapshots, keyed by the job's own identifier
CREATE TABLE IF NOT EXISTS jobs (
    uuid TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status TEXT NOT NULL,
    owner TEXT NOT NULL,
    progress REAL NOT NULL DEFAULT 0,
    warnings TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    is_public INTEGER NOT NULL DEFAULT 0,
    parent TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_owner_status ON jobs(owner, status);

-- Resumable crawl-engine sessions
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    collection TEXT NOT NULL,
    observers TEXT NOT NULL
);

-- Durable frontier tier: discovered but not yet visited
CREATE TABLE IF NOT EXISTS frontier (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES crawl_sessions(id),
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    found_on TEXT,
    UNIQUE(session_id, url)
);

CREATE INDEX IF NOT EXISTS idx_frontier_session ON frontier(session_id, seq);

-- URIs dequeued for a session; never enqueued again for it
CREATE TABLE IF NOT EXISTS visited (
    session_id TEXT NOT NULL REFERENCES crawl_sessions(id),
    url TEXT NOT NULL,
    visited_at TEXT NOT NULL,
    PRIMARY KEY(session_id, url)
);

-- Continuation messages
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    dispatched_at TEXT NOT NULL
);

-- Full-text index documents
CREATE TABLE IF NOT EXISTS documents (
    url TEXT PRIMARY KEY,
    status_code INTEGER NOT NULL,
    headers TEXT NOT NULL,
    title TEXT,
    body_text TEXT NOT NULL,
    checksum TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
