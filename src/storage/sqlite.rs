//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::job::{warnings_from_json, Job, JobId, JobParts, Owner, Status};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{DocumentRecord, DocumentWrite, FrontierRecord, SessionRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

const JOB_COLUMNS: &str =
    "uuid, kind, created_at, updated_at, status, owner, progress, warnings, metadata, is_public, parent";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Runs raw SQL against the connection (for testing)
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

/// Raw column values of one `jobs` row
struct JobRow {
    uuid: String,
    kind: String,
    created_at: String,
    updated_at: String,
    status: String,
    owner: String,
    progress: f64,
    warnings: String,
    metadata: String,
    is_public: bool,
    parent: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            kind: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            status: row.get(4)?,
            owner: row.get(5)?,
            progress: row.get(6)?,
            warnings: row.get(7)?,
            metadata: row.get(8)?,
            is_public: row.get(9)?,
            parent: row.get(10)?,
        })
    }

    fn into_job(self) -> StorageResult<Job> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            StorageError::Serialization(format!("job {}: {}: {}", self.uuid, what, e))
        };

        let id = JobId::parse(&self.uuid).map_err(|e| corrupt("id", &e))?;
        let status = Status::from_db_string(&self.status)
            .ok_or_else(|| corrupt("status", &self.status))?;
        let owner =
            Owner::from_db_string(&self.owner).ok_or_else(|| corrupt("owner", &self.owner))?;
        let warnings = warnings_from_json(serde_json::from_str(&self.warnings)?)
            .map_err(|e| corrupt("warnings", &e))?;
        let metadata: Map<String, Value> = serde_json::from_str(&self.metadata)?;
        let parent = match &self.parent {
            Some(p) => Some(JobId::parse(p).map_err(|e| corrupt("parent", &e))?),
            None => None,
        };

        Job::from_parts(JobParts {
            id,
            kind: self.kind.clone(),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            status,
            owner,
            progress: self.progress,
            warnings,
            metadata,
            is_public: self.is_public,
            parent,
        })
        .map_err(|e| corrupt("invariant", &e))
    }
}

/// `?1, ?2, ...` placeholders starting at `first`
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Storage for SqliteStorage {
    // ===== Job Management =====

    fn upsert_job(&mut self, job: &Job) -> StorageResult<()> {
        let warnings = serde_json::to_string(job.warnings())?;
        let metadata = serde_json::to_string(job.metadata())?;

        self.conn.execute(
            "INSERT INTO jobs (uuid, kind, created_at, updated_at, status, owner, progress,
                               warnings, metadata, is_public, parent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(uuid) DO UPDATE SET
                kind = excluded.kind,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                status = excluded.status,
                owner = excluded.owner,
                progress = excluded.progress,
                warnings = excluded.warnings,
                metadata = excluded.metadata,
                is_public = excluded.is_public,
                parent = excluded.parent",
            params![
                job.id().to_string(),
                job.kind(),
                format_timestamp(&job.created_at()),
                format_timestamp(&job.updated_at()),
                job.status().to_db_string(),
                job.owner().to_db_string(),
                job.progress(),
                warnings,
                metadata,
                job.is_public(),
                job.parent().map(|p| p.to_string()),
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: JobId) -> StorageResult<Option<Job>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE uuid = ?1", JOB_COLUMNS),
                params![id.to_string()],
                JobRow::from_row,
            )
            .optional()?;

        row.map(JobRow::into_job).transpose()
    }

    fn list_jobs(&self, owners: &[Owner], statuses: &[Status]) -> StorageResult<Vec<Job>> {
        if owners.is_empty() || statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM jobs WHERE owner IN ({}) AND status IN ({})
             ORDER BY created_at DESC, rowid DESC",
            JOB_COLUMNS,
            placeholders(1, owners.len()),
            placeholders(owners.len() + 1, statuses.len()),
        );

        let values: Vec<String> = owners
            .iter()
            .map(Owner::to_db_string)
            .chain(statuses.iter().map(|s| s.to_db_string().to_string()))
            .collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    fn delete_job(&mut self, id: JobId) -> StorageResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM jobs WHERE uuid = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    // ===== Session Management =====

    fn create_session(&mut self, session: &SessionRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_sessions (id, created_at, config_hash, collection, observers)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.created_at,
                session.config_hash,
                serde_json::to_string(&session.collection)?,
                serde_json::to_string(&session.observers)?,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>> {
        let row: Option<(String, String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT id, created_at, config_hash, collection, observers
                 FROM crawl_sessions WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        match row {
            Some((id, created_at, config_hash, collection, observers)) => Ok(Some(SessionRecord {
                id,
                created_at,
                config_hash,
                collection: serde_json::from_str(&collection)?,
                observers: serde_json::from_str(&observers)?,
            })),
            None => Ok(None),
        }
    }

    // ===== Frontier Management =====

    fn enqueue(&mut self, session_id: &str, entry: &FrontierRecord) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO frontier (session_id, url, depth, found_on)
             SELECT ?1, ?2, ?3, ?4
             WHERE NOT EXISTS (SELECT 1 FROM visited WHERE session_id = ?1 AND url = ?2)",
            params![session_id, entry.url, entry.depth, entry.found_on],
        )?;
        Ok(inserted == 1)
    }

    fn peek_frontier(&self, session_id: &str, limit: usize) -> StorageResult<Vec<FrontierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, depth, found_on FROM frontier
             WHERE session_id = ?1 ORDER BY seq ASC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(params![session_id, limit as i64], |row| {
                Ok(FrontierRecord {
                    url: row.get(0)?,
                    depth: row.get(1)?,
                    found_on: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn mark_visited(&mut self, session_id: &str, url: &str) -> StorageResult<bool> {
        let now = format_timestamp(&Utc::now());
        let tx = self.conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM frontier WHERE session_id = ?1 AND url = ?2",
            params![session_id, url],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO visited (session_id, url, visited_at) VALUES (?1, ?2, ?3)",
            params![session_id, url, now],
        )?;

        tx.commit()?;
        Ok(removed > 0)
    }

    fn requeue(&mut self, session_id: &str, entry: &FrontierRecord) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM visited WHERE session_id = ?1 AND url = ?2",
            params![session_id, entry.url],
        )?;
        if removed > 0 {
            tx.execute(
                "INSERT OR IGNORE INTO frontier (session_id, url, depth, found_on)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, entry.url, entry.depth, entry.found_on],
            )?;
        }

        tx.commit()?;
        Ok(removed > 0)
    }

    fn is_known(&self, session_id: &str, url: &str) -> StorageResult<bool> {
        let known: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM frontier WHERE session_id = ?1 AND url = ?2)
                 OR EXISTS (SELECT 1 FROM visited WHERE session_id = ?1 AND url = ?2)",
            params![session_id, url],
            |row| row.get(0),
        )?;
        Ok(known)
    }

    fn count_pending(&self, session_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM frontier WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_visited(&self, session_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM visited WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Continuation Messages =====

    fn push_message(&mut self, job_id: &str) -> StorageResult<i64> {
        let now = format_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO messages (job_id, dispatched_at) VALUES (?1, ?2)",
            params![job_id, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn pop_message(&mut self) -> StorageResult<Option<String>> {
        let tx = self.conn.transaction()?;

        let next: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, job_id FROM messages ORDER BY id ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, _)) = &next {
            tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        }

        tx.commit()?;
        Ok(next.map(|(_, job_id)| job_id))
    }

    fn count_messages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Document Index =====

    fn upsert_document(&mut self, document: &DocumentRecord) -> StorageResult<DocumentWrite> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT checksum FROM documents WHERE url = ?1",
                params![document.url],
                |row| row.get(0),
            )
            .optional()?;

        if existing.as_deref() == Some(document.checksum.as_str()) {
            return Ok(DocumentWrite::Unchanged);
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO documents
                (url, status_code, headers, title, body_text, checksum, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                document.url,
                document.status_code,
                serde_json::to_string(&document.headers)?,
                document.title,
                document.body_text,
                document.checksum,
                document.indexed_at,
            ],
        )?;

        Ok(if existing.is_some() {
            DocumentWrite::Updated
        } else {
            DocumentWrite::Inserted
        })
    }

    fn get_document(&self, url: &str) -> StorageResult<Option<DocumentRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT url, status_code, headers, title, body_text, checksum, indexed_at
                 FROM documents WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((url, status_code, headers, title, body_text, checksum, indexed_at)) => {
                Ok(Some(DocumentRecord {
                    url,
                    status_code,
                    headers: serde_json::from_str(&headers)?,
                    title,
                    body_text,
                    checksum,
                    indexed_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn delete_document(&mut self, url: &str) -> StorageResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM documents WHERE url = ?1", params![url])?;
        Ok(deleted > 0)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
