//! Postmortem store.
//!
//! Postmortems live in a `SQLite` database inside the data directory. The
//! store supports:
//! - insertion with per-project deduplication by content hash
//! - listing per project and across projects, newest first
//! - attaching analysis results to a record

pub mod migrations;
mod record;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub use record::{Postmortem, PostmortemDraft, Severity};

const COLUMNS: &str = "id, project_path, created_at, title, notes, what_happened, expected, \
                       severity, files, content_hash, analysis, analyzed_at";

/// Storage engine for postmortems.
#[derive(Debug)]
pub struct PostmortemStore {
    path: PathBuf,
    conn: Connection,
}

impl PostmortemStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening postmortem database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Postmortem database ready at {}", path.display());
        Ok(Self { path, conn })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a postmortem and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePostmortem`] if the same content was
    /// already recorded for the project, or an error if the insert fails.
    pub fn insert(&self, postmortem: &Postmortem) -> Result<i64> {
        let project = postmortem.project_path.to_string_lossy();
        if let Some(existing_id) = self.find_by_hash(&project, &postmortem.content_hash)? {
            debug!(
                existing_id,
                "Skipping duplicate postmortem with hash {}",
                &postmortem.content_hash[..16.min(postmortem.content_hash.len())]
            );
            return Err(Error::DuplicatePostmortem { existing_id });
        }

        let files = serde_json::to_string(&postmortem.files)?;
        let analysis = postmortem
            .analysis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r"
            INSERT INTO postmortems (project_path, created_at, title, notes, what_happened,
                                     expected, severity, files, content_hash, analysis, analyzed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                project,
                postmortem.created_at.to_rfc3339(),
                postmortem.title,
                postmortem.notes,
                postmortem.what_happened,
                postmortem.expected,
                postmortem.severity.to_string(),
                files,
                postmortem.content_hash,
                analysis,
                postmortem.analyzed_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        info!(id, project = %project, "Recorded postmortem");
        Ok(id)
    }

    fn find_by_hash(&self, project: &str, hash: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM postmortems WHERE project_path = ?1 AND content_hash = ?2",
                [project, hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Get a postmortem by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PostmortemNotFound`] if no such record exists.
    pub fn get(&self, id: i64) -> Result<Postmortem> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM postmortems WHERE id = ?1"),
                [id],
                Self::row_to_postmortem,
            )
            .optional()?
            .ok_or(Error::PostmortemNotFound { id })
    }

    /// Postmortems of one project, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_for_project(&self, project: &Path, limit: usize) -> Result<Vec<Postmortem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM postmortems WHERE project_path = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let postmortems = stmt
            .query_map(
                params![project.to_string_lossy(), limit_i64],
                Self::row_to_postmortem,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(postmortems)
    }

    /// Most recent postmortems across all projects.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Postmortem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM postmortems ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let postmortems = stmt
            .query_map([limit_i64], Self::row_to_postmortem)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(postmortems)
    }

    /// Delete a postmortem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PostmortemNotFound`] if no such record exists.
    pub fn delete(&self, id: i64) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM postmortems WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(Error::PostmortemNotFound { id });
        }
        info!(id, "Deleted postmortem");
        Ok(())
    }

    /// Store the analysis result of a postmortem and stamp `analyzed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PostmortemNotFound`] if no such record exists.
    pub fn set_analysis(&self, id: i64, analysis: &serde_json::Value) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let affected = self.conn.execute(
            "UPDATE postmortems SET analysis = ?1, analyzed_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(analysis)?, now.to_rfc3339(), id],
        )?;
        if affected == 0 {
            return Err(Error::PostmortemNotFound { id });
        }
        debug!(id, "Stored postmortem analysis");
        Ok(now)
    }

    /// Count postmortems, optionally for one project.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self, project: Option<&Path>) -> Result<i64> {
        let count: i64 = match project {
            Some(p) => self.conn.query_row(
                "SELECT COUNT(*) FROM postmortems WHERE project_path = ?1",
                [p.to_string_lossy()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM postmortems", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<PostmortemStats> {
        let total = self.count(None)?;
        let analyzed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM postmortems WHERE analyzed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let projects: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT project_path) FROM postmortems",
            [],
            |row| row.get(0),
        )?;
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM postmortems",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(PostmortemStats {
            total,
            analyzed,
            projects,
            oldest: oldest.as_deref().and_then(parse_timestamp),
            newest: newest.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    fn row_to_postmortem(row: &rusqlite::Row) -> rusqlite::Result<Postmortem> {
        let id: i64 = row.get(0)?;
        let project_path: String = row.get(1)?;
        let created_at: String = row.get(2)?;
        let severity: String = row.get(7)?;
        let files: String = row.get(8)?;
        let analysis: Option<String> = row.get(10)?;
        let analyzed_at: Option<String> = row.get(11)?;

        let severity = severity.parse().unwrap_or_else(|_| {
            warn!(id, "Unknown severity '{}', defaulting to medium", severity);
            Severity::Medium
        });
        let files = serde_json::from_str(&files).unwrap_or_else(|e| {
            warn!(id, error = %e, "Unreadable file list");
            Vec::new()
        });
        let analysis = analysis.and_then(|a| match serde_json::from_str(&a) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(id, error = %e, "Unreadable stored analysis");
                None
            }
        });

        Ok(Postmortem {
            id: Some(id),
            project_path: PathBuf::from(project_path),
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
            title: row.get(3)?,
            notes: row.get(4)?,
            what_happened: row.get(5)?,
            expected: row.get(6)?,
            severity,
            files,
            content_hash: row.get(9)?,
            analysis,
            analyzed_at: analyzed_at.as_deref().and_then(parse_timestamp),
        })
    }
}

/// A [`PostmortemStore`] shared between request handlers.
#[derive(Debug, Clone)]
pub struct SharedStore(Arc<Mutex<PostmortemStore>>);

impl SharedStore {
    /// Share `store`.
    #[must_use]
    pub fn new(store: PostmortemStore) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    /// Run `f` with exclusive access to the store.
    ///
    /// The lock is released when `f` returns, so never call this across an
    /// `.await`.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or an internal error if a previous
    /// holder panicked.
    pub fn with<T>(&self, f: impl FnOnce(&PostmortemStore) -> Result<T>) -> Result<T> {
        let store = self
            .0
            .lock()
            .map_err(|_| Error::internal("postmortem store lock poisoned"))?;
        f(&store)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the postmortem store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostmortemStats {
    /// Total number of postmortems.
    pub total: i64,
    /// Postmortems with a stored analysis.
    pub analyzed: i64,
    /// Distinct projects with at least one postmortem.
    pub projects: i64,
    /// Creation time of the oldest postmortem.
    pub oldest: Option<DateTime<Utc>>,
    /// Creation time of the newest postmortem.
    pub newest: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
