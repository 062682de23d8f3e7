//! SQLite store
//!
//! File-backed output database; `in_memory` is used by tests.

use super::ChangeSink;
use crate::models::{CommitSummary, FileChange};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
DROP TABLE IF EXISTS commits;
DROP TABLE IF EXISTS files;

CREATE TABLE commits
(
    cid CHARACTER (40) PRIMARY KEY,
    created_at DATE,
    files_touched INTEGER,
    lines_added INTEGER,
    lines_removed INTEGER
);

CREATE TABLE files
(
    cid CHARACTER (40),
    filename TEXT,
    added INTEGER,
    removed INTEGER,
    PRIMARY KEY(cid, filename)
);
";

const INSERT_COMMIT: &str = "INSERT INTO commits (cid, created_at, files_touched, lines_added, lines_removed)
     VALUES (?1, ?2, ?3, ?4, ?5)";

const INSERT_FILE: &str = "INSERT INTO files (cid, filename, added, removed) VALUES (?1, ?2, ?3, ?4)";

/// SQLite-backed [`ChangeSink`].
pub struct SqliteStore {
    conn: Connection,
    /// Wrap each commit's inserts in one transaction
    atomic: bool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open output database {}", path.display()))?;
        debug!("Opened output database at {}", path.display());
        Ok(Self { conn, atomic: true })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, atomic: true })
    }

    /// Choose whether a commit's two inserts share one transaction.
    pub fn with_atomic_commits(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows in the `commits` table.
    pub fn commit_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of rows in the `files` table.
    pub fn file_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn insert_files(conn: &Connection, commit_id: &str, files: &[FileChange]) -> Result<()> {
    let mut stmt = conn.prepare_cached(INSERT_FILE)?;
    for file in files {
        stmt.execute(params![commit_id, file.filename, file.added, file.removed])
            .with_context(|| format!("Failed to insert file {} of {}", file.filename, commit_id))?;
    }
    Ok(())
}

fn insert_commit(conn: &Connection, commit: &CommitSummary) -> Result<()> {
    conn.prepare_cached(INSERT_COMMIT)?
        .execute(params![
            commit.id,
            commit.authored_at.to_rfc3339(),
            commit.files_touched,
            commit.lines_added,
            commit.lines_removed
        ])
        .with_context(|| format!("Failed to insert commit {}", commit.id))?;
    Ok(())
}

impl ChangeSink for SqliteStore {
    fn reset(&mut self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to create output tables")
    }

    fn insert_files(&mut self, commit_id: &str, files: &[FileChange]) -> Result<()> {
        insert_files(&self.conn, commit_id, files)
    }

    fn insert_commit(&mut self, commit: &CommitSummary) -> Result<()> {
        insert_commit(&self.conn, commit)
    }

    fn persist(&mut self, commit: &CommitSummary, files: &[FileChange]) -> Result<()> {
        if !self.atomic {
            insert_files(&self.conn, &commit.id, files)?;
            return insert_commit(&self.conn, commit);
        }

        let tx = self.conn.transaction()?;
        insert_files(&tx, &commit.id, files)?;
        insert_commit(&tx, commit)?;
        tx.commit()
            .with_context(|| format!("Failed to commit rows for {}", commit.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn summary(id: &str, files: &[FileChange]) -> CommitSummary {
        let entry = crate::models::CommitEntry {
            id: id.to_string(),
            authored_at: DateTime::parse_from_rfc3339("2018-10-09T12:34:56+02:00").unwrap(),
        };
        CommitSummary::from_changes(&entry, files)
    }

    fn store() -> SqliteStore {
        let mut store = SqliteStore::in_memory().unwrap();
        store.reset().unwrap();
        store
    }

    #[test]
    fn test_persist_writes_both_tables() {
        let mut store = store();
        let files = vec![FileChange::new("f2.txt", 5, 0), FileChange::new("f3.bin", 0, 3)];
        store.persist(&summary("b", &files), &files).unwrap();

        let row: (String, String, i64, i64, i64) = store
            .connection()
            .query_row(
                "SELECT cid, created_at, files_touched, lines_added, lines_removed FROM commits",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .unwrap();
        assert_eq!(row, ("b".to_string(), "2018-10-09T12:34:56+02:00".to_string(), 2, 5, 3));
        assert_eq!(store.file_count().unwrap(), 2);
    }

    #[test]
    fn test_reset_drops_previous_rows() {
        let mut store = store();
        let files = vec![FileChange::new("a.txt", 1, 1)];
        store.persist(&summary("a", &files), &files).unwrap();
        assert_eq!(store.commit_count().unwrap(), 1);

        store.reset().unwrap();
        assert_eq!(store.commit_count().unwrap(), 0);
        assert_eq!(store.file_count().unwrap(), 0);
    }

    #[test]
    fn test_atomic_persist_rolls_back_on_failure() {
        let mut store = store();
        // duplicate (cid, filename) violates the primary key
        let files = vec![FileChange::new("dup.txt", 1, 0), FileChange::new("dup.txt", 2, 0)];
        assert!(store.persist(&summary("c", &files), &files).is_err());

        assert_eq!(store.file_count().unwrap(), 0);
        assert_eq!(store.commit_count().unwrap(), 0);
    }

    #[test]
    fn test_non_atomic_persist_leaves_partial_rows() {
        let mut store = SqliteStore::in_memory().unwrap().with_atomic_commits(false);
        store.reset().unwrap();
        let files = vec![FileChange::new("dup.txt", 1, 0), FileChange::new("dup.txt", 2, 0)];
        assert!(store.persist(&summary("c", &files), &files).is_err());

        assert_eq!(store.file_count().unwrap(), 1);
        assert_eq!(store.commit_count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_commit_is_rejected() {
        let mut store = store();
        store.insert_commit(&summary("d", &[])).unwrap();
        assert!(store.insert_commit(&summary("d", &[])).is_err());
    }
}
