//! Output stores for extracted rows
//!
//! The pipeline only talks to [`ChangeSink`]; [`SqliteStore`] is the
//! on-disk implementation.
//!
//! Logical schema:
//!
//! ```text
//! commits(cid PRIMARY KEY, created_at, files_touched, lines_added, lines_removed)
//! files(cid, filename, added, removed, PRIMARY KEY(cid, filename))
//! ```

mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{CommitSummary, FileChange};
use anyhow::Result;

/// Destination for commit and file rows.
pub trait ChangeSink {
    /// Drop and recreate the tables, discarding any previous run.
    fn reset(&mut self) -> Result<()>;

    /// Insert one commit's file rows.
    fn insert_files(&mut self, commit_id: &str, files: &[FileChange]) -> Result<()>;

    /// Insert one commit summary row.
    fn insert_commit(&mut self, commit: &CommitSummary) -> Result<()>;

    /// Persist a commit and its files: file rows first, then the summary.
    ///
    /// Implementations may make this atomic.
    fn persist(&mut self, commit: &CommitSummary, files: &[FileChange]) -> Result<()> {
        self.insert_files(&commit.id, files)?;
        self.insert_commit(commit)
    }
}
