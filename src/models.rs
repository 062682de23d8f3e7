//! Core data models for gitchurn
//!
//! These are the rows the pipeline produces and the sink persists:
//! one `CommitSummary` per non-merge commit and one `FileChange` per file
//! the commit touched.

use chrono::{DateTime, FixedOffset};

/// A commit as yielded by the history stream, before its files are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    /// Full 40-character commit hash
    pub id: String,
    /// Author date, with the author's timezone offset
    pub authored_at: DateTime<FixedOffset>,
}

/// Line counts for a single file within a single commit.
///
/// Binary files report unknown counts, which are stored as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub filename: String,
    pub added: u64,
    pub removed: u64,
}

impl FileChange {
    pub fn new(filename: impl Into<String>, added: u64, removed: u64) -> Self {
        Self {
            filename: filename.into(),
            added,
            removed,
        }
    }
}

/// Per-commit totals, aggregated from the commit's file changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub authored_at: DateTime<FixedOffset>,
    pub files_touched: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl CommitSummary {
    /// Aggregate a commit's file changes into its summary row.
    pub fn from_changes(entry: &CommitEntry, files: &[FileChange]) -> Self {
        let (lines_added, lines_removed) = files
            .iter()
            .fold((0u64, 0u64), |(added, removed), f| {
                (added.saturating_add(f.added), removed.saturating_add(f.removed))
            });

        Self {
            id: entry.id.clone(),
            authored_at: entry.authored_at,
            files_touched: files.len() as u64,
            lines_added,
            lines_removed,
        }
    }
}
