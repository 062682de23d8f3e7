//! Extraction pipeline
//!
//! Orchestrates a full run:
//! 1. Reset the output tables
//! 2. Stream non-merge commits from `git log`
//! 3. Fetch each commit's numstat (sequentially or on a worker pool)
//! 4. Aggregate per-commit totals
//! 5. Persist commit and file rows, in history order

mod parallel;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::git::{read_file_changes, ChangeSource, CommitFiles, CommitStream, GitError};
use crate::models::{CommitEntry, CommitSummary};
use crate::store::ChangeSink;

/// Drives a [`ChangeSource`] into a [`ChangeSink`].
pub struct Pipeline<S> {
    source: S,
    workers: usize,
    progress: ProgressBar,
}

impl<S: ChangeSource> Pipeline<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            workers: 1,
            progress: ProgressBar::hidden(),
        }
    }

    /// Fetch file stats on `workers` threads (1 = sequential).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Report progress on this bar (one tick per commit).
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Run the full extraction into `sink`.
    ///
    /// Per-commit failures are reported and the commit is skipped. Failing
    /// to read the commit list or to write to the sink aborts the run.
    pub fn run(&self, sink: &mut dyn ChangeSink) -> Result<ExtractStats> {
        let started = Instant::now();
        let mut stats = ExtractStats::default();

        sink.reset()?;
        let lines = self.source.log().context("Failed to list commits")?;

        let skipped_dates = if self.workers > 1 {
            debug!("Fetching file stats with {} workers", self.workers);
            parallel::run(&self.source, lines, self.workers, |entry, files| {
                self.record(&mut *sink, &mut stats, entry, files)
            })?
        } else {
            let mut commits = CommitStream::new(lines);
            for entry in commits.by_ref() {
                let entry = entry.context("Failed to read commit history")?;
                let files = fetch_files(&self.source, &entry.id);
                self.record(&mut *sink, &mut stats, entry, files)?;
            }
            commits.skipped()
        };

        stats.commits_skipped += skipped_dates;
        stats.elapsed = started.elapsed();
        self.progress.finish_and_clear();
        info!("Extraction finished: {}", stats.summary());
        Ok(stats)
    }

    /// Aggregate and persist one commit, or count it as skipped.
    fn record(
        &self,
        sink: &mut dyn ChangeSink,
        stats: &mut ExtractStats,
        entry: CommitEntry,
        files: Result<CommitFiles, GitError>,
    ) -> Result<()> {
        self.progress.inc(1);

        let changes = match files {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Skipping commit {}: {}", entry.id, e);
                stats.commits_skipped += 1;
                return Ok(());
            }
        };

        let summary = CommitSummary::from_changes(&entry, &changes.files);
        sink.persist(&summary, &changes.files)?;

        stats.commits_written += 1;
        stats.files_written += changes.files.len();
        stats.malformed_lines += changes.malformed;
        Ok(())
    }
}

/// Run the file-change extractor for one commit.
fn fetch_files<S: ChangeSource>(source: &S, commit_id: &str) -> Result<CommitFiles, GitError> {
    read_file_changes(commit_id, source.show(commit_id)?)
}

/// Statistics from one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Commits persisted
    pub commits_written: usize,
    /// File rows persisted
    pub files_written: usize,
    /// Commits dropped (bad date, git failure or timeout)
    pub commits_skipped: usize,
    /// Numstat lines with unparsable counts (still persisted)
    pub malformed_lines: usize,
    pub elapsed: Duration,
}

impl ExtractStats {
    /// Get a summary string.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} commits", self.commits_written),
            format!("{} file changes", self.files_written),
        ];
        if self.commits_skipped > 0 {
            parts.push(format!("{} commits skipped", self.commits_skipped));
        }
        if self.malformed_lines > 0 {
            parts.push(format!("{} malformed numstat lines", self.malformed_lines));
        }
        format!("{} in {:.2?}", parts.join(", "), self.elapsed)
    }
}
