//! Commit history enumeration and per-commit file statistics
//!
//! `git log --no-merges` provides the commit list; `git show --numstat`
//! provides each commit's per-file line counts.

use super::command::{GitCommand, GitLines};
use super::parse::{parse_commit_header, parse_numstat};
use super::GitError;
use crate::models::{CommitEntry, FileChange};
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `--format` used for both log and show: `<hash> <author date>`
pub const HEADER_FORMAT: &str = "--format=%H %ad";

/// git's default date format, e.g. `Tue Oct 9 12:34:56 2018 +0200`
pub const GIT_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y %z";

/// Parse an author date in git's default format.
pub fn parse_author_date(text: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(text, GIT_DATE_FORMAT)
}

/// Where raw history lines come from.
///
/// [`GitRepo`] is the real implementation; anything that can produce the
/// same line shapes can drive the pipeline.
pub trait ChangeSource: Sync {
    type Lines: Iterator<Item = Result<String, GitError>> + Send;

    /// One `<hash> <date>` line per non-merge commit.
    fn log(&self) -> Result<Self::Lines, GitError>;

    /// Numstat output for a single commit.
    fn show(&self, commit_id: &str) -> Result<Self::Lines, GitError>;
}

/// Files touched by one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitFiles {
    /// In the order git reported them
    pub files: Vec<FileChange>,
    /// Numstat lines with a count that could not be parsed
    pub malformed: usize,
}

/// Collect a commit's file changes from its numstat output.
///
/// Malformed counts are reported and zero-filled; the file is still
/// included.
pub fn read_file_changes<I>(commit_id: &str, lines: I) -> Result<CommitFiles, GitError>
where
    I: IntoIterator<Item = Result<String, GitError>>,
{
    let mut result = CommitFiles::default();

    for line in lines {
        let line = line?;
        let Some(stat) = parse_numstat(&line) else {
            continue;
        };

        if stat.is_malformed() {
            warn!(
                "Failed to read counts for {} in {}: ++ {}, -- {}",
                stat.filename,
                commit_id,
                stat.added.raw(),
                stat.removed.raw()
            );
            result.malformed += 1;
        }
        result.files.push(stat.to_file_change());
    }

    Ok(result)
}

/// Turns `<hash> <date>` lines into [`CommitEntry`] values.
///
/// Commits whose date does not parse are reported and skipped. Errors from
/// the underlying lines are passed through.
pub struct CommitStream<I> {
    lines: I,
    skipped: usize,
}

impl<I> CommitStream<I>
where
    I: Iterator<Item = Result<String, GitError>>,
{
    pub fn new(lines: I) -> Self {
        Self { lines, skipped: 0 }
    }

    /// Number of commits dropped because their date could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<I> Iterator for CommitStream<I>
where
    I: Iterator<Item = Result<String, GitError>>,
{
    type Item = Result<CommitEntry, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };

            if line.trim().is_empty() {
                continue;
            }

            let Some(header) = parse_commit_header(&line) else {
                warn!("Ignoring unexpected line in commit list: {:?}", line);
                continue;
            };

            match parse_author_date(header.date_text) {
                Ok(authored_at) => {
                    return Some(Ok(CommitEntry {
                        id: header.id.to_string(),
                        authored_at,
                    }))
                }
                Err(e) => {
                    warn!(
                        "Failed to parse date {}: {} ({})",
                        header.id, header.date_text, e
                    );
                    self.skipped += 1;
                }
            }
        }
    }
}

/// A git working copy read through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
    git: GitCommand,
    chronological: bool,
}

impl GitRepo {
    /// Open a repository directory.
    ///
    /// Only checks that `path` is a directory; git itself reports anything
    /// else when the first command runs.
    pub fn open(path: &Path, git: GitCommand) -> Result<Self, GitError> {
        if !path.is_dir() {
            return Err(GitError::RepoNotFound(path.to_path_buf()));
        }
        debug!("Opened repository at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            git,
            chronological: false,
        })
    }

    /// List commits oldest first instead of git's newest-first default.
    pub fn chronological(mut self, chronological: bool) -> Self {
        self.chronological = chronological;
        self
    }

    /// Stream of non-merge commits with their author dates.
    pub fn commits(&self) -> Result<CommitStream<GitLines>, GitError> {
        Ok(CommitStream::new(self.log()?))
    }

    /// Per-file line counts of one commit.
    pub fn file_changes(&self, commit_id: &str) -> Result<CommitFiles, GitError> {
        read_file_changes(commit_id, self.show(commit_id)?)
    }
}

impl ChangeSource for GitRepo {
    type Lines = GitLines;

    fn log(&self) -> Result<GitLines, GitError> {
        let mut args = vec!["log", "--no-merges", "--date=default", HEADER_FORMAT];
        if self.chronological {
            args.push("--reverse");
        }
        self.git.run(&self.path, &args)
    }

    fn show(&self, commit_id: &str) -> Result<GitLines, GitError> {
        self.git
            .run(&self.path, &["show", commit_id, "--numstat", HEADER_FORMAT])
    }
}
