//! Git history extraction module
//!
//! Drives the `git` binary as a subprocess and turns its output into typed
//! records.
//!
//! # Layers
//!
//! - [`command`]: spawns git, streams stdout as decoded lines, enforces a timeout
//! - [`parse`]: pure parsers for commit header and numstat lines
//! - [`history`]: the commit stream and the per-commit file-change extractor
//!
//! # Example
//!
//! ```no_run
//! use gitchurn::git::{GitCommand, GitRepo};
//! use std::path::Path;
//!
//! let repo = GitRepo::open(Path::new("/path/to/repo"), GitCommand::default()).unwrap();
//! for entry in repo.commits().unwrap() {
//!     let entry = entry.unwrap();
//!     let changes = repo.file_changes(&entry.id).unwrap();
//!     println!("{} touched {} files", entry.id, changes.files.len());
//! }
//! ```

pub mod command;
pub mod history;
pub mod parse;

pub use command::{decode_line, GitCommand, GitLines};
pub use history::{read_file_changes, ChangeSource, CommitFiles, CommitStream, GitRepo};
pub use parse::{parse_commit_header, parse_numstat, CommitHeader, LineCount, NumstatLine};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running git
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Repository directory {} does not exist", .0.display())]
    RepoNotFound(PathBuf),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} produced no output for {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
