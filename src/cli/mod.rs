//! CLI definition and run handler

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::{ExtractConfig, MAX_WORKERS};
use crate::git::GitRepo;
use crate::pipeline::Pipeline;
use crate::store::SqliteStore;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > MAX_WORKERS {
        Err(format!("workers cannot exceed {}", MAX_WORKERS))
    } else {
        Ok(n)
    }
}

/// gitchurn - per-commit churn statistics from git history
///
/// Walks every non-merge commit, collects per-file added/removed line
/// counts and writes them to a SQLite database with two tables:
/// `commits` and `files`. Existing tables are replaced on every run.
#[derive(Parser, Debug)]
#[command(name = "gitchurn")]
#[command(
    version,
    about = "Extract per-commit churn statistics from a git repository into SQLite",
    after_help = "\
Examples:
  gitchurn .                              Write ./output.db for the current repo
  gitchurn ~/src/linux -o linux.db        Choose the output database
  gitchurn . --workers 8                  Fetch file stats on 8 threads
  gitchurn . --reverse --timeout 60       Oldest commit first, 60s per git call

Environment:
  GITCHURN_GIT, GITCHURN_TIMEOUT, GITCHURN_WORKERS override the config file.
  RUST_LOG overrides --log-level."
)]
pub struct Cli {
    /// Path to the git repository to analyze
    pub repo: PathBuf,

    /// Output SQLite database
    #[arg(long, short = 'o', default_value = "output.db")]
    pub out: PathBuf,

    /// Config file (default: ~/.config/gitchurn/config.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of parallel workers fetching file stats (1-64)
    #[arg(long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Timeout per git invocation in seconds (0 = none)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Process commits oldest first
    #[arg(long)]
    pub reverse: bool,

    /// Write commit and file rows without a shared transaction
    #[arg(long)]
    pub no_atomic: bool,

    /// git executable to use
    #[arg(long, value_name = "BIN")]
    pub git: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// No progress spinner or summary
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl Cli {
    /// Config from file and environment, with flags applied on top.
    pub fn resolve_config(&self) -> Result<ExtractConfig> {
        let mut config = ExtractConfig::load(self.config.as_deref())?;

        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(git) = &self.git {
            config.git_binary = git.clone();
        }
        if self.reverse {
            config.chronological = true;
        }
        if self.no_atomic {
            config.atomic_commits = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("{spinner:.green} {pos} commits [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(template);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub fn run(cli: Cli) -> Result<()> {
    let repo_path = absolute(&cli.repo)?;
    let out_path = absolute(&cli.out)?;
    let config = cli.resolve_config()?;

    let repo = GitRepo::open(&repo_path, config.git_command())?
        .chronological(config.chronological);
    let mut store = SqliteStore::open(&out_path)?.with_atomic_commits(config.atomic_commits);

    info!(
        "Extracting {} into {}",
        repo_path.display(),
        out_path.display()
    );

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        spinner()
    };

    let stats = Pipeline::new(repo)
        .with_workers(config.workers)
        .with_progress(progress)
        .run(&mut store)?;

    if !cli.quiet {
        println!(
            "{} {}",
            style("Wrote").green().bold(),
            style(out_path.display()).bold()
        );
        println!("  {}", stats.summary());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["gitchurn", "repo"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("repo"));
        assert_eq!(cli.out, PathBuf::from("output.db"));
        assert_eq!(cli.workers, None);
        assert!(!cli.reverse);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_repo_is_required() {
        assert!(Cli::try_parse_from(["gitchurn"]).is_err());
    }

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("8"), Ok(8));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitchurn.toml");
        std::fs::write(&path, "workers = 2\ntimeout_secs = 10\n").unwrap();

        let cli = Cli::try_parse_from([
            "gitchurn",
            "repo",
            "--config",
            path.to_str().unwrap(),
            "--workers",
            "6",
            "--reverse",
            "--no-atomic",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.workers, 6);
        assert!(config.chronological);
        assert!(!config.atomic_commits);
    }

    #[test]
    fn test_absolute_resolves_relative_paths() {
        let path = absolute(Path::new("output.db")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("output.db"));
    }
}
