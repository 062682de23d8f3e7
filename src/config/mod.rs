//! Extraction configuration
//!
//! Supports loading config from (lowest to highest priority):
//! - built-in defaults
//! - ~/.config/gitchurn/config.toml, or an explicit `--config` file
//! - environment variables (`GITCHURN_GIT`, `GITCHURN_TIMEOUT`, `GITCHURN_WORKERS`)
//!
//! Command-line flags are applied on top by the CLI.

use crate::git::command::{GitCommand, DEFAULT_TIMEOUT_SECS};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound for the worker pool size
pub const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// git executable to run
    pub git_binary: String,
    /// Per-invocation timeout in seconds (0 = none)
    pub timeout_secs: u64,
    /// Threads fetching per-commit file stats (1 = sequential)
    pub workers: usize,
    /// Process commits oldest first
    pub chronological: bool,
    /// Write each commit's rows in one transaction
    pub atomic_commits: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workers: 1,
            chronological: false,
            atomic_commits: true,
        }
    }
}

impl ExtractConfig {
    /// Load config from file and environment.
    ///
    /// An explicit file must exist and parse. The user config file is
    /// optional, and a broken one is reported and ignored.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::user_config_path()
                .filter(|p| p.exists())
                .and_then(|p| match Self::from_file(&p) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!("Ignoring user config: {:#}", e);
                        None
                    }
                })
                .unwrap_or_default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitchurn").join("config.toml"))
    }

    /// Override fields from environment variables, looked up through `var`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(git) = var("GITCHURN_GIT").filter(|v| !v.is_empty()) {
            self.git_binary = git;
        }
        if let Some(timeout) = var("GITCHURN_TIMEOUT") {
            self.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("GITCHURN_TIMEOUT: '{}' is not a number of seconds", timeout))?;
        }
        if let Some(workers) = var("GITCHURN_WORKERS") {
            self.workers = workers
                .trim()
                .parse()
                .with_context(|| format!("GITCHURN_WORKERS: '{}' is not a valid number", workers))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.git_binary.trim().is_empty() {
            bail!("git_binary cannot be empty");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.workers > MAX_WORKERS {
            bail!("workers cannot exceed {}", MAX_WORKERS);
        }
        Ok(())
    }

    pub fn git_command(&self) -> GitCommand {
        GitCommand::new(self.git_binary.clone()).with_timeout_secs(self.timeout_secs)
    }
}
