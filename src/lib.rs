//! gitchurn - per-commit churn statistics from git history
//!
//! Runs `git log` / `git show --numstat` against a repository, aggregates
//! per-file line counts into per-commit totals, and writes both to a
//! relational store.

pub mod cli;
pub mod config;
pub mod git;
pub mod models;
pub mod pipeline;
pub mod store;
