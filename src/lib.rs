//! mdxsync - git history to versioned content database
//!
//! Replays the commit history of a repository of MDX/Markdown files into a
//! versioned entity store, one version per content change.
//!
//! # Architecture
//!
//! - [`git`] - Repository accessor (trait + `git` CLI implementation)
//! - [`parser`] - Turns file changes into staged entity changes
//! - [`provider`] - Database providers (SQLite, HTTP)
//! - [`sync`] - Sync engine, work dirs, conflict detection
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod parser;
pub mod provider;
pub mod sync;

pub use error::{Error, Result};
