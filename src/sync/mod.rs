//! Git to database synchronization.
//!
//! - **Engine**: walks a commit range and applies staged changes in order
//! - **Conflicts**: finds files changed on both sides since the checkpoint
//! - **Work dirs**: local repositories, reusable clones and temp clones
//!
//! # Example
//!
//! ```ignore
//! use mdxsync::git::CliGit;
//! use mdxsync::provider::SqliteProvider;
//! use mdxsync::sync::{SyncEngine, SyncRequest};
//!
//! let engine = SyncEngine::new(CliGit::new(), SqliteProvider::open_memory()?);
//! let result = engine.sync(&SyncRequest::new("acme/site")).await?;
//! println!("{} things written", result.stats.things_written());
//! ```

mod conflict;
pub mod engine;
pub mod types;
pub mod workdir;

pub use engine::{ProgressFn, SyncEngine};
pub use types::{
    ConflictType, DbSide, GitSide, PipelineStage, Resolution, StageStatus, SyncConflict,
    SyncDirection, SyncError, SyncMode, SyncRequest, SyncResult, SyncState, SyncStats,
    SyncedFile,
};
pub use workdir::{WorkDir, repo_key};
