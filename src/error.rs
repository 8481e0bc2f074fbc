//! Error types for mdxsync.
//!
//! Every [`Error`] maps to an [`ErrorCode`], which fixes its string code,
//! process exit code and whether a retry may help. Git failures keep the
//! command line and stderr of the invocation that failed. The CLI renders
//! errors either as text with a hint or as a JSON object.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mdxsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,
    StaleVersion,

    // Not Found (exit 3)
    FileNotFound,
    NotARepository,

    // Validation (exit 4)
    InvalidArgument,
    InvalidRepository,
    UnsupportedDirection,

    // Git (exit 6)
    GitCommandFailed,
    GitTimeout,
    CloneFailed,
    WorkDirError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote provider (exit 9)
    ProviderError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::StaleVersion => "STALE_VERSION",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::NotARepository => "NOT_A_REPOSITORY",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidRepository => "INVALID_REPOSITORY",
            Self::UnsupportedDirection => "UNSUPPORTED_DIRECTION",
            Self::GitCommandFailed => "GIT_COMMAND_FAILED",
            Self::GitTimeout => "GIT_TIMEOUT",
            Self::CloneFailed => "CLONE_FAILED",
            Self::WorkDirError => "WORK_DIR_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::StaleVersion => 2,
            Self::FileNotFound | Self::NotARepository => 3,
            Self::InvalidArgument | Self::InvalidRepository | Self::UnsupportedDirection => 4,
            Self::GitCommandFailed | Self::GitTimeout | Self::CloneFailed | Self::WorkDirError => {
                6
            }
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::ProviderError => 9,
        }
    }

    /// Whether running the same request again may succeed.
    ///
    /// True for transient failures (timeouts, remote provider hiccups, a
    /// version race with another writer). False for bad input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GitTimeout
                | Self::CloneFailed
                | Self::ProviderError
                | Self::StaleVersion
                | Self::DatabaseError
        )
    }
}

/// Errors that can occur in mdxsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Invalid repository reference: {reference}")]
    InvalidRepository { reference: String },

    #[error("git {command} failed (exit {exit_code:?}): {stderr}")]
    GitCommand {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("git {command} timed out after {secs}s: {stderr}")]
    GitTimeout {
        command: String,
        stderr: String,
        secs: u64,
    },

    #[error("File not found: {file} at {reference}")]
    FileNotFound { file: String, reference: String },

    #[error("Clone failed for {url}: {message}")]
    Clone { url: String, message: String },

    #[error("Working directory error: {0}")]
    WorkDir(String),

    #[error("Unsupported sync direction: {0}")]
    UnsupportedDirection(String),

    #[error("Stale version for {url}: attempted {attempted}, current {current}")]
    StaleVersion {
        url: String,
        attempted: u64,
        current: u64,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Remote provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotARepository { .. } => ErrorCode::NotARepository,
            Self::InvalidRepository { .. } => ErrorCode::InvalidRepository,
            Self::GitCommand { .. } => ErrorCode::GitCommandFailed,
            Self::GitTimeout { .. } => ErrorCode::GitTimeout,
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::Clone { .. } => ErrorCode::CloneFailed,
            Self::WorkDir(_) => ErrorCode::WorkDirError,
            Self::UnsupportedDirection(_) => ErrorCode::UnsupportedDirection,
            Self::StaleVersion { .. } => ErrorCode::StaleVersion,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Provider(_) | Self::Http(_) => ErrorCode::ProviderError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether this error aborts a sync run before any commit is processed.
    #[must_use]
    pub const fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::NotARepository { .. }
                | Self::InvalidRepository { .. }
                | Self::Clone { .. }
                | Self::WorkDir(_)
                | Self::UnsupportedDirection(_)
        )
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotARepository { path } => Some(format!(
                "'{}' has no .git directory. Pass a clone URL or `org/repo` instead.",
                path.display()
            )),

            Self::InvalidRepository { .. } => Some(
                "Use a local path, an https:// or git@ URL, or `org/repo` shorthand".to_string(),
            ),

            Self::Clone { url, .. } if url.starts_with("https://") => Some(
                "Private repository? Pass --token or set MDXSYNC_GIT_TOKEN.".to_string(),
            ),

            Self::GitTimeout { .. } => Some(
                "Raise the limit with MDXSYNC_GIT_TIMEOUT_SECS or --timeout.".to_string(),
            ),

            Self::UnsupportedDirection(_) => {
                Some("Only `git-to-db` is supported; use `mdxsync conflicts` to inspect drift.".to_string())
            }

            Self::StaleVersion { .. } => Some(
                "Another writer updated this entity. Re-run the sync; it resumes from the last checkpoint."
                    .to_string(),
            ),

            Self::Config(msg) if msg.contains("MDXSYNC_DB_URL") => {
                Some("Set MDXSYNC_DB_URL to an http(s) base URL.".to_string())
            }

            Self::Clone { .. }
            | Self::GitCommand { .. }
            | Self::FileNotFound { .. }
            | Self::WorkDir(_)
            | Self::Database(_)
            | Self::Provider(_)
            | Self::Http(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
