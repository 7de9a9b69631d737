//! Typed errors for the harvest library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur while fetching a single page.
///
/// The classification drives retry behavior: transient failures are
/// retried with backoff, permanent failures abort the fetch
/// immediately, and `Exhausted` is returned once the retry budget is
/// spent on transient failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Retryable failure: timeout, connection reset, 5xx, rate limit
    #[error("transient fetch failure: {reason}")]
    Transient { reason: String },

    /// Non-retryable failure: 4xx other than 429, malformed request
    #[error("permanent fetch failure: {reason}")]
    Permanent { reason: String },

    /// Retry budget spent on transient failures
    #[error("fetch retries exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The run was cancelled while the request was in flight
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// Whether the run itself is being torn down.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// An adapter failed to extract candidates from a fetched payload.
///
/// Treated like a failed page by the source driver: logged, skipped,
/// counted toward consecutive-failure abandonment.
#[derive(Debug, Error)]
#[error("parse failed for {adapter}: {reason}")]
pub struct ParseError {
    /// Adapter name that produced the error
    pub adapter: String,
    /// Human-readable failure description
    pub reason: String,
}

impl ParseError {
    pub fn new(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }
}

/// Backup or output persistence failed.
///
/// Checkpoint failures are logged and retried at the next checkpoint;
/// the in-memory collection keeps running.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem operation failed
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot (de)serialization failed
    #[error("serialization error for {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error for a harvest run.
///
/// Only conditions that make continuing meaningless surface here; the
/// controller catches them and still routes through finalize.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),

    /// Unexpected condition outside the known taxonomy
    #[error("fatal error: {0}")]
    Fatal(String),
}

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for persistence operations.
pub type PersistResult<T> = std::result::Result<T, PersistError>;
