//! Error handling module
//!
//! Provides the unified error type for every migration command.

use crate::revision::RevisionId;
use crate::squash::SquashStage;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The revision chain on disk violates its structural invariants
    /// (dangling parent reference, more than one head, or a cycle).
    /// Fatal: requires operator judgment, no partial recovery is attempted.
    #[error("Revision store corrupted: {0}")]
    StoreCorruption(String),

    /// A forward or reverse script failed mid-batch. The batch is aborted
    /// and the marker stays at the last revision that applied cleanly.
    #[error("Migration apply failed at revision {failing}: {reason} (marker left at {last_good:?})")]
    Apply {
        failing: RevisionId,
        last_good: Option<RevisionId>,
        reason: String,
    },

    /// A squash stage failed. The schema may be left partially downgraded;
    /// there is no automatic rollback (manual recovery).
    #[error("Squash failed during {stage}: {source}")]
    SquashFailed {
        stage: SquashStage,
        #[source]
        source: Box<MigrateError>,
    },
}

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Helper function to create a configuration error
pub fn config_error(msg: impl Into<String>) -> MigrateError {
    MigrateError::Config(msg.into())
}

/// Helper function to create a store corruption error
pub fn corruption_error(msg: impl Into<String>) -> MigrateError {
    MigrateError::StoreCorruption(msg.into())
}
