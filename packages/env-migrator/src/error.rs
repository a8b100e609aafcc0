//! Error taxonomy for the migration engine.
//!
//! Only fatal conditions are represented as errors. Per-record problems
//! (write conflicts, unresolved foreign keys) and post-hoc findings
//! (validation mismatches at warning severity, integrity gaps, non-empty
//! targets) are recorded in the run's event log instead and never abort a run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Failure reported by a document store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The endpoint could not be reached at all
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured timeout
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with an error status
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The store answered with something we could not decode
    #[error("malformed store response: {0}")]
    Malformed(String),
}

/// Fatal engine errors. Any of these aborts the current run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("environment '{env}' is unreachable: {source}")]
    EnvironmentUnreachable {
        env: String,
        #[source]
        source: StoreError,
    },

    #[error("table '{table}' does not exist in environment '{env}'")]
    MissingTable { env: String, table: String },

    #[error("write of record {id} to '{table}' failed: {source}")]
    WriteFailed {
        table: String,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("store call on '{table}' in '{env}' failed: {source}")]
    Store {
        env: String,
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("validation failed for '{table}': {detail}")]
    ValidationFailed { table: String, detail: String },

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("full migration requires explicit confirmation")]
    NotConfirmed,

    #[error("artifact I/O failed at {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rollback left {failures} records in place; target needs manual reconciliation")]
    RollbackIncomplete { failures: usize },

    #[error("rollback journal {path} is corrupt: {detail}")]
    Journal { path: PathBuf, detail: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrationError {
    /// Short machine-readable category, used in reports and CLI output.
    pub fn category(&self) -> &'static str {
        match self {
            MigrationError::EnvironmentUnreachable { .. } => "environment_unreachable",
            MigrationError::MissingTable { .. } => "missing_table",
            MigrationError::WriteFailed { .. } => "write_failed",
            MigrationError::Store { .. } => "store_error",
            MigrationError::ValidationFailed { .. } => "validation_failed",
            MigrationError::InvalidTopology(_) => "invalid_topology",
            MigrationError::UnknownTable(_) => "unknown_table",
            MigrationError::NotConfirmed => "not_confirmed",
            MigrationError::Artifact { .. } => "artifact_error",
            MigrationError::RollbackIncomplete { .. } => "rollback_incomplete",
            MigrationError::Journal { .. } => "journal_error",
            MigrationError::Serialization(_) => "serialization_error",
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Artifact {
            path: path.into(),
            source,
        }
    }
}
