use history::{HistoryError, RevisionId};
use sandbox::ExecutionError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while replicating a page into git
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid configuration, detected before any work starts
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// A directory could not be created or removed
    #[error("Storage error at '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess could not be launched or did not finish in time
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// No scratch directory could be allocated
    #[error("Could not allocate a scratch directory under '{}' after {attempts} attempts", base.display())]
    ResourceExhaustion { base: PathBuf, attempts: usize },

    /// A git step that must succeed exited with a failure status
    #[error("git {step} failed (exit code {exit_code:?}): {stderr}")]
    GitCommand {
        step: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Revision history error: {0}")]
    History(#[from] HistoryError),

    /// The revision chain is longer than the configured hop bound
    #[error("Revision chain of '{entity}' exceeds {limit} hops")]
    WalkLimitExceeded { entity: String, limit: usize },

    /// A revision links to a revision that is not older than itself
    #[error("Inconsistent revision chain of '{entity}': {revision} links to {previous}")]
    InconsistentChain {
        entity: String,
        revision: RevisionId,
        previous: RevisionId,
    },

    /// The entity key cannot be mapped onto a repository or file path
    #[error("Invalid entity key '{key}': {reason}")]
    InvalidEntity { key: String, reason: String },

    /// The stored watermark is not a decimal revision id
    #[error("Invalid watermark '{value}' in '{}'", repository.display())]
    InvalidWatermark { repository: PathBuf, value: String },

    /// The repository lock could not be taken
    #[error("Failed to lock '{}': {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }
}
