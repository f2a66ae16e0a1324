//! Store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Whether retrying a failed operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Errors surfaced by the data store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("data store is not active")]
    NotActive,

    #[error("remote name cannot be empty")]
    EmptyRemoteName,

    #[error("invalid setting {key}: {reason}")]
    Settings { key: &'static str, reason: String },

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("failed to open repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("failed to fetch from remote: {0}")]
    Fetch(#[source] git2::Error),

    #[error("failed to push to remote: {0}")]
    Push(#[source] git2::Error),

    #[error("coordination service failure: {0}")]
    Coordination(String),

    #[error("malformed properties: {0}")]
    Properties(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl StoreError {
    /// Whether retrying the failed operation may succeed.
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Fetch(_) | StoreError::Push(_) | StoreError::Coordination(_) => {
                Transience::Retryable
            }

            StoreError::NotActive
            | StoreError::EmptyRemoteName
            | StoreError::Settings { .. }
            | StoreError::Unsupported(_)
            | StoreError::OpenRepo(_, _)
            | StoreError::BranchNotFound(_)
            | StoreError::Properties(_)
            | StoreError::Json(_) => Transience::Permanent,

            StoreError::Io(_) | StoreError::Git(_) => Transience::Unknown,
        }
    }
}
