//! Error types for the reading session and its collaborators.

use thiserror::Error;

/// Failures raised by a key/value backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("value under '{0}' has the wrong type")]
    WrongType(String),

    #[error("could not clear {}: {reason}", .keys.join(", "))]
    ClearIncomplete { keys: Vec<String>, reason: String },
}

/// Failures raised by the rendering engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("could not parse book: {0}")]
    Parse(String),

    #[error("could not render book: {0}")]
    Render(String),

    #[error("could not display '{location}': {reason}")]
    Display { location: String, reason: String },

    #[error("engine teardown failed: {0}")]
    Teardown(String),
}

/// Every failure that leaves the session orchestrator is one of these.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to load book: {0}")]
    LoadFailure(String),

    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    #[error("navigation failed: {0}")]
    NavigationFailure(#[source] EngineError),

    #[error("'{0}' is not in the table of contents")]
    NotFoundInIndex(String),

    #[error("no book is open")]
    NotReady,

    #[error("request superseded by a newer one")]
    Superseded,
}

impl SessionError {
    /// Superseded requests are not failures from the user's point of view.
    pub fn is_superseded(&self) -> bool {
        matches!(self, SessionError::Superseded)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
