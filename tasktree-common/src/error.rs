//! Error types for tasktree.

use thiserror::Error;

/// Result type alias using the tasktree error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the command store, pipeline and model resolver.
#[derive(Error, Debug)]
pub enum Error {
    /// Database file inaccessible, not a database, or corrupt
    #[error("Failed to open store: {0}")]
    OpenFailure(String),

    /// Write would break a foreign-key or uniqueness invariant
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Referenced tag or command does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Summarization or embedding backend failed or timed out
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// The user declined to pick a model
    #[error("Model selection cancelled")]
    SelectionCancelled,

    /// No summarization model is available
    #[error("No backend available: {0}")]
    NoBackendAvailable(String),

    /// Any other database engine error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Work abandoned because a cancellation signal was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap a collaborator error as a backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendFailure(err.to_string())
    }

    /// The innermost error, with any context wrappers removed.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    /// Check if this is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root(), Self::ConstraintViolation(_))
    }

    /// Check if the store could not be opened.
    pub fn is_open_failure(&self) -> bool {
        matches!(self.root(), Self::OpenFailure(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(err.to_string()),
            Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => {
                Self::OpenFailure(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
