//! Projection error types.

use thiserror::Error;

/// Errors that can occur while recording or querying the saga log.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Running the schema migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored envelope could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is not valid.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Subscribing the processor failed.
    #[error(transparent)]
    Messaging(#[from] messaging::MessagingError),
}

impl From<ProjectionError> for messaging::MessagingError {
    fn from(error: ProjectionError) -> Self {
        match error {
            ProjectionError::Messaging(e) => e,
            other => messaging::MessagingError::Handler(other.to_string()),
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
