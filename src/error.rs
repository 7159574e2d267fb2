//! Error types for tagfolio operations.

use thiserror::Error;

/// Result type alias using tagfolio's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input. Nothing was mutated.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The entity does not exist or is not owned by the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Prompt ranking left no tag that exists on the owner's images.
    #[error("No valid tags to update")]
    NoValidTags,

    /// A collaborator needed by the operation is not configured.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A collaborator (label detection, embeddings, object store) failed.
    #[error("{service} failed: {message}")]
    External {
        service: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest(message.into())
    }

    /// Wrap a collaborator failure, keeping the full error chain in the message.
    pub fn external(service: &'static str, err: anyhow::Error) -> Self {
        Error::External {
            service,
            message: format!("{:#}", err),
        }
    }

    /// Whether the failure was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::BadRequest(_) | Error::NotFound { .. } | Error::NoValidTags
        )
    }
}
