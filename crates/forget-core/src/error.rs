//! Error types for Forget Core

use thiserror::Error;

/// Result type alias using Forget's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Forget error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Anonymizer not found: {0}")]
    AnonymizerNotFound(String),

    #[error("Anonymizer error: {0}")]
    Anonymizer(String),

    #[error("Field not removable: {0}")]
    FieldNotRemovable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Traversal exceeded the limit of {max} entities")]
    TraversalLimit { max: usize },

    #[error("Traversal cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
