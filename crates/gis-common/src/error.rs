//! Error types for geolayer services.

use thiserror::Error;

/// Result type alias using GisError.
pub type GisResult<T> = Result<T, GisError>;

/// Primary error type for catalog and object-store operations.
#[derive(Debug, Error)]
pub enum GisError {
    // === Object Store Errors ===
    #[error("Object store error: {0}")]
    StorageError(String),

    // === Catalog Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),
}

// Conversion from common error types
impl From<std::io::Error> for GisError {
    fn from(err: std::io::Error) -> Self {
        GisError::InternalError(err.to_string())
    }
}
