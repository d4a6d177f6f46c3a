//! Error types for the ingestion pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors produced while ingesting or purging file layers.
///
/// Display strings are the user-facing messages returned by the API, so
/// variants that wrap lower-level failures carry the full message text.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The layer is already recorded in the catalog.
    #[error("File layer already exists: {0}")]
    AlreadyExists(String),

    /// The remote folder does not exist or holds no objects.
    #[error("Folder not found or empty in S3: {0}")]
    NotFound(String),

    /// An object carries an extension outside the allow-set for its type.
    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    /// A remote fetch or rendering-service upload failed.
    #[error("{0}")]
    TransferFailed(String),

    /// Catalog rows could not be written or deleted.
    #[error("{0}")]
    CatalogWriteFailed(String),

    /// A catalog lookup failed before any transfer started.
    #[error("Catalog query failed: {0}")]
    CatalogQueryFailed(String),

    /// Local staging filesystem error.
    #[error("Staging error: {0}")]
    Staging(#[from] std::io::Error),

    /// A shutdown signal interrupted the run.
    #[error("Ingestion cancelled by shutdown")]
    Cancelled,
}

impl IngestError {
    /// HTTP status code the API reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            IngestError::AlreadyExists(_) => 409,
            IngestError::NotFound(_) => 404,
            IngestError::InvalidFileType(_) => 400,
            IngestError::TransferFailed(_) => 502,
            IngestError::CatalogWriteFailed(_) => 500,
            IngestError::CatalogQueryFailed(_) => 500,
            IngestError::Staging(_) => 500,
            IngestError::Cancelled => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        let err = IngestError::AlreadyExists("S3-roads".to_string());
        assert_eq!(err.to_string(), "File layer already exists: S3-roads");

        let err = IngestError::NotFound("roads".to_string());
        assert_eq!(err.to_string(), "Folder not found or empty in S3: roads");

        let err = IngestError::InvalidFileType("gif for scan.gif".to_string());
        assert_eq!(err.to_string(), "Invalid file type: gif for scan.gif");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(IngestError::AlreadyExists(String::new()).http_status(), 409);
        assert_eq!(IngestError::NotFound(String::new()).http_status(), 404);
        assert_eq!(IngestError::InvalidFileType(String::new()).http_status(), 400);
        assert_eq!(IngestError::TransferFailed(String::new()).http_status(), 502);
        assert_eq!(IngestError::Cancelled.http_status(), 503);
    }
}
