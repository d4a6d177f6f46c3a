//! Request validation and project access control.
//!
//! The upload portal drives this service with form posts, so the checks
//! run in a fixed order and every rejection carries the exact message the
//! portal displays to the user.

use gis_common::FileLayerType;
use ingestion::IngestionRequest;
use storage::Catalog;

/// Roles allowed to trigger layer downloads for a project.
pub const INGEST_ROLES: &[&str] = &["Project Manager", "Project Monitor"];

/// Form fields accepted by the download operation.
#[derive(Debug, Clone, Default)]
pub struct DownloadFields {
    pub file_layer: Option<String>,
    pub file_type: Option<String>,
    pub project_name: Option<String>,
    pub email: Option<String>,
}

/// A rejected request: user-facing message plus the HTTP status to pair
/// with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessError {
    pub status: u16,
    pub message: String,
}

impl AccessError {
    fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

/// Validate the download form and resolve it against the project catalog.
pub async fn resolve_download_request(
    catalog: &Catalog,
    fields: &DownloadFields,
) -> Result<IngestionRequest, AccessError> {
    let object_key = require_field(&fields.file_layer, "File name not provided.")?;

    let file_type = fields
        .file_type
        .as_deref()
        .and_then(FileLayerType::parse_tag)
        .ok_or_else(|| AccessError::new(400, "Invalid file type."))?;

    let project_name = require_field(&fields.project_name, "Project name not provided.")?;

    let project = catalog
        .find_project_by_name(&project_name)
        .await
        .map_err(|e| AccessError::new(500, &format!("Download failed: {}", e)))?
        .ok_or_else(|| AccessError::new(404, "Project does not exist."))?;

    let email = require_field(&fields.email, "Email not provided.")?;

    let permitted = catalog
        .user_has_project_role(project.project_id_number, &email, INGEST_ROLES)
        .await
        .map_err(|e| AccessError::new(500, &format!("Download failed: {}", e)))?;
    if !permitted {
        return Err(AccessError::new(
            403,
            "User does not have permission to download file.",
        ));
    }

    Ok(IngestionRequest {
        file_type,
        object_key,
        project,
        actor_email: email,
    })
}

/// A field is present only if it is set and non-empty.
fn require_field(value: &Option<String>, message: &str) -> Result<String, AccessError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AccessError::new(400, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_field() {
        assert_eq!(
            require_field(&Some("lake.kml".to_string()), "File name not provided."),
            Ok("lake.kml".to_string())
        );

        let err = require_field(&None, "File name not provided.").unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "File name not provided.");

        let err = require_field(&Some(String::new()), "Email not provided.").unwrap_err();
        assert_eq!(err.message, "Email not provided.");
    }

    #[test]
    fn test_ingest_roles() {
        assert!(INGEST_ROLES.contains(&"Project Manager"));
        assert!(INGEST_ROLES.contains(&"Project Monitor"));
        assert!(!INGEST_ROLES.contains(&"Viewer"));
    }
}
