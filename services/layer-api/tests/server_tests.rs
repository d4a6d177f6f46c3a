//! Tests for the layer API HTTP server components.
//!
//! These tests cover the wire contract of the form-encoded operation
//! endpoint and the status/health responses without requiring a database
//! or bucket connection. Handler internals live in the binary crate, so
//! the contract is exercised through the library types it is built on.

use gis_common::FileLayerType;
use ingestion::IngestError;

// ============================================================================
// Operation form contract
// ============================================================================

#[test]
fn test_download_form_field_names() {
    // The upload portal posts these exact field names
    let body = "op=download&fileLayer=lake.kml&fileType=KML&projectName=Harbour&email=pm%40example.com";

    let fields: Vec<(&str, &str)> = body
        .split('&')
        .map(|pair| pair.split_once('=').unwrap())
        .collect();

    assert_eq!(fields[0], ("op", "download"));
    assert!(fields.iter().any(|(k, _)| *k == "fileLayer"));
    assert!(fields.iter().any(|(k, _)| *k == "fileType"));
    assert!(fields.iter().any(|(k, _)| *k == "projectName"));
    assert!(fields.iter().any(|(k, _)| *k == "email"));
}

#[test]
fn test_file_type_tags_match_portal_values() {
    // The portal's type selector offers exactly these codes
    assert_eq!(
        FileLayerType::parse_tag("SHP"),
        Some(FileLayerType::Shapefile)
    );
    assert_eq!(
        FileLayerType::parse_tag("AIC"),
        Some(FileLayerType::AerialImage)
    );
    assert_eq!(FileLayerType::parse_tag("KML"), Some(FileLayerType::Kml));
    assert_eq!(FileLayerType::parse_tag("GPX"), None);
}

// ============================================================================
// Response serialization tests
// ============================================================================

#[test]
fn test_op_response_serialization_success() {
    let response = serde_json::json!({
        "success": true,
        "message": "All files downloaded successfully."
    });

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("All files downloaded successfully."));
}

#[test]
fn test_op_response_serialization_failure() {
    let response = serde_json::json!({
        "success": false,
        "message": "File layer already exists: S3-roads"
    });

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
}

#[test]
fn test_health_response_serialization() {
    let response = serde_json::json!({
        "status": "ok",
        "service": "layer-api"
    });

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"status\":\"ok\""));
    assert!(json.contains("\"service\":\"layer-api\""));
}

#[test]
fn test_status_response_serialization() {
    let response = serde_json::json!({
        "active": [
            {
                "id": "abc123",
                "op": "download",
                "layer": "KML lake.kml",
                "project_id": 42,
                "started_at": "2024-01-15T12:00:00Z"
            }
        ],
        "recent": [
            {
                "id": "def456",
                "op": "delete-s3-file-layers",
                "layer": null,
                "project_id": null,
                "started_at": "2024-01-15T11:00:00Z",
                "completed_at": "2024-01-15T11:00:03Z",
                "duration_ms": 3000,
                "success": true,
                "files_processed": 7,
                "error_message": null
            }
        ],
        "total_completed": 12
    });

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"total_completed\":12"));
    assert!(json.contains("\"op\":\"download\""));
}

// ============================================================================
// Error to status-code contract
// ============================================================================

#[test]
fn test_pipeline_errors_map_to_expected_statuses() {
    let cases = [
        (IngestError::AlreadyExists("S3-roads".to_string()), 409),
        (IngestError::NotFound("roads".to_string()), 404),
        (
            IngestError::InvalidFileType("gif for scan.gif".to_string()),
            400,
        ),
        (
            IngestError::TransferFailed("Upload failed: timeout".to_string()),
            502,
        ),
        (IngestError::Cancelled, 503),
    ];

    for (error, expected) in cases {
        assert_eq!(error.http_status(), expected, "{}", error);
    }
}

#[test]
fn test_portal_messages_are_stable() {
    // The portal string-matches some of these, so the wording is frozen
    let err = IngestError::AlreadyExists("S3-lake.kml".to_string());
    assert_eq!(err.to_string(), "File layer already exists: S3-lake.kml");

    let err = IngestError::NotFound("contours".to_string());
    assert_eq!(err.to_string(), "Folder not found or empty in S3: contours");
}
