//! Pipeline orchestration for file layer ingestion.
//!
//! The pipeline owns the four clients a run needs (object store, catalog,
//! publisher, staging) and dispatches each request to the handler for its
//! layer type. Runs are bracketed by staging wipes so no transient file
//! survives, whatever the outcome.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use gis_common::{key_extension, FileLayerType, GisError, ProjectRef};
use storage::{Catalog, ObjectStorage, PurgeCounts};

use crate::error::{IngestError, Result};
use crate::publish::PublishClient;
use crate::staging::StagingArea;
use crate::{aerial, kml, shapefile};

/// One ingestion request, already validated and resolved by the API layer.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub file_type: FileLayerType,
    /// Folder name for shapefile bundles, object file name otherwise
    pub object_key: String,
    pub project: ProjectRef,
    pub actor_email: String,
}

/// A file materialized in the staging area.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Remote-origin-prefixed name the file is saved and published under
    pub file_name: String,
    pub file_type: FileLayerType,
    pub local_path: PathBuf,
    /// Bundle folder the file belongs to, set for shapefile members only
    pub group_folder_name: Option<String>,
}

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub layer_name: String,
    pub file_type: FileLayerType,
    pub files_staged: usize,
    pub bytes_fetched: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aic_id: Option<i64>,
}

/// Summary of a purge run.
#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub files_deleted: usize,
    /// Catalog rows whose file was already gone
    pub files_missing: usize,
    /// Catalog rows whose file could not be deleted
    pub files_failed: usize,
    pub catalog_rows: PurgeCounts,
}

/// Orchestrates the full ingestion flow for all layer types.
pub struct LayerPipeline {
    store: ObjectStorage,
    catalog: Catalog,
    publisher: PublishClient,
    staging: StagingArea,
}

impl LayerPipeline {
    pub fn new(
        store: ObjectStorage,
        catalog: Catalog,
        publisher: PublishClient,
        staging: StagingArea,
    ) -> Self {
        Self {
            store,
            catalog,
            publisher,
            staging,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run one ingestion request to completion.
    ///
    /// The shutdown receiver interrupts the run between object transfers;
    /// the closing wipe still runs on that path.
    #[instrument(
        skip(self, request, shutdown),
        fields(
            file_type = %request.file_type,
            key = %request.object_key,
            project_id = request.project.project_id_number,
        )
    )]
    pub async fn ingest(
        &self,
        request: &IngestionRequest,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<IngestReport> {
        self.staging.wipe().await?;

        let result = match request.file_type {
            FileLayerType::Shapefile => {
                shapefile::ingest_bundle(
                    &self.store,
                    &self.catalog,
                    &self.publisher,
                    &self.staging,
                    request,
                    shutdown,
                )
                .await
            }
            FileLayerType::Kml => {
                kml::ingest_document(&self.store, &self.catalog, &self.staging, request, shutdown)
                    .await
            }
            FileLayerType::AerialImage => {
                aerial::ingest_image(
                    &self.store,
                    &self.catalog,
                    &self.publisher,
                    &self.staging,
                    request,
                    shutdown,
                )
                .await
            }
        };

        // The staging tree never survives a run, success or failure
        if let Err(e) = self.staging.wipe().await {
            warn!(error = %e, "Failed to clear staging area after run");
        }

        match &result {
            Ok(report) => {
                info!(
                    layer = %report.layer_name,
                    files = report.files_staged,
                    bytes = report.bytes_fetched,
                    "Ingestion complete"
                )
            }
            Err(e) => warn!(error = %e, "Ingestion failed"),
        }

        result
    }

    /// Delete every remote-origin layer: permanent KML documents first,
    /// then the staging tree, then the catalog rows.
    ///
    /// Filesystem failures are logged and skipped, never fatal; the
    /// catalog delete always runs, so repeated purges converge on a
    /// catalog with no remote-origin rows.
    #[instrument(skip(self))]
    pub async fn purge_remote_layers(&self) -> Result<PurgeReport> {
        let paths = self
            .catalog
            .list_remote_origin_kml_paths()
            .await
            .map_err(|e| IngestError::CatalogQueryFailed(e.to_string()))?;

        let mut files_deleted = 0usize;
        let mut files_missing = 0usize;
        let mut files_failed = 0usize;

        for recorded in &paths {
            match remove_catalog_file(&self.staging, recorded).await {
                FileRemoval::Deleted => files_deleted += 1,
                FileRemoval::Missing => files_missing += 1,
                FileRemoval::Failed => files_failed += 1,
            }
        }

        if let Err(e) = self.staging.wipe().await {
            warn!(error = %e, "Failed to clear staging area during purge");
        }

        let catalog_rows = self.catalog.delete_remote_origin_layers().await.map_err(|e| {
            IngestError::CatalogWriteFailed(format!("Failed to delete catalog rows: {}", e))
        })?;

        info!(
            files_deleted,
            files_missing,
            files_failed,
            data_pool_rows = catalog_rows.data_pool,
            layer_rows = catalog_rows.project_layers,
            aerial_rows = catalog_rows.aerial_images,
            "Purged remote-origin layers"
        );

        Ok(PurgeReport {
            files_deleted,
            files_missing,
            files_failed,
            catalog_rows,
        })
    }
}

/// Race an object fetch against the shutdown signal.
pub(crate) async fn fetch_with_cancel(
    store: &ObjectStorage,
    key: &str,
    dest: &Path,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<u64> {
    tokio::select! {
        _ = shutdown.recv() => Err(IngestError::Cancelled),
        fetched = store.fetch_to_local(key, dest) => {
            fetched.map_err(|e| IngestError::TransferFailed(format!("S3 Download failed: {}", e)))
        }
    }
}

/// Outcome of deleting one catalog-recorded document during a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileRemoval {
    Deleted,
    Missing,
    Failed,
}

/// Delete one catalog-recorded file under the data root.
///
/// Rows whose path escapes the data root and files that cannot be
/// unlinked count as failures; a row whose file is already gone is
/// merely missing.
pub(crate) async fn remove_catalog_file(staging: &StagingArea, recorded: &str) -> FileRemoval {
    let Some(path) = staging.resolve_catalog_path(recorded) else {
        warn!(path = %recorded, "Skipping catalog path that escapes the data root");
        return FileRemoval::Failed;
    };

    match tokio::fs::remove_file(&path).await {
        Ok(()) => FileRemoval::Deleted,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileRemoval::Missing,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete KML document");
            FileRemoval::Failed
        }
    }
}

/// Check a single object key against the extension allow-set for its type.
pub(crate) fn validate_object_extension(file_type: FileLayerType, key: &str) -> Result<()> {
    let ext = key_extension(key);
    match ext.as_deref() {
        Some(e) if file_type.allowed_extensions().contains(&e) => Ok(()),
        _ => Err(IngestError::InvalidFileType(format!(
            "{} for {}",
            ext.as_deref().unwrap_or(""),
            key
        ))),
    }
}

/// Map a catalog insert failure onto the pipeline error space.
///
/// Unique-index violations mean a concurrent run recorded the layer after
/// the pre-check passed, so they surface as the layer already existing.
pub(crate) fn map_insert_failure(object_key: &str, error: GisError) -> IngestError {
    match error {
        GisError::DuplicateRecord(name) => IngestError::AlreadyExists(name),
        other => {
            warn!(error = %other, "Catalog insert failed");
            IngestError::CatalogWriteFailed(format!(
                "File layer data not inserted to DB: {}",
                object_key
            ))
        }
    }
}

/// Root-relative URL recorded in the catalog for a stored layer file.
pub(crate) fn catalog_data_url(file_type: FileLayerType, project_id: i64, name: &str) -> String {
    format!("{}/{}/{}", file_type.category_dir(), project_id, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_object_extension() {
        assert!(validate_object_extension(FileLayerType::Kml, "lake.kml").is_ok());
        assert!(validate_object_extension(FileLayerType::Kml, "lake.KMZ").is_ok());
        assert!(validate_object_extension(FileLayerType::AerialImage, "south.tiff").is_ok());
        assert!(validate_object_extension(FileLayerType::AerialImage, "north.ecw").is_ok());

        let err = validate_object_extension(FileLayerType::Kml, "scan.gif").unwrap_err();
        assert_eq!(err.to_string(), "Invalid file type: gif for scan.gif");

        let err = validate_object_extension(FileLayerType::AerialImage, "README").unwrap_err();
        assert_eq!(err.to_string(), "Invalid file type:  for README");

        // Cross-type extensions are rejected
        assert!(validate_object_extension(FileLayerType::Kml, "north.ecw").is_err());
        assert!(validate_object_extension(FileLayerType::AerialImage, "lake.kml").is_err());
    }

    #[test]
    fn test_catalog_data_url() {
        assert_eq!(
            catalog_data_url(FileLayerType::Kml, 42, "S3-lake.kml"),
            "KML/42/S3-lake.kml"
        );
        assert_eq!(
            catalog_data_url(FileLayerType::Shapefile, 7, "S3-roads"),
            "Geoserver/Shapefile/7/S3-roads"
        );
    }

    #[test]
    fn test_map_insert_failure() {
        let err = map_insert_failure(
            "roads",
            GisError::DuplicateRecord("S3-roads".to_string()),
        );
        assert_eq!(err.to_string(), "File layer already exists: S3-roads");
        assert_eq!(err.http_status(), 409);

        let err = map_insert_failure(
            "roads",
            GisError::DatabaseError("connection reset".to_string()),
        );
        assert_eq!(err.to_string(), "File layer data not inserted to DB: roads");
        assert_eq!(err.http_status(), 500);
    }

    #[tokio::test]
    async fn test_remove_catalog_file_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let doc = dir.path().join("KML/42/S3-lake.kml");
        tokio::fs::create_dir_all(doc.parent().unwrap()).await.unwrap();
        tokio::fs::write(&doc, b"<kml/>").await.unwrap();

        assert_eq!(
            remove_catalog_file(&staging, "KML/42/S3-lake.kml").await,
            FileRemoval::Deleted
        );
        assert!(!doc.exists());

        // The row is still there on a second pass, its file is not
        assert_eq!(
            remove_catalog_file(&staging, "KML/42/S3-lake.kml").await,
            FileRemoval::Missing
        );

        assert_eq!(
            remove_catalog_file(&staging, "../outside.kml").await,
            FileRemoval::Failed
        );

        // A directory at the recorded path cannot be unlinked as a file
        tokio::fs::create_dir_all(dir.path().join("KML/42/S3-group.kml"))
            .await
            .unwrap();
        assert_eq!(
            remove_catalog_file(&staging, "KML/42/S3-group.kml").await,
            FileRemoval::Failed
        );
    }
}
