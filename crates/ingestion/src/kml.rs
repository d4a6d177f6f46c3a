//! KML document ingestion.
//!
//! KML layers are the one type served straight from local disk: the staged
//! document is relocated into permanent per-project storage instead of
//! being pushed to the rendering service.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::info;

use gis_common::{remote_origin_name, FileLayerType};
use storage::{Catalog, DataPoolRecord, ObjectStorage, ProjectLayerRecord};

use crate::error::{IngestError, Result};
use crate::pipeline::{
    catalog_data_url, fetch_with_cancel, map_insert_failure, validate_object_extension,
    IngestReport, IngestionRequest,
};
use crate::staging::StagingArea;

/// Ingest a single KML or KMZ document.
pub async fn ingest_document(
    store: &ObjectStorage,
    catalog: &Catalog,
    staging: &StagingArea,
    request: &IngestionRequest,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<IngestReport> {
    let project = &request.project;
    let saved_name = remote_origin_name(&request.object_key);

    let exists = catalog
        .data_pool_name_exists(&saved_name)
        .await
        .map_err(|e| IngestError::CatalogQueryFailed(e.to_string()))?;
    if exists {
        return Err(IngestError::AlreadyExists(request.object_key.clone()));
    }

    // Extension check runs before the transfer so a bad request never
    // touches the bucket.
    validate_object_extension(FileLayerType::Kml, &request.object_key)?;

    let key = format!(
        "{}/{}",
        FileLayerType::Kml.category_dir(),
        request.object_key
    );
    let staged = staging
        .project_dir(FileLayerType::Kml, project.project_id_number)
        .join(&saved_name);

    let bytes_fetched = fetch_with_cancel(store, &key, &staged, shutdown).await?;

    let now = Utc::now();
    let data_pool = DataPoolRecord {
        data_name: saved_name.clone(),
        data_url: catalog_data_url(FileLayerType::Kml, project.project_id_number, &saved_name),
        data_owner: project.project_name.clone(),
        share: 0,
        data_type: FileLayerType::Kml,
        added_date: now,
        z_offset: 0.0,
        x_offset: 0.0,
        y_offset: 0.0,
        data_owner_pid: project.parent_project_id_number,
        added_by: request.actor_email.clone(),
    };
    let layer = ProjectLayerRecord {
        layer_name: saved_name.clone(),
        attached_date: now,
        zindex: 1,
        default_view: 0,
        project_id: project.project_id_number,
        attached_by: request.actor_email.clone(),
    };

    let (data_id, layer_id) = catalog
        .insert_file_layer(&data_pool, &layer)
        .await
        .map_err(|e| map_insert_failure(&request.object_key, e))?;

    // Must survive the closing staging wipe; the map application serves
    // the document from here.
    staging
        .relocate_to_permanent(
            &staged,
            FileLayerType::Kml,
            project.project_id_number,
            &saved_name,
        )
        .await?;

    info!(layer = %saved_name, data_id, "KML document ingested");

    Ok(IngestReport {
        layer_name: saved_name,
        file_type: FileLayerType::Kml,
        files_staged: 1,
        bytes_fetched,
        data_id: Some(data_id),
        layer_id: Some(layer_id),
        aic_id: None,
    })
}
