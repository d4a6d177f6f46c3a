//! Aerial imagery ingestion.
//!
//! Rasters are published to the rendering service and recorded in the
//! comparison catalog under a monthly routine identifier. Nothing is kept
//! on local disk once the run finishes.

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::broadcast;
use tracing::info;

use gis_common::{remote_origin_name, FileLayerType};
use storage::{AerialCompareRecord, Catalog, ObjectStorage};

use crate::error::{IngestError, Result};
use crate::pipeline::{
    fetch_with_cancel, map_insert_failure, validate_object_extension, IngestReport,
    IngestionRequest, StagedFile,
};
use crate::publish::PublishClient;
use crate::staging::StagingArea;

/// Ingest a single aerial comparison raster.
pub async fn ingest_image(
    store: &ObjectStorage,
    catalog: &Catalog,
    publisher: &PublishClient,
    staging: &StagingArea,
    request: &IngestionRequest,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<IngestReport> {
    let project = &request.project;
    let saved_name = remote_origin_name(&request.object_key);

    let exists = catalog
        .aerial_image_url_exists(&saved_name)
        .await
        .map_err(|e| IngestError::CatalogQueryFailed(e.to_string()))?;
    if exists {
        return Err(IngestError::AlreadyExists(request.object_key.clone()));
    }

    // Extension check runs before the transfer so a bad request never
    // touches the bucket.
    validate_object_extension(FileLayerType::AerialImage, &request.object_key)?;

    let key = format!(
        "{}/{}",
        FileLayerType::AerialImage.category_dir(),
        request.object_key
    );
    let dest = staging
        .project_dir(FileLayerType::AerialImage, project.project_id_number)
        .join(&saved_name);

    let bytes_fetched = fetch_with_cancel(store, &key, &dest, shutdown).await?;

    let staged = StagedFile {
        file_name: saved_name.clone(),
        file_type: FileLayerType::AerialImage,
        local_path: dest,
        group_folder_name: None,
    };
    publisher
        .publish(std::slice::from_ref(&staged), project.project_id_number)
        .await?;

    let now = Utc::now();
    let record = AerialCompareRecord {
        // Comparison views roll up to the owning project when the package
        // belongs to a sub-project
        project_id: project.owning_project_id(),
        package_id: project.project_id_number,
        image_type: FileLayerType::AerialImage,
        image_captured_date: now,
        registered_by: request.actor_email.clone(),
        registered_date: now,
        image_url: saved_name.clone(),
        routine_id: monthly_routine_id(now),
        routine_type: 0,
        owner_id: project.project_id_number,
        share: 0,
        owner_aic_id: 0,
    };

    let aic_id = catalog
        .insert_aerial_compare(&record)
        .await
        .map_err(|e| map_insert_failure(&request.object_key, e))?;

    info!(image = %saved_name, aic_id, "Aerial image ingested");

    Ok(IngestReport {
        layer_name: saved_name,
        file_type: FileLayerType::AerialImage,
        files_staged: 1,
        bytes_fetched,
        data_id: None,
        layer_id: None,
        aic_id: Some(aic_id),
    })
}

/// Monthly comparison routine identifier, e.g. `aic_monthly_7_2026` for
/// August 2026. Months are zero-based in the routine naming scheme.
fn monthly_routine_id(at: DateTime<Utc>) -> String {
    format!("aic_monthly_{}_{}", at.month0(), at.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_monthly_routine_id() {
        let january = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(monthly_routine_id(january), "aic_monthly_0_2024");

        let december = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(monthly_routine_id(december), "aic_monthly_11_2024");
    }
}
