//! Shapefile bundle ingestion.
//!
//! A shapefile layer arrives as a bucket folder of sidecar members (.shp,
//! .dbf, .prj and friends). The whole folder is validated and staged
//! before anything is published, and the bundle lands in the catalog as a
//! single layer named after its folder.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use gis_common::{
    key_basename, key_extension, remote_origin_name, FileLayerType, SHAPEFILE_MEMBER_EXTENSIONS,
};
use storage::{Catalog, DataPoolRecord, ObjectStorage, ProjectLayerRecord};

use crate::error::{IngestError, Result};
use crate::pipeline::{
    catalog_data_url, fetch_with_cancel, map_insert_failure, IngestReport, IngestionRequest,
    StagedFile,
};
use crate::publish::PublishClient;
use crate::staging::StagingArea;

/// Ingest a folder of shapefile members as one logical layer.
pub async fn ingest_bundle(
    store: &ObjectStorage,
    catalog: &Catalog,
    publisher: &PublishClient,
    staging: &StagingArea,
    request: &IngestionRequest,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<IngestReport> {
    let project = &request.project;
    let layer_name = remote_origin_name(&request.object_key);

    // Pre-check saves the remote round trips; the partial unique index on
    // data_pool still backs it up at insert time.
    let exists = catalog
        .data_pool_name_exists(&layer_name)
        .await
        .map_err(|e| IngestError::CatalogQueryFailed(e.to_string()))?;
    if exists {
        return Err(IngestError::AlreadyExists(layer_name));
    }

    let prefix = format!(
        "{}/{}",
        FileLayerType::Shapefile.category_dir(),
        request.object_key
    );

    let found = store
        .probe_prefix(&prefix)
        .await
        .map_err(|e| IngestError::TransferFailed(format!("S3 Download failed: {}", e)))?;
    if !found {
        return Err(IngestError::NotFound(request.object_key.clone()));
    }

    let bundle_dir = staging.bundle_dir(project.project_id_number, &layer_name);

    let mut staged: Vec<StagedFile> = Vec::new();
    let mut bytes_fetched = 0u64;
    let mut continuation: Option<String> = None;

    // Drain the listing completely so the publish is one logical batch.
    loop {
        let page = store
            .list_page(&prefix, continuation.as_deref())
            .await
            .map_err(|e| IngestError::TransferFailed(format!("S3 Download failed: {}", e)))?;

        for key in &page.keys {
            // Folder markers carry no data
            if key.ends_with('/') {
                continue;
            }

            validate_member_extension(key)?;

            let file_name = remote_origin_name(key_basename(key));
            let dest = bundle_dir.join(&file_name);

            bytes_fetched += fetch_with_cancel(store, key, &dest, shutdown).await?;
            debug!(key = %key, file = %file_name, "Staged bundle member");

            staged.push(StagedFile {
                file_name,
                file_type: FileLayerType::Shapefile,
                local_path: dest,
                group_folder_name: Some(layer_name.clone()),
            });
        }

        match page.next_token {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    publisher
        .publish(&staged, project.project_id_number)
        .await?;

    let now = Utc::now();
    let data_pool = DataPoolRecord {
        data_name: layer_name.clone(),
        data_url: catalog_data_url(
            FileLayerType::Shapefile,
            project.project_id_number,
            &layer_name,
        ),
        data_owner: project.project_name.clone(),
        share: 0,
        data_type: FileLayerType::Shapefile,
        added_date: now,
        z_offset: 0.0,
        x_offset: 0.0,
        y_offset: 0.0,
        data_owner_pid: Some(project.project_id_number),
        added_by: request.actor_email.clone(),
    };
    let layer = ProjectLayerRecord {
        layer_name: layer_name.clone(),
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

    info!(
        layer = %layer_name,
        files = staged.len(),
        data_id,
        "Shapefile bundle ingested"
    );

    Ok(IngestReport {
        layer_name,
        file_type: FileLayerType::Shapefile,
        files_staged: staged.len(),
        bytes_fetched,
        data_id: Some(data_id),
        layer_id: Some(layer_id),
        aic_id: None,
    })
}

/// Every member of a bundle must carry a known sidecar extension. One bad
/// member fails the whole request before any publish happens.
fn validate_member_extension(key: &str) -> Result<()> {
    match key_extension(key) {
        Some(ext) if SHAPEFILE_MEMBER_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(IngestError::InvalidFileType(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_extension_allow_set() {
        for key in [
            "Geoserver/Shapefile/roads/roads.shp",
            "Geoserver/Shapefile/roads/roads.shx",
            "Geoserver/Shapefile/roads/roads.dbf",
            "Geoserver/Shapefile/roads/roads.prj",
            "Geoserver/Shapefile/roads/roads.shp.xml",
            "Geoserver/Shapefile/roads/ROADS.SBN",
        ] {
            assert!(validate_member_extension(key).is_ok(), "{key}");
        }
    }

    #[test]
    fn test_member_extension_rejects_strays() {
        let err = validate_member_extension("Geoserver/Shapefile/roads/notes.txt").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid file type: Geoserver/Shapefile/roads/notes.txt"
        );

        assert!(validate_member_extension("Geoserver/Shapefile/roads/README").is_err());
        assert!(validate_member_extension("Geoserver/Shapefile/roads/scan.gif").is_err());
    }
}
