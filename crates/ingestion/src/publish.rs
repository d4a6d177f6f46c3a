//! Upload client for the rendering-service bridge.
//!
//! Staged shapefile members and aerial images are pushed to the bridge as
//! multipart POST requests, one request per file. The service password
//! travels base64 encoded in the form body, matching what the bridge
//! expects.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};
use crate::pipeline::StagedFile;

/// Configuration for the rendering-service upload bridge.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Full URL of the bridge upload endpoint
    pub upload_url: String,
    /// Bridge password, sent base64 encoded with each request
    pub password: String,
    /// Per-file transfer timeout; rasters run to hundreds of megabytes
    pub timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            upload_url: "http://localhost:8080/JavaBridge/geodataupload/fileTransfer.php"
                .to_string(),
            password: String::new(),
            timeout: Duration::from_secs(1000),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for publishing staged files to the rendering service.
pub struct PublishClient {
    client: Client,
    config: PublishConfig,
}

impl PublishClient {
    pub fn new(config: PublishConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                IngestError::TransferFailed(format!("Failed to create upload client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Publish a batch of staged files as one logical upload.
    ///
    /// An empty batch is a failure, it means a bundle listing produced no
    /// uploadable members. The first per-file failure aborts the batch so
    /// the caller records nothing in the catalog.
    #[instrument(skip(self, files), fields(count = files.len(), project_id = project_id))]
    pub async fn publish(&self, files: &[StagedFile], project_id: i64) -> Result<()> {
        if files.is_empty() {
            return Err(IngestError::TransferFailed(
                "File layers failed to upload.".to_string(),
            ));
        }

        for staged in files {
            self.upload_file(staged, project_id).await?;
        }

        info!(count = files.len(), "Published staged files to rendering service");
        Ok(())
    }

    /// Stream one staged file to the bridge endpoint.
    async fn upload_file(&self, staged: &StagedFile, project_id: i64) -> Result<()> {
        let file = File::open(&staged.local_path).await.map_err(|e| {
            IngestError::TransferFailed(format!(
                "Upload failed: cannot read {}: {}",
                staged.local_path.display(),
                e
            ))
        })?;

        let body = Body::wrap_stream(ReaderStream::new(file));
        let file_part = Part::stream(body).file_name(staged.file_name.clone());

        let mut form = Form::new()
            .text("pwd", general_purpose::STANDARD.encode(&self.config.password))
            .text("fileName", staged.file_name.clone())
            .text("projectId", project_id.to_string())
            .text("fileType", staged.file_type.publish_label())
            .part("file", file_part);

        if let Some(folder) = &staged.group_folder_name {
            form = form.text("folderName", folder.clone());
        }

        debug!(file = %staged.file_name, "Uploading staged file");

        let response = self
            .client
            .post(&self.config.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::TransferFailed(format!("Upload failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IngestError::TransferFailed(format!(
                "Upload failed: rendering service returned HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PublishConfig::default();
        assert!(config.upload_url.ends_with("/fileTransfer.php"));
        assert_eq!(config.timeout, Duration::from_secs(1000));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_failure() {
        let client = PublishClient::new(PublishConfig::default()).unwrap();

        let err = client.publish(&[], 42).await.unwrap_err();
        assert_eq!(err.to_string(), "File layers failed to upload.");
        assert_eq!(err.http_status(), 502);
    }
}
