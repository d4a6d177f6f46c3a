//! Remote object store holding uploaded layer files (S3 compatible).

use std::path::Path;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use gis_common::{GisError, GisResult};

/// Configuration for the layer upload bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// Custom endpoint URL (MinIO); None for AWS proper
    pub endpoint: Option<String>,
    /// Bucket name
    pub bucket: String,
    /// Access key ID; empty means anonymous access
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region
    pub region: String,
    /// Per-operation timeout (imagery rasters can be large)
    pub operation_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: "geolayer-uploads".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "ap-southeast-2".to_string(),
            operation_timeout: Duration::from_secs(900),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// One page of a bucket listing.
#[derive(Debug, Clone)]
pub struct ObjectPage {
    /// Raw object keys, folder markers included
    pub keys: Vec<String>,
    /// Token for the next page when the listing was truncated
    pub next_token: Option<String>,
}

/// Client for the layer upload bucket.
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl ObjectStorage {
    /// Create a client from config.
    pub async fn connect(config: &ObjectStorageConfig) -> Self {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(config.operation_timeout)
            .connect_timeout(config.connect_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(timeouts);

        if config.access_key_id.is_empty() {
            // Unsigned requests for public or test buckets
            loader = loader.no_credentials();
        } else {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                None,
                None,
                "layer-bucket-config",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        // Custom endpoints (MinIO) need path-style addressing
        if config.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    /// Check whether at least one object exists under a prefix.
    #[instrument(skip(self), fields(bucket = %self.bucket, prefix = %prefix))]
    pub async fn probe_prefix(&self, prefix: &str) -> GisResult<bool> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| GisError::StorageError(format!("List failed for {}: {}", prefix, e)))?;

        Ok(!response.contents().is_empty())
    }

    /// Fetch one page of keys under a prefix.
    ///
    /// Keys come back exactly as stored, so folder-marker keys ending in
    /// `/` stay visible to the caller.
    #[instrument(skip(self), fields(bucket = %self.bucket, prefix = %prefix))]
    pub async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> GisResult<ObjectPage> {
        let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GisError::StorageError(format!("List failed for {}: {}", prefix, e)))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(|k| k.to_string()))
            .collect();

        let next_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ObjectPage { keys, next_token })
    }

    /// Download one object to a local file, creating parent directories.
    /// Returns the number of bytes written.
    #[instrument(skip(self), fields(bucket = %self.bucket, key = %key))]
    pub async fn fetch_to_local(&self, key: &str, dest: &Path) -> GisResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| GisError::StorageError(format!("Fetch failed for {}: {}", key, e)))?;

        let mut body = output.body;
        let mut file = fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| GisError::StorageError(format!("Stream failed for {}: {}", key, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!(bytes = written, path = %dest.display(), "Fetched object");
        Ok(written)
    }
}
