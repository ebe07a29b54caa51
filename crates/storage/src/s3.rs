//! S3-compatible blob store built on `aws-sdk-s3`.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::{join_url, validate_key, BlobError, BlobStore, StorageConfig};

/// Blob store writing to a single S3 bucket.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: impl Into<String>, public_url: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_url: public_url.into(),
        }
    }

    /// Build a client from the ambient AWS configuration (env, profile,
    /// instance metadata), honouring a custom endpoint if one is set.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, BlobError> {
        let bucket = config
            .s3_bucket
            .clone()
            .ok_or_else(|| BlobError::Config("S3_BUCKET is required for the s3 backend".into()))?;

        let sdk_config = aws_config::load_from_env().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.s3_endpoint {
            // Custom endpoints (MinIO and friends) generally need path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let public_url = default_public_url(&bucket, config.s3_endpoint.as_deref(), config.s3_public_url.as_deref());
        Ok(Self::new(client, bucket, public_url))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_body(&self, key: &str, body: ByteStream, content_type: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                BlobError::Remote(format!(
                    "Failed to write s3://{}/{key}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        tracing::debug!(bucket = %self.bucket, key, "Stored blob");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        self.put_body(key, ByteStream::from(bytes), content_type).await
    }

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), BlobError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| BlobError::Remote(format!("Failed to read {}: {e}", path.display())))?;
        self.put_body(key, body, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                BlobError::Remote(format!(
                    "Failed to delete s3://{}/{key}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_url, key)
    }
}

/// Public base URL: explicit override, else path-style on the custom
/// endpoint, else the virtual-hosted AWS URL.
fn default_public_url(bucket: &str, endpoint: Option<&str>, explicit: Option<&str>) -> String {
    match (explicit, endpoint) {
        (Some(url), _) => url.to_string(),
        (None, Some(endpoint)) => join_url(endpoint, bucket),
        (None, None) => format!("https://{bucket}.s3.amazonaws.com"),
    }
}
