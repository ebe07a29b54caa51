//! Blob storage for raw videos and published model artifacts.
//!
//! Everything above this crate talks to an `Arc<dyn BlobStore>` built once at
//! startup by [`build_blob_store`]. Keys are relative, `/`-separated paths
//! such as `videos/{user_id}/{ts}_{job_id}_{name}`.

pub mod config;
pub mod local;
pub mod s3;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use config::{StorageBackend, StorageConfig};
pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

/// Errors returned by [`BlobStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Invalid blob key '{0}'")]
    InvalidKey(String),

    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object storage error: {0}")]
    Remote(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Object storage addressed by relative keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    /// Store the contents of a local file under `key`.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), BlobError>;

    /// Remove the object at `key`. Removing a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Public URL clients use to download the object at `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Reject keys that are empty, absolute, or try to climb out of the root.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Join a base URL and a key with exactly one `/` between them.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Build the configured blob store.
pub async fn build_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, BlobError> {
    match config.backend {
        StorageBackend::Local => {
            let store = LocalBlobStore::new(&config.root, &config.public_url);
            tracing::info!(root = %config.root.display(), "Using local blob storage");
            Ok(Arc::new(store))
        }
        StorageBackend::S3 => {
            let store = S3BlobStore::from_config(config).await?;
            tracing::info!(bucket = %store.bucket(), "Using S3 blob storage");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn validate_key_accepts_nested_relative_keys() {
        assert!(validate_key("videos/u/1700000000_j_scan.mp4").is_ok());
        assert!(validate_key("models/u/j/final_mesh.ply").is_ok());
    }

    #[test]
    fn validate_key_rejects_escapes() {
        for key in ["", "/etc/passwd", "videos/../../x", "a//b", "./a", "a\\b", "videos/"] {
            assert_matches!(validate_key(key), Err(BlobError::InvalidKey(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn local_config_builds_a_filesystem_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_blob_store(&StorageConfig::local(dir.path(), "http://h/files/"))
            .await
            .unwrap();

        store.put("videos/u/scan.mp4", b"abc".to_vec(), "video/mp4").await.unwrap();

        assert!(dir.path().join("videos/u/scan.mp4").exists());
        assert_eq!(store.public_url("videos/u/scan.mp4"), "http://h/files/videos/u/scan.mp4");
    }

    #[test]
    fn join_url_normalises_trailing_slash() {
        assert_eq!(join_url("http://h/files/", "a/b"), "http://h/files/a/b");
        assert_eq!(join_url("http://h/files", "a/b"), "http://h/files/a/b");
    }
}
