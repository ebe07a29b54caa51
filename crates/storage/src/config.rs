use std::path::PathBuf;
use std::str::FromStr;

/// Which [`BlobStore`](crate::BlobStore) implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(format!("Unknown storage backend '{other}'. Must be one of: local, s3")),
        }
    }
}

/// Blob storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the local backend.
    pub root: PathBuf,
    /// Base URL local blobs are served from.
    pub public_url: String,
    /// Bucket for the S3 backend.
    pub s3_bucket: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub s3_endpoint: Option<String>,
    /// Base URL S3 objects are served from. Derived from the endpoint or
    /// bucket when unset.
    pub s3_public_url: Option<String>,
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                        |
    /// |----------------------|--------------------------------|
    /// | `STORAGE_BACKEND`    | `local`                        |
    /// | `STORAGE_ROOT`       | `./storage`                    |
    /// | `STORAGE_PUBLIC_URL` | `http://localhost:3000/files`  |
    /// | `S3_BUCKET`          | (required for `s3`)            |
    /// | `S3_ENDPOINT`        | (AWS default)                  |
    /// | `S3_PUBLIC_URL`      | (derived)                      |
    pub fn from_env() -> Self {
        let backend: StorageBackend = std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".into())
            .parse()
            .unwrap_or_else(|e| panic!("STORAGE_BACKEND: {e}"));

        let root = PathBuf::from(std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./storage".into()));

        let public_url =
            std::env::var("STORAGE_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000/files".into());

        Self {
            backend,
            root,
            public_url,
            s3_bucket: non_empty_var("S3_BUCKET"),
            s3_endpoint: non_empty_var("S3_ENDPOINT"),
            s3_public_url: non_empty_var("S3_PUBLIC_URL"),
        }
    }

    /// A local-filesystem configuration rooted at `root`.
    pub fn local(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Local,
            root: root.into(),
            public_url: public_url.into(),
            s3_bucket: None,
            s3_endpoint: None,
            s3_public_url: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
