//! Uploads finished artifacts and resolves the URL recorded on the job.

use std::sync::Arc;

use meshvault_core::types::{JobId, UserId};
use meshvault_core::upload::{content_type_for, model_storage_key};
use meshvault_db::models::job::PublishedModel;
use meshvault_storage::BlobStore;

use crate::driver::Artifact;
use crate::error::PipelineError;

/// Turns an [`Artifact`] into a [`PublishedModel`].
#[derive(Clone)]
pub struct ResultPublisher {
    blobs: Arc<dyn BlobStore>,
}

impl ResultPublisher {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Upload a model file to `models/{user_id}/{job_id}/{name}`, or pass a
    /// placeholder URL through untouched.
    pub async fn publish(
        &self,
        user_id: UserId,
        job_id: JobId,
        artifact: &Artifact,
    ) -> Result<PublishedModel, PipelineError> {
        match artifact {
            Artifact::Placeholder(url) => Ok(PublishedModel {
                url: url.clone(),
                path: None,
            }),
            Artifact::File(path) => {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("model.ply");
                let key = model_storage_key(user_id, job_id, name);

                self.blobs
                    .put_file(&key, path, content_type_for(name))
                    .await
                    .map_err(PipelineError::Publish)?;

                let url = self.blobs.public_url(&key);
                tracing::info!(job_id = %job_id, key = %key, "Published model");
                Ok(PublishedModel { url, path: Some(key) })
            }
        }
    }

    /// Remove an uploaded model that could not be recorded on its job.
    /// Best effort; placeholders own no blob.
    pub async fn retract(&self, job_id: JobId, model: &PublishedModel) {
        let Some(key) = model.path.as_deref() else {
            return;
        };
        match self.blobs.delete(key).await {
            Ok(()) => tracing::info!(job_id = %job_id, key = %key, "Retracted unrecorded model"),
            Err(e) => tracing::warn!(job_id = %job_id, key = %key, error = %e, "Failed to retract model"),
        }
    }
}
