//! Object-store boundary.
//!
//! The core only builds opaque paths and hands bytes across this seam.
//! Production uses S3; local development and tests write under a
//! temp directory, switched by `STORAGE_PROVIDER`.

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::StorageConfig;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Vec<u8>>;
}

pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "s3" => Ok(Arc::new(S3ObjectStore::new(config)?)),
        "local" => Ok(Arc::new(LocalObjectStore::new(&config.local_dir))),
        other => anyhow::bail!("unknown storage provider: {other}"),
    }
}

/// Path of a file belonging to one study job. All job artifacts live
/// under the job's prefix so teardown can remove them together.
pub fn study_job_file_path(
    org_slug: &str,
    study_id: Uuid,
    job_id: Uuid,
    file_name: &str,
) -> String {
    format!("studies/{org_slug}/{study_id}/jobs/{job_id}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_file_paths_are_scoped_per_job() {
        let study_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let path = study_job_file_path("open-lab", study_id, job_id, "encrypted-logs.zip");
        assert_eq!(
            path,
            format!("studies/open-lab/{study_id}/jobs/{job_id}/encrypted-logs.zip")
        );
    }
}
