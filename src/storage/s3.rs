//! S3-backed object store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use super::ObjectStore;
use crate::config::StorageConfig;

pub struct S3ObjectStore {
    bucket: Bucket,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let region = match &config.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .s3_region
                .parse()
                .context("parsing S3 region")?,
        };

        let credentials = Credentials::new(
            config.s3_access_key_id.as_deref(),
            config.s3_secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .context("building S3 credentials")?;

        let mut bucket = Bucket::new(&config.s3_bucket, region, credentials)
            .context("creating S3 bucket client")?;
        if config.s3_endpoint.is_some() {
            // Custom endpoints (minio and friends) want path-style URLs.
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let response = self
            .bucket
            .put_object(path, bytes)
            .await
            .with_context(|| format!("storing s3 object {path}"))?;
        if response.status_code() != 200 {
            anyhow::bail!(
                "unexpected status {} storing s3 object {path}",
                response.status_code()
            );
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .bucket
            .get_object(path)
            .await
            .with_context(|| format!("fetching s3 object {path}"))?;
        if response.status_code() != 200 {
            anyhow::bail!(
                "unexpected status {} fetching s3 object {path}",
                response.status_code()
            );
        }
        Ok(response.bytes().to_vec())
    }
}
