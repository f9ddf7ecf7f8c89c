//! S3 storage backend implementation.

use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use std::sync::Arc;

use crate::config::AwsCredentials;
use crate::error::{S3ConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// S3 storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub region: Option<String>,
    pub bucket: String,
}

impl StorageProvider {
    pub(super) fn construct_s3(
        config: S3Config,
        credentials: Option<&AwsCredentials>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

        if let Some(creds) = credentials {
            builder = builder
                .with_access_key_id(&creds.access_key_id)
                .with_secret_access_key(&creds.secret_access_key);
        }

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        // Transient request failures are retried inside the client.
        builder = builder.with_retry(RetryConfig::default());

        let canonical_url = match &config.region {
            Some(region) => format!("https://s3.{}.amazonaws.com/{}", region, config.bucket),
            None => format!("https://s3.amazonaws.com/{}", config.bucket),
        };

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(S3ConfigSnafu)?);

        Ok(Self {
            config: BackendConfig::S3(config),
            object_store,
            canonical_url,
        })
    }
}
