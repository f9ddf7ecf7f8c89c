//! Object storage abstraction.
//!
//! Provides a unified interface over S3 and the local filesystem. The local
//! backend exists so the whole pipeline can run (and be tested) against a
//! directory tree without cloud access.

mod local;
pub mod lister;
mod s3;

use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::config::AwsCredentials;
use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

pub use lister::{ListObjectPages, ListPage, list_all_keys};
pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for the supported backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)/?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)/?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

fn matchers() -> &'static HashMap<Backend, Vec<Regex>> {
    static MATCHERS: OnceLock<HashMap<Backend, Vec<Regex>>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let mut m = HashMap::new();

        m.insert(
            Backend::S3,
            vec![Regex::new(S3_PATH).unwrap(), Regex::new(S3_URL).unwrap()],
        );

        m.insert(
            Backend::Local,
            vec![Regex::new(FILE_URI).unwrap(), Regex::new(FILE_PATH).unwrap()],
        );

        m
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (k, v) in matchers() {
            if let Some(matches) = v.iter().filter_map(|r| r.captures(url)).next() {
                return match k {
                    Backend::S3 => Ok(Self::parse_s3(matches)),
                    Backend::Local => Ok(Self::parse_local(matches)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: regex::Captures) -> Self {
        let bucket = matches
            .name("bucket")
            .expect("bucket should always be available")
            .as_str()
            .to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        BackendConfig::S3(S3Config { region, bucket })
    }

    fn parse_local(matches: regex::Captures) -> Self {
        let path = matches
            .name("path")
            .expect("path regex must contain a path group")
            .as_str();

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path })
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL.
    ///
    /// Credentials apply only to the S3 backend; the local backend ignores
    /// them.
    pub fn for_url(
        url: &str,
        credentials: Option<&AwsCredentials>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, credentials),
            BackendConfig::Local(config) => Self::construct_local(config),
        }
    }

    /// List keys under a string prefix, in the order the backend returns
    /// them.
    ///
    /// Access-log keys embed the date in the object name rather than in path
    /// segments, and object_store prefixes match whole segments only, so the
    /// final name component is filtered here after a segment-aligned listing.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let (dir, _) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let list_path = (!dir.is_empty()).then(|| Path::from(dir));

        let result: Result<Vec<String>, StorageError> = async {
            let mut stream = self.object_store.list(list_path.as_ref());
            let mut keys = Vec::new();
            while let Some(meta) = stream.next().await {
                let meta = meta.context(ObjectStoreSnafu)?;
                let key = meta.location.to_string();
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
            Ok(keys)
        }
        .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from_result(&result),
        });
        result
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&path).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_result(&result),
        });
        tracing::trace!(path = %path, elapsed = ?start.elapsed(), "get complete");

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to a path, replacing any existing object.
    pub async fn put(&self, path: impl Into<Path>, bytes: Bytes) -> Result<(), StorageError> {
        let path = path.into();
        let result = self
            .object_store
            .put(&path, PutPayload::from(bytes))
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_result(&result),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete an object. Deleting a missing object is not an error.
    pub async fn delete(&self, path: impl Into<Path>) -> Result<(), StorageError> {
        let path = path.into();
        let result = self.object_store.delete(&path).await;

        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::from_result(&result),
        });

        match result {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}
