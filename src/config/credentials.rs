//! AWS credentials file loading.
//!
//! The credentials file is a JSON object with `accessKeyId` and
//! `secretAccessKey` fields. It is read once per run and shared by every
//! partition.

use serde::Deserialize;
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ConfigError, CredentialsParseSnafu, CredentialsReadSnafu};

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for AwsCredentials {
    // Keep the secret out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl AwsCredentials {
    /// Load credentials from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(CredentialsReadSnafu {
            path: path.display().to_string(),
        })?;
        serde_json::from_str(&content).context(CredentialsParseSnafu {
            path: path.display().to_string(),
        })
    }
}
