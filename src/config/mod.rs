//! Run configuration.
//!
//! The configuration is an explicit value assembled from command-line
//! arguments and passed into the pipeline; there is no process-wide state.

mod credentials;

pub use credentials::AwsCredentials;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{
    ConfigError, EmptyDateRangeSnafu, EmptyDestinationBucketSnafu,
    EmptySourceAccessLogBucketSnafu, EmptySourceBucketSnafu, InvalidDateSnafu,
    ZeroOutputFilesSnafu,
};
use crate::sink::ParquetCompression;

/// Main configuration for a compaction run.
#[derive(Debug, Clone)]
pub struct Config {
    /// First partition date, inclusive.
    pub min_date: NaiveDate,
    /// Last partition date, exclusive.
    pub max_date: NaiveDate,
    /// Bucket (or storage URL) holding the raw access-log objects.
    pub source_access_log_bucket: String,
    /// The monitored bucket whose name prefixes every log object key.
    pub source_bucket: String,
    /// Bucket (or storage URL) receiving the compacted files.
    pub destination_bucket: String,
    /// Path prefix inside the destination bucket.
    pub destination_prefix: String,
    /// Output files per partition.
    pub num_output_files: usize,
    /// Bound on concurrent source-object fetches within one partition.
    pub max_concurrent_fetches: usize,
    /// Output compression codec.
    pub compression: ParquetCompression,
    /// Credentials for the S3 backends; `None` falls back to the ambient
    /// environment (or is ignored by the local backend).
    pub credentials: Option<AwsCredentials>,
    pub metrics: MetricsConfig,
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is enabled (default: false for a batch
    /// job; pass --metrics-address to enable).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server.
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

pub fn default_num_output_files() -> usize {
    10
}

pub fn default_max_concurrent_fetches() -> usize {
    16
}

impl Config {
    /// Parse a YYYY-MM-DD date flag.
    pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").context(InvalidDateSnafu {
            value: value.to_string(),
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.source_access_log_bucket.is_empty(),
            EmptySourceAccessLogBucketSnafu
        );
        ensure!(!self.source_bucket.is_empty(), EmptySourceBucketSnafu);
        ensure!(
            !self.destination_bucket.is_empty(),
            EmptyDestinationBucketSnafu
        );
        ensure!(self.num_output_files >= 1, ZeroOutputFilesSnafu);
        ensure!(
            self.min_date < self.max_date,
            EmptyDateRangeSnafu {
                min: self.min_date,
                max: self.max_date,
            }
        );
        Ok(())
    }

    /// Storage URL for the access-log bucket. A bare bucket name is treated
    /// as S3; URLs and absolute paths pass through for the other backends.
    pub fn source_store_url(&self) -> String {
        store_url(&self.source_access_log_bucket)
    }

    /// Storage URL for the destination bucket.
    pub fn destination_store_url(&self) -> String {
        store_url(&self.destination_bucket)
    }
}

fn store_url(bucket: &str) -> String {
    if bucket.contains("://") || bucket.starts_with('/') {
        bucket.to_string()
    } else {
        format!("s3://{bucket}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            min_date: Config::parse_date("2019-02-06").unwrap(),
            max_date: Config::parse_date("2019-02-08").unwrap(),
            source_access_log_bucket: "access-logs".to_string(),
            source_bucket: "mybucket".to_string(),
            destination_bucket: "compacted".to_string(),
            destination_prefix: "teams/metrics-data/s3_server_side_access_logs".to_string(),
            num_output_files: default_num_output_files(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            compression: ParquetCompression::Snappy,
            credentials: None,
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_date_parsing() {
        let date = Config::parse_date("2019-02-06").unwrap();
        assert_eq!(date.to_string(), "2019-02-06");
        assert!(Config::parse_date("02/06/2019").is_err());
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let mut config = base_config();
        config.source_bucket = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptySourceBucket)
        ));
    }

    #[test]
    fn test_zero_output_files_rejected() {
        let mut config = base_config();
        config.num_output_files = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroOutputFiles)
        ));
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let mut config = base_config();
        config.max_date = config.min_date;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDateRange { .. })
        ));
    }

    #[test]
    fn test_store_url_forms() {
        let mut config = base_config();
        assert_eq!(config.source_store_url(), "s3://access-logs");

        config.source_access_log_bucket = "/tmp/logs".to_string();
        assert_eq!(config.source_store_url(), "/tmp/logs");

        config.destination_bucket = "s3a://dest".to_string();
        assert_eq!(config.destination_store_url(), "s3a://dest");
    }
}
