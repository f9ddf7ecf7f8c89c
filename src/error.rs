//! Error types for drift using snafu.
//!
//! One enum per concern, with context selectors exported for use at the
//! call sites.

use chrono::NaiveDate;
use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// Local filesystem configuration error.
    #[snafu(display("Local storage configuration error"))]
    LocalConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source access log bucket is empty.
    #[snafu(display("Source access log bucket cannot be empty"))]
    EmptySourceAccessLogBucket,

    /// Source bucket is empty.
    #[snafu(display("Source bucket cannot be empty"))]
    EmptySourceBucket,

    /// Destination bucket is empty.
    #[snafu(display("Destination bucket cannot be empty"))]
    EmptyDestinationBucket,

    /// Output file count must be at least one.
    #[snafu(display("Number of output files must be at least 1"))]
    ZeroOutputFiles,

    /// A date flag did not parse as YYYY-MM-DD.
    #[snafu(display("Invalid date '{value}' (expected YYYY-MM-DD)"))]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },

    /// min date must precede max date.
    #[snafu(display("Date range is empty: min {min} is not before max {max}"))]
    EmptyDateRange { min: NaiveDate, max: NaiveDate },

    /// Failed to read the credentials file.
    #[snafu(display("Failed to read credentials file {path}"))]
    CredentialsRead {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse the credentials file.
    #[snafu(display("Failed to parse credentials file {path}"))]
    CredentialsParse {
        path: String,
        source: serde_json::Error,
    },
}

// ============ Sink Errors ============

/// Errors that can occur while encoding Parquet output.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to create the Parquet writer.
    #[snafu(display("Failed to create Parquet writer"))]
    WriterCreate {
        source: parquet::errors::ParquetError,
    },

    /// Parquet write error.
    #[snafu(display("Parquet write error"))]
    Write {
        source: parquet::errors::ParquetError,
    },

    /// Failed to build a RecordBatch from parsed rows.
    #[snafu(display("Failed to build record batch"))]
    Batch { source: arrow::error::ArrowError },
}

// ============ Compaction Errors (per partition) ============

/// Errors that abort a single partition's compaction.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompactError {
    /// Fetching a source object failed.
    #[snafu(display("Failed to fetch source object {key}"))]
    FetchObject { key: String, source: StorageError },

    /// Encoding an output bucket to Parquet failed.
    #[snafu(display("Failed to encode output file {index}"))]
    EncodeOutput { index: usize, source: SinkError },

    /// Clearing prior contents of the destination failed.
    #[snafu(display("Failed to clear destination {destination}"))]
    ClearDestination {
        destination: String,
        source: StorageError,
    },

    /// Uploading an output file failed.
    #[snafu(display("Failed to upload output file {path}"))]
    UploadOutput { path: String, source: StorageError },

    /// A parse worker task panicked or was aborted.
    #[snafu(display("Parse task failed"))]
    ParseTask { source: tokio::task::JoinError },

    /// The run was cancelled while this partition was in flight.
    #[snafu(display("Compaction cancelled"))]
    Cancelled,
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Run Error (top-level) ============

/// Top-level errors that abort the whole run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Storage provider construction failed.
    #[snafu(display("Storage error"))]
    RunStorage { source: StorageError },

    /// The run-wide source listing failed.
    #[snafu(display("Failed to list source objects under {prefix}"))]
    ListSources { prefix: String, source: StorageError },

    /// A partition failed to compact. Remaining partitions are not attempted;
    /// the date identifies which partition to rerun.
    #[snafu(display("Compaction failed for partition {date}"))]
    Partition { date: NaiveDate, source: CompactError },

    /// The run stopped early on a shutdown signal.
    #[snafu(display("Run interrupted by shutdown before completing the date range"))]
    Interrupted,

    /// Address parsing error for the metrics endpoint.
    #[snafu(display("Failed to parse metrics address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}
