//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline and
//! emits the corresponding Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when lines are parsed into entry rows.
pub struct RecordsParsed {
    pub count: u64,
}

impl InternalEvent for RecordsParsed {
    fn emit(self) {
        trace!(count = self.count, "Records parsed");
        counter!("drift_records_parsed_total").increment(self.count);
    }
}

/// Event emitted when lines fail to decode and are kept as error rows.
pub struct ErrorLines {
    pub count: u64,
}

impl InternalEvent for ErrorLines {
    fn emit(self) {
        trace!(count = self.count, "Error lines retained");
        counter!("drift_error_lines_total").increment(self.count);
    }
}

/// Event emitted when raw bytes are fetched from source storage.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("drift_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when output bytes are uploaded.
pub struct BytesWritten {
    pub bytes: u64,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes written");
        counter!("drift_bytes_written_total").increment(self.bytes);
    }
}

/// Event emitted when a source object fetch completes.
pub struct ObjectFetchCompleted {
    pub duration: Duration,
}

impl InternalEvent for ObjectFetchCompleted {
    fn emit(self) {
        histogram!("drift_object_fetch_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when one output file is encoded.
pub struct ParquetEncodeCompleted {
    pub duration: Duration,
}

impl InternalEvent for ParquetEncodeCompleted {
    fn emit(self) {
        histogram!("drift_parquet_encode_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Outcome of one partition's compaction.
#[derive(Debug, Clone, Copy)]
pub enum PartitionStatus {
    Success,
    Failed,
}

impl PartitionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            PartitionStatus::Success => "success",
            PartitionStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a partition finishes compaction.
pub struct PartitionCompacted {
    pub status: PartitionStatus,
}

impl InternalEvent for PartitionCompacted {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Partition compacted");
        counter!("drift_partitions_compacted_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Storage operation kind, used to label request metrics.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    List,
    Get,
    Put,
    Delete,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::List => "list",
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Success or failure of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted per storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        counter!(
            "drift_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}
