//! Output file encoding.

pub mod parquet;

pub use parquet::{ParquetCompression, encode_rows};

use bytes::Bytes;

/// One fully encoded output file, staged in memory until the whole
/// partition's file set is ready to upload.
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// Destination key, relative to the destination bucket root.
    pub path: String,
    pub bytes: Bytes,
    pub record_count: usize,
}
