//! drift: A library for compacting S3 server access logs into Parquet.
//!
//! This library provides components for listing raw access-log objects,
//! parsing the space-delimited access-log format, and rewriting each daily
//! partition as a fixed number of sorted, compressed Parquet files.
//!
//! # Example
//!
//! ```ignore
//! use drift::{Config, run_compaction, error::RunError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RunError> {
//!     let config = build_config()?;
//!     let stats = run_compaction(config).await?;
//!     println!("Compacted {} partitions", stats.partitions_compacted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use pipeline::{CompactionJob, Orchestrator, RunStats, run_compaction};
pub use storage::{StorageProvider, StorageProviderRef};
