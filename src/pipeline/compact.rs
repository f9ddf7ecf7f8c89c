//! Per-partition compaction.
//!
//! One job invocation owns one calendar-day partition end to end: fetch all
//! source objects concurrently, parse every non-blank line, redistribute the
//! rows into a fixed number of output buckets, sort each bucket by request
//! time, and replace the partition's destination with the encoded files.
//!
//! Fetches are I/O bound and run as concurrent tokio futures; parsing is CPU
//! bound and runs on the blocking thread pool. The redistribution step is
//! the fan-in point: every fetch task has finished before any bucket is
//! encoded.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use snafu::prelude::*;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emit;
use crate::error::{
    ClearDestinationSnafu, CompactError, EncodeOutputSnafu, FetchObjectSnafu, ParseTaskSnafu,
    UploadOutputSnafu,
};
use crate::metrics::events::{
    BytesRead, BytesWritten, ErrorLines, ObjectFetchCompleted, ParquetEncodeCompleted,
    RecordsParsed,
};
use crate::partition::Partition;
use crate::record::{ParsedLine, parse_line};
use crate::sink::{OutputFile, ParquetCompression, encode_rows};
use crate::storage::StorageProviderRef;

/// What one partition's compaction produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionOutcome {
    pub objects_fetched: usize,
    pub rows: usize,
    pub error_rows: usize,
    pub files_written: usize,
    pub bytes_written: usize,
}

/// Compacts one partition at a time. Holds no per-partition state, so one
/// job value serves the whole run.
pub struct CompactionJob {
    source: StorageProviderRef,
    destination: StorageProviderRef,
    compression: ParquetCompression,
    max_concurrent_fetches: usize,
    shutdown: CancellationToken,
}

impl CompactionJob {
    pub fn new(
        source: StorageProviderRef,
        destination: StorageProviderRef,
        compression: ParquetCompression,
        max_concurrent_fetches: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            destination,
            compression,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            shutdown,
        }
    }

    /// Compact one partition, replacing any prior output at its destination.
    pub async fn run(&self, partition: &Partition) -> Result<PartitionOutcome, CompactError> {
        let rows = self.fetch_and_parse(&partition.sources).await?;

        let row_count = rows.len();
        let error_rows = rows.iter().filter(|r| r.is_error()).count();
        emit!(RecordsParsed {
            count: (row_count - error_rows) as u64
        });
        emit!(ErrorLines {
            count: error_rows as u64
        });
        if error_rows > 0 {
            warn!(
                date = %partition.date,
                error_rows,
                "Retaining undecodable lines as error rows"
            );
        }

        let mut buckets = redistribute(rows, partition.output_files);
        for bucket in &mut buckets {
            // Stable, and None sorts first: error rows lead each file.
            bucket.sort_by_key(|row| row.request_time());
        }

        let files = self.encode_buckets(partition, &buckets)?;
        let bytes_written = self.replace_destination(partition, &files).await?;

        let outcome = PartitionOutcome {
            objects_fetched: partition.sources.len(),
            rows: row_count,
            error_rows,
            files_written: files.len(),
            bytes_written,
        };
        info!(
            date = %partition.date,
            objects = outcome.objects_fetched,
            rows = outcome.rows,
            error_rows = outcome.error_rows,
            files = outcome.files_written,
            "Partition compacted"
        );
        Ok(outcome)
    }

    /// Fetch every source object and parse its lines, with bounded fan-out.
    ///
    /// Completion order is not deterministic; redistribution below is
    /// order-insensitive in aggregate, so this only affects which file a row
    /// lands in, never the row content.
    async fn fetch_and_parse(
        &self,
        sources: &[String],
    ) -> Result<Vec<ParsedLine>, CompactError> {
        let per_object: Vec<Vec<ParsedLine>> = stream::iter(sources.iter().cloned())
            .map(|key| {
                let storage = self.source.clone();
                let shutdown = self.shutdown.clone();
                fetch_one(storage, key, shutdown)
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .try_collect()
            .await?;

        Ok(per_object.into_iter().flatten().collect())
    }

    /// Encode every bucket before anything touches the destination, so an
    /// encode failure leaves prior output untouched.
    fn encode_buckets(
        &self,
        partition: &Partition,
        buckets: &[Vec<ParsedLine>],
    ) -> Result<Vec<OutputFile>, CompactError> {
        let mut files = Vec::with_capacity(buckets.len());
        for (index, bucket) in buckets.iter().enumerate() {
            let start = Instant::now();
            let bytes = encode_rows(bucket, self.compression)
                .context(EncodeOutputSnafu { index })?;
            emit!(ParquetEncodeCompleted {
                duration: start.elapsed()
            });

            files.push(OutputFile {
                path: format!("{}/part-{:05}.parquet", partition.destination, index),
                bytes,
                record_count: bucket.len(),
            });
        }
        Ok(files)
    }

    /// Full-replace write: clear the destination prefix, then upload the
    /// complete file set. On an upload failure the files already written by
    /// this attempt are best-effort deleted so a partial set is not mistaken
    /// for a finished partition.
    async fn replace_destination(
        &self,
        partition: &Partition,
        files: &[OutputFile],
    ) -> Result<usize, CompactError> {
        let prefix = format!("{}/", partition.destination);
        let existing = self
            .destination
            .list_keys(&prefix)
            .await
            .context(ClearDestinationSnafu {
                destination: partition.destination.clone(),
            })?;
        for key in existing {
            debug!(key, "Removing stale destination object");
            self.destination
                .delete(key.as_str())
                .await
                .context(ClearDestinationSnafu {
                    destination: partition.destination.clone(),
                })?;
        }

        let mut written: Vec<String> = Vec::with_capacity(files.len());
        let mut bytes_written = 0;
        for file in files {
            match self
                .destination
                .put(file.path.as_str(), file.bytes.clone())
                .await
            {
                Ok(()) => {
                    emit!(BytesWritten {
                        bytes: file.bytes.len() as u64
                    });
                    bytes_written += file.bytes.len();
                    debug!(
                        path = file.path,
                        records = file.record_count,
                        bytes = file.bytes.len(),
                        "Wrote output file"
                    );
                    written.push(file.path.clone());
                }
                Err(source) => {
                    warn!(
                        path = file.path,
                        "Upload failed, removing this attempt's partial output"
                    );
                    for path in &written {
                        let _ = self.destination.delete(path.as_str()).await;
                    }
                    return Err(source).context(UploadOutputSnafu {
                        path: file.path.clone(),
                    });
                }
            }
        }

        Ok(bytes_written)
    }
}

/// Fetch one object and parse it on the blocking pool.
async fn fetch_one(
    storage: StorageProviderRef,
    key: String,
    shutdown: CancellationToken,
) -> Result<Vec<ParsedLine>, CompactError> {
    let start = Instant::now();
    let bytes = tokio::select! {
        biased;

        _ = shutdown.cancelled() => return Err(CompactError::Cancelled),

        result = storage.get(key.as_str()) => {
            result.context(FetchObjectSnafu { key: key.clone() })?
        }
    };

    emit!(ObjectFetchCompleted {
        duration: start.elapsed()
    });
    emit!(BytesRead {
        bytes: bytes.len() as u64
    });
    debug!(key, bytes = bytes.len(), "Fetched source object");

    tokio::task::spawn_blocking(move || parse_object(&bytes))
        .await
        .context(ParseTaskSnafu)
}

/// Split an object into non-blank lines and parse each one. Nothing is
/// dropped: undecodable lines come back as error rows.
fn parse_object(bytes: &Bytes) -> Vec<ParsedLine> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

/// Round-robin rows into exactly `n` buckets.
///
/// The assignment is deliberately key-insensitive; it balances file sizes,
/// nothing more. Global ordering across the resulting files is not a goal.
fn redistribute(rows: Vec<ParsedLine>, n: usize) -> Vec<Vec<ParsedLine>> {
    let n = n.max(1);
    let mut buckets: Vec<Vec<ParsedLine>> = (0..n)
        .map(|_| Vec::with_capacity(rows.len() / n + 1))
        .collect();

    for (i, row) in rows.into_iter().enumerate() {
        buckets[i % n].push(row);
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: &str) -> ParsedLine {
        let line = format!(
            r#"79a5 mybucket [{ts} +0000] 192.0.2.3 - 3E57 REST.GET.OBJECT file.txt "GET /file.txt HTTP/1.1" 200 - 1024 1024 50 10 "-" "curl/7.1" -"#
        );
        let parsed = parse_line(&line);
        assert!(!parsed.is_error(), "fixture line must parse: {line}");
        parsed
    }

    fn error_row() -> ParsedLine {
        parse_line("nope")
    }

    #[test]
    fn test_redistribute_is_balanced_and_lossless() {
        let rows: Vec<ParsedLine> = (0..10).map(|_| error_row()).collect();
        let buckets = redistribute(rows, 4);

        assert_eq!(buckets.len(), 4);
        let sizes: Vec<usize> = buckets.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(sizes.iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_redistribute_zero_buckets_clamped_to_one() {
        let rows: Vec<ParsedLine> = (0..3).map(|_| error_row()).collect();
        let buckets = redistribute(rows, 0);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].len(), 3);
    }

    #[test]
    fn test_redistribute_empty_still_yields_n_buckets() {
        let buckets = redistribute(Vec::new(), 10);
        assert_eq!(buckets.len(), 10);
        assert!(buckets.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_bucket_sort_orders_by_time_with_errors_first() {
        let mut bucket = vec![
            entry("07/Feb/2019:12:00:00"),
            error_row(),
            entry("06/Feb/2019:00:00:38"),
            entry("06/Feb/2019:23:59:59"),
        ];
        bucket.sort_by_key(|row| row.request_time());

        assert!(bucket[0].is_error());
        let times: Vec<_> = bucket[1..]
            .iter()
            .map(|r| r.request_time().unwrap())
            .collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_parse_object_skips_blank_lines_only() {
        let bytes = Bytes::from_static(b"\n  \nnot a log line\r\n\n");
        let rows = parse_object(&bytes);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_error());
    }
}
