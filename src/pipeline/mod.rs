//! Main compaction run.
//!
//! Connects the planner, lister, and compaction job into a run over a date
//! range. Partitions are compacted strictly one at a time; all concurrency
//! lives inside [`CompactionJob`], where source fetches fan out. A failed
//! partition aborts the run immediately so the exit status never hides a
//! half-compacted range.

mod compact;
mod signal;

use snafu::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{ListSourcesSnafu, RunError, RunStorageSnafu};
use crate::metrics::events::{PartitionCompacted, PartitionStatus};
use crate::partition::{PartitionPlanner, plan_dates};
use crate::storage::{StorageProvider, StorageProviderRef, list_all_keys};

pub use compact::{CompactionJob, PartitionOutcome};
pub use signal::shutdown_signal;

/// Statistics about the compaction run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub partitions_compacted: usize,
    pub objects_fetched: usize,
    pub records_parsed: usize,
    pub error_records: usize,
    pub files_written: usize,
    pub bytes_written: usize,
    /// Set when a shutdown signal stopped the run before the date range was
    /// finished. The partitions counted above are still fully compacted.
    pub interrupted: bool,
}

impl RunStats {
    fn absorb(&mut self, outcome: &PartitionOutcome) {
        self.partitions_compacted += 1;
        self.objects_fetched += outcome.objects_fetched;
        self.records_parsed += outcome.rows - outcome.error_rows;
        self.error_records += outcome.error_rows;
        self.files_written += outcome.files_written;
        self.bytes_written += outcome.bytes_written;
    }
}

/// Drives compaction over every partition in the configured date range.
pub struct Orchestrator {
    config: Config,
    source: StorageProviderRef,
    destination: StorageProviderRef,
    planner: PartitionPlanner,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Storage providers are injected so runs can target any backend the
    /// providers support.
    pub fn new(
        config: Config,
        source: StorageProviderRef,
        destination: StorageProviderRef,
        shutdown: CancellationToken,
    ) -> Self {
        let planner = PartitionPlanner::new(
            &config.source_bucket,
            &config.destination_prefix,
            config.num_output_files,
        );
        Self {
            config,
            source,
            destination,
            planner,
            shutdown,
        }
    }

    /// Compact every partition in `[min_date, max_date)`, oldest first.
    ///
    /// The first partition failure ends the run with an error naming the
    /// date; partitions already compacted stay compacted. A shutdown signal
    /// stops the run cleanly at the next partition boundary and marks the
    /// returned stats as interrupted.
    pub async fn run(&self) -> Result<RunStats, RunError> {
        let dates = plan_dates(self.config.min_date, self.config.max_date);
        info!(
            partitions = dates.len(),
            min_date = %self.config.min_date,
            max_date = %self.config.max_date,
            "Starting compaction run"
        );

        let job = CompactionJob::new(
            self.source.clone(),
            self.destination.clone(),
            self.config.compression,
            self.config.max_concurrent_fetches,
            self.shutdown.clone(),
        );

        // One listing covers the whole date range; per-day prefixes are not
        // path segments, so pushing them to the backend is not possible and
        // listing per day would re-scan the bucket once per partition.
        let run_prefix = self.planner.run_prefix();
        let all_keys = list_all_keys(self.source.as_ref(), &run_prefix)
            .await
            .context(ListSourcesSnafu { prefix: run_prefix })?;
        info!(objects = all_keys.len(), "Listed source objects");

        let mut stats = RunStats::default();
        for date in dates {
            if self.shutdown.is_cancelled() {
                warn!(date = %date, "Shutdown requested, stopping before partition");
                stats.interrupted = true;
                break;
            }

            let sources = self.planner.sources_for(date, &all_keys);
            info!(date = %date, objects = sources.len(), "Compacting partition");

            let partition = self.planner.partition(date, sources);
            match job.run(&partition).await {
                Ok(outcome) => {
                    emit!(PartitionCompacted {
                        status: PartitionStatus::Success
                    });
                    stats.absorb(&outcome);
                }
                Err(crate::error::CompactError::Cancelled) => {
                    warn!(date = %date, "Shutdown requested, partition left for a rerun");
                    stats.interrupted = true;
                    break;
                }
                Err(source) => {
                    emit!(PartitionCompacted {
                        status: PartitionStatus::Failed
                    });
                    return Err(RunError::Partition { date, source });
                }
            }
        }

        Ok(stats)
    }
}

/// Run compaction with the given configuration.
///
/// Builds the storage providers, wires up signal-driven shutdown, and runs
/// the orchestrator to completion.
pub async fn run_compaction(config: Config) -> Result<RunStats, RunError> {
    let credentials = config.credentials.clone();
    let source = Arc::new(
        StorageProvider::for_url(&config.source_store_url(), credentials.as_ref())
            .context(RunStorageSnafu)?,
    );
    let destination = Arc::new(
        StorageProvider::for_url(&config.destination_store_url(), credentials.as_ref())
            .context(RunStorageSnafu)?,
    );

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_for_signal.cancel();
    });

    Orchestrator::new(config, source, destination, shutdown)
        .run()
        .await
}
