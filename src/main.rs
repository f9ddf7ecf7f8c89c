//! drift: A standalone tool for compacting S3 server access logs.
//!
//! Amazon-style server access logging scatters each day's requests across
//! thousands of small text objects. This tool rewrites every daily partition
//! in a date range as a fixed number of sorted, Snappy-compressed Parquet
//! files under a Hive-style `dt=` layout.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use drift::config::{AwsCredentials, Config, MetricsConfig};
use drift::error::{AddressParseSnafu, ConfigSnafu, InterruptedSnafu, MetricsSnafu, RunError};
use drift::partition::{PartitionPlanner, plan_dates};
use drift::pipeline::run_compaction;
use drift::sink::ParquetCompression;

/// S3 server access log to Parquet compaction tool.
#[derive(Parser, Debug)]
#[command(name = "drift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First partition date to compact (YYYY-MM-DD, inclusive).
    #[arg(long)]
    min_date: String,

    /// Last partition date to compact (YYYY-MM-DD, exclusive).
    #[arg(long)]
    max_date: String,

    /// Bucket or storage URL holding the raw access-log objects.
    #[arg(long)]
    source_access_log_bucket: String,

    /// Monitored bucket whose name prefixes every log object key.
    #[arg(long)]
    source_bucket: String,

    /// Bucket or storage URL receiving the compacted files.
    #[arg(long)]
    destination_log_bucket: String,

    /// Path prefix inside the destination bucket.
    #[arg(long, default_value = "teams/metrics-data/s3_server_side_access_logs")]
    destination_log_prefix: String,

    /// Output files per partition.
    #[arg(long, default_value_t = drift::config::default_num_output_files())]
    num_output_files: usize,

    /// Bound on concurrent source-object fetches within one partition.
    #[arg(long, default_value_t = drift::config::default_max_concurrent_fetches())]
    max_concurrent_fetches: usize,

    /// Path to a JSON credentials file with accessKeyId/secretAccessKey.
    #[arg(long)]
    aws_config: Option<PathBuf>,

    /// Address for the Prometheus metrics endpoint; omit to disable.
    #[arg(long)]
    metrics_address: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - plan partitions without reading or writing any object.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), RunError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("drift starting");

    let config = build_config(&args)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        drift::metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - planning partitions only");
        let planner = PartitionPlanner::new(
            &config.source_bucket,
            &config.destination_prefix,
            config.num_output_files,
        );
        for date in plan_dates(config.min_date, config.max_date) {
            info!(
                "  {} : {} -> {}",
                date,
                planner.source_prefix(date),
                planner.destination(date)
            );
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = run_compaction(config).await?;

    info!("  Partitions compacted: {}", stats.partitions_compacted);
    info!("  Objects fetched: {}", stats.objects_fetched);
    info!("  Records parsed: {}", stats.records_parsed);
    info!("  Error records retained: {}", stats.error_records);
    info!("  Parquet files written: {}", stats.files_written);
    info!("  Bytes written: {}", stats.bytes_written);

    // A shutdown-interrupted run is not a successful one; the remaining
    // partitions were never attempted.
    if stats.interrupted {
        warn!("Run stopped by shutdown signal before completing the date range");
        return InterruptedSnafu.fail();
    }

    info!("Compaction completed successfully");
    Ok(())
}

/// Build configuration from arguments.
fn build_config(args: &Args) -> Result<Config, RunError> {
    let min_date = Config::parse_date(&args.min_date).context(ConfigSnafu)?;
    let max_date = Config::parse_date(&args.max_date).context(ConfigSnafu)?;

    let credentials = match &args.aws_config {
        Some(path) => Some(AwsCredentials::from_file(path).context(ConfigSnafu)?),
        None => None,
    };

    let config = Config {
        min_date,
        max_date,
        source_access_log_bucket: args.source_access_log_bucket.clone(),
        source_bucket: args.source_bucket.clone(),
        destination_bucket: args.destination_log_bucket.clone(),
        destination_prefix: args.destination_log_prefix.clone(),
        num_output_files: args.num_output_files,
        max_concurrent_fetches: args.max_concurrent_fetches,
        compression: ParquetCompression::Snappy,
        credentials,
        metrics: MetricsConfig {
            enabled: args.metrics_address.is_some(),
            address: args
                .metrics_address
                .clone()
                .unwrap_or_else(|| "0.0.0.0:9090".to_string()),
        },
    };
    config.validate().context(ConfigSnafu)?;

    Ok(config)
}
