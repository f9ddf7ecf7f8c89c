//! Calendar-day partition planning.
//!
//! One partition is one day's worth of source access-log objects plus the
//! destination they compact into. The date is taken from the object naming
//! convention, not from object contents.

use chrono::{Days, NaiveDate};

/// The unit of compaction: one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub date: NaiveDate,
    /// Source object keys, in listing order.
    pub sources: Vec<String>,
    /// Destination path prefix, relative to the destination bucket.
    pub destination: String,
    /// Number of output files to produce (exactly, even for zero records).
    pub output_files: usize,
}

/// Computes partition keys, source prefixes and destinations for a run.
#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    source_bucket: String,
    destination_prefix: String,
    output_files: usize,
}

impl PartitionPlanner {
    pub fn new(source_bucket: &str, destination_prefix: &str, output_files: usize) -> Self {
        Self {
            source_bucket: source_bucket.to_string(),
            destination_prefix: destination_prefix.trim_matches('/').to_string(),
            // A partition always materializes at least one file.
            output_files: output_files.max(1),
        }
    }

    /// Listing prefix covering every date's source objects. The source bucket
    /// is listed once per run under this prefix and the keys are bucketed by
    /// date afterwards.
    pub fn run_prefix(&self) -> String {
        format!("{}-", self.source_bucket)
    }

    /// Key prefix for one day's source objects. Access logs are delivered
    /// as `{source_bucket}-{date}-{suffix}`; any suffix is accepted.
    pub fn source_prefix(&self, date: NaiveDate) -> String {
        format!("{}-{}-", self.source_bucket, date.format("%Y-%m-%d"))
    }

    /// Select the keys belonging to one date from a run-wide listing.
    pub fn sources_for(&self, date: NaiveDate, keys: &[String]) -> Vec<String> {
        let prefix = self.source_prefix(date);
        keys.iter()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Destination path for one day's compacted output, relative to the
    /// destination bucket. Deterministic, so reprocessing overwrites in place.
    pub fn destination(&self, date: NaiveDate) -> String {
        if self.destination_prefix.is_empty() {
            format!("{}/dt={}", self.source_bucket, date.format("%Y-%m-%d"))
        } else {
            format!(
                "{}/{}/dt={}",
                self.destination_prefix,
                self.source_bucket,
                date.format("%Y-%m-%d")
            )
        }
    }

    /// Assemble the partition for a date from its listed source keys.
    pub fn partition(&self, date: NaiveDate, sources: Vec<String>) -> Partition {
        Partition {
            date,
            sources,
            destination: self.destination(date),
            output_files: self.output_files,
        }
    }
}

/// Every calendar day in `[min, max)`, ascending.
pub fn plan_dates(min: NaiveDate, max: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut date = min;
    while date < max {
        dates.push(date);
        date = date
            .checked_add_days(Days::new(1))
            .expect("date range stays within chrono bounds");
    }
    dates
}
