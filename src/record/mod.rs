//! Parsed access-log records.
//!
//! Every input line becomes exactly one [`ParsedLine`]: either a fully
//! decoded [`LogEntry`] or an error row carrying the raw line for audit.
//! There is no partially decoded middle ground.

pub mod parser;
pub mod schema;

pub use parser::parse_line;
pub use schema::{build_batch, output_schema};

use chrono::NaiveDateTime;

/// A fully decoded S3 server access-log record.
///
/// Optional fields were the sentinel dash in the source line. `request_time`
/// is not optional: a matched line whose timestamp fails to parse is rejected
/// as a whole, so every entry is orderable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub bucket_owner: Option<String>,
    pub s3_bucket: Option<String>,
    pub request_time: NaiveDateTime,
    pub remote_ip: Option<String>,
    pub requester: Option<String>,
    pub request_id: Option<String>,
    pub operation: Option<String>,
    pub key: Option<String>,
    /// Verbatim request line, quotes included. Kept even when the log wrote
    /// a bare dash; it is a log field, not an absent value.
    pub request: String,
    pub http_status: Option<i32>,
    pub error_code: Option<String>,
    pub bytes_sent: Option<i64>,
    pub object_size: Option<i64>,
    pub total_time: Option<i64>,
    pub turn_around_time: Option<i64>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub version_id: Option<String>,
}

/// The result of parsing one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// The line matched the grammar and every field decoded.
    Entry(Box<LogEntry>),
    /// The line did not match, or a field failed to decode. The raw text is
    /// preserved verbatim so data loss stays observable downstream.
    Error { raw: String },
}

impl ParsedLine {
    /// Sort key for within-file ordering. Error rows have no timestamp and
    /// sort before every entry (`None < Some`).
    pub fn request_time(&self) -> Option<NaiveDateTime> {
        match self {
            ParsedLine::Entry(entry) => Some(entry.request_time),
            ParsedLine::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ParsedLine::Error { .. })
    }
}
