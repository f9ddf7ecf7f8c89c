//! Output schema and RecordBatch construction.
//!
//! The compacted form is a 19-column columnar layout; every column is
//! nullable because error rows populate only `error_line` and entry rows
//! never populate it.

use arrow::array::{
    ArrayRef, Int32Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use snafu::prelude::*;
use std::sync::{Arc, OnceLock};

use crate::error::{BatchSnafu, SinkError};
use crate::record::ParsedLine;

/// The compacted output schema.
///
/// Timestamps are millisecond precision, matching what the downstream query
/// layers expect from the historical output of this job.
pub fn output_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new("bucket_owner", DataType::Utf8, true),
                Field::new("s3_bucket", DataType::Utf8, true),
                Field::new(
                    "request_time",
                    DataType::Timestamp(TimeUnit::Millisecond, None),
                    true,
                ),
                Field::new("remote_ip", DataType::Utf8, true),
                Field::new("requester", DataType::Utf8, true),
                Field::new("request_id", DataType::Utf8, true),
                Field::new("operation", DataType::Utf8, true),
                Field::new("key", DataType::Utf8, true),
                Field::new("request", DataType::Utf8, true),
                Field::new("http_status", DataType::Int32, true),
                Field::new("error_code", DataType::Utf8, true),
                Field::new("bytes_sent", DataType::Int64, true),
                Field::new("object_size", DataType::Int64, true),
                Field::new("total_time", DataType::Int64, true),
                Field::new("turn_around_time", DataType::Int64, true),
                Field::new("referrer", DataType::Utf8, true),
                Field::new("user_agent", DataType::Utf8, true),
                Field::new("version_id", DataType::Utf8, true),
                Field::new("error_line", DataType::Utf8, true),
            ]))
        })
        .clone()
}

/// Build one RecordBatch from parsed rows.
///
/// Entry rows fill the typed columns and leave `error_line` null; error rows
/// do the reverse. Row order is preserved.
pub fn build_batch(rows: &[ParsedLine]) -> Result<RecordBatch, SinkError> {
    let n = rows.len();
    let mut bucket_owner = StringBuilder::with_capacity(n, 0);
    let mut s3_bucket = StringBuilder::with_capacity(n, 0);
    let mut request_time = TimestampMillisecondBuilder::with_capacity(n);
    let mut remote_ip = StringBuilder::with_capacity(n, 0);
    let mut requester = StringBuilder::with_capacity(n, 0);
    let mut request_id = StringBuilder::with_capacity(n, 0);
    let mut operation = StringBuilder::with_capacity(n, 0);
    let mut key = StringBuilder::with_capacity(n, 0);
    let mut request = StringBuilder::with_capacity(n, 0);
    let mut http_status = Int32Builder::with_capacity(n);
    let mut error_code = StringBuilder::with_capacity(n, 0);
    let mut bytes_sent = Int64Builder::with_capacity(n);
    let mut object_size = Int64Builder::with_capacity(n);
    let mut total_time = Int64Builder::with_capacity(n);
    let mut turn_around_time = Int64Builder::with_capacity(n);
    let mut referrer = StringBuilder::with_capacity(n, 0);
    let mut user_agent = StringBuilder::with_capacity(n, 0);
    let mut version_id = StringBuilder::with_capacity(n, 0);
    let mut error_line = StringBuilder::with_capacity(n, 0);

    for row in rows {
        match row {
            ParsedLine::Entry(entry) => {
                bucket_owner.append_option(entry.bucket_owner.as_deref());
                s3_bucket.append_option(entry.s3_bucket.as_deref());
                request_time.append_value(entry.request_time.and_utc().timestamp_millis());
                remote_ip.append_option(entry.remote_ip.as_deref());
                requester.append_option(entry.requester.as_deref());
                request_id.append_option(entry.request_id.as_deref());
                operation.append_option(entry.operation.as_deref());
                key.append_option(entry.key.as_deref());
                request.append_value(&entry.request);
                http_status.append_option(entry.http_status);
                error_code.append_option(entry.error_code.as_deref());
                bytes_sent.append_option(entry.bytes_sent);
                object_size.append_option(entry.object_size);
                total_time.append_option(entry.total_time);
                turn_around_time.append_option(entry.turn_around_time);
                referrer.append_option(entry.referrer.as_deref());
                user_agent.append_option(entry.user_agent.as_deref());
                version_id.append_option(entry.version_id.as_deref());
                error_line.append_null();
            }
            ParsedLine::Error { raw } => {
                bucket_owner.append_null();
                s3_bucket.append_null();
                request_time.append_null();
                remote_ip.append_null();
                requester.append_null();
                request_id.append_null();
                operation.append_null();
                key.append_null();
                request.append_null();
                http_status.append_null();
                error_code.append_null();
                bytes_sent.append_null();
                object_size.append_null();
                total_time.append_null();
                turn_around_time.append_null();
                referrer.append_null();
                user_agent.append_null();
                version_id.append_null();
                error_line.append_value(raw);
            }
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(bucket_owner.finish()),
        Arc::new(s3_bucket.finish()),
        Arc::new(request_time.finish()),
        Arc::new(remote_ip.finish()),
        Arc::new(requester.finish()),
        Arc::new(request_id.finish()),
        Arc::new(operation.finish()),
        Arc::new(key.finish()),
        Arc::new(request.finish()),
        Arc::new(http_status.finish()),
        Arc::new(error_code.finish()),
        Arc::new(bytes_sent.finish()),
        Arc::new(object_size.finish()),
        Arc::new(total_time.finish()),
        Arc::new(turn_around_time.finish()),
        Arc::new(referrer.finish()),
        Arc::new(user_agent.finish()),
        Arc::new(version_id.finish()),
        Arc::new(error_line.finish()),
    ];

    RecordBatch::try_new(output_schema(), columns).context(BatchSnafu)
}
