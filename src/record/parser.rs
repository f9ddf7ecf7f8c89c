//! Access-log line grammar.
//!
//! The grammar is the 18-token S3 server access-log format documented at
//! <https://docs.aws.amazon.com/AmazonS3/latest/dev/LogFormat.html>. Quoted
//! fields may contain embedded spaces; the sentinel dash (`-` unquoted,
//! `"-"` quoted) marks an absent value.

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

use super::{LogEntry, ParsedLine};

const LINE_PATTERN: &str = concat!(
    r#"(?P<owner>\S+) (?P<bucket>\S+) (?P<time>\[[^\]]*\]) (?P<ip>\S+) "#,
    r#"(?P<requester>\S+) (?P<reqid>\S+) (?P<operation>\S+) (?P<key>\S+) "#,
    r#"(?P<request>"[^"]*"|-) (?P<status>\S+) (?P<error>\S+) (?P<bytes>\S+) "#,
    r#"(?P<size>\S+) (?P<totaltime>\S+) (?P<turnaround>\S+) (?P<referrer>"[^"]*"|-) "#,
    r#"(?P<useragent>"[^"]*"|-) (?P<version>\S)"#,
);

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(LINE_PATTERN).expect("line pattern is valid"))
}

/// Parse one raw line into a [`ParsedLine`].
///
/// Any failure along the way (grammar mismatch, bad integer, unparsable
/// timestamp) yields an error row with the original line; a line never
/// produces a partially populated entry.
pub fn parse_line(line: &str) -> ParsedLine {
    match try_parse(line) {
        Some(entry) => ParsedLine::Entry(Box::new(entry)),
        None => ParsedLine::Error {
            raw: line.to_string(),
        },
    }
}

fn try_parse(line: &str) -> Option<LogEntry> {
    let caps = line_pattern().captures(line)?;
    let request_time = parse_request_time(&caps["time"])?;

    Some(LogEntry {
        bucket_owner: unquoted(&caps["owner"]),
        s3_bucket: unquoted(&caps["bucket"]),
        request_time,
        remote_ip: unquoted(&caps["ip"]),
        requester: unquoted(&caps["requester"]),
        request_id: unquoted(&caps["reqid"]),
        operation: unquoted(&caps["operation"]),
        key: unquoted(&caps["key"]),
        request: caps["request"].to_string(),
        http_status: numeric(&caps["status"])?,
        error_code: unquoted(&caps["error"]),
        bytes_sent: numeric(&caps["bytes"])?,
        object_size: numeric(&caps["size"])?,
        total_time: numeric(&caps["totaltime"])?,
        turn_around_time: numeric(&caps["turnaround"])?,
        referrer: quoted(&caps["referrer"]),
        user_agent: quoted(&caps["useragent"]),
        version_id: unquoted(&caps["version"]),
    })
}

/// Normalize the bracketed time token, e.g. `[06/Feb/2019:00:00:38 +0000]`.
///
/// The text between the opening bracket and the first space is kept and the
/// time-zone token dropped; S3 server access logs always record UTC, so the
/// offset carries no information. The date and time-of-day portions are
/// joined by a colon in the source and split apart before parsing.
pub fn parse_request_time(token: &str) -> Option<NaiveDateTime> {
    let inner = token.strip_prefix('[')?;
    let local = inner.split(' ').next()?;
    let normalized = local.replacen(':', " ", 1);
    NaiveDateTime::parse_from_str(&normalized, "%d/%b/%Y %H:%M:%S").ok()
}

/// Unquoted field: a single dash means absent.
fn unquoted(token: &str) -> Option<String> {
    (token != "-").then(|| token.to_string())
}

/// Quoted field: the literal two-character token `"-"` means absent.
/// Present values are kept verbatim, surrounding quotes included.
fn quoted(token: &str) -> Option<String> {
    (token != "\"-\"").then(|| token.to_string())
}

/// Numeric field: dash means absent; anything else must parse as an integer
/// or the whole line is rejected.
fn numeric<T: std::str::FromStr>(token: &str) -> Option<Option<T>> {
    if token == "-" {
        Some(None)
    } else {
        token.parse().ok().map(Some)
    }
}
