//! Parsers turning raw restic output into normalized records.
//!
//! Each restic output shape gets its own schema struct. Optional fields
//! that are missing default to zero or `None` instead of failing the cycle.

use crate::error::{ExporterError, Result};
use crate::model::{LegacyStats, LockList, ModernStats, RepositoryStats, Snapshot};
use crate::version::ToolVersion;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Numeric timestamps at or above this are taken as milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

#[derive(Debug, Deserialize)]
struct SnapshotJson {
    time: Value,
    hostname: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    paths: Option<Vec<String>>,
    #[serde(default)]
    id: String,
    #[serde(default)]
    short_id: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    program_version: Option<String>,
    #[serde(default)]
    summary: Option<SummaryJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryJson {
    backup_start: Option<Value>,
    backup_end: Option<Value>,
    files_new: u64,
    files_changed: u64,
    files_unmodified: u64,
    dirs_new: u64,
    dirs_changed: u64,
    dirs_unmodified: u64,
    data_added: u64,
    total_bytes_processed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotStatsJson {
    total_size: u64,
    #[serde(default)]
    total_file_count: u64,
}

#[derive(Debug, Deserialize)]
struct RawDataStatsJson {
    total_size: u64,
    #[serde(default)]
    total_uncompressed_size: Option<u64>,
    #[serde(default)]
    total_blob_count: u64,
    #[serde(default)]
    snapshots_count: u64,
}

#[derive(Debug, Deserialize)]
struct VersionJson {
    version: String,
}

/// Parse `restic snapshots --json`.
///
/// The document must be a JSON array. Individual records that are
/// malformed (missing hostname, unreadable time, ...) are skipped with a
/// warning instead of failing the whole list.
pub fn parse_snapshots(raw: &[u8]) -> Result<Vec<Snapshot>> {
    let records: Vec<Value> =
        serde_json::from_slice(raw).map_err(|e| ExporterError::parse("snapshots", e, raw))?;

    debug!("Parsing {} snapshot records", records.len());

    let mut snapshots = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match snapshot_from_value(record) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(reason) => warn!("Skipping malformed snapshot record #{}: {}", index, reason),
        }
    }
    Ok(snapshots)
}

fn snapshot_from_value(record: Value) -> std::result::Result<Snapshot, String> {
    let json: SnapshotJson = serde_json::from_value(record).map_err(|e| e.to_string())?;

    let timestamp = parse_timestamp(&json.time)
        .ok_or_else(|| format!("unreadable time {} in snapshot {}", json.time, json.id))?;

    let program_version = json.program_version.unwrap_or_default();
    let short_id = json
        .short_id
        .unwrap_or_else(|| json.id.chars().take(8).collect());

    Ok(Snapshot {
        client_version: ToolVersion::parse(&program_version),
        program_version,
        id: json.id,
        short_id,
        timestamp: timestamp.timestamp() as f64,
        hostname: json.hostname,
        username: json.username.unwrap_or_default(),
        tags: json.tags.unwrap_or_default(),
        paths: json.paths.unwrap_or_default(),
        summary: json.summary.map(modern_stats_from_summary),
    })
}

fn modern_stats_from_summary(summary: SummaryJson) -> ModernStats {
    let start = summary.backup_start.as_ref().and_then(parse_timestamp);
    let end = summary.backup_end.as_ref().and_then(parse_timestamp);
    let duration_seconds = match (start, end) {
        (Some(start), Some(end)) => (end - start)
            .num_nanoseconds()
            .map(|ns| ns as f64 / 1e9)
            .filter(|d| *d >= 0.0),
        _ => None,
    };

    ModernStats {
        files_new: summary.files_new,
        files_changed: summary.files_changed,
        files_unmodified: summary.files_unmodified,
        dirs_new: summary.dirs_new,
        dirs_changed: summary.dirs_changed,
        dirs_unmodified: summary.dirs_unmodified,
        data_added: summary.data_added,
        size_total: summary.total_bytes_processed,
        duration_seconds,
    }
}

/// Normalize a restic time value to UTC.
///
/// Accepts RFC 3339 with an offset or `Z` and any number of fractional
/// digits, a naive date-time (taken as UTC), or a number of Unix seconds
/// (milliseconds when large enough).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_time_str(text),
        Value::Number(number) => {
            let raw = number.as_f64()?;
            let seconds = if raw.abs() >= MILLIS_THRESHOLD {
                raw / 1000.0
            } else {
                raw
            };
            let whole = seconds.trunc();
            let nanos = ((seconds - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        }
        _ => None,
    }
}

fn parse_time_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse `restic stats --json <snapshot id>` (restore-size mode).
pub fn parse_snapshot_stats(raw: &[u8]) -> Result<LegacyStats> {
    let json: SnapshotStatsJson =
        serde_json::from_slice(raw).map_err(|e| ExporterError::parse("stats", e, raw))?;
    Ok(LegacyStats {
        files_total: json.total_file_count,
        size_total: json.total_size,
    })
}

/// Parse `restic stats --json --mode raw-data`.
///
/// The tool's own `compression_ratio` is ignored; it is derived from the
/// sizes instead.
pub fn parse_repository_stats(raw: &[u8]) -> Result<RepositoryStats> {
    let json: RawDataStatsJson =
        serde_json::from_slice(raw).map_err(|e| ExporterError::parse("stats", e, raw))?;
    Ok(RepositoryStats {
        total_size: json.total_size,
        total_uncompressed_size: json.total_uncompressed_size,
        total_blob_count: json.total_blob_count,
        snapshots_count: json.snapshots_count,
    })
}

/// Parse `restic list locks`: one lowercase hex id per line.
pub fn parse_locks(raw: &[u8]) -> LockList {
    let text = String::from_utf8_lossy(raw);
    let count = text
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && line
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
        .count();
    LockList {
        count: count as u64,
    }
}

/// Parse `restic version` output, plain text or JSON. Never fails.
pub fn parse_tool_version(raw: &[u8]) -> ToolVersion {
    if let Ok(json) = serde_json::from_slice::<VersionJson>(raw) {
        return ToolVersion::parse(&json.version);
    }
    let text = String::from_utf8_lossy(raw);
    text.lines()
        .map(ToolVersion::parse)
        .find(|v| *v != ToolVersion::Unknown)
        .unwrap_or(ToolVersion::Unknown)
}
