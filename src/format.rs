//! Human-friendly rendering of server timestamps, durations and sizes.
//!
//! Timestamps are compared in UTC and only converted to local time when
//! they are rendered.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use tracing::debug;

/// The server's "never" value
const UNSET_TIME: &str = "0001-01-01T00:00:00Z";

const PRECISE_FORMAT: &str = "%I:%M:%S %p %d/%m/%Y";
const DATE_FORMAT: &str = "%d/%m/%Y";
const CLOCK_FORMAT: &str = "%I:%M %p";

/// Message and exception texts longer than this are cut unless `--all`
pub const MAX_LINES: usize = 15;

const SIZE_STEP: f64 = 1024.0;
const SIZE_UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

/// Parse the timestamp shapes the server emits: RFC 3339, Duplicati's
/// compact `20180711T114312Z`, and naive ISO timestamps taken as UTC
pub fn parse_time(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(input) {
        return Some(time.with_timezone(&Utc));
    }
    ["%Y%m%dT%H%M%SZ", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Render a server timestamp, or `None` when it is unset or unparsable
pub fn format_time(input: &str, precise: bool) -> Option<String> {
    format_time_at(input, precise, Utc::now())
}

pub fn format_time_at(input: &str, precise: bool, now: DateTime<Utc>) -> Option<String> {
    if input.is_empty() || input == UNSET_TIME || input == "0" {
        return None;
    }
    let Some(time) = parse_time(input) else {
        debug!(input, "unparsable timestamp");
        return None;
    };
    Some(if precise {
        precise_time(time)
    } else {
        relative_time(time, now)
    })
}

/// `03:04:05 PM 02/01/2030` in local time
pub fn precise_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format(PRECISE_FORMAT).to_string()
}

/// Clock time within a day of `now`, prefixed with Yesterday/Tomorrow one
/// day out, and a plain date beyond that
pub fn relative_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let local = time.with_timezone(&Local);
    match (time - now).num_days() {
        days if days.abs() > 1 => local.format(DATE_FORMAT).to_string(),
        1 => format!("Tomorrow {}", local.format(CLOCK_FORMAT)),
        -1 => format!("Yesterday {}", local.format(CLOCK_FORMAT)),
        _ => local.format(CLOCK_FORMAT).to_string(),
    }
}

/// Backup log timestamps are Unix seconds
pub fn unix_time(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(precise_time)
}

/// Drop the fractional seconds of a `hh:mm:ss.fffffff` duration
pub fn format_duration(duration: &str) -> &str {
    duration.split('.').next().unwrap_or_default()
}

/// `1536` -> `1.5 KB`, in steps of 1024 up to TB, rounded to two decimals
pub fn human_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value / SIZE_STEP >= 1.0 && unit < SIZE_UNITS.len() - 1 {
        value /= SIZE_STEP;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{:?} {}", rounded, SIZE_UNITS[unit])
}

/// Split a multi-line text, keeping the first `MAX_LINES` lines and a
/// marker for the rest unless `show_all` is set
pub fn split_lines(text: &str, show_all: bool) -> Vec<String> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if !show_all && lines.len() > MAX_LINES {
        let hidden = lines.len() - MAX_LINES;
        lines.truncate(MAX_LINES);
        lines.push(format!("{} hidden lines (show with --all)", hidden));
    }
    lines
}
