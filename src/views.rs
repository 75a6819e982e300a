//! Reshape server documents into the short summaries printed by `list`,
//! `get` and `logs`. Every view yields a `serde_json::Value` which is then
//! dumped as YAML; keys come out sorted.

use crate::format::{format_duration, format_time, human_bytes, split_lines, unix_time};
use crate::models::{BackupEntry, LogEntry, Notification, ProgressState};
use serde_json::{json, Map, Value};

/// Server setting the `list serversettings` output leaves out
const HIDDEN_SETTING: &str = "update-check-latest";

/// Remote operation whose payload is too large to print
const LIST_OPERATION: &str = "list";

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn opt(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

fn is_active(entry: &BackupEntry, progress: Option<&ProgressState>) -> bool {
    match (progress.and_then(|p| p.backup_id.as_deref()), &entry.backup.id) {
        (Some(active), Some(id)) => active == id,
        _ => false,
    }
}

/// Progress state that belongs to `entry`, if it is the running backup
pub fn progress_for<'a>(
    entry: &BackupEntry,
    progress: Option<&'a ProgressState>,
) -> Option<&'a ProgressState> {
    progress.filter(|_| is_active(entry, progress))
}

/// `list backups`: name -> ID, source size, next/last run and running task
pub fn backup_list(entries: &[BackupEntry], progress: Option<&ProgressState>) -> Vec<Value> {
    entries
        .iter()
        .map(|entry| {
            let backup = &entry.backup;
            let mut summary = Map::new();
            summary.insert("ID".into(), opt(backup.id.clone()));
            if let Some(size) = &backup.metadata.source_size_string {
                summary.insert("Source size".into(), json!(size));
            }
            if let Some(schedule) = &entry.schedule {
                if let Some(next) = schedule.time.as_deref().and_then(|t| format_time(t, false)) {
                    summary.insert("Next run".into(), json!(next));
                }
                if let Some(last) = schedule
                    .last_run
                    .as_deref()
                    .and_then(|t| format_time(t, false))
                {
                    summary.insert("Last run".into(), json!(last));
                }
            }
            if let Some(state) = progress_for(entry, progress) {
                summary.insert(
                    "Running".into(),
                    json!({ "Task ID": state.task_id, "State": state.phase }),
                );
            }
            single(&backup.name, Value::Object(summary))
        })
        .collect()
}

/// `list notifications`: title -> backup id, notification id, timestamp
pub fn notification_list(notifications: &[Notification]) -> Vec<Value> {
    notifications
        .iter()
        .map(|n| {
            let mut summary = Map::new();
            summary.insert("Backup ID".into(), opt(n.backup_id.clone()));
            summary.insert("Notification ID".into(), opt(n.id.clone()));
            if let Some(ts) = n.timestamp.as_deref().and_then(|t| format_time(t, false)) {
                summary.insert("Timestamp".into(), json!(ts));
            }
            single(n.title.as_deref().unwrap_or_default(), Value::Object(summary))
        })
        .collect()
}

/// `list serversettings`: one `{key: {value}}` entry per setting
pub fn server_settings(settings: &Map<String, Value>) -> Vec<Value> {
    settings
        .iter()
        .filter(|(key, _)| key.as_str() != HIDDEN_SETTING)
        .map(|(key, value)| single(key, json!({ "value": value })))
        .collect()
}

/// `get notification`
pub fn notification_summary(notifications: &[Notification]) -> Vec<Value> {
    notifications
        .iter()
        .map(|n| {
            let mut summary = Map::new();
            summary.insert("Backup ID".into(), opt(n.backup_id.clone()));
            summary.insert("Notification ID".into(), opt(n.id.clone()));
            summary.insert("Message".into(), opt(n.message.clone()));
            summary.insert("Type".into(), opt(n.kind.clone()));
            if let Some(ts) = n.timestamp.as_deref().and_then(|t| format_time(t, false)) {
                summary.insert("Timestamp".into(), json!(ts));
            }
            single(
                n.title.as_deref().unwrap_or("Notification"),
                Value::Object(summary),
            )
        })
        .collect()
}

fn percent(current: i64, total: i64) -> Option<String> {
    (current > 0 && total > 0).then(|| format!("{:.2}%", current as f64 / total as f64 * 100.0))
}

/// The `Progress` block of `get backup`
pub fn progress_summary(state: &ProgressState) -> Value {
    let mut backend = Map::new();
    backend.insert(
        "Action".into(),
        state.backend_action.clone().unwrap_or(json!(0)),
    );
    if state.backend_speed > 0 {
        backend.insert(
            "Speed".into(),
            json!(format!("{}/s", human_bytes(state.backend_speed as u64))),
        );
    }
    if let Some(p) = percent(state.backend_file_progress, state.backend_file_size) {
        backend.insert("Progress".into(), json!(p));
    }

    let phase = state.phase.as_deref();
    let mut progress = Map::new();
    progress.insert("State".into(), opt(state.phase.clone()));
    progress.insert("Task ID".into(), json!(state.task_id.unwrap_or(-1)));
    if state.still_counting {
        progress.insert("Counting".into(), json!(true));
    }
    if phase == Some("Backup_ProcessingFiles") {
        if let Some(p) = percent(state.processed_file_count, state.total_file_count) {
            progress.insert("Processed files".into(), json!(p));
        }
    }
    // Finished tasks carry stale backend figures
    if !matches!(phase, Some("Backup_Complete") | Some("Error")) {
        progress.insert("Backend".into(), Value::Object(backend));
    }
    Value::Object(progress)
}

/// `get backup`: name -> database, versions, last run, sizes, schedule and,
/// for the running backup, its progress
pub fn backup_summary(entry: &BackupEntry, progress: Option<&ProgressState>) -> Value {
    let backup = &entry.backup;
    let meta = &backup.metadata;
    let time = |t: &Option<String>| opt(format_time(t.as_deref().unwrap_or("0"), false));

    let mut summary = Map::new();
    summary.insert("ID".into(), opt(backup.id.clone()));
    summary.insert("Local database".into(), opt(backup.db_path.clone()));
    summary.insert(
        "Versions".into(),
        json!(meta
            .backup_list_count
            .as_deref()
            .and_then(|c| c.parse::<i64>().ok())
            .unwrap_or(0)),
    );
    summary.insert(
        "Last run".into(),
        json!({
            "Duration": format_duration(meta.last_duration.as_deref().unwrap_or("0")),
            "Started": time(&meta.last_started),
            "Stopped": time(&meta.last_finished),
        }),
    );
    summary.insert(
        "Size".into(),
        json!({
            "Local": meta.source_size_string.clone().unwrap_or_default(),
            "Backend": meta.target_size_string.clone().unwrap_or_default(),
        }),
    );

    let schedule = entry.schedule.as_ref().map(|s| {
        let mut out = Map::new();
        out.insert("Repeat".into(), opt(s.repeat.clone()));
        if let Some(next) = s.time.as_deref().and_then(|t| format_time(t, false)) {
            out.insert("Next run".into(), json!(next));
        }
        if let Some(last) = s.last_run.as_deref().and_then(|t| format_time(t, false)) {
            out.insert("Last run".into(), json!(last));
        }
        Value::Object(out)
    });
    summary.insert("Schedule".into(), schedule.unwrap_or(Value::Null));

    if let Some(state) = progress_for(entry, progress) {
        summary.insert("Progress".into(), progress_summary(state));
    }
    single(&backup.name, Value::Object(summary))
}

fn log_document(entry: LogEntry, show_all: bool) -> Map<String, Value> {
    let mut doc = entry.extra;
    if let Some(message) = entry.message {
        doc.insert("Message".into(), json!(split_lines(&message, show_all)));
    }
    if let Some(exception) = entry.exception {
        doc.insert("Exception".into(), json!(split_lines(&exception, show_all)));
    }
    if let Some(operation) = entry.operation {
        doc.insert("Operation".into(), json!(operation));
    }
    if let Some(data) = entry.data {
        doc.insert("Data".into(), data);
    }
    if let Some(timestamp) = entry.timestamp {
        doc.insert("Timestamp".into(), timestamp);
    }
    if let Some(when) = entry.when {
        doc.insert("When".into(), json!(when));
    }
    doc
}

/// Remote log payloads are JSON strings; their `Size` is humanized
fn remote_data(data: Value) -> Value {
    let parsed = match data {
        Value::String(raw) => serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw)),
        other => other,
    };
    match parsed {
        Value::Object(mut map) => {
            if let Some(size) = map.get("Size").and_then(Value::as_u64) {
                map.insert("Size".into(), json!(human_bytes(size)));
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn last_page<T>(mut entries: Vec<T>, page_size: usize) -> Vec<T> {
    let skip = entries.len().saturating_sub(page_size);
    entries.drain(..skip);
    entries
}

/// Local or remote log of one backup
pub fn backup_logs(entries: Vec<LogEntry>, page_size: usize, show_all: bool) -> Vec<Value> {
    last_page(entries, page_size)
        .into_iter()
        .map(|entry| {
            let expunge = entry.operation.as_deref() == Some(LIST_OPERATION);
            let data = entry.data.clone();
            let timestamp = entry.timestamp.clone();
            let mut doc = log_document(entry, show_all);

            if expunge {
                doc.insert("Data".into(), json!("Expunged"));
            } else if let Some(data) = data {
                doc.insert("Data".into(), remote_data(data));
            }
            let secs = timestamp.as_ref().and_then(seconds).unwrap_or(0);
            doc.insert("Timestamp".into(), opt(unix_time(secs)));
            Value::Object(doc)
        })
        .collect()
}

/// Live log poll: `When` shown as a precise local time
pub fn live_logs(entries: Vec<LogEntry>, page_size: usize) -> Vec<Value> {
    last_page(entries, page_size)
        .into_iter()
        .map(|entry| {
            let when = entry.when.clone();
            let mut doc = log_document(entry, true);
            doc.insert(
                "When".into(),
                opt(when.as_deref().and_then(|w| format_time(w, true))),
            );
            Value::Object(doc)
        })
        .collect()
}

/// Server's stored log
pub fn stored_logs(entries: Vec<LogEntry>, page_size: usize, show_all: bool) -> Vec<Value> {
    last_page(entries, page_size)
        .into_iter()
        .map(|entry| Value::Object(log_document(entry, show_all)))
        .collect()
}
