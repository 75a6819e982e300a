//! Typed views of the JSON documents returned by the Duplicati REST API.
//!
//! Only the fields the client reads are named; everything else is optional
//! or kept in a flattened map so documents can be passed through untouched.

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Validate a raw server document against one of the typed models
pub fn parse<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

/// Accept a string or a number where the server is inconsistent about ids
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One element of `GET /api/v1/backups` and the `data` of `GET /api/v1/backup/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupEntry {
    #[serde(default)]
    pub backup: Backup,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Backup {
    #[serde(rename = "ID", default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "DBPath", default)]
    pub db_path: Option<String>,
    #[serde(default)]
    pub metadata: BackupMetadata,
}

/// Duplicati reports metadata as a string-to-string map
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupMetadata {
    #[serde(default)]
    pub backup_list_count: Option<String>,
    #[serde(default)]
    pub last_duration: Option<String>,
    #[serde(default)]
    pub last_started: Option<String>,
    #[serde(default)]
    pub last_finished: Option<String>,
    #[serde(default)]
    pub source_size_string: Option<String>,
    #[serde(default)]
    pub target_size_string: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Schedule {
    #[serde(default)]
    pub repeat: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub last_run: Option<String>,
}

/// `GET /api/v1/progressstate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgressState {
    #[serde(rename = "BackupID", default, deserialize_with = "string_or_number")]
    pub backup_id: Option<String>,
    #[serde(rename = "TaskID", default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub still_counting: bool,
    #[serde(default)]
    pub backend_action: Option<Value>,
    #[serde(default)]
    pub backend_speed: i64,
    #[serde(default)]
    pub processed_file_count: i64,
    #[serde(default)]
    pub total_file_count: i64,
    #[serde(default)]
    pub backend_file_progress: i64,
    #[serde(default)]
    pub backend_file_size: i64,
}

/// `GET /api/v1/notifications`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    #[serde(rename = "ID", default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "BackupID", default, deserialize_with = "string_or_number")]
    pub backup_id: Option<String>,
}

/// Entry of the backup, remote, stored and live logs. Fields the client
/// rewrites are typed; the rest is passed through as-is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEntry {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /api/v1/systeminfo`, reduced to what export needs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub server_version: Option<String>,
}
