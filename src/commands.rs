//! Resource commands: list, get, describe, run, abort, delete, export and
//! import.
//!
//! Each command takes an authenticated `ApiClient` and a `Console`; errors
//! are returned to the top-level handler, except where a single failing id
//! should not stop the others.

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::models::{parse, BackupEntry, Notification, ProgressState};
use crate::output::Console;
use crate::views;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Yes/no prompt, `credentials::confirm` outside of tests
pub type Confirm = fn(&str, bool) -> Result<bool, ClientError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListResource {
    Backups,
    Restores,
    Notifications,
    Serversettings,
    Systeminfo,
}

impl ListResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListResource::Backups => "backups",
            ListResource::Restores => "restores",
            ListResource::Notifications => "notifications",
            ListResource::Serversettings => "serversettings",
            ListResource::Systeminfo => "systeminfo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Backup,
    Notification,
}

/// Resources that only exist for backups (delete, import, export)
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackupResource {
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Yaml,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Yaml => "yml",
            ExportFormat::Json => "json",
        }
    }
}

fn is_empty(document: &Value) -> bool {
    match document {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub fn list(api: &mut ApiClient, console: &Console, resource: ListResource) -> Result<(), ClientError> {
    let document = match resource {
        ListResource::Backups => {
            let entries = api.backups()?;
            let progress = api.progress_state()?.map(|(_, state)| state);
            Value::Array(views::backup_list(&entries, progress.as_ref()))
        }
        ListResource::Notifications => {
            let notifications: Vec<Notification> = api
                .notifications()?
                .into_iter()
                .map(|(_, typed)| typed)
                .collect();
            Value::Array(views::notification_list(&notifications))
        }
        ListResource::Serversettings => match api.resource(resource.as_str())? {
            Value::Object(settings) => Value::Array(views::server_settings(&settings)),
            other => other,
        },
        _ => api.resource(resource.as_str())?,
    };

    if is_empty(&document) {
        return Err(ClientError::not_found("No items found"));
    }
    console.yaml(&document, Some(200))
}

struct FetchedBackups {
    documents: Vec<Value>,
    progress: Option<(Value, ProgressState)>,
}

impl FetchedBackups {
    /// The running task's raw state, if it belongs to `document`
    fn progress_of(&self, document: &Value) -> Result<Option<&Value>, ClientError> {
        let entry: BackupEntry = parse(document.clone())?;
        Ok(self.progress.as_ref().and_then(|(raw, state)| {
            views::progress_for(&entry, Some(state)).map(|_| raw)
        }))
    }
}

/// Fetch backups by id. An id the server rejects is reported and skipped;
/// finding none at all is an error.
fn fetch_backups(
    api: &mut ApiClient,
    console: &Console,
    ids: &[String],
) -> Result<FetchedBackups, ClientError> {
    info!("Fetching backups from API...");
    let progress = api.progress_state()?;
    let mut documents = Vec::new();
    for id in ids {
        match api.backup(id) {
            Ok(document) => documents.push(document),
            Err(err @ ClientError::Request { .. }) => console.error(&err),
            Err(err) => return Err(err),
        }
    }
    if documents.is_empty() {
        return Err(ClientError::not_found("No backups found"));
    }
    Ok(FetchedBackups {
        documents,
        progress,
    })
}

fn fetch_notifications(
    api: &mut ApiClient,
    ids: &[String],
) -> Result<Vec<(Value, Notification)>, ClientError> {
    let matching: Vec<_> = api
        .notifications()?
        .into_iter()
        .filter(|(_, n)| n.id.as_ref().is_some_and(|id| ids.contains(id)))
        .collect();
    if matching.is_empty() {
        return Err(ClientError::not_found("No notifications found"));
    }
    Ok(matching)
}

/// Short summaries of one or more resources
pub fn get(
    api: &mut ApiClient,
    console: &Console,
    kind: ResourceKind,
    ids: &[String],
) -> Result<(), ClientError> {
    let summaries = match kind {
        ResourceKind::Backup => {
            let fetched = fetch_backups(api, console, ids)?;
            let progress = fetched.progress.as_ref().map(|(_, state)| state);
            fetched
                .documents
                .iter()
                .map(|doc| -> Result<Value, ClientError> {
                    let entry: BackupEntry = parse(doc.clone())?;
                    Ok(views::backup_summary(&entry, progress))
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        ResourceKind::Notification => {
            let notifications: Vec<Notification> = fetch_notifications(api, ids)?
                .into_iter()
                .map(|(_, typed)| typed)
                .collect();
            views::notification_summary(&notifications)
        }
    };
    console.yaml(&summaries, Some(200))
}

/// Full server documents of a resource
pub fn describe(
    api: &mut ApiClient,
    console: &Console,
    kind: ResourceKind,
    id: &str,
) -> Result<(), ClientError> {
    let ids = [id.to_string()];
    let documents = match kind {
        ResourceKind::Backup => {
            let fetched = fetch_backups(api, console, &ids)?;
            let mut documents = Vec::new();
            for doc in &fetched.documents {
                let mut doc = doc.clone();
                if let Some(progress) = fetched.progress_of(&doc)? {
                    if let Some(map) = doc.as_object_mut() {
                        map.insert("Progress".to_string(), progress.clone());
                    }
                }
                documents.push(doc);
            }
            documents
        }
        ResourceKind::Notification => fetch_notifications(api, &ids)?
            .into_iter()
            .map(|(raw, _)| raw)
            .collect(),
    };
    console.yaml(&documents, Some(200))
}

pub fn run(api: &mut ApiClient, console: &Console, id: u64) -> Result<(), ClientError> {
    let status = api.run_backup(id)?;
    console.result("Backup scheduled", Some(status));
    Ok(())
}

pub fn abort(api: &mut ApiClient, console: &Console, id: u64) -> Result<(), ClientError> {
    let status = api.abort_task(id)?;
    console.result("Task aborted", Some(status));
    Ok(())
}

fn backup_name(document: &Value) -> &str {
    document
        .pointer("/Backup/Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Delete a backup job after checking it exists. Asks first unless
/// `confirmed`.
pub fn delete(
    api: &mut ApiClient,
    console: &Console,
    id: u64,
    delete_db: bool,
    confirmed: bool,
    confirm: Confirm,
) -> Result<(), ClientError> {
    let fetched = fetch_backups(api, console, &[id.to_string()])?;
    let name = fetched.documents.first().map(backup_name).unwrap_or_default();

    if !confirmed && !confirm(&format!("Delete \"{}\"? (ID:{})", name, id), false)? {
        console.print("Backup not deleted");
        return Ok(());
    }

    let status = api.delete_backup(id, delete_db)?;
    console.result("Backup deleted", Some(status));
    Ok(())
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

/// `backup_config_16.10.2026_03.04_PM.yml`
pub fn default_export_name(format: ExportFormat, now: DateTime<Local>) -> String {
    format!(
        "backup_config_{}.{}",
        now.format("%d.%m.%Y_%I.%M_%p"),
        format.extension()
    )
}

/// Write a backup's configuration to a YAML or JSON file. Returns the path
/// written, or `None` when the user declined to overwrite.
pub fn export(
    api: &mut ApiClient,
    console: &Console,
    id: u64,
    format: ExportFormat,
    path: Option<&str>,
    confirm: Confirm,
) -> Result<Option<PathBuf>, ClientError> {
    let fetched = fetch_backups(api, console, &[id.to_string()])?;
    let mut backup = fetched
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::not_found("Could not fetch backup"))?;

    let version = api
        .system_info()?
        .server_version
        .ok_or_else(|| ClientError::InvalidResponse("Error exporting backup".to_string()))?;
    if let Some(map) = backup.as_object_mut() {
        map.remove("Progress");
        map.insert("CreatedByVersion".to_string(), json!(version));
    }

    let path = match path {
        Some(p) => expand_home(p),
        None => PathBuf::from(default_export_name(format, Local::now())),
    };
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            console.print(&format!("Created directory \"{}\"", dir.display()));
        }
    }
    if path.is_file() && !confirm("File already exists, overwrite?", true)? {
        return Ok(None);
    }

    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&backup)?,
        ExportFormat::Yaml => serde_yaml::to_string(&backup)?,
    };
    std::fs::write(&path, content)?;
    console.result(&format!("Created {}", path.display()), Some(200));
    Ok(Some(path))
}

/// Read a backup configuration from a `.yml`, `.yaml` or `.json` file
pub fn load_backup_file(file: &Path) -> Result<Value, ClientError> {
    if !file.is_file() {
        return Err(ClientError::not_found(format!("{} not found", file.display())));
    }
    let content = std::fs::read_to_string(file)?;
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match extension.as_deref() {
        Some("yml") | Some("yaml") => serde_yaml::from_str(&content)
            .map_err(|_| ClientError::Config("Failed to load file as YAML".to_string())),
        Some("json") => serde_json::from_str(&content)
            .map_err(|_| ClientError::Config("Failed to load file as JSON".to_string())),
        _ => Err(ClientError::Config(format!(
            "{} is neither a YAML nor a JSON file",
            file.display()
        ))),
    }
}

/// Update an existing backup (`id` given) or create a new one from `file`.
///
/// Without `import_metadata` an update drops the `Metadata` key entirely
/// and a new job is created with empty metadata.
pub fn import(
    api: &mut ApiClient,
    console: &Console,
    file: &Path,
    id: Option<&str>,
    import_metadata: bool,
) -> Result<(), ClientError> {
    let mut config = load_backup_file(file)?;
    let backup = config.get_mut("Backup").and_then(Value::as_object_mut);

    match id {
        Some(id) => {
            if !import_metadata {
                if let Some(backup) = backup {
                    backup.remove("Metadata");
                }
            }
            let status = api.update_backup(id, &config)?;
            console.result("Backup updated", Some(status));
        }
        None => {
            if !import_metadata {
                if let Some(backup) = backup {
                    backup.insert("Metadata".to_string(), json!({}));
                }
            }
            let status = api.import_backup(&config, import_metadata)?;
            console.result("Backup job created", Some(status));
        }
    }
    Ok(())
}
