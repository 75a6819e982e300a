//! Authenticated calls against the Duplicati REST API (`/api/v1`).
//!
//! Every call goes through `ApiClient::send`: the session's credentials are
//! attached, the request is executed, and the response status is handed to
//! the session manager before the caller looks at the body.

use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse, Method, MultipartUpload};
use crate::models::{parse, BackupEntry, LogEntry, Notification, ProgressState, SystemInfo};
use crate::session::{with_session_cookies, SessionManager};
use serde_json::Value;
use tracing::{debug, info};

const API_PREFIX: &str = "/api/v1";

/// The import endpoint takes the CSRF token as a query parameter
const XSRF_QUERY: &str = "x-xsrf-token";

const LOCKED_DATABASE: &str = "Error getting log, database may be locked by backup";

/// Booleans as the server's form parser expects them
fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn expect_ok(response: HttpResponse, message: &str) -> Result<HttpResponse, ClientError> {
    if response.is_ok() {
        Ok(response)
    } else {
        Err(ClientError::request(message, response.status))
    }
}

/// `expect_ok` for calls addressing one resource, where 404 means it is gone
fn expect_found(
    response: HttpResponse,
    missing: &str,
    message: &str,
) -> Result<HttpResponse, ClientError> {
    match response.status {
        404 => Err(ClientError::NotFound {
            message: missing.to_string(),
            status: Some(404),
        }),
        _ => expect_ok(response, message),
    }
}

pub struct ApiClient<'a> {
    session: SessionManager<'a>,
}

impl<'a> ApiClient<'a> {
    pub fn new(session: SessionManager<'a>) -> Self {
        Self { session }
    }

    fn url(&self, path: &str) -> String {
        self.session
            .server()
            .base_url(&format!("{}{}", API_PREFIX, path))
    }

    /// Send `request` with the session's header and cookies
    pub fn send(&mut self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let request = self.session.authorize(request)?;
        self.dispatch(request)
    }

    fn dispatch(&mut self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let response = self.session.transport().execute(request)?;
        self.session.observe_response(response.status)?;
        Ok(response)
    }

    fn get(&mut self, path: &str) -> Result<HttpResponse, ClientError> {
        let url = self.url(path);
        self.send(HttpRequest::new(Method::Get, url))
    }

    /// Raw document of one of the list endpoints (`backups`, `restores`,
    /// `notifications`, `serversettings`, `systeminfo`)
    pub fn resource(&mut self, resource: &str) -> Result<Value, ClientError> {
        info!("Fetching {} list from API...", resource);
        let response = self.get(&format!("/{}", resource))?;
        expect_ok(response, "Error connecting")?.json()
    }

    pub fn backups(&mut self) -> Result<Vec<BackupEntry>, ClientError> {
        parse(self.resource("backups")?)
    }

    pub fn system_info(&mut self) -> Result<SystemInfo, ClientError> {
        parse(self.resource("systeminfo")?)
    }

    /// State of the running task, raw and typed. A non-200 answer means no
    /// progress is available.
    pub fn progress_state(&mut self) -> Result<Option<(Value, ProgressState)>, ClientError> {
        let response = self.get("/progressstate")?;
        if !response.is_ok() {
            debug!(status = response.status, "Error getting progressstate");
            return Ok(None);
        }
        let raw: Value = response.json()?;
        let state = parse(raw.clone())?;
        Ok(Some((raw, state)))
    }

    /// Full document of one backup, unwrapped from the `data` envelope
    pub fn backup(&mut self, id: &str) -> Result<Value, ClientError> {
        let response = self.get(&format!("/backup/{}", id))?;
        let mut body: Value = expect_ok(response, &format!("Error getting backup {}", id))?.json()?;
        match body.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(ClientError::InvalidResponse(format!(
                "backup {} has no data",
                id
            ))),
        }
    }

    /// Raw notifications alongside their typed view
    pub fn notifications(&mut self) -> Result<Vec<(Value, Notification)>, ClientError> {
        info!("Fetching notifications from API...");
        let response = self.get("/notifications")?;
        let raw: Vec<Value> = expect_ok(response, "Error getting notifications")?.json()?;
        raw.into_iter()
            .map(|value| -> Result<(Value, Notification), ClientError> {
                let notification = parse(value.clone())?;
                Ok((value, notification))
            })
            .collect()
    }

    fn logs(&mut self, request: HttpRequest) -> Result<Vec<LogEntry>, ClientError> {
        let response = self.send(request)?;
        match response.status {
            200 => response.json(),
            500 => Err(ClientError::request(LOCKED_DATABASE, 500)),
            status => Err(ClientError::request("Error getting log", status)),
        }
    }

    /// Local (`log`) or backend (`remotelog`) log of a backup
    pub fn backup_log(
        &mut self,
        id: u64,
        remote: bool,
        page_size: usize,
    ) -> Result<Vec<LogEntry>, ClientError> {
        let kind = if remote { "remotelog" } else { "log" };
        let url = self.url(&format!("/backup/{}/{}", id, kind));
        self.logs(HttpRequest::new(Method::Get, url).query("pagesize", page_size))
    }

    /// Live log messages at `level` and above
    pub fn live_log(&mut self, level: &str, page_size: usize) -> Result<Vec<LogEntry>, ClientError> {
        let url = self.url("/logdata/poll");
        self.logs(
            HttpRequest::new(Method::Get, url)
                .query("level", level)
                .query("id", 0)
                .query("pagesize", page_size),
        )
    }

    pub fn stored_log(&mut self, page_size: usize) -> Result<Vec<LogEntry>, ClientError> {
        let url = self.url("/logdata/log");
        self.logs(HttpRequest::new(Method::Get, url).query("pagesize", page_size))
    }

    /// Schedule a backup to run next
    pub fn run_backup(&mut self, id: u64) -> Result<u16, ClientError> {
        let url = self.url(&format!("/backup/{}/run", id));
        let response = self.send(HttpRequest::new(Method::Post, url))?;
        Ok(expect_found(response, "Backup not found", "Error scheduling backup")?.status)
    }

    pub fn abort_task(&mut self, id: u64) -> Result<u16, ClientError> {
        let url = self.url(&format!("/task/{}/abort", id));
        let response = self.send(HttpRequest::new(Method::Post, url))?;
        Ok(expect_found(response, "Task not found", "Error aborting task")?.status)
    }

    /// Delete a backup job. Remote files are never deleted: the server
    /// guards that behind a graphical captcha.
    pub fn delete_backup(&mut self, id: u64, delete_db: bool) -> Result<u16, ClientError> {
        let url = self.url(&format!("/backup/{}", id));
        let request = HttpRequest::new(Method::Delete, url)
            .query("delete-local-db", flag(delete_db))
            .query("delete-remote-files", flag(false));
        let response = self.send(request)?;
        Ok(expect_found(response, "Backup not found", "Error deleting backup")?.status)
    }

    /// Replace the configuration of an existing backup
    pub fn update_backup(&mut self, id: &str, config: &Value) -> Result<u16, ClientError> {
        let url = self.url(&format!("/backup/{}", id));
        let body = serde_json::to_string(config)?;
        let response = self.send(HttpRequest::new(Method::Put, url).json(body))?;
        Ok(expect_found(response, "Backup not found", "Error updating backup")?.status)
    }

    /// Create a new backup job from a configuration document
    pub fn import_backup(&mut self, config: &Value, import_metadata: bool) -> Result<u16, ClientError> {
        let url = self.url("/backups/import");
        let upload = MultipartUpload {
            field: "config".to_string(),
            file_name: "backup_config.json".to_string(),
            mime: "application/json".to_string(),
            content: serde_json::to_string(config)?,
            fields: vec![
                ("passphrase".to_string(), String::new()),
                ("import_metadata".to_string(), flag(import_metadata).to_string()),
                ("direct".to_string(), flag(true).to_string()),
            ],
        };
        let request = {
            let session = self.session.ensure_authenticated()?;
            let token = session.token.clone().unwrap_or_default();
            with_session_cookies(HttpRequest::new(Method::Post, url), session)
                .query(XSRF_QUERY, token)
                .multipart(upload)
        };
        let response = self.dispatch(request)?;
        Ok(expect_ok(response, "Error importing backup configuration")?.status)
    }
}
