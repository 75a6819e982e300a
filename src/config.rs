//! Persisted client configuration.
//!
//! The whole client state (server endpoint, verbosity, parameters file and
//! the session) lives in one YAML record, `config.yml`, stored at
//! `~/.config/duplicati-client/` (or `~/AppData/Local/DuplicatiClient/` on
//! Windows). `SessionStore` is the only thing that reads or writes it.

use crate::error::ClientError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Config file name
const CONFIG_FILE: &str = "config.yml";

/// Server endpoint the client talks to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    pub protocol: String,
    pub url: String,
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            url: "localhost".to_string(),
            port: "8200".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build `{protocol}://{host}:{port}{path}`
    pub fn base_url(&self, path: &str) -> String {
        format!("{}://{}:{}{}", self.protocol, self.url, self.port, path)
    }
}

/// Authentication state issued by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Session {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(
        default,
        rename = "session-auth",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_auth: Option<String>,
}

impl Session {
    /// A session is present only when both the token and its expiry are set
    pub fn is_present(&self) -> bool {
        self.token.is_some() && self.token_expires.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub parameters_file: Option<PathBuf>,
    #[serde(flatten)]
    pub session: Session,
}

impl Config {
    /// Default config location for the current OS
    pub fn default_path() -> Result<PathBuf, ClientError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ClientError::Config("Could not find home directory".to_string()))?;
        let dir = if cfg!(windows) {
            home.join("AppData").join("Local").join("DuplicatiClient")
        } else {
            home.join(".config").join("duplicati-client")
        };
        Ok(dir.join(CONFIG_FILE))
    }

    pub fn to_yaml(&self) -> Result<String, ClientError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Handle over the persisted configuration record.
///
/// Every mutation of the in-memory record must be followed by `save()`;
/// the session logic does so after each login, logout and expiry refresh.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    config: Config,
}

impl SessionStore {
    /// Open the config at `path`, creating it from defaults when missing or
    /// when `overwrite` is set
    pub fn open(path: &Path, overwrite: bool) -> Result<Self, ClientError> {
        let mut store = Self {
            path: path.to_path_buf(),
            config: Config::default(),
        };
        if overwrite || !path.is_file() {
            store.save()?;
        }
        store.load()?;
        Ok(store)
    }

    /// Re-read the record from disk
    pub fn load(&mut self) -> Result<(), ClientError> {
        let content = std::fs::read_to_string(&self.path)?;
        self.config = serde_yaml::from_str(&content).map_err(|e| {
            ClientError::Config(format!(
                "Configuration appears to be invalid ({}). You can re-create it with --overwrite.",
                e
            ))
        })?;
        Ok(())
    }

    /// Write the record to disk, creating the parent directory if needed
    pub fn save(&self) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!("Created directory \"{}\"", parent.display());
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, self.config.to_yaml()?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn session(&self) -> &Session {
        &self.config.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.config.session
    }

    pub fn server(&self) -> &ServerConfig {
        &self.config.server
    }
}

/// Values read from a user's parameters file. They only fill in options
/// that were not given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Parameters {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default, alias = "output-path")]
    pub output_path: Option<String>,
    #[serde(default)]
    pub lines: Option<usize>,
    #[serde(default)]
    pub verbose: Option<bool>,
}

impl Parameters {
    pub fn load_from(path: &Path) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)?;
        let params: Parameters = serde_yaml::from_str(&content)?;
        Ok(params)
    }

    /// Number of keys that carry a value
    pub fn len(&self) -> usize {
        [
            self.url.is_some(),
            self.password.is_some(),
            self.output.is_some(),
            self.output_path.is_some(),
            self.lines.is_some(),
            self.verbose.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Fill `slot` from the parameters file unless the CLI already set it
pub fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}
