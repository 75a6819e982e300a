use thiserror::Error;

/// Every way a client command can fail. All of them end the invocation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Session expired. Please login again")]
    SessionExpired,

    #[error("Server is not responding. Is it running?")]
    ServerUnavailable,

    #[error("{message}")]
    AuthenticationFailed { message: String, status: Option<u16> },

    #[error("Error connecting to server")]
    ConnectionError { status: u16 },

    #[error("{message}")]
    NotFound { message: String, status: Option<u16> },

    #[error("{message}")]
    Request { message: String, status: u16 },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status that triggered the error, shown to the user in verbose mode
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::SessionExpired => Some(400),
            ClientError::ServerUnavailable => Some(503),
            ClientError::ConnectionError { status } => Some(*status),
            ClientError::Request { status, .. } => Some(*status),
            ClientError::AuthenticationFailed { status, .. } => *status,
            ClientError::NotFound { status, .. } => *status,
            _ => None,
        }
    }

    pub fn request(message: impl Into<String>, status: u16) -> Self {
        ClientError::Request {
            message: message.into(),
            status,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ClientError::NotFound {
            message: message.into(),
            status: None,
        }
    }
}
