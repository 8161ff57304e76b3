use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Notifier error: {notifier}: {message}")]
    Notifier { notifier: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse {
            message: message.into(),
        }
    }

    /// Connection failures, timeouts and 5xx responses are worth another
    /// attempt. Everything else (4xx, bad payloads, local failures) is final.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(err) => {
                if let Some(status) = err.status() {
                    return status.is_server_error();
                }
                err.is_connect() || err.is_timeout() || err.is_request()
            }
            AppError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
