use std::fmt;

#[derive(Debug)]
pub enum MmcodeError {
    ApiError {
        status: u16,
        message: String,
    },
    ConfigError(String),
    SessionError(String),
    NetworkError(reqwest::Error),
    DbError(rusqlite::Error),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    Other(String),
}

impl fmt::Display for MmcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmcodeError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            MmcodeError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            MmcodeError::SessionError(msg) => write!(f, "Session error: {}", msg),
            MmcodeError::NetworkError(e) => write!(f, "Network error: {}", e),
            MmcodeError::DbError(e) => write!(f, "Database error: {}", e),
            MmcodeError::IoError(e) => write!(f, "IO error: {}", e),
            MmcodeError::JsonError(e) => write!(f, "JSON error: {}", e),
            MmcodeError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MmcodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MmcodeError::NetworkError(e) => Some(e),
            MmcodeError::DbError(e) => Some(e),
            MmcodeError::IoError(e) => Some(e),
            MmcodeError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MmcodeError {
    fn from(err: reqwest::Error) -> Self {
        MmcodeError::NetworkError(err)
    }
}

impl From<rusqlite::Error> for MmcodeError {
    fn from(err: rusqlite::Error) -> Self {
        MmcodeError::DbError(err)
    }
}

impl From<std::io::Error> for MmcodeError {
    fn from(err: std::io::Error) -> Self {
        MmcodeError::IoError(err)
    }
}

impl From<serde_json::Error> for MmcodeError {
    fn from(err: serde_json::Error) -> Self {
        MmcodeError::JsonError(err)
    }
}

impl From<String> for MmcodeError {
    fn from(msg: String) -> Self {
        MmcodeError::Other(msg)
    }
}

impl From<&str> for MmcodeError {
    fn from(msg: &str) -> Self {
        MmcodeError::Other(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MmcodeError>;
