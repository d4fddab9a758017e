use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum WardenError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Config File Error: {0}")]
    ConfigFile(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid cache directory: {0}")]
    InvalidCacheDir(String),

    #[error("Failed download from '{url}'. Got http status {status}")]
    RemoteFetchFailed {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Download incomplete for '{0}': {1}")]
    DownloadIncomplete(String, String),

    #[error("Extraction incomplete for '{0}': {1}")]
    ExtractionIncomplete(String, String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Supervision Error: {0}")]
    Supervision(String),

    #[error("Supervised run panicked: {0}")]
    Panicked(String),

    #[error("Supervised process exited with status {0}")]
    ProcessExited(i32),

    #[error("Service control error: {0}")]
    ServiceControl(String),
}

impl WardenError {
    /// Whether a caller deciding on update retries should try the whole fetch again.
    pub fn is_retryable(&self) -> bool {
        match self {
            WardenError::Http(_) | WardenError::DownloadIncomplete(..) => true,
            WardenError::RemoteFetchFailed { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        WardenError::Http(Arc::new(err))
    }
}

impl From<semver::Error> for WardenError {
    fn from(err: semver::Error) -> Self {
        WardenError::SemVer(Arc::new(err))
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        WardenError::ConfigFile(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn remote_fetch_failed_renders_status() {
        let err = WardenError::RemoteFetchFailed {
            url: "https://dl.example/agent.tar.gz".to_string(),
            status: StatusCode::NOT_FOUND,
        };
        assert!(err.to_string().contains("404 Not Found"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_and_partial_downloads_are_retryable() {
        let err = WardenError::RemoteFetchFailed {
            url: "u".to_string(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        };
        assert!(err.is_retryable());
        let throttled = WardenError::RemoteFetchFailed {
            url: "u".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
        };
        assert!(throttled.is_retryable());
        let redirect_loop = WardenError::RemoteFetchFailed {
            url: "u".to_string(),
            status: StatusCode::from_u16(508).unwrap(),
        };
        assert!(redirect_loop.is_retryable());
        let forbidden = WardenError::RemoteFetchFailed {
            url: "u".to_string(),
            status: StatusCode::FORBIDDEN,
        };
        assert!(!forbidden.is_retryable());
        assert!(WardenError::DownloadIncomplete("a".into(), "reset".into()).is_retryable());
        assert!(!WardenError::InvalidCacheDir(String::new()).is_retryable());
        assert!(!WardenError::ExtractionIncomplete("a".into(), "b".into()).is_retryable());
    }

    #[test]
    fn io_context_keeps_the_error_kind() {
        let raw = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = WardenError::from(std::io::Error::new(
            raw.kind(),
            format!("couldn't create archive file /c/a.tar.gz: {raw}"),
        ));
        match err {
            WardenError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied);
                assert!(e.to_string().contains("/c/a.tar.gz"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
