use http::StatusCode;
use thiserror::Error;

/// Failure of one remote read. `Clone` because a single in-flight request
/// answers every caller waiting on the same key.
#[derive(Debug, Clone, Error)]
pub enum RemoteFetchError {
    #[error("unexpected status {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("request {key} was abandoned before completing")]
    Abandoned { key: String },
}

impl RemoteFetchError {
    pub fn status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::Status {
            status,
            url: url.into(),
        }
    }

    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheBackendError {
    #[error("cache io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheBackendError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
