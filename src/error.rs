use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error with stable kinds. Everything that crosses the request
/// boundary is one of these; per-chunk extraction failures are logged and
/// swallowed inside the extractor instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open media: {0}")]
    MediaOpen(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("no indexed video found, process a video first")]
    IndexNotReady,

    #[error("index artifacts corrupt: {0}")]
    IndexCorruption(String),

    #[error("object storage error: {0}")]
    Storage(String),

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn media_open(msg: impl std::fmt::Display) -> Self {
        Error::MediaOpen(msg.to_string())
    }

    pub fn encoding(msg: impl std::fmt::Display) -> Self {
        Error::Encoding(msg.to_string())
    }

    pub fn corruption(msg: impl std::fmt::Display) -> Self {
        Error::IndexCorruption(msg.to_string())
    }

    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Error::Storage(msg.to_string())
    }

    /// Stable machine-readable kind, used by the HTTP boundary and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MediaOpen(_) => "media_open",
            Error::Encoding(_) => "encoding",
            Error::IndexNotReady => "index_not_ready",
            Error::IndexCorruption(_) => "index_corruption",
            Error::Storage(_) => "storage",
            Error::Metadata(_) => "metadata",
            Error::Timeout(_) => "timeout",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Metadata(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(Duration::from_secs(0))
        } else {
            Error::Storage(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(Error::IndexNotReady.kind(), "index_not_ready");
        assert_eq!(Error::media_open("x").kind(), "media_open");
        assert_eq!(Error::corruption("x").kind(), "index_corruption");
        assert_eq!(Error::Timeout(Duration::from_secs(5)).kind(), "timeout");
    }

    #[test]
    fn test_not_ready_message_is_user_facing() {
        let msg = Error::IndexNotReady.to_string();
        assert!(msg.contains("process a video first"));
    }
}
