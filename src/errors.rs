use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),
    #[error("Invalid multipart stream: {0}")]
    Protocol(String),
    #[error("Frame exceeds the {limit} byte buffer")]
    Overflow { limit: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No data received for {0:?}")]
    Timeout(Duration),
    #[error("Stream closed by the remote end")]
    Ended,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Configuration parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid stream address: {0}")]
    Url(#[from] url::ParseError),
}

/// Coarse classification of a [`StreamError`], carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DNS, TCP, TLS or HTTP transport failure, including non-2xx replies.
    Connection,
    /// Missing or unparseable multipart boundary declaration.
    Protocol,
    /// A frame did not fit into the frame buffer.
    Overflow,
    /// Failure or end of the body while streaming.
    Read,
    /// Rejected configuration or address.
    Config,
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Status(_) => ErrorKind::Connection,
            Self::Http(e) if e.is_body() || e.is_decode() => ErrorKind::Read,
            Self::Http(_) => ErrorKind::Connection,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Overflow { .. } => ErrorKind::Overflow,
            Self::Io(_) | Self::Timeout(_) | Self::Ended => ErrorKind::Read,
            Self::Config(_) | Self::Json(_) | Self::Url(_) => {
                ErrorKind::Config
            }
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_failure_stage() {
        assert_eq!(
            StreamError::Connection("refused".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            StreamError::Status(reqwest::StatusCode::UNAUTHORIZED).kind(),
            ErrorKind::Connection
        );
        assert_eq!(StreamError::protocol("x").kind(), ErrorKind::Protocol);
        assert_eq!(
            StreamError::Overflow { limit: 16 }.kind(),
            ErrorKind::Overflow
        );
        assert_eq!(StreamError::Ended.kind(), ErrorKind::Read);
        assert_eq!(
            StreamError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Read
        );
        assert_eq!(StreamError::config("x").kind(), ErrorKind::Config);
    }

    #[test]
    fn overflow_message_names_limit() {
        let err = StreamError::Overflow { limit: 1024 };
        assert_eq!(err.to_string(), "Frame exceeds the 1024 byte buffer");
    }
}
