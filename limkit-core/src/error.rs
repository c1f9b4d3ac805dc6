//! Structured error types for every client operation.
//!
//! Variants map one-to-one onto the failure classes a caller can act on.
//! An empty result (server code 130) is not an error: read operations return
//! `Ok(None)` for it.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum LimError {
    /// Non-200 HTTP status. Never retried; the raw body is surfaced as-is.
    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// The request could not be sent or the body could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a status code this client does not recognize.
    #[error("server reported status {code}: {message}")]
    Server { code: i64, message: String },

    #[error("run out of tries after {tries} attempts")]
    TriesExhausted { tries: u32 },

    #[error("malformed report: {0}")]
    Parse(String),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid query input: {0}")]
    Query(String),

    #[error("upload rejected: {0}")]
    Upload(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LimError {
    /// True for failures raised by the remote side (HTTP or embedded status).
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Server { .. })
    }
}

pub type Result<T, E = LimError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_surfaces_raw_body() {
        let err = LimError::Transport {
            status: 401,
            body: "<html>Unauthorized</html>".into(),
        };
        assert_eq!(err.to_string(), "HTTP 401: <html>Unauthorized</html>");
        assert!(err.is_remote());
    }

    #[test]
    fn exhausted_tries_is_distinct_from_server_error() {
        let exhausted = LimError::TriesExhausted { tries: 50 };
        assert!(!exhausted.is_remote());
        assert!(exhausted.to_string().contains("run out of tries"));
    }
}
