use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by transport backends.
///
/// Backends classify every failure at the source: [`is_transient`] decides
/// whether the executor may retry it.
///
/// [`is_transient`]: TransportError::is_transient
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error talking to {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("{operation} against {endpoint} timed out after {after:?}")]
    Timeout {
        endpoint: String,
        operation: &'static str,
        after: Duration,
    },

    #[error("authentication rejected by {endpoint}: {message}")]
    AuthRejected { endpoint: String, message: String },

    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("no transport registered for scheme {scheme:?} ({url})")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("local mirror {path}: {message}")]
    Mirror { path: PathBuf, message: String },

    #[error("malformed output from {command}: {message}")]
    MalformedOutput { command: String, message: String },

    #[error("internal transport error: {0}")]
    Internal(String),

    #[error(transparent)]
    Ref(#[from] muld_refs::RefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Network and timeout failures may succeed on a later attempt.
    /// Everything else (auth, remote refusal, local misconfiguration) won't.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
