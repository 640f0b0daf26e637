use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid repository name: {0}")]
    InvalidName(#[from] muld_refs::RefError),

    #[error("state i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt sync record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state lock poisoned: {0}")]
    Poisoned(String),

    #[error("state task failed: {0}")]
    Interrupted(String),
}

pub type Result<T> = std::result::Result<T, StateError>;
