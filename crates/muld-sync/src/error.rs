use std::fmt;

use muld_manifest::ConfigError;
use muld_state::StateError;
use muld_transport::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::Stage;

/// Planning failed; nothing was executed for the stage.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("{stage}: invalid ref names: {}", names.join(", "))]
    InvalidRefNames { stage: Stage, names: Vec<String> },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("invalid repository entry: {0}")]
    Config(#[from] ConfigError),

    #[error("cancelled before the step started")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Plan(_) => ErrorKind::Plan,
            Self::Transport(e) if e.is_transient() => ErrorKind::TransportTransient,
            Self::Transport(_) => ErrorKind::TransportRejected,
            Self::State(_) => ErrorKind::StateStore,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Error class shown to operators next to each reported error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed manifest entry.
    Config,
    /// The planner refused the observed state.
    Plan,
    /// Network or timeout failure that outlived the retry budget.
    TransportTransient,
    /// Authentication, non-fast-forward or other refusal. Never retried.
    TransportRejected,
    /// Persisting or loading the sync record failed.
    StateStore,
    /// Skipped because the run was cancelled.
    Cancelled,
    /// The task doing the work panicked or was torn down.
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Plan => "plan",
            Self::TransportTransient => "transport-transient",
            Self::TransportRejected => "transport-rejected",
            Self::StateStore => "state-store",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}
