//! Error types for ref primitives.

use thiserror::Error;

/// Errors produced while validating refs, ids and patterns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefError {
    /// The ref name breaks git naming rules.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidRefName { name: String, reason: String },

    /// A single-component name (repository, downstream) is unusable.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The content identifier is not a hex hash of a supported length.
    #[error("invalid content id {value:?}: {reason}")]
    InvalidContentId { value: String, reason: String },

    /// A filter pattern could not be compiled.
    #[error("invalid ref pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
