use std::path::PathBuf;

use thiserror::Error;

/// Errors that make a whole manifest unusable.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("manifest is not valid YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors confined to a single repository entry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("malformed repository entry: {0}")]
    Malformed(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),

    #[error(transparent)]
    Invalid(#[from] muld_refs::RefError),

    #[error("repository name {0:?} is declared more than once")]
    DuplicateRepository(String),

    #[error("downstream name {0:?} is declared more than once")]
    DuplicateDownstream(String),
}
