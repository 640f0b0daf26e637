//! Manifest model for muld.
//!
//! A manifest is a TOML document listing the repositories to mirror. Loading
//! it produces an immutable [`Manifest`] value that is handed to the
//! orchestrator at the start of a run; nothing re-reads configuration while a
//! run is in flight.
//!
//! Malformed repository entries do not fail the whole document. They are kept
//! as [`InvalidEntry`] values carrying a [`ConfigError`], so the run can report
//! them and still mirror every valid repository.

pub mod error;
pub mod manifest;
pub mod repository;
pub mod settings;

pub use error::{ConfigError, ManifestError, ManifestResult};
pub use manifest::{InvalidEntry, Manifest};
pub use repository::{DownstreamSpec, RepositorySpec};
pub use settings::{RetryPolicy, Settings};
