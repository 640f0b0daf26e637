//! Repository state store for muld.
//!
//! Each repository has one [`SyncRecord`]: the last ref snapshot confirmed in
//! its local mirror and, per downstream, the last snapshot confirmed there.
//! Records are what makes a run resumable. A snapshot is only written after
//! the transport confirmed the corresponding fetch or push, and a save always
//! replaces the whole record, so a reader sees either the old record or the
//! new one.
//!
//! # Modules
//!
//! - [`error`] — [`StateError`] and the crate `Result` alias
//! - [`record`] — the persisted [`SyncRecord`]
//! - [`traits`] — the [`StateStore`] interface
//! - [`memory`] — [`InMemoryStateStore`] for tests and dry runs
//! - [`file`] — [`FileStateStore`], one JSON document per repository

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{Result, StateError};
pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
pub use record::SyncRecord;
pub use traits::StateStore;
