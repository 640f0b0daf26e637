//! Ref primitives for muld.
//!
//! A mirrored repository is observed as a set of named refs, each resolving to
//! an opaque content identifier. This crate holds the types every other muld
//! crate speaks in:
//!
//! - [`ContentId`] -- validated hex hash a ref points at
//! - [`RefState`] -- snapshot of all refs of one endpoint at one point in time
//! - [`RefFilter`] -- include/exclude glob patterns selecting refs to mirror
//! - [`names`] -- git-style ref name validation
//!
//! Snapshots are values. Nothing in muld patches a `RefState` in place once it
//! has been observed; a new snapshot replaces the old one.

pub mod content;
pub mod error;
pub mod filter;
pub mod names;
pub mod state;

pub use content::ContentId;
pub use error::{RefError, Result};
pub use filter::{RefFilter, RefPattern};
pub use names::{validate_component_name, validate_ref_name};
pub use state::RefState;
