//! Transport adapters for muld.
//!
//! Every backend implements the [`Transport`] capability set -- list refs,
//! fetch into the local mirror, push from the local mirror -- and is picked
//! per endpoint by URL scheme through the [`TransportRegistry`]. Nothing above
//! this crate branches on the kind of remote.
//!
//! # Backends
//!
//! - [`GitTransport`] -- drives the `git` binary for `file`, `ssh`, `http(s)`
//!   and `git` endpoints
//! - [`MemoryTransport`] -- in-process repositories under `mem://`, with
//!   commit ancestry and failure injection; used by tests

pub mod endpoint;
pub mod error;
pub mod git;
pub mod memory;
pub mod registry;
pub mod traits;
pub mod types;

pub use endpoint::{Endpoint, LocalMirror, Scheme};
pub use error::{TransportError, TransportResult};
pub use git::GitTransport;
pub use memory::{MemoryTransport, TransportCall};
pub use registry::TransportRegistry;
pub use traits::Transport;
pub use types::{PushReport, RefRejection, RefUpdate, RejectReason};
