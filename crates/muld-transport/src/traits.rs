//! The [`Transport`] capability set.

use async_trait::async_trait;
use muld_refs::RefState;

use crate::endpoint::{Endpoint, LocalMirror};
use crate::error::TransportResult;
use crate::types::{PushReport, RefUpdate};

/// Remote operations muld needs from a version-control backend.
///
/// Every method may suspend on network I/O. Implementations must not share
/// mutable session state between concurrent calls: two pushes to different
/// downstreams of the same repository can run at the same time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Observe every ref the endpoint advertises.
    async fn list_refs(&self, endpoint: &Endpoint) -> TransportResult<RefState>;

    /// Make sure the local mirror exists. Returns `true` when it was created,
    /// meaning any previously recorded local state no longer describes it.
    async fn prepare_mirror(&self, mirror: &LocalMirror) -> TransportResult<bool>;

    /// Bring the named refs of the local mirror in line with `endpoint`.
    ///
    /// Mirror updates are always forced: the upstream is authoritative.
    /// Updates with `new = None` delete the ref from the mirror. Returns the
    /// mirror's full ref state after the fetch.
    async fn fetch(
        &self,
        mirror: &LocalMirror,
        endpoint: &Endpoint,
        updates: &[RefUpdate],
    ) -> TransportResult<RefState>;

    /// Publish refs from the local mirror to `endpoint`.
    ///
    /// A non-fast-forward update is only applied when `force_allowed` is set;
    /// otherwise it comes back as a per-ref rejection. Whole-request failures
    /// (network, auth) are returned as `Err`.
    async fn push(
        &self,
        mirror: &LocalMirror,
        endpoint: &Endpoint,
        updates: &[RefUpdate],
        force_allowed: bool,
    ) -> TransportResult<PushReport>;
}
