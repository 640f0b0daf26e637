use crate::error::Result;
use crate::record::SyncRecord;

/// Durable storage for [`SyncRecord`]s, keyed by repository name.
///
/// Implementations must make [`save`](StateStore::save) atomic per record.
/// The executor is the only writer for a given repository, but readers
/// (status queries, other repositories' tasks) may run at any time.
///
/// Calls may block on disk I/O. Async callers run them on the blocking pool.
pub trait StateStore: Send + Sync {
    /// The record for `repository`, or `None` before its first sync.
    fn load(&self, repository: &str) -> Result<Option<SyncRecord>>;

    /// Replace the record for `record.repository`.
    fn save(&self, record: &SyncRecord) -> Result<()>;

    /// Names of all repositories with a record, sorted.
    fn list(&self) -> Result<Vec<String>>;
}
