//! In-memory transport for tests and ephemeral use.
//!
//! [`MemoryTransport`] keeps named repositories (`mem://<name>`) and local
//! mirrors in a `HashMap` behind a `Mutex`. It tracks commit ancestry so that
//! fast-forward checks behave like a real remote, records every call it
//! serves, and can be told to fail for a given endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use muld_refs::{ContentId, RefState};

use crate::endpoint::{Endpoint, LocalMirror};
use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;
use crate::types::{PushReport, RefRejection, RefUpdate, RejectReason};

/// A call served by the memory transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    ListRefs(String),
    PrepareMirror(String),
    Fetch { mirror: String, endpoint: String, refs: Vec<String> },
    Push { endpoint: String, refs: Vec<String>, force: bool },
}

#[derive(Clone, Debug)]
enum Fault {
    /// Fail with a network error this many more times, then recover.
    Transient(u32),
    /// Refuse every request with an authentication error.
    AuthRejected,
}

#[derive(Debug, Default)]
struct Hub {
    repos: HashMap<String, RefState>,
    mirrors: HashMap<String, RefState>,
    parents: HashMap<ContentId, ContentId>,
    faults: HashMap<String, Fault>,
    calls: Vec<TransportCall>,
}

impl Hub {
    fn check_fault(&mut self, endpoint: &str) -> TransportResult<()> {
        match self.faults.get_mut(endpoint) {
            Some(Fault::Transient(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(TransportError::Network {
                    endpoint: endpoint.to_string(),
                    message: "injected network failure".into(),
                })
            }
            Some(Fault::AuthRejected) => Err(TransportError::AuthRejected {
                endpoint: endpoint.to_string(),
                message: "injected authentication failure".into(),
            }),
            _ => Ok(()),
        }
    }

    fn is_ancestor(&self, ancestor: &ContentId, descendant: &ContentId) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(descendant);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            cursor = self.parents.get(id);
        }
        false
    }
}

/// Shared handle to an in-process set of repositories.
///
/// Clones share the same repositories, so a test keeps one handle to seed
/// and inspect state while the registry holds another.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    hub: Arc<Mutex<Hub>>,
}

fn repo_key(endpoint: &Endpoint) -> TransportResult<String> {
    endpoint
        .memory_name()
        .map(str::to_string)
        .ok_or_else(|| TransportError::UnsupportedScheme {
            scheme: endpoint.scheme().to_string(),
            url: endpoint.url.clone(),
        })
}

fn mirror_key(mirror: &LocalMirror) -> String {
    mirror.to_string()
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> TransportResult<MutexGuard<'_, Hub>> {
        self.hub
            .lock()
            .map_err(|e| TransportError::Internal(format!("lock poisoned: {e}")))
    }

    /// Mint a commit id, optionally recording its parent for fast-forward
    /// checks.
    pub fn commit(&self, parent: Option<&ContentId>, label: &str) -> TransportResult<ContentId> {
        let seed = match parent {
            Some(p) => format!("{p}:{label}"),
            None => label.to_string(),
        };
        let id = ContentId::from_data(seed.as_bytes());
        if let Some(p) = parent {
            self.hub()?.parents.insert(id.clone(), p.clone());
        }
        Ok(id)
    }

    /// Replace the refs of repository `name` (the part after `mem://`).
    pub fn set_refs(&self, name: &str, refs: RefState) -> TransportResult<()> {
        self.hub()?.repos.insert(name.to_string(), refs);
        Ok(())
    }

    /// Current refs of repository `name`.
    pub fn refs(&self, name: &str) -> TransportResult<RefState> {
        Ok(self.hub()?.repos.get(name).cloned().unwrap_or_default())
    }

    /// Current refs of a local mirror.
    pub fn mirror_refs(&self, mirror: &LocalMirror) -> TransportResult<RefState> {
        Ok(self
            .hub()?
            .mirrors
            .get(&mirror_key(mirror))
            .cloned()
            .unwrap_or_default())
    }

    /// Make the next `times` requests against `name` fail with a network error.
    pub fn fail_transient(&self, name: &str, times: u32) -> TransportResult<()> {
        self.hub()?
            .faults
            .insert(name.to_string(), Fault::Transient(times));
        Ok(())
    }

    /// Reject every request against `name` as unauthenticated.
    pub fn reject_auth(&self, name: &str) -> TransportResult<()> {
        self.hub()?
            .faults
            .insert(name.to_string(), Fault::AuthRejected);
        Ok(())
    }

    pub fn clear_faults(&self, name: &str) -> TransportResult<()> {
        self.hub()?.faults.remove(name);
        Ok(())
    }

    /// Every call served so far, in order.
    pub fn calls(&self) -> TransportResult<Vec<TransportCall>> {
        Ok(self.hub()?.calls.clone())
    }

    pub fn clear_calls(&self) -> TransportResult<()> {
        self.hub()?.calls.clear();
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_refs(&self, endpoint: &Endpoint) -> TransportResult<RefState> {
        let key = repo_key(endpoint)?;
        let mut hub = self.hub()?;
        hub.calls.push(TransportCall::ListRefs(key.clone()));
        hub.check_fault(&key)?;
        Ok(hub.repos.get(&key).cloned().unwrap_or_default())
    }

    async fn prepare_mirror(&self, mirror: &LocalMirror) -> TransportResult<bool> {
        let key = mirror_key(mirror);
        let mut hub = self.hub()?;
        hub.calls.push(TransportCall::PrepareMirror(key.clone()));
        if hub.mirrors.contains_key(&key) {
            return Ok(false);
        }
        hub.mirrors.insert(key, RefState::new());
        Ok(true)
    }

    async fn fetch(
        &self,
        mirror: &LocalMirror,
        endpoint: &Endpoint,
        updates: &[RefUpdate],
    ) -> TransportResult<RefState> {
        let key = repo_key(endpoint)?;
        let mkey = mirror_key(mirror);
        let mut hub = self.hub()?;
        hub.calls.push(TransportCall::Fetch {
            mirror: mkey.clone(),
            endpoint: key.clone(),
            refs: updates.iter().map(|u| u.name.clone()).collect(),
        });
        hub.check_fault(&key)?;

        let upstream = hub.repos.get(&key).cloned().unwrap_or_default();
        let current = hub.mirrors.get(&mkey).cloned().ok_or_else(|| TransportError::Mirror {
            path: mirror.path.clone(),
            message: "mirror has not been prepared".into(),
        })?;

        let mut next: Vec<(String, ContentId)> = current.into_iter().collect();
        for update in updates {
            next.retain(|(name, _)| name != &update.name);
            if update.new.is_some() {
                // Like git, fetch whatever the upstream has now.
                if let Some(id) = upstream.get(&update.name) {
                    next.push((update.name.clone(), id.clone()));
                }
            }
        }
        let state: RefState = next.into_iter().collect();
        hub.mirrors.insert(mkey, state.clone());
        Ok(state)
    }

    async fn push(
        &self,
        _mirror: &LocalMirror,
        endpoint: &Endpoint,
        updates: &[RefUpdate],
        force_allowed: bool,
    ) -> TransportResult<PushReport> {
        let key = repo_key(endpoint)?;
        let mut hub = self.hub()?;
        hub.calls.push(TransportCall::Push {
            endpoint: key.clone(),
            refs: updates.iter().map(|u| u.name.clone()).collect(),
            force: force_allowed,
        });
        hub.check_fault(&key)?;

        let target = hub.repos.get(&key).cloned().unwrap_or_default();
        let mut next: Vec<(String, ContentId)> = target.clone().into_iter().collect();
        let mut report = PushReport::default();

        for update in updates {
            if let Some(new) = &update.new {
                let fast_forward = match target.get(&update.name) {
                    None => true,
                    Some(current) => current == new || hub.is_ancestor(current, new),
                };
                if !fast_forward && !force_allowed {
                    report.rejected.push(RefRejection {
                        name: update.name.clone(),
                        reason: RejectReason::NonFastForward,
                    });
                    continue;
                }
                next.retain(|(name, _)| name != &update.name);
                next.push((update.name.clone(), new.clone()));
            } else {
                next.retain(|(name, _)| name != &update.name);
            }
            report.accepted.push(update.clone());
        }

        hub.repos.insert(key, next.into_iter().collect());
        Ok(report)
    }
}
