use muld_refs::RefFilter;
use muld_transport::{Endpoint, LocalMirror};

/// A downstream target the local mirror is published to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownstreamSpec {
    /// Stable key for this downstream in the persisted sync record.
    pub name: String,
    pub endpoint: Endpoint,
    /// Allow non-fast-forward updates on this downstream.
    pub force: bool,
}

impl DownstreamSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: Endpoint::new(url),
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// One repository to mirror: upstream → local mirror → downstreams.
///
/// Immutable for the duration of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositorySpec {
    pub name: String,
    pub upstream: Endpoint,
    pub local: LocalMirror,
    /// Processed in declaration order; each is independent of the others.
    pub downstreams: Vec<DownstreamSpec>,
    pub filter: RefFilter,
    /// Propagate ref deletions. Off unless the manifest opts in.
    pub prune: bool,
}

impl RepositorySpec {
    pub fn new(
        name: impl Into<String>,
        upstream: impl Into<String>,
        local: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            upstream: Endpoint::new(upstream),
            local: LocalMirror::new(local),
            downstreams: Vec::new(),
            filter: RefFilter::all(),
            prune: false,
        }
    }

    pub fn with_downstream(mut self, downstream: DownstreamSpec) -> Self {
        self.downstreams.push(downstream);
        self
    }

    pub fn with_filter(mut self, filter: RefFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn downstream(&self, name: &str) -> Option<&DownstreamSpec> {
        self.downstreams.iter().find(|d| d.name == name)
    }
}
