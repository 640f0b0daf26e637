use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::endpoint::{Endpoint, Scheme};
use crate::error::{TransportError, TransportResult};
use crate::git::GitTransport;
use crate::traits::Transport;

/// Maps endpoint schemes to transport backends.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    backends: HashMap<Scheme, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// A registry with no backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// `git` for every scheme the git client speaks.
    pub fn with_git(git: GitTransport) -> Self {
        let git: Arc<dyn Transport> = Arc::new(git);
        let mut registry = Self::new();
        for scheme in [Scheme::File, Scheme::Ssh, Scheme::Http, Scheme::Https, Scheme::Git] {
            registry.register(scheme, git.clone());
        }
        registry
    }

    /// Register (or replace) the backend for `scheme`.
    pub fn register(&mut self, scheme: Scheme, transport: Arc<dyn Transport>) -> &mut Self {
        self.backends.insert(scheme, transport);
        self
    }

    /// Backend responsible for `endpoint`.
    pub fn resolve(&self, endpoint: &Endpoint) -> TransportResult<Arc<dyn Transport>> {
        let scheme = endpoint.scheme();
        self.backends
            .get(&scheme)
            .cloned()
            .ok_or_else(|| TransportError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: endpoint.url.clone(),
            })
    }

    pub fn supports(&self, scheme: &Scheme) -> bool {
        self.backends.contains_key(scheme)
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<String> = self.backends.keys().map(ToString::to_string).collect();
        schemes.sort();
        f.debug_struct("TransportRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}
