use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// URL scheme of an endpoint, used to pick a transport backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    /// In-process repository (`mem://name`).
    Memory,
    /// Local filesystem path or `file://` URL.
    File,
    /// `ssh://` URL or scp-like `user@host:path`.
    Ssh,
    Http,
    Https,
    /// Native git protocol (`git://`).
    Git,
    /// Anything else; no backend is registered for it by default.
    Other(String),
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "mem"),
            Self::File => write!(f, "file"),
            Self::Ssh => write!(f, "ssh"),
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
            Self::Git => write!(f, "git"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A remote repository location plus opaque values handed to the transport.
///
/// `env` is never interpreted by muld. The git backend exports it into the
/// environment of every `git` process it runs for this endpoint, which is how
/// credentials (`GIT_SSH_COMMAND`, `GIT_ASKPASS`, ...) are passed through.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Classify the URL.
    pub fn scheme(&self) -> Scheme {
        let url = self.url.trim();
        if let Some((scheme, _)) = url.split_once("://") {
            return match scheme.to_ascii_lowercase().as_str() {
                "mem" => Scheme::Memory,
                "file" => Scheme::File,
                "ssh" | "git+ssh" | "ssh+git" => Scheme::Ssh,
                "http" => Scheme::Http,
                "https" => Scheme::Https,
                "git" => Scheme::Git,
                other => Scheme::Other(other.to_string()),
            };
        }
        if is_scp_like(url) {
            Scheme::Ssh
        } else {
            Scheme::File
        }
    }

    /// The part after `mem://`, for in-memory endpoints.
    pub fn memory_name(&self) -> Option<&str> {
        self.url.trim().strip_prefix("mem://")
    }

    /// Resolve a relative filesystem path against `base`.
    ///
    /// URLs with a scheme and scp-like addresses are returned unchanged.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        if self.scheme() == Scheme::File && !self.url.contains("://") {
            let path = Path::new(&self.url);
            if path.is_relative() {
                self.url = base.join(path).display().to_string();
            }
        }
        self
    }
}

/// `user@host:path` or `host:path`, but not a Windows drive (`C:\...`) and
/// not a path whose first colon comes after a slash.
fn is_scp_like(url: &str) -> bool {
    match url.find(':') {
        Some(colon) => {
            let host = &url[..colon];
            !host.is_empty() && !host.contains('/') && host.len() > 1
        }
        None => false,
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // env may hold credentials
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("env_keys", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// The local bare mirror a repository is staged through.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalMirror {
    pub path: PathBuf,
}

impl LocalMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for LocalMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
