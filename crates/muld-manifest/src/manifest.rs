//! Manifest loading and per-entry validation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use muld_refs::{validate_component_name, RefFilter};
use muld_transport::{Endpoint, LocalMirror};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ConfigError, ManifestError, ManifestResult};
use crate::repository::{DownstreamSpec, RepositorySpec};
use crate::settings::Settings;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    settings: Settings,
    /// Kept as raw values so one bad entry cannot sink the document.
    #[serde(default, rename = "repository")]
    repositories: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRepository {
    name: Option<String>,
    upstream: Option<String>,
    #[serde(default)]
    upstream_env: BTreeMap<String, String>,
    local: Option<PathBuf>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    prune: bool,
    #[serde(default, rename = "downstream")]
    downstreams: Vec<RawDownstream>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDownstream {
    name: Option<String>,
    url: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// A repository entry that failed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidEntry {
    /// The entry's `name`, or `repository[<index>]` when it has none.
    pub name: String,
    pub error: ConfigError,
}

/// A loaded, validated manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    pub settings: Settings,
    pub repositories: Vec<RepositorySpec>,
    pub invalid: Vec<InvalidEntry>,
    /// Directory relative paths were resolved against.
    pub base_dir: PathBuf,
}

impl Manifest {
    /// Read and validate the manifest at `path`.
    ///
    /// `.yaml` and `.yml` files are read as YAML, anything else as TOML.
    /// Relative paths inside the manifest resolve against its directory.
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let read_err = |source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        };
        let text = std::fs::read_to_string(path).map_err(read_err)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let base_dir = std::path::absolute(parent).map_err(read_err)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text, &base_dir),
            _ => Self::from_toml_str(&text, &base_dir),
        }
    }

    /// Parse and validate TOML manifest text.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> ManifestResult<Self> {
        let raw: RawManifest = toml::from_str(text)?;
        Self::from_raw(raw, base_dir)
    }

    /// Parse and validate YAML manifest text. Keys are the same as in TOML.
    pub fn from_yaml_str(text: &str, base_dir: &Path) -> ManifestResult<Self> {
        // an empty YAML document is null, not an empty mapping
        if text.trim().is_empty() {
            return Self::from_raw(RawManifest::default(), base_dir);
        }
        let raw: RawManifest = serde_yaml::from_str(text)?;
        Self::from_raw(raw, base_dir)
    }

    fn from_raw(raw: RawManifest, base_dir: &Path) -> ManifestResult<Self> {
        let mut settings = raw.settings;
        settings.validate()?;
        settings.state_dir = resolve(base_dir, &settings.state_dir);
        settings.mirror_root = resolve(base_dir, &settings.mirror_root);

        let built: Vec<(String, Result<RepositorySpec, ConfigError>)> = raw
            .repositories
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let label = value
                    .get("name")
                    .and_then(toml::Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("repository[{index}]"));
                (label, build_repository(value, &settings, base_dir))
            })
            .collect();

        // counted on the validated name, so "demo" and "demo " collide
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for (_, result) in &built {
            if let Ok(spec) = result {
                *occurrences.entry(spec.name.clone()).or_default() += 1;
            }
        }

        let mut repositories = Vec::new();
        let mut invalid = Vec::new();
        for (label, result) in built {
            let result = result.and_then(|spec| {
                if occurrences.get(&spec.name).copied().unwrap_or(0) > 1 {
                    Err(ConfigError::DuplicateRepository(spec.name))
                } else {
                    Ok(spec)
                }
            });
            match result {
                Ok(spec) => {
                    debug!(repository = %spec.name, downstreams = spec.downstreams.len(), "loaded repository");
                    repositories.push(spec);
                }
                Err(error) => {
                    warn!(repository = %label, %error, "invalid repository entry");
                    invalid.push(InvalidEntry { name: label, error });
                }
            }
        }

        Ok(Self {
            settings,
            repositories,
            invalid,
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn repository(&self, name: &str) -> Option<&RepositorySpec> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Number of entries, valid or not.
    pub fn len(&self) -> usize {
        self.repositories.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    let value = value.ok_or(ConfigError::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn build_repository(
    value: toml::Value,
    settings: &Settings,
    base_dir: &Path,
) -> Result<RepositorySpec, ConfigError> {
    let raw: RawRepository = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Malformed(e.to_string().trim().to_string()))?;

    let name = required(raw.name, "name")?;
    validate_component_name(&name)?;

    let upstream = Endpoint {
        url: required(raw.upstream, "upstream")?,
        env: raw.upstream_env,
    }
    .resolved_against(base_dir);

    let local = match raw.local {
        Some(path) => resolve(base_dir, &path),
        None => settings.mirror_root.join(format!("{name}.git")),
    };

    let filter = RefFilter::new(&raw.include, &raw.exclude)?;

    let mut seen = HashSet::new();
    let mut downstreams = Vec::with_capacity(raw.downstreams.len());
    for (index, raw) in raw.downstreams.into_iter().enumerate() {
        let ds_name = match raw.name {
            Some(n) => n.trim().to_string(),
            None => format!("downstream-{}", index + 1),
        };
        validate_component_name(&ds_name)?;
        if !seen.insert(ds_name.clone()) {
            return Err(ConfigError::DuplicateDownstream(ds_name));
        }
        downstreams.push(DownstreamSpec {
            name: ds_name,
            endpoint: Endpoint {
                url: required(raw.url, "downstream.url")?,
                env: raw.env,
            }
            .resolved_against(base_dir),
            force: raw.force,
        });
    }

    Ok(RepositorySpec {
        name,
        upstream,
        local: LocalMirror::new(local),
        downstreams,
        filter,
        prune: raw.prune,
    })
}
