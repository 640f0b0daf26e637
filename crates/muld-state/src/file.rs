//! Filesystem state store: one JSON document per repository.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use muld_refs::validate_component_name;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, StateError};
use crate::record::SyncRecord;
use crate::traits::StateStore;

const EXTENSION: &str = "json";

/// [`StateStore`] writing `<dir>/<repository>.json`.
///
/// A save writes a temporary file in the same directory, syncs it and renames
/// it over the previous record, so a crash leaves either the old or the new
/// document on disk.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Use `dir` for records, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StateError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, repository: &str) -> Result<PathBuf> {
        validate_component_name(repository)?;
        Ok(self.dir.join(format!("{repository}.{EXTENSION}")))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, repository: &str) -> Result<Option<SyncRecord>> {
        let path = self.record_path(repository)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Io { path, source }),
        };
        let record = serde_json::from_slice(&bytes)
            .map_err(|source| StateError::Corrupt { path, source })?;
        Ok(Some(record))
    }

    fn save(&self, record: &SyncRecord) -> Result<()> {
        let path = self.record_path(&record.repository)?;
        let io_err = |source| StateError::Io {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        debug!(repository = %record.repository, path = %path.display(), "saved sync record");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StateError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                // skips in-flight temporaries, which start with '.'
                if validate_component_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
