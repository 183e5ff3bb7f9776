//! Users document kept in a single JSON file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::document::UsersDocument;
use crate::repository::{LoadOutcome, StorageError, UsersRepository, decode};

/// File-backed users repository.
///
/// Every save writes `<path>.tmp`, syncs it and renames it over `path`, so a
/// crash mid-write leaves the previous document intact. There is no
/// cross-process locking: one process per file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl UsersRepository for JsonFileRepository {
    fn load(&self) -> Result<LoadOutcome, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Ok(LoadOutcome::Corrupt {
                    reason: err.to_string(),
                });
            }
            Err(source) => {
                return Err(StorageError::Io {
                    operation: "read",
                    path: self.path.clone(),
                    source,
                });
            }
        };
        Ok(decode(&raw))
    }

    fn save(&self, doc: &UsersDocument) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.path, &self.temp_path(), &bytes)?;
        tracing::trace!(path = %self.path.display(), users = doc.users.len(), "users document saved");
        Ok(())
    }
}

fn write_atomic(path: &Path, temp_path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            operation: "create directory",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut file = File::create(temp_path).map_err(|source| StorageError::Io {
        operation: "create",
        path: temp_path.to_path_buf(),
        source,
    })?;
    file.write_all(bytes).map_err(|source| StorageError::Io {
        operation: "write",
        path: temp_path.to_path_buf(),
        source,
    })?;
    file.sync_all().map_err(|source| StorageError::Io {
        operation: "sync",
        path: temp_path.to_path_buf(),
        source,
    })?;
    drop(file);

    fs::rename(temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        temp: temp_path.to_path_buf(),
        target: path.to_path_buf(),
        source,
    })
}
