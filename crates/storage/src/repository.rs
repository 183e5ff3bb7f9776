use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::document::{UsersDocument, decode_rows};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to replace {target} with {temp}: {source}")]
    AtomicWriteFailed {
        temp: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Result of reading the users document.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(UsersDocument),
    /// Nothing stored yet.
    Missing,
    /// Something is stored but it is not a users document.
    Corrupt { reason: String },
}

/// Persistence contract for the users document.
///
/// `save` must replace the stored document atomically: a reader sees either
/// the previous document or the new one, never a partial write.
pub trait UsersRepository: Send + Sync {
    /// Read the stored document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only for I/O failures; unparseable content is
    /// reported as `LoadOutcome::Corrupt`.
    fn load(&self) -> Result<LoadOutcome, StorageError>;

    /// Replace the stored document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be serialized or written.
    fn save(&self, doc: &UsersDocument) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    stored: Option<String>,
    saves: usize,
}

/// In-memory repository for tests and prototyping.
///
/// Keeps the serialized JSON rather than the value so loads go through the
/// same decoding path as the file adapter.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with raw stored content.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        let repo = Self::new();
        if let Ok(mut guard) = repo.state.lock() {
            guard.stored = Some(raw.into());
        }
        repo
    }

    /// Number of successful `save` calls so far.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.state.lock().map(|s| s.saves).unwrap_or_default()
    }

    /// Raw content of the last save.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.stored.clone())
    }
}

impl UsersRepository for InMemoryRepository {
    fn load(&self) -> Result<LoadOutcome, StorageError> {
        let guard = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(match guard.stored.as_deref() {
            None => LoadOutcome::Missing,
            Some(raw) => decode(raw),
        })
    }

    fn save(&self, doc: &UsersDocument) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(doc)?;
        let mut guard = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        guard.stored = Some(raw);
        guard.saves += 1;
        Ok(())
    }
}

/// Decode stored content. Only an unreadable envelope counts as corrupt;
/// bad rows are handled one by one.
pub(crate) fn decode(raw: &str) -> LoadOutcome {
    if raw.trim().is_empty() {
        return LoadOutcome::Corrupt {
            reason: "empty document".to_string(),
        };
    }
    match decode_rows(raw) {
        Ok(doc) => LoadOutcome::Loaded(doc),
        Err(err) => LoadOutcome::Corrupt {
            reason: err.to_string(),
        },
    }
}
