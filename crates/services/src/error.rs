//! Shared error types for the services crate.

use thiserror::Error;

use storage::StorageError;

/// Errors emitted by `SessionStore`.
///
/// Soft outcomes (no session, pool too small, unknown question) are not
/// errors; they come back as `false`, `None` or an empty series.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("session store lock poisoned")]
    Poisoned,
}
