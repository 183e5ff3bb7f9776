#![forbid(unsafe_code)]

pub mod bank_files;
pub mod document;
pub mod json_file;
pub mod repository;

pub use document::{USERS_DOCUMENT_VERSION, UsersDocument};
pub use json_file::JsonFileRepository;
pub use repository::{InMemoryRepository, LoadOutcome, StorageError, UsersRepository};
