#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod guard;
pub mod selector;
pub mod store;

pub use quiz_core::Clock;

pub use config::{GuardConfig, StorePaths};
pub use error::SessionStoreError;
pub use guard::{ActionGuard, ActionKey, Admission, InFlightPermit};
pub use selector::SeriesSelector;
pub use store::SessionStore;
