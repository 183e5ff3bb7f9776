#![forbid(unsafe_code)]

pub mod bank;
pub mod model;
pub mod time;

pub use bank::{BankError, QuestionBank};
pub use time::Clock;
