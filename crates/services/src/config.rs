use std::path::PathBuf;
use std::time::Duration;

/// Timing knobs for [`ActionGuard`](crate::ActionGuard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Repeats of the same action closer together than this are dropped.
    pub dedup_ttl: Duration,
    /// A user lock older than this is treated as released.
    pub in_flight_timeout: Duration,
    /// Purge expired entries every this many guard calls; 0 disables it.
    pub sweep_every: u32,
}

impl GuardConfig {
    pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_millis(800);
    pub const DEFAULT_IN_FLIGHT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const DEFAULT_SWEEP_EVERY: u32 = 1024;

    #[must_use]
    pub fn new(dedup_ttl: Duration, in_flight_timeout: Duration) -> Self {
        Self {
            dedup_ttl,
            in_flight_timeout,
            ..Self::default()
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: Self::DEFAULT_DEDUP_TTL,
            in_flight_timeout: Self::DEFAULT_IN_FLIGHT_TIMEOUT,
            sweep_every: Self::DEFAULT_SWEEP_EVERY,
        }
    }
}

/// Where the bank sources and the users document live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub topics: PathBuf,
    pub questions: PathBuf,
    pub users: PathBuf,
}

impl StorePaths {
    /// All three files under one directory with their default names.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            topics: dir.join("topics.json"),
            questions: dir.join("questions.json"),
            users: dir.join("users.json"),
        }
    }
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::in_dir("database")
    }
}
