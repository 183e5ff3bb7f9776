use chrono::{DateTime, SecondsFormat, Utc};

/// Where `created_at` / `updated_at` stamps come from. Stamps are stored at
/// whole-second resolution, so `now` already drops the fraction.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    /// Wall-clock UTC.
    #[default]
    System,
    /// Every stamp is this instant; used to make stored documents reproducible.
    Pinned(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn pinned(at: DateTime<Utc>) -> Self {
        Self::Pinned(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let now = match self {
            Clock::System => Utc::now(),
            Clock::Pinned(at) => *at,
        };
        DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
    }
}

/// Formats a timestamp the way the users document stores it
/// (`2023-11-14T22:13:20Z`).
#[must_use]
pub fn format_iso(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serde adapter for `DateTime<Utc>` fields stored as second-resolution
/// RFC 3339 strings. Reading accepts any RFC 3339 offset.
pub mod iso_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_iso(at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Unix time of the stamp written by [`pinned_clock`] (2023-11-14T22:13:20Z).
pub const PINNED_UNIX_SECONDS: i64 = 1_700_000_000;

#[must_use]
pub fn pinned_now() -> DateTime<Utc> {
    DateTime::from_timestamp(PINNED_UNIX_SECONDS, 0).unwrap_or_default()
}

/// A clock stuck at [`pinned_now`], so users documents written in tests
/// compare byte for byte.
#[must_use]
pub fn pinned_clock() -> Clock {
    Clock::pinned(pinned_now())
}
